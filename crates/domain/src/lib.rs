//! `jota-domain` — types shared across the Jota orchestrator crates:
//! configuration, the common error type, and the stream alias used for
//! token streaming.

pub mod config;
pub mod error;
pub mod stream;

pub use config::Config;
pub use error::{Error, Result};
pub use stream::BoxStream;
