use std::pin::Pin;

/// A boxed async stream, used for token streams from the inference engine.
///
/// The stream is lazy, finite, single-shot, and ordered; dropping it cancels
/// the underlying inference delivery.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;
