//! Command-line interface and config loading.

use clap::{Parser, Subcommand};

/// Jota Orchestrator — chat gateway over a stateful inference engine.
#[derive(Debug, Parser)]
#[command(name = "jota", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the orchestrator server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Dump the resolved configuration (defaults + file + env) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `JOTA_CONFIG` (or
/// `config.toml` by default), then apply the environment variable
/// overrides. Returns the parsed config and the path that was used.
pub fn load_config() -> anyhow::Result<(jota_domain::Config, String)> {
    let config_path = std::env::var("JOTA_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let mut config: jota_domain::Config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        jota_domain::Config::default()
    };
    config.apply_env();

    Ok((config, config_path))
}
