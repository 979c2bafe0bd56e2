pub mod config;
pub mod resolve;

use clap::{Parser, Subcommand};

/// Arbor: capability resolution and session affinity for agent trees.
#[derive(Debug, Parser)]
#[command(name = "arbor", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Resolve a capability provider against the configured tree and exit.
    Resolve {
        /// Agent to start the search from.
        #[arg(long)]
        start: String,
        /// Capability / data key to look for.
        #[arg(long)]
        key: String,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `ARBOR_CONFIG` (or
/// `config.toml` by default).  A missing file yields the defaults.
pub fn load_config() -> anyhow::Result<(ar_domain::config::Config, String)> {
    let config_path = std::env::var("ARBOR_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(&config_path)?;
    Ok((config, config_path))
}

pub fn load_config_from(config_path: &str) -> anyhow::Result<ar_domain::config::Config> {
    if !std::path::Path::new(config_path).exists() {
        return Ok(ar_domain::config::Config::default());
    }
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))
}
