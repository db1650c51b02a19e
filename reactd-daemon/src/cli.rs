//! CLI argument definitions for reactd.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use reactd_core::config::{GeneralConfig, ReactdConfig};

/// reactd log reaction daemon.
///
/// Tails log files and systemd journal streams, matches every line against
/// the configured rules and runs external commands when a rule triggers.
#[derive(Parser, Debug)]
#[command(name = "reactd")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to reactd.toml configuration file.
    #[arg(short, long, default_value = "/etc/reactd/reactd.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Parse the configuration, compile every rule and exit.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    ///
    /// An empty string disables the PID file.
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Read the configuration file, then apply environment and CLI overrides.
    ///
    /// The result is not validated yet.
    pub async fn load_config(&self) -> Result<ReactdConfig> {
        let mut config = ReactdConfig::from_file(&self.config)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load {}: {}", self.config.display(), e))?;
        config.apply_env_overrides();
        self.apply_overrides(&mut config.general);
        Ok(config)
    }

    /// Apply the CLI overrides on top of the loaded general configuration.
    pub fn apply_overrides(&self, general: &mut GeneralConfig) {
        if let Some(level) = &self.log_level {
            general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            general.log_format = format.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            general.pid_file = pid_file.clone();
        }
    }
}
