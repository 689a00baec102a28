//! Command-line surface: `serve` (the default), plus `config`
//! inspection utilities. Grounded on the teacher's `cli::Cli`/`Command`
//! shape, trimmed to what this gateway actually does — no chat/import/
//! systemd/login subcommands, since those belong to a different domain.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use sa_domain::config::{Config, ConfigSeverity};

#[derive(Debug, Parser)]
#[command(name = "superagent", version, about = "Agent orchestration backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the configuration from the path named by `SA_CONFIG` (or
/// `config.toml` by default). Returns the parsed config and the path it
/// was loaded from, so callers can report it and later write back to
/// the same file.
pub fn load_config() -> anyhow::Result<(Config, PathBuf)> {
    let config_path: PathBuf = std::env::var("SA_CONFIG")
        .unwrap_or_else(|_| "config.toml".into())
        .into();
    let config = Config::load(&config_path)
        .map_err(|e| anyhow::anyhow!("loading {}: {e}", config_path.display()))?;
    Ok((config, config_path))
}

/// Parse and validate the config, printing any issues. Returns `true`
/// when there are no `Error`-severity findings.
pub fn validate(config: &Config, config_path: &PathBuf) -> bool {
    let findings = config.validate();
    if findings.is_empty() {
        println!("Config OK ({})", config_path.display());
        return true;
    }

    let error_count = findings
        .iter()
        .filter(|(sev, _)| *sev == ConfigSeverity::Error)
        .count();
    let warning_count = findings.len() - error_count;

    for (severity, message) in &findings {
        let label = match severity {
            ConfigSeverity::Error => "error",
            ConfigSeverity::Warning => "warning",
        };
        println!("[{label}] {message}");
    }

    println!(
        "\n{error_count} error(s), {warning_count} warning(s) in {}",
        config_path.display()
    );
    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
