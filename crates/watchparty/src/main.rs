//! # watchparty
//!
//! Watch-party server binary. Loads settings, starts logging and metrics,
//! and serves the WebSocket hub plus the HTTP API until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use watchparty_server::{ServerConfig, WatchpartyServer};
use watchparty_settings::loader::parse_log_level;
use watchparty_settings::{LogLevel, WatchpartySettings};

/// Watch-party sync server.
#[derive(Parser, Debug)]
#[command(name = "watchparty", about = "Watch-party sync server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 1-65535 (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.watchparty/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Movie library directory (overrides settings).
    #[arg(long)]
    library: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, value_parser = parse_level)]
    log_level: Option<LogLevel>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

fn parse_level(val: &str) -> std::result::Result<LogLevel, String> {
    parse_log_level(val).ok_or_else(|| format!("unknown log level: {val}"))
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut WatchpartySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(library) = &self.library {
            settings.library.path = library.to_string_lossy().into_owned();
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

fn load(cli: &Cli) -> Result<WatchpartySettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(watchparty_settings::settings_path);
    let mut settings = watchparty_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    watchparty_settings::validate(&settings).context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    watchparty_core::logging::init_subscriber(
        settings.logging.level.as_filter_str(),
        settings.logging.json,
    );

    let metrics = match watchparty_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let config = ServerConfig::from(&settings);

    let server = WatchpartyServer::new(config, metrics);
    let addr = server.listen().await.context("Failed to bind server")?;
    tracing::info!(library = %server.config().library_dir.display(), "watchparty listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let stuck = server.stop(Duration::from_secs(10)).await;
    if !stuck.is_empty() {
        tracing::warn!(?stuck, "tasks aborted during shutdown");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_all_flags() {
        let cli = Cli::try_parse_from([
            "watchparty",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--config",
            "/tmp/wp.json",
            "--library",
            "/srv/movies",
            "--log-level",
            "debug",
            "--log-json",
        ])
        .unwrap();
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/wp.json")));
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(cli.log_json);
    }

    #[test]
    fn cli_rejects_unknown_level() {
        assert!(Cli::try_parse_from(["watchparty", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::try_parse_from([
            "watchparty",
            "--port",
            "4000",
            "--library",
            "/srv/movies",
            "--log-json",
        ])
        .unwrap();
        let mut settings = WatchpartySettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 4000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.library.path, "/srv/movies");
        assert!(settings.logging.json);
    }

    #[test]
    fn load_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"maxConnections": 12}}"#).unwrap();
        let cli = Cli::try_parse_from([
            "watchparty",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "5000",
        ])
        .unwrap();
        let settings = load(&cli).unwrap();
        assert_eq!(settings.server.max_connections, 12);
        assert_eq!(settings.server.port, 5000);
    }

    #[test]
    fn load_rejects_port_zero_from_flags() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "watchparty",
            "--config",
            dir.path().join("missing.json").to_str().unwrap(),
            "--port",
            "0",
        ])
        .unwrap();
        assert!(load(&cli).is_err());
    }
}
