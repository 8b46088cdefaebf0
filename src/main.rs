//! Sample site server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ bind request ID ──▶ request log ──▶ panic recovery ──▶ handler
//!                      (child logger)     (body tee,                          (version,
//!                                          one record)                         404, 405)
//!
//!     Cross-cutting:  config (TOML + flags)   observability (console + rotating file)
//!                     lifecycle (SIGINT/SIGTERM → graceful drain)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use sample_site::config::{load_config, validate_config, ConfigError, SiteConfig};
use sample_site::lifecycle::{spawn_signal_listener, Shutdown};
use sample_site::version::BuildInfo;
use sample_site::{AppState, HttpServer, Logger};

#[derive(Parser)]
#[command(name = "sample-site")]
#[command(about = "Serves build information over HTTP", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the log level.
    #[arg(long)]
    log_level: Option<String>,

    /// Also write JSON logs to this file.
    #[arg(long)]
    log_file: Option<String>,
}

impl Cli {
    fn resolve(self) -> Result<SiteConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SiteConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if let Some(path) = self.log_file {
            config.log.send_to_file = true;
            config.log.file_path = path;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().resolve()?;

    let logger = Logger::new(&config.log)?;
    logger.install_global()?;

    let build = BuildInfo::current();
    logger.in_scope(|| {
        tracing::info!(
            version = build.version,
            build_number = build.build_number,
            git_commit = build.git_commit,
            log_level = %config.log.level,
            send_to_file = config.log.send_to_file,
            "sample-site starting"
        );
    });

    let state = AppState::from_config(&config, logger.clone())?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_signal_listener(shutdown, logger.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    HttpServer::new(state).run(listener, server_shutdown).await?;

    logger.info("Shutdown complete");
    Ok(())
}
