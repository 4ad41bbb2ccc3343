//! PARC Daemon - Peer-Assist Rescue Core
//!
//! The PARC daemon provides:
//! - REST API for SOS flares, hype, and preferences
//! - Escalation sweeper firing the AI fallback for unanswered flares
//! - Tribe fan-out through the configured push gateway

use anyhow::Context;
use clap::Parser;
use parc_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// PARC Daemon CLI
#[derive(Parser)]
#[command(name = "parcd")]
#[command(about = "PARC Daemon - Peer-Assist Rescue Core", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PARC_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the configuration file)
    #[arg(short, long, env = "PARC_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "PARC_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "PARC_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Override with CLI args
    if let Some(listen) = cli.listen.as_deref() {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", listen))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Print startup banner
    println!(
        r#"
  ____   _    ____   ____
 |  _ \ / \  |  _ \ / ___|
 | |_) / _ \ | |_) | |
 |  __/ ___ \|  _ <| |___
 |_| /_/   \_\_| \_\\____|

  Peer-Assist Rescue Core
  Version: {}
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.server.listen_addr
    );

    // Create and run server
    let server = Server::new(config)
        .await
        .context("Failed to initialize PARC daemon")?;
    server.run().await.context("PARC daemon exited with an error")?;

    Ok(())
}
