use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use upvote_admin::cli::Cli;
use upvote_admin::client::UpvoteClient;
use upvote_admin::commands;
use upvote_admin::config::AppConfig;
use upvote_admin::resources::HttpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(Some(path), |key| std::env::var(key).ok()),
        None => AppConfig::load(),
    }?;
    init_tracing(&config.log_filter);
    info!("using Upvote backend at {}", config.api_base_url);

    let transport = HttpTransport::from_config(&config)?;
    let client = Arc::new(UpvoteClient::new(Arc::new(transport), &config.web_prefix));

    tokio::select! {
        result = commands::run(cli.command, cli.json, &config, client) => {
            result.context("command failed")
        }
        _ = shutdown_signal() => {
            warn!("interrupted; pending requests dropped");
            Ok(())
        }
    }
}

fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
