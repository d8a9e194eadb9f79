use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use config::env::{EnvKey, EnvReader};
use config::settings::AppConfig;
use dotenvy::dotenv;
use infrastructure::codec::ffmpeg::FfmpegExtractor;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod cli;
mod common;
mod config;
mod docs;
mod infrastructure;
mod middleware;
mod modules;
mod routes;
mod state;
#[cfg(test)]
mod testing;
mod workers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    init_tracing(if cli.verbose { "debug" } else { "info" });

    if let Commands::CheckTools = cli.command {
        return check_tools().await;
    }

    let config = AppConfig::new().context("Failed to load configuration")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    match cli.command {
        Commands::Gateway { port } => app::start_gateway(config, port, shutdown).await,
        Commands::Converter => workers::converter::start_converter_worker(config, shutdown).await,
        Commands::Notifier => workers::notifier::start_notification_worker(config, shutdown).await,
        Commands::CheckTools => Ok(()),
    }
}

fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();
}

async fn check_tools() -> anyhow::Result<()> {
    let configured = EnvReader::process().get(EnvKey::FfmpegPath);
    let extractor = FfmpegExtractor::locate(configured.as_deref(), Duration::from_secs(30))
        .context("ffmpeg not found")?;

    let has_mp3 = extractor.has_mp3_encoder().await?;
    println!("ffmpeg: {}", extractor.binary().display());
    println!("libmp3lame: {}", if has_mp3 { "available" } else { "missing" });

    if !has_mp3 {
        anyhow::bail!("ffmpeg was built without libmp3lame");
    }
    Ok(())
}

/// Waits for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing in-flight work"),
        _ = terminate => info!("Received SIGTERM, finishing in-flight work"),
    }
}
