//! Audio Tap (wavetap-ap) - Main entry point
//!
//! Runs the playback-session service: one local playback engine per session,
//! commands over HTTP, session events over SSE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wavetap_ap::api::{server, AppContext, CommandRouter};
use wavetap_ap::config::{CliOverrides, Settings, TomlConfig};
use wavetap_ap::engine::{LocalEngineFactory, SymphoniaMetadataReader};
use wavetap_ap::playback::{DeliveryMode, SessionRegistry};
use wavetap_common::EventBus;

/// Command-line arguments for wavetap-ap
#[derive(Parser, Debug)]
#[command(name = "wavetap-ap")]
#[command(about = "Audio playback tap service for wavetap")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "WAVETAP_PORT")]
    port: Option<u16>,

    /// Path to the TOML config file
    #[arg(short, long, env = "WAVETAP_CONFIG")]
    config: Option<PathBuf>,

    /// Sample delivery mode: pull or push
    #[arg(long)]
    delivery: Option<DeliveryMode>,

    /// Start playback as soon as a source is bound
    #[arg(long)]
    autoplay: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let settings = Settings::resolve(
        toml,
        &CliOverrides {
            port: args.port,
            delivery: args.delivery,
            autoplay: args.autoplay,
        },
    );

    // Initialize tracing: RUST_LOG wins over the configured level
    let default_filter = format!("wavetap_ap={0},wavetap_common={0},tower_http={0}", settings.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting wavetap-ap v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!(
        "Sample delivery: {}, autoplay on setSource: {}, scale: {:?}",
        settings.session.delivery_mode,
        settings.session.autoplay_on_set_source,
        settings.session.sample_scale
    );

    let bus = Arc::new(EventBus::new(settings.event_capacity));
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(LocalEngineFactory::new()),
        Arc::clone(&bus),
        settings.session,
    ));
    let commands = Arc::new(CommandRouter::new(
        Arc::clone(&registry),
        Arc::new(SymphoniaMetadataReader::new()),
    ));

    let ctx = AppContext {
        commands,
        bus,
        port: settings.listen_addr.port(),
    };

    server::run(ctx, settings.listen_addr, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    registry.close_all().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
