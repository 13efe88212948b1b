use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kinema_server::infra::app_state::AppState;
use kinema_server::infra::config::{ConfigLoad, ConfigLoader};
use kinema_server::infra::startup::{build_service, register_folders};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kinema-server")]
#[command(about = "Watches media folders, identifies video files and serves their metadata")]
struct Cli {
    /// Path to a kinema.toml configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Alternative .env file to load
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Folder to watch; may be repeated
    #[arg(long = "folder", value_name = "PATH")]
    folders: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &args.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }
    config.folders.extend(args.folders.iter().cloned());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "kinema_server=info,kinema_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    let workers = &config.ingest.workers;
    info!(
        workers.hash = workers.max_parallel_hashes,
        workers.identify = workers.max_parallel_identify,
        workers.metadata = workers.max_parallel_metadata,
        queue.drain_interval_ms = config.ingest.queue.drain_interval_ms,
        watch.scan_on_add = config.ingest.watch.scan_on_add,
        "ingest configuration in effect"
    );

    let service = build_service(&config).await?;
    service
        .start()
        .await
        .context("failed to start ingest service")?;
    let registered = register_folders(&service, &config.folders).await;
    if !config.folders.is_empty() {
        info!(registered, requested = config.folders.len(), "startup folders processed");
    }

    let bind_address = config.server.bind_address();
    let state = AppState::new(Arc::clone(&service), Arc::new(config));
    let app = kinema_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(address = %bind_address, "server listening");

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;
    if let Err(err) = &served {
        error!(error = %err, "server stopped with an error");
    }

    service.shutdown().await;
    served.context("server error")?;
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
    shutdown.cancel();
}
