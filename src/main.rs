use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rabbit::build::GitBuilder;
use rabbit::catalog::{CatalogBackend, CatalogError};
use rabbit::config::{Config, ConfigError, LogFormat};
use rabbit::dispatch::{DispatchError, Dispatcher};
use rabbit::server::{AppState, build_router};
use rabbit::webhooks::Provider;
use rabbit::worker::{ReleaseSource, ReleaseWorker, WorkerError, WorkerPool};

/// Builds and serves releases from tag push webhooks.
#[derive(Debug, Parser)]
#[command(name = "rabbit", version, about)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "RABBIT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("failed to set up dispatcher: {0}")]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("rabbit: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Exiting");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    for provider in [Provider::Gitlab, Provider::Github] {
        let settings = match provider {
            Provider::Gitlab => &config.integrations.gitlab,
            Provider::Github => &config.integrations.github,
        };
        if settings.secret().is_none() {
            warn!(provider = %provider, "No webhook secret configured, deliveries are not authenticated");
        }
    }

    let addr = config.app.listen_addr()?;
    let shutdown = CancellationToken::new();

    let catalog = Arc::new(CatalogBackend::from_config(&config.catalog)?);
    let (dispatcher, receiver) = Dispatcher::from_config(&config.broker, shutdown.clone())?;
    let source = match receiver {
        Some(rx) => ReleaseSource::Channel(rx),
        None => ReleaseSource::subscribe(&config.broker.redis).await?,
    };

    let worker = ReleaseWorker::new(GitBuilder::from_config(&config.build), Arc::clone(&catalog));
    let pool = WorkerPool::new(worker, config.broker.workers);
    // The server must not keep accepting releases nobody will build.
    let workers = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            pool.run(source, shutdown.clone()).await;
            if !shutdown.is_cancelled() {
                error!("Worker pool stopped unexpectedly, shutting down");
                shutdown.cancel();
            }
        }
    });

    let app = build_router(AppState::new(config, dispatcher, catalog));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;
    shutdown.cancel();

    if let Err(e) = workers.await {
        error!(error = %e, "Worker pool task failed");
    }
    served?;

    info!("Stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
