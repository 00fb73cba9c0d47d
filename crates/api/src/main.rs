use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagesmith_api::config::ServerConfig;
use pagesmith_api::router::build_app_router;
use pagesmith_api::state::AppState;
use pagesmith_db::{KvStore, MemoryStore, PgStore};
use pagesmith_oracle::OracleApi;
use pagesmith_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pagesmith_api=debug,pagesmith_worker=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store ---
    let store: Arc<dyn KvStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = pagesmith_db::create_pool(&database_url)
                .await
                .context("Failed to connect to database")?;
            pagesmith_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            pagesmith_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Using Postgres job store");
            Arc::new(PgStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    // --- In-process workers ---
    let cancel = CancellationToken::new();
    let mut workers = JoinSet::new();
    if config.inprocess_workers > 0 {
        let worker_config = WorkerConfig::from_env().context("Invalid worker configuration")?;
        let backend = Arc::new(OracleApi::new(
            worker_config.oracle_base_url.clone(),
            worker_config.oracle_api_key.clone(),
        ));
        for _ in 0..config.inprocess_workers {
            let worker = Worker::new(store.clone(), backend.clone(), worker_config.clone());
            let cancel = cancel.clone();
            workers.spawn(async move { worker.run(cancel).await });
        }
        tracing::info!(count = config.inprocess_workers, models = %worker_config.model_chain, "Started in-process workers");
    }

    // --- Router ---
    let state = AppState::new(store, config.clone());
    let app = build_app_router(state, &config);

    // --- Start server ---
    let ip: IpAddr = config.host.parse().context("Invalid HOST address")?;
    let addr = SocketAddr::new(ip, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, stopping workers");
    cancel.cancel();
    let drain = async { while workers.join_next().await.is_some() {} };
    if tokio::time::timeout(Duration::from_secs(config.shutdown_timeout_secs), drain)
        .await
        .is_err()
    {
        tracing::warn!("Workers did not finish in time, aborting");
        workers.abort_all();
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
