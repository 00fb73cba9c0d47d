use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pagesmith_db::PgStore;
use pagesmith_oracle::OracleApi;
use pagesmith_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pagesmith_worker=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        models = %config.model_chain,
        oracle = %config.oracle_base_url,
        timeout_secs = config.oracle_timeout.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = pagesmith_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    pagesmith_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Worker ---
    let store = Arc::new(PgStore::new(pool));
    let backend = Arc::new(OracleApi::new(
        config.oracle_base_url.clone(),
        config.oracle_api_key.clone(),
    ));
    let worker = Worker::new(store, backend, config);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("Received Ctrl-C, finishing current job");
        signal_cancel.cancel();
    });

    worker.run(cancel).await;
    Ok(())
}
