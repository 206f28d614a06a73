use std::sync::Arc;

use anyhow::Context;

use jobrelay_infra::config::{AppConfig, StoreConfig};
use jobrelay_infra::jobs::{InMemoryJobStore, JobEngine, JobStore, SqliteJobStore};
use jobrelay_infra::notify::WebhookNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobrelay_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let store: Arc<dyn JobStore> = match &config.store {
        StoreConfig::InMemory => {
            tracing::warn!("USE_IN_MEMORY_STORE set; jobs will not survive a restart");
            InMemoryJobStore::arc()
        }
        StoreConfig::Sqlite { url } => Arc::new(
            SqliteJobStore::connect(url)
                .await
                .with_context(|| format!("failed to open job database {url}"))?,
        ),
    };

    let notifier = WebhookNotifier::new(config.webhook_url.clone(), config.webhook_timeout)
        .context("failed to build webhook client")?
        .with_retry_policy(config.retry_policy());
    if !notifier.is_enabled() {
        tracing::warn!("WEBHOOK_URL not set; completion notifications are disabled");
    }

    let engine = JobEngine::new(store, Arc::new(notifier), config.engine_config());
    let recovered = engine
        .recover()
        .await
        .context("failed to reschedule running jobs")?;
    tracing::info!(recovered, "job engine ready");

    let app = jobrelay_api::app::build_app(engine.clone());

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(jobrelay_api::shutdown::shutdown_signal())
        .await
        .context("server error")?;

    let aborted = engine.shutdown().await;
    tracing::info!(aborted, "shutdown complete");
    Ok(())
}
