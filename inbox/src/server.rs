use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::classifier::HeuristicClassifier;
use crate::config::Config;
use crate::event_log::EventLog;
use crate::router;
use crate::storage::memory::MemoryBackend;
use crate::storage::postgres::PostgresBackend;
use crate::storage::sqlite::SqliteBackend;
use crate::storage::{HybridStore, StorageBackend};
use crate::time::SystemClock;

async fn create_store(config: &Config) -> anyhow::Result<HybridStore> {
    let remote: Arc<dyn StorageBackend> = if config.memory_store {
        // In-memory store is only meant for local development, nothing survives a restart
        warn!("MEMORY_STORE is set, messages will not be persisted");
        Arc::new(MemoryBackend::new())
    } else {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is required unless MEMORY_STORE=true")?;
        let postgres = PostgresBackend::connect(
            url,
            config.max_pg_connections,
            Duration::from_secs(config.pg_acquire_timeout_seconds),
        )
        .await
        .context("failed to connect to postgres")?;

        if config.run_migrations {
            postgres
                .run_migrations()
                .await
                .context("failed to run migrations")?;
        }
        Arc::new(postgres)
    };

    let local: Option<Arc<dyn StorageBackend>> = match &config.local_cache_path {
        Some(path) => {
            let cache = SqliteBackend::open(path)
                .await
                .with_context(|| format!("failed to open local cache at {path}"))?;
            Some(Arc::new(cache))
        }
        None => None,
    };

    Ok(HybridStore::new(
        remote,
        local,
        config.storage_fallback.into(),
    ))
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = create_store(&config).await?;

    let app = router::router(
        SystemClock {},
        HeuristicClassifier {},
        store,
        EventLog::new(config.event_log_capacity),
        config.max_body_size,
        config.export_prometheus,
    );

    info!("listening on {:?}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    Ok(())
}
