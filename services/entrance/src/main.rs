use anyhow::{Context, Result};
use entrance_registry::config::{PhotoBackend, StoreBackend};
use entrance_registry::{
    start_api_server, AccessLogStore, AppState, Config, EntranceWorkflow, InMemoryStore,
    MemoryObjectStorage, ObjectStorage, PostgresStore, RecentEntriesFeed, S3PhotoStorage,
    VisitorStore,
};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        store = ?config.store.backend,
        photos = ?config.photos.backend,
        "Starting entrance registry"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let (visitors, logs) = build_record_stores(&config).await?;
    let storage = build_photo_storage(&config).await?;

    // A missing bucket is not fatal: photos degrade to inline data URIs.
    let photo_bucket_error = match storage.check_ready().await {
        Ok(()) => {
            info!(bucket = %config.photos.bucket, "Photo bucket ready");
            None
        }
        Err(e) => {
            warn!(
                error = %e,
                bucket = %config.photos.bucket,
                "Photo bucket not ready, photos will be stored inline"
            );
            Some(e.to_string())
        }
    };

    let nudge = Arc::new(Notify::new());
    let workflow = Arc::new(
        EntranceWorkflow::new(visitors.clone(), logs, storage).with_entry_notifier(nudge.clone()),
    );
    let feed = Arc::new(RecentEntriesFeed::new(
        workflow.clone(),
        config.feed.limit,
        config.feed_refresh_interval(),
        nudge,
    ));

    let cancel = CancellationToken::new();

    // Spawn feed polling task
    let feed_handle = tokio::spawn({
        let feed = feed.clone();
        let cancel = cancel.clone();
        async move { feed.run(cancel).await }
    });

    let api_state = AppState {
        workflow,
        visitors,
        feed: feed.subscribe(),
        photo_bucket_error,
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_cancel = cancel.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, api_cancel).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Entrance registry started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down entrance registry");

    cancel.cancel();
    for (name, handle) in [("feed", feed_handle), ("api", api_handle)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Task did not shut down cleanly");
        }
    }

    info!("Entrance registry stopped");

    Ok(())
}

/// Build the configured visitor and access log backends
async fn build_record_stores(
    config: &Config,
) -> Result<(Arc<dyn VisitorStore>, Arc<dyn AccessLogStore>)> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory record store, data is lost on restart");
            let store = Arc::new(InMemoryStore::new());
            let visitors: Arc<dyn VisitorStore> = store.clone();
            let logs: Arc<dyn AccessLogStore> = store;
            Ok((visitors, logs))
        }
        StoreBackend::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("store.backend = \"postgres\" requires a [database] section")?;

            let store = Arc::new(
                PostgresStore::new(database)
                    .await
                    .context("Failed to initialize PostgreSQL store")?,
            );

            // Run migrations if enabled
            if database.run_migrations {
                store
                    .run_migrations()
                    .await
                    .context("Failed to run database migrations")?;
            }

            let visitors: Arc<dyn VisitorStore> = store.clone();
            let logs: Arc<dyn AccessLogStore> = store;
            Ok((visitors, logs))
        }
    }
}

async fn build_photo_storage(config: &Config) -> Result<Arc<dyn ObjectStorage>> {
    let storage: Arc<dyn ObjectStorage> = match config.photos.backend {
        PhotoBackend::Memory => Arc::new(MemoryObjectStorage::new(config.photos.bucket.clone())),
        PhotoBackend::S3 => Arc::new(
            S3PhotoStorage::new(&config.photos)
                .await
                .context("Failed to initialize S3 photo storage")?,
        ),
    };
    Ok(storage)
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
