//! Autoexporter: starts Prometheus exporter sidecars next to the containers they monitor.
//!
//! This library watches the Docker event stream, resolves the exporters a container needs
//! (explicit label or catalog match), provisions them as sidecars sharing the container's
//! network namespace and tears them down when the container dies. Running exporters are
//! exposed to Prometheus through an HTTP service discovery endpoint.
use std::sync::Arc;

use error::ResultOkLogExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub mod api;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod container;
pub mod dispatcher;
pub mod error;
pub mod exporter;
pub mod fsutil;
pub mod reconcile;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod runtime;
pub mod targets;

#[cfg(test)]
mod testutil;

/// Capacity of the task event channel feeding the target store.
const TASK_EVENT_BUFFER: usize = 64;

/// Runs the autoexporter daemon.
///
/// Connects to the Docker daemon, starts the service discovery API and the periodic
/// reconciliation, then dispatches container events until the event stream fails or the
/// process receives Ctrl-C.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid `AUTOEXPORTER_*` environment variables.
/// - An unreadable or invalid catalog file.
/// - Failure to connect to the Docker daemon.
/// - A failed or closed event subscription.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Configuration: {:?}", config);

    let catalog = match &config.catalog {
        Some(path) => catalog::PredefinedCatalog::load(path)?,
        None => catalog::PredefinedCatalog::builtin()?,
    };
    log::info!(
        "Known exporter types: {}",
        catalog.exporter_types().collect::<Vec<_>>().join(", ")
    );

    let runtime = runtime::DockerRuntime::connect()?;
    let backend = Arc::new(backend::Backend::new(
        Arc::new(runtime),
        Arc::new(catalog),
        config.network.clone(),
    ));
    let root = CancellationToken::new();

    let store = Arc::new(targets::TargetStore::new());
    let (events_tx, events_rx) = mpsc::channel(TASK_EVENT_BUFFER);
    {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.consume(events_rx).await });
    }
    {
        let api = api::APIServer::new(Arc::clone(&store));
        let addr = config.listen_addr;
        let shutdown = root.clone();
        tokio::spawn(async move { api.listen(addr, shutdown).await.ok_log() });
    }
    {
        let reconciler = reconcile::Reconciler::new(Arc::clone(&backend), config.retry)
            .with_task_events(events_tx.clone());
        let cancel = root.clone();
        let interval = config.reconcile_interval;
        tokio::spawn(async move {
            reconciler.restore_targets().await.ok_log();
            match interval {
                Some(interval) => reconciler.run_every(interval, cancel).await,
                None => {
                    reconciler.reconcile(&cancel).await.ok_log();
                }
            }
        });
    }

    let dispatcher = dispatcher::Dispatcher::new(
        Arc::clone(&backend),
        Arc::new(registry::CancellationRegistry::new()),
        config.retry,
    )
    .with_task_events(events_tx);

    let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        result = dispatcher.listen(&root, chrono::Utc::now()) => result.map_err(Into::into),
        signal = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl-C, shutting down");
            signal.map_err(Into::into)
        }
    };
    root.cancel();

    if config.cleanup_on_exit {
        log::info!("Removing every exporter");
        backend.cleanup_exporters(true).await.ok_log();
    }

    result
}
