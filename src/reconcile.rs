//! Periodic provisioning of exporters missing for running containers.
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{self, Backend, Outcome};
use crate::catalog::ExporterFinder;
use crate::container::MonitoredTask;
use crate::exporter::{TaskEvent, TaskEventType};
use crate::retry::RetryPolicy;
use crate::runtime::ContainerRuntime;

pub struct Reconciler<R, F> {
    backend: Arc<Backend<R, F>>,
    retry: RetryPolicy,
    events: Option<mpsc::Sender<TaskEvent>>,
}

/// Result of one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub started: usize,
    pub failed: usize,
}

impl<R, F> Reconciler<R, F>
where
    R: ContainerRuntime,
    F: ExporterFinder,
{
    pub fn new(backend: Arc<Backend<R, F>>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            events: None,
        }
    }

    /// Publishes a [`TaskEventType::Started`] event for every exporter brought up.
    pub fn with_task_events(mut self, events: mpsc::Sender<TaskEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Publishes `Started` events for the sidecars already running, grouped by the container
    /// they export. Returns the number of containers announced.
    ///
    /// Exported containers that are gone or stopped are skipped.
    ///
    /// # Errors
    ///
    /// Fails if the sidecars cannot be listed or an exported container cannot be inspected.
    pub async fn restore_targets(&self) -> backend::Result<usize> {
        let running = self.backend.running_exporters().await?;
        let names: HashSet<&str> = running.iter().map(|sidecar| sidecar.name.as_str()).collect();
        let exported: BTreeSet<_> = running.iter().map(|sidecar| &sidecar.exported_id).collect();

        let mut restored = 0;
        for exported_id in exported {
            let details = match self.backend.runtime().inspect(exported_id.as_str()).await {
                Ok(details) if details.running => details,
                Ok(_) => continue,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err.into()),
            };
            let task = MonitoredTask::new(details.id, details.name, details.labels);
            let exporters: Vec<_> = match self.backend.resolve_exporters(&task) {
                Ok(exporters) => exporters
                    .into_iter()
                    .filter(|exporter| names.contains(exporter.name.as_str()))
                    .collect(),
                Err(err) => {
                    log::warn!("{}", err);
                    continue;
                }
            };
            if exporters.is_empty() {
                continue;
            }

            self.publish(TaskEvent {
                task,
                event_type: TaskEventType::Started,
                exporters,
            })
            .await;
            restored += 1;
        }
        log::debug!("Restored targets of {} containers", restored);

        Ok(restored)
    }

    /// Starts every missing exporter once.
    ///
    /// # Errors
    ///
    /// Only the container listing is fatal; failing exporters are logged and counted.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> backend::Result<Summary> {
        let missing = self.backend.find_missing_exporters().await?;
        let mut summary = Summary::default();

        for exporter in &missing {
            let backend = self.backend.as_ref();
            match self
                .retry
                .run(move || backend.run_exporter(exporter, cancel))
                .await
            {
                Ok(Outcome::Started(_)) => {
                    summary.started += 1;
                    self.publish(TaskEvent {
                        task: exporter.monitored_task.clone(),
                        event_type: TaskEventType::Started,
                        exporters: vec![exporter.clone()],
                    })
                    .await;
                }
                Ok(Outcome::Cancelled(_)) => break,
                Err(err) => {
                    log::error!("Failed to start missing exporter `{}`: {}", exporter.name, err);
                    summary.failed += 1;
                }
            }
        }
        if !missing.is_empty() {
            log::info!(
                "Reconciliation started {} exporters, {} failed",
                summary.started,
                summary.failed
            );
        }

        Ok(summary)
    }

    /// Runs [`Self::reconcile`] immediately and then every `interval` until `cancel` fires.
    pub async fn run_every(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if let Err(err) = self.reconcile(&cancel).await {
                log::error!("Reconciliation failed: {}", err);
            }
        }
    }

    async fn publish(&self, event: TaskEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if events.send(event).await.is_err() {
            log::debug!("Task event receiver dropped");
        }
    }
}
