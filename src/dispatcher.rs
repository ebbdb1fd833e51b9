//! Runtime event loop fanning out start and stop handling per monitored container.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{self, Backend, Outcome};
use crate::catalog::ExporterFinder;
use crate::container::{ContainerID, LABEL_EXPORTED_NAME, MonitoredTask, strip_bookkeeping_labels};
use crate::exporter::{TaskEvent, TaskEventType};
use crate::registry::CancellationRegistry;
use crate::retry::RetryPolicy;
use crate::runtime::{self, Action, ContainerEvent, ContainerRuntime};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("event subscription failed: {0}")]
    Stream(#[source] runtime::Error),
    #[error("event subscription closed by the runtime")]
    StreamClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Dispatcher<R, F> {
    backend: Arc<Backend<R, F>>,
    registry: Arc<CancellationRegistry>,
    retry: RetryPolicy,
    events: Option<mpsc::Sender<TaskEvent>>,
}

impl<R, F> Clone for Dispatcher<R, F> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
            retry: self.retry,
            events: self.events.clone(),
        }
    }
}

impl<R, F> Dispatcher<R, F>
where
    R: ContainerRuntime,
    F: ExporterFinder,
{
    pub fn new(
        backend: Arc<Backend<R, F>>,
        registry: Arc<CancellationRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            registry,
            retry,
            events: None,
        }
    }

    /// Publishes a [`TaskEvent`] on `events` for every handled start and stop.
    pub fn with_task_events(mut self, events: mpsc::Sender<TaskEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Consumes runtime events emitted after `since` until `root` is cancelled.
    ///
    /// Handling runs in spawned tasks; the loop itself only waits for the next event. Every
    /// start registers a token derived from `root`, so cancelling `root` also stops in-flight
    /// pipelines at their next step.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription fails or ends.
    pub async fn listen(&self, root: &CancellationToken, since: DateTime<Utc>) -> Result<()> {
        let mut events = self.backend.runtime().events(since);
        log::info!("Listening for container events");

        loop {
            let event = tokio::select! {
                biased;
                _ = root.cancelled() => return Ok(()),
                event = events.next() => event,
            };
            match event {
                Some(Ok(event)) => {
                    self.dispatch(event, root);
                }
                Some(Err(err)) => return Err(Error::Stream(err)),
                None => return Err(Error::StreamClosed),
            }
        }
    }

    /// Handles one event. Returns the spawned unit of work, if any.
    pub fn dispatch(&self, event: ContainerEvent, root: &CancellationToken) -> Option<JoinHandle<()>> {
        if event.attributes.contains_key(LABEL_EXPORTED_NAME) {
            return None;
        }
        if let Action::Other(action) = &event.action {
            log::debug!("Ignoring `{}` event for {}", action, event.actor_id);
            return None;
        }
        let id = match ContainerID::new(&event.actor_id) {
            Ok(id) => id,
            Err(err) => {
                log::warn!("Ignoring event: {}", err);
                return None;
            }
        };
        log::debug!("event.action={:?} event.actor.id={}", event.action, id);

        let this = self.clone();
        let handle = match event.action {
            Action::Start => {
                let registration = self.registry.register(id.clone(), root);
                tokio::spawn(async move {
                    let result = {
                        let (this, id, cancel) = (&this, &id, registration.token());
                        this.retry.run(move || this.handle_start(id, cancel)).await
                    };
                    if let Err(err) = result {
                        log::error!("Giving up on start of container {}: {}", id, err);
                    }
                    this.registry.release(&id, &registration);
                })
            }
            Action::Die => {
                // Drops the entry; the stop unit has nothing to release.
                self.registry.cancel(&id);
                let attributes = event.attributes;
                tokio::spawn(async move {
                    let result = {
                        let (this, id, attributes) = (&this, &id, &attributes);
                        this.retry
                            .run(move || this.handle_stop(id, attributes))
                            .await
                    };
                    if let Err(err) = result {
                        log::error!("Giving up on stop of container {}: {}", id, err);
                    }
                })
            }
            Action::Other(_) => return None,
        };

        Some(handle)
    }

    async fn handle_start(
        &self,
        id: &ContainerID,
        cancel: &CancellationToken,
    ) -> backend::Result<()> {
        let details = match self.backend.runtime().inspect(id.as_str()).await {
            Ok(details) => details,
            Err(err) if err.is_not_found() => {
                log::info!("Container {} died prematurely, exporters won't start", id);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let task = MonitoredTask::new(details.id, details.name, details.labels);
        let exporters = self.backend.resolve_exporters(&task)?;
        if exporters.is_empty() {
            log::info!("No exporter found for `{}`", task.name);
            return Ok(());
        }

        for exporter in &exporters {
            if let Outcome::Cancelled(_) = self.backend.run_exporter(exporter, cancel).await? {
                return Ok(());
            }
        }

        self.publish(TaskEvent {
            task,
            event_type: TaskEventType::Started,
            exporters,
        })
        .await;

        Ok(())
    }

    async fn handle_stop(
        &self,
        id: &ContainerID,
        attributes: &HashMap<String, String>,
    ) -> backend::Result<()> {
        let name = attributes.get("name").cloned().unwrap_or_default();
        let task = MonitoredTask::new(id.clone(), name, strip_bookkeeping_labels(attributes.clone()));

        let exporters = match self.backend.resolve_exporters(&task) {
            Ok(exporters) => exporters,
            Err(err) => {
                log::warn!("{}", err);
                Vec::new()
            }
        };
        self.publish(TaskEvent {
            task,
            event_type: TaskEventType::Stopped,
            exporters,
        })
        .await;

        self.backend.cleanup_exporters_of(id).await
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
