//! In-memory [`ContainerRuntime`] recording every call it receives.
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::{self, BoxStream};

use crate::container::{ContainerID, MonitoredTask};
use crate::exporter::Exporter;
use crate::runtime::{
    ContainerDetails, ContainerEvent, ContainerRuntime, ContainerSummary, CreateSpec, Error,
    ListOptions, Result,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Inspect(String),
    List(ListOptions),
    Pull(String),
    Create(CreateSpec),
    Connect { network: String, container: String },
    Disconnect {
        network: String,
        container: String,
        force: bool,
    },
    Start(String),
    Stop(String),
    Remove { container: String, force: bool },
}

impl Call {
    pub fn op(&self) -> &'static str {
        match self {
            Call::Inspect(_) => "inspect",
            Call::List(_) => "list",
            Call::Pull(_) => "pull",
            Call::Create(_) => "create",
            Call::Connect { .. } => "connect",
            Call::Disconnect { .. } => "disconnect",
            Call::Start(_) => "start",
            Call::Stop(_) => "stop",
            Call::Remove { .. } => "remove",
        }
    }
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Injected failure of one operation. `remaining` of `None` fails forever.
struct Failure {
    message: String,
    remaining: Option<u32>,
}

/// In-memory runtime. Created containers are listed afterwards and, like with the Docker
/// daemon, creating a second container with a name in use fails with a 409 conflict.
#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<Call>>,
    containers: Mutex<Vec<ContainerSummary>>,
    details: Mutex<HashMap<String, ContainerDetails>>,
    failures: Mutex<HashMap<&'static str, Failure>>,
    inspect_failures: Mutex<HashMap<String, String>>,
    events: Mutex<Option<Vec<Result<ContainerEvent>>>>,
    hooks: Mutex<HashMap<&'static str, Hook>>,
    pull_delay: Mutex<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub fn id(raw: &str) -> ContainerID {
    ContainerID::new(raw).unwrap()
}

pub fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

pub fn summary(raw_id: &str, name: &str, pairs: &[(&str, &str)]) -> ContainerSummary {
    ContainerSummary {
        id: id(raw_id),
        names: vec![name.to_owned()],
        labels: labels(pairs),
    }
}

pub fn details(raw_id: &str, name: &str, running: bool) -> ContainerDetails {
    ContainerDetails {
        id: id(raw_id),
        name: name.to_owned(),
        running,
        labels: HashMap::new(),
    }
}

pub fn exporter(exporter_type: &str, task_id: &str, task_name: &str) -> Exporter {
    Exporter {
        name: crate::exporter::exporter_name(exporter_type, task_name),
        exporter_type: exporter_type.to_owned(),
        image: "x/y:latest".to_owned(),
        command: vec!["-a".to_owned()],
        environment: vec!["F=1".to_owned()],
        port: 9121,
        monitored_task: MonitoredTask::new(id(task_id), task_name, HashMap::new()),
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, container: ContainerSummary) -> Self {
        lock(&self.containers).push(container);
        self
    }

    pub fn with_details(self, details: ContainerDetails) -> Self {
        lock(&self.details).insert(details.id.to_string(), details);
        self
    }

    /// Makes every call of `op` fail with a daemon error carrying `message`.
    pub fn failing(self, op: &'static str, message: &str) -> Self {
        lock(&self.failures).insert(
            op,
            Failure {
                message: message.to_owned(),
                remaining: None,
            },
        );
        self
    }

    /// Makes the next call of `op` fail with a daemon error carrying `message`.
    pub fn failing_once(self, op: &'static str, message: &str) -> Self {
        lock(&self.failures).insert(
            op,
            Failure {
                message: message.to_owned(),
                remaining: Some(1),
            },
        );
        self
    }

    pub fn failing_inspect(self, raw_id: &str, message: &str) -> Self {
        lock(&self.inspect_failures).insert(raw_id.to_owned(), message.to_owned());
        self
    }

    pub fn with_events(self, events: Vec<Result<ContainerEvent>>) -> Self {
        *lock(&self.events) = Some(events);
        self
    }

    /// Runs `hook` every time `op` is called, after the call was recorded.
    pub fn on(self, op: &'static str, hook: impl Fn() + Send + Sync + 'static) -> Self {
        lock(&self.hooks).insert(op, Box::new(hook));
        self
    }

    /// Makes every image pull take `delay`.
    pub fn with_pull_delay(self, delay: Duration) -> Self {
        *lock(&self.pull_delay) = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// The operation names of every recorded call except inspections and listings.
    pub fn mutations(&self) -> Vec<&'static str> {
        self.calls()
            .iter()
            .filter(|call| !matches!(call, Call::Inspect(_) | Call::List(_)))
            .map(Call::op)
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|call| call.op() == op).count()
    }

    fn record(&self, call: Call) -> Result<()> {
        let op = call.op();
        lock(&self.calls).push(call);
        if let Some(hook) = lock(&self.hooks).get(op) {
            hook();
        }

        let mut failures = lock(&self.failures);
        let Some(failure) = failures.get_mut(op) else {
            return Ok(());
        };
        match &mut failure.remaining {
            Some(0) => return Ok(()),
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        Err(Error::Daemon {
            status_code: 500,
            message: failure.message.clone(),
        })
    }
}

fn label_matches(summary: &ContainerSummary, filter: &str) -> bool {
    match filter.split_once('=') {
        Some((key, value)) => summary.labels.get(key).is_some_and(|v| v == value),
        None => summary.labels.contains_key(filter),
    }
}

impl ContainerRuntime for FakeRuntime {
    fn events(
        &self,
        _since: chrono::DateTime<chrono::Utc>,
    ) -> BoxStream<'static, Result<ContainerEvent>> {
        match lock(&self.events).take() {
            Some(events) => stream::iter(events).chain(stream::pending()).boxed(),
            None => stream::pending().boxed(),
        }
    }

    async fn inspect(&self, raw_id: &str) -> Result<ContainerDetails> {
        self.record(Call::Inspect(raw_id.to_owned()))?;
        if let Some(message) = lock(&self.inspect_failures).get(raw_id) {
            return Err(Error::Daemon {
                status_code: 500,
                message: message.clone(),
            });
        }
        lock(&self.details)
            .get(raw_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(raw_id.to_owned()))
    }

    async fn list(&self, options: ListOptions) -> Result<Vec<ContainerSummary>> {
        self.record(Call::List(options.clone()))?;
        Ok(lock(&self.containers)
            .iter()
            .filter(|c| options.label.as_deref().is_none_or(|f| label_matches(c, f)))
            .filter(|c| {
                options
                    .name
                    .as_deref()
                    .is_none_or(|name| c.names.iter().any(|n| n == name))
            })
            .cloned()
            .collect())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(Call::Pull(image.to_owned()))?;
        let delay = *lock(&self.pull_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn create(&self, spec: &CreateSpec) -> Result<ContainerID> {
        self.record(Call::Create(spec.clone()))?;

        let mut containers = lock(&self.containers);
        if containers
            .iter()
            .any(|container| container.names.contains(&spec.name))
        {
            return Err(Error::Daemon {
                status_code: 409,
                message: format!(
                    r#"Conflict. The container name "/{}" is already in use"#,
                    spec.name
                ),
            });
        }

        let created = lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, Call::Create(_)))
            .count();
        let container_id = match created {
            1 => id("9d234f"),
            n => id(&format!("9d234f-{n}")),
        };
        containers.push(ContainerSummary {
            id: container_id.clone(),
            names: vec![spec.name.clone()],
            labels: spec.labels.clone(),
        });

        Ok(container_id)
    }

    async fn connect_network(&self, network: &str, container: &ContainerID) -> Result<()> {
        self.record(Call::Connect {
            network: network.to_owned(),
            container: container.to_string(),
        })
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container: &ContainerID,
        force: bool,
    ) -> Result<()> {
        self.record(Call::Disconnect {
            network: network.to_owned(),
            container: container.to_string(),
            force,
        })
    }

    async fn start(&self, container: &ContainerID) -> Result<()> {
        self.record(Call::Start(container.to_string()))
    }

    async fn stop(&self, container: &ContainerID) -> Result<()> {
        self.record(Call::Stop(container.to_string()))
    }

    async fn remove(&self, container: &ContainerID, force: bool) -> Result<()> {
        self.record(Call::Remove {
            container: container.to_string(),
            force,
        })
    }
}
