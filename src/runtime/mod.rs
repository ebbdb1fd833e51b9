//! Container runtime boundary.
//!
//! The orchestration core only talks to the container engine through [`ContainerRuntime`].
//! [`DockerRuntime`] implements it against the Docker Engine API.
use std::collections::HashMap;
use std::future::Future;

use futures::stream::BoxStream;

use crate::container::ContainerID;

mod docker;
mod error;

pub use docker::DockerRuntime;
pub use error::{Error, Result};

/// Lifecycle action reported by the runtime event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    Die,
    Other(String),
}

impl From<&str> for Action {
    fn from(action: &str) -> Self {
        match action {
            "start" => Action::Start,
            "die" => Action::Die,
            other => Action::Other(other.to_owned()),
        }
    }
}

/// A container-level lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub action: Action,
    pub actor_id: String,
    /// Container labels mixed with runtime attributes (`name`, `image`, `exitCode`, ...).
    pub attributes: HashMap<String, String>,
}

/// Current state of a single container as returned by inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: ContainerID,
    pub name: String,
    pub running: bool,
    pub labels: HashMap<String, String>,
}

/// A container entry as returned by listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: ContainerID,
    /// Container names without the leading `/`.
    pub names: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    /// The primary name of the container, or its id when the runtime reported no name.
    pub fn name(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or(self.id.as_str())
    }
}

/// Filters applied when listing containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Include stopped containers.
    pub all: bool,
    /// Label filter, either `key` or `key=value`.
    pub label: Option<String>,
    /// Exact container name.
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    OnFailure { max_retries: i64 },
}

/// Everything needed to create a sidecar container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub environment: Vec<String>,
    pub labels: HashMap<String, String>,
    /// Container whose network namespace is joined.
    pub network_container: ContainerID,
    pub restart_policy: RestartPolicy,
}

/// The calls the orchestration core issues against the container engine.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Subscribes to container `start` and `die` events emitted after `since`.
    ///
    /// An `Err` item is a failure of the subscription itself.
    fn events(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> BoxStream<'static, Result<ContainerEvent>>;

    /// Inspects a container. A missing container yields [`Error::NotFound`].
    fn inspect(&self, id: &str) -> impl Future<Output = Result<ContainerDetails>> + Send;

    fn list(&self, options: ListOptions)
    -> impl Future<Output = Result<Vec<ContainerSummary>>> + Send;

    /// Pulls an image and waits until the pull completed.
    fn pull_image(&self, image: &str) -> impl Future<Output = Result<()>> + Send;

    fn create(&self, spec: &CreateSpec) -> impl Future<Output = Result<ContainerID>> + Send;

    fn connect_network(
        &self,
        network: &str,
        container: &ContainerID,
    ) -> impl Future<Output = Result<()>> + Send;

    fn disconnect_network(
        &self,
        network: &str,
        container: &ContainerID,
        force: bool,
    ) -> impl Future<Output = Result<()>> + Send;

    fn start(&self, container: &ContainerID) -> impl Future<Output = Result<()>> + Send;

    fn stop(&self, container: &ContainerID) -> impl Future<Output = Result<()>> + Send;

    fn remove(&self, container: &ContainerID, force: bool)
    -> impl Future<Output = Result<()>> + Send;
}
