//! Orchestration of exporter sidecars against a [`ContainerRuntime`].
//!
//! - [`Backend::run_exporter`] provisions one sidecar through a cancellable, step-wise
//!   pipeline (pull, create, connect, start).
//! - [`Backend::cleanup_exporter`] and [`Backend::cleanup_exporters`] tear sidecars down,
//!   refusing to touch those whose exported container still runs unless forced.
//! - [`Backend::find_missing_exporters`] compares resolved exporters against running
//!   containers.
use std::sync::Arc;

use crate::catalog::ExporterFinder;
use crate::container::MonitoredTask;
use crate::exporter::Exporter;
use crate::resolver;
use crate::runtime::ContainerRuntime;

mod error;
mod pipeline;
mod teardown;

pub use error::{Error, Result};
pub use pipeline::{Outcome, State, Step};

#[derive(Debug)]
pub struct Backend<R, F> {
    runtime: Arc<R>,
    finder: Arc<F>,
    network: String,
}

impl<R, F> Backend<R, F>
where
    R: ContainerRuntime,
    F: ExporterFinder,
{
    /// Creates a backend attaching sidecars to `network`.
    pub fn new(runtime: Arc<R>, finder: Arc<F>, network: impl Into<String>) -> Self {
        Self {
            runtime,
            finder,
            network: network.into(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Resolves the exporters `task` needs.
    pub fn resolve_exporters(&self, task: &MonitoredTask) -> Result<Vec<Exporter>> {
        resolver::resolve_exporters(self.finder.as_ref(), task).map_err(|source| Error::Resolve {
            task: task.name.clone(),
            source,
        })
    }
}
