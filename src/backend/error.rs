use crate::container::ContainerID;
use crate::{catalog, runtime};

use super::pipeline::Step;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{step} step failed for exporter `{exporter}`: {source}")]
    Step {
        step: Step,
        exporter: String,
        #[source]
        source: runtime::Error,
    },
    #[error(transparent)]
    Runtime(#[from] runtime::Error),
    #[error("exporter not found: `{0}`")]
    ExporterNotFound(String),
    #[error("more than one container ({count}) match the exporter name `{name}`")]
    AmbiguousExporter { name: String, count: usize },
    #[error(
        "exporter `{exporter_id}` can't be stopped, exported container `{exported_id}` still running"
    )]
    StillRunning {
        exporter_id: ContainerID,
        exported_id: String,
    },
    #[error("container `{0}` is not labelled as an exporter")]
    NotAnExporter(String),
    #[error("failed to cleanup {}", .0.join(", "))]
    CleanupRefused(Vec<String>),
    #[error("failed to resolve exporters for `{task}`: {source}")]
    Resolve {
        task: String,
        #[source]
        source: catalog::Error,
    },
}

impl Error {
    pub fn is_still_running(&self) -> bool {
        matches!(self, Error::StillRunning { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
