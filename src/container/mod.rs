use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

mod error;
mod utils;

pub use error::{Error, Result};
pub use utils::{strip_bookkeeping_labels, trim_leading_slash};

/// Label carrying an explicit exporter type (rendered as a template against the task).
pub const LABEL_EXPORTER: &str = "autoexporter.exporter";
/// Label set on every sidecar, recording the id of the container it exports.
pub const LABEL_EXPORTED_ID: &str = "autoexporter.exported.id";
/// Label set on every sidecar, recording the name of the container it exports. Its presence
/// marks a container as a sidecar.
pub const LABEL_EXPORTED_NAME: &str = "autoexporter.exported.name";

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// A validated container identifier.
///
/// # Examples
///
/// ```
/// # use autoexporter::container::ContainerID;
/// let container_id = ContainerID::new("012dfc9").unwrap();
/// assert_eq!(container_id.as_ref(), "012dfc9");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty or its length exceeds
    /// [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A container whose metrics should be exported.
///
/// This is an immutable snapshot of what the runtime reported when the task was last
/// inspected or when the lifecycle event carrying it was emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredTask {
    pub id: ContainerID,
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl MonitoredTask {
    pub fn new(id: ContainerID, name: impl Into<String>, labels: HashMap<String, String>) -> Self {
        Self {
            id,
            name: name.into(),
            labels,
        }
    }

    /// Returns true if this container is itself an exporter sidecar.
    pub fn is_sidecar(&self) -> bool {
        self.labels.contains_key(LABEL_EXPORTED_NAME)
    }
}
