//! Exporter descriptions and the events emitted for monitored tasks.
use crate::container::{ContainerID, MonitoredTask, trim_leading_slash};

/// A sidecar specification for one monitored task.
///
/// An `Exporter` is only a description; it gets an identity once a container is created for
/// it (see [`RunningExporter`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exporter {
    pub name: String,
    pub exporter_type: String,
    pub image: String,
    pub command: Vec<String>,
    pub environment: Vec<String>,
    pub port: u16,
    pub monitored_task: MonitoredTask,
}

/// Computes the deterministic sidecar name for an exporter type and a task name.
///
/// # Examples
///
/// ```
/// # use autoexporter::exporter::exporter_name;
/// assert_eq!(exporter_name("redis", "/cache"), "exporter.redis.cache");
/// ```
pub fn exporter_name(exporter_type: &str, task_name: &str) -> String {
    format!(
        "exporter.{}.{}",
        exporter_type,
        trim_leading_slash(task_name)
    )
}

/// An exporter with a live container, discovered through the sidecar labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningExporter {
    pub container_id: ContainerID,
    pub name: String,
    pub exported_id: ContainerID,
    pub exported_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEventType {
    Started,
    Stopped,
}

/// Lifecycle notification for a monitored task, along with the exporters resolved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEvent {
    pub task: MonitoredTask,
    pub event_type: TaskEventType,
    pub exporters: Vec<Exporter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_name_is_deterministic() {
        let first = exporter_name("redis", "/foo");
        let second = exporter_name("redis", "/foo");
        assert_eq!(first, "exporter.redis.foo");
        assert_eq!(first, second);
        assert_eq!(exporter_name("redis", "foo"), first);
    }
}
