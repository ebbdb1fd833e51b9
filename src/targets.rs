//! Scrape targets derived from task events, served as Prometheus HTTP service discovery.
use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::container::{ContainerID, trim_leading_slash};
use crate::exporter::{Exporter, TaskEvent, TaskEventType};

const META_EXPORTER_TYPE: &str = "__meta_autoexporter_exporter_type";
const META_EXPORTER_NAME: &str = "__meta_autoexporter_exporter_name";
const META_CONTAINER_ID: &str = "__meta_autoexporter_container_id";
const META_CONTAINER_NAME: &str = "__meta_autoexporter_container_name";

/// One entry of a Prometheus `http_sd_configs` response.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    pub labels: BTreeMap<&'static str, String>,
}

impl From<&Exporter> for TargetGroup {
    fn from(exporter: &Exporter) -> Self {
        let task = &exporter.monitored_task;
        let task_name = trim_leading_slash(&task.name);
        Self {
            targets: vec![format!("{}:{}", task_name, exporter.port)],
            labels: BTreeMap::from([
                (META_EXPORTER_TYPE, exporter.exporter_type.clone()),
                (META_EXPORTER_NAME, exporter.name.clone()),
                (META_CONTAINER_ID, task.id.to_string()),
                (META_CONTAINER_NAME, task_name.to_owned()),
            ]),
        }
    }
}

/// Targets of every monitored container with running exporters.
#[derive(Debug, Default)]
pub struct TargetStore {
    groups: DashMap<ContainerID, Vec<TargetGroup>>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: &TaskEvent) {
        match event.event_type {
            TaskEventType::Started => {
                let mut groups = self.groups.entry(event.task.id.clone()).or_default();
                for group in event.exporters.iter().map(TargetGroup::from) {
                    // Same exporter name replaces the earlier group.
                    let name = &group.labels[META_EXPORTER_NAME];
                    match groups
                        .iter_mut()
                        .find(|existing| &existing.labels[META_EXPORTER_NAME] == name)
                    {
                        Some(existing) => *existing = group,
                        None => groups.push(group),
                    }
                }
            }
            TaskEventType::Stopped => {
                self.groups.remove(&event.task.id);
            }
        }
    }

    /// All target groups, sorted.
    pub fn groups(&self) -> Vec<TargetGroup> {
        let mut groups: Vec<TargetGroup> = self
            .groups
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        groups.sort();
        groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Applies events from `events` until every sender is dropped.
    pub async fn consume(&self, mut events: mpsc::Receiver<TaskEvent>) {
        while let Some(event) = events.recv().await {
            log::debug!(
                "Applying {:?} event for `{}` ({} exporters)",
                event.event_type,
                event.task.name,
                event.exporters.len()
            );
            self.apply(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testutil::exporter;

    fn started(exporters: Vec<Exporter>) -> TaskEvent {
        TaskEvent {
            task: exporters[0].monitored_task.clone(),
            event_type: TaskEventType::Started,
            exporters,
        }
    }

    #[test]
    fn test_target_group_from_exporter() {
        let group = TargetGroup::from(&exporter("redis", "c1", "/cache"));
        assert_eq!(group.targets, vec!["cache:9121"]);
        assert_eq!(group.labels[META_EXPORTER_TYPE], "redis");
        assert_eq!(group.labels[META_EXPORTER_NAME], "exporter.redis.cache");
        assert_eq!(group.labels[META_CONTAINER_ID], "c1");
        assert_eq!(group.labels[META_CONTAINER_NAME], "cache");
    }

    #[test]
    fn test_started_then_stopped() {
        let store = TargetStore::new();
        let event = started(vec![
            exporter("redis", "c1", "cache"),
            exporter("nginx", "c1", "cache"),
        ]);
        store.apply(&event);
        store.apply(&started(vec![exporter("redis", "c2", "app")]));

        assert_eq!(store.len(), 2);
        let targets: Vec<String> = store
            .groups()
            .into_iter()
            .flat_map(|group| group.targets)
            .collect();
        assert_eq!(targets, vec!["app:9121", "cache:9121", "cache:9121"]);

        store.apply(&TaskEvent {
            event_type: TaskEventType::Stopped,
            exporters: Vec::new(),
            ..event
        });
        assert_eq!(store.len(), 1);
        assert_eq!(store.groups()[0].targets, vec!["app:9121"]);
    }

    #[test]
    fn test_started_merges_by_exporter_name() {
        let store = TargetStore::new();
        store.apply(&started(vec![exporter("redis", "c1", "cache")]));
        store.apply(&started(vec![
            exporter("redis", "c1", "cache"),
            exporter("nginx", "c1", "cache"),
        ]));
        store.apply(&started(vec![exporter("nginx", "c1", "cache")]));

        let names: Vec<String> = store
            .groups()
            .into_iter()
            .map(|group| group.labels[META_EXPORTER_NAME].clone())
            .collect();
        assert_eq!(store.len(), 1);
        assert_eq!(names, vec!["exporter.nginx.cache", "exporter.redis.cache"]);
    }

    #[test]
    fn test_serializes_as_http_sd() {
        let group = TargetGroup::from(&exporter("redis", "c1", "cache"));
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "targets": ["cache:9121"],
                "labels": {
                    "__meta_autoexporter_container_id": "c1",
                    "__meta_autoexporter_container_name": "cache",
                    "__meta_autoexporter_exporter_name": "exporter.redis.cache",
                    "__meta_autoexporter_exporter_type": "redis",
                }
            })
        );
    }

    #[tokio::test]
    async fn test_consume_until_senders_drop() {
        let store = Arc::new(TargetStore::new());
        let (tx, rx) = mpsc::channel(4);
        let consumer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.consume(rx).await })
        };

        tx.send(started(vec![exporter("redis", "c1", "cache")]))
            .await
            .unwrap();
        drop(tx);
        consumer.await.unwrap();

        assert_eq!(store.len(), 1);
    }
}
