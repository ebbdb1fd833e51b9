use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use super::{Error, ExporterFinder, Result, template};
use crate::container::{MonitoredTask, trim_leading_slash};
use crate::exporter::Exporter;
use crate::fsutil;

/// Rules deciding whether a definition applies to a task. Either rule matching is enough.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MatchRule {
    /// Regular expression tested against the task name (without leading `/`).
    #[serde(default)]
    pub name: Option<String>,
    /// Label whose presence on the task selects this exporter.
    #[serde(default)]
    pub label: Option<String>,
}

/// Fixed description of an exporter type. `command` and `environment` entries are templates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExporterDefinition {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub environment: Vec<String>,
    pub port: u16,
    #[serde(default, rename = "match")]
    pub matcher: MatchRule,
}

impl ExporterDefinition {
    fn new(image: &str, command: &[&str], environment: &[&str], port: u16, name: &str) -> Self {
        Self {
            image: image.to_owned(),
            command: command.iter().map(|arg| (*arg).to_owned()).collect(),
            environment: environment.iter().map(|var| (*var).to_owned()).collect(),
            port,
            matcher: MatchRule {
                name: Some(name.to_owned()),
                label: None,
            },
        }
    }
}

#[derive(Debug)]
struct Entry {
    definition: ExporterDefinition,
    name_pattern: Option<Regex>,
}

impl Entry {
    fn matches(&self, task: &MonitoredTask) -> bool {
        let name_matches = self
            .name_pattern
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(trim_leading_slash(&task.name)));
        let label_matches = self
            .definition
            .matcher
            .label
            .as_ref()
            .is_some_and(|label| task.labels.contains_key(label));

        name_matches || label_matches
    }
}

/// Exporter catalog made of predefined definitions keyed by exporter type.
#[derive(Debug)]
pub struct PredefinedCatalog {
    entries: BTreeMap<String, Entry>,
}

impl PredefinedCatalog {
    /// Builds a catalog from definitions, compiling their name patterns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if a name pattern is not a valid regular expression.
    pub fn new(definitions: BTreeMap<String, ExporterDefinition>) -> Result<Self> {
        let entries = definitions
            .into_iter()
            .map(|(exporter_type, definition)| -> Result<(String, Entry)> {
                let name_pattern = definition
                    .matcher
                    .name
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .map_err(|source| Error::InvalidPattern {
                        exporter_type: exporter_type.clone(),
                        source,
                    })?;
                Ok((
                    exporter_type,
                    Entry {
                        definition,
                        name_pattern,
                    },
                ))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self { entries })
    }

    /// Definitions shipped with the daemon.
    pub fn builtin_definitions() -> BTreeMap<String, ExporterDefinition> {
        BTreeMap::from([
            (
                "memcached".to_owned(),
                ExporterDefinition::new(
                    "prom/memcached-exporter:v0.14.4",
                    &["--memcached.address=localhost:11211"],
                    &[],
                    9150,
                    r"(^|[-_.])memcached?([-_.]|$)",
                ),
            ),
            (
                "nginx".to_owned(),
                ExporterDefinition::new(
                    "nginx/nginx-prometheus-exporter:1.3.0",
                    &["--nginx.scrape-uri=http://localhost:8080/stub_status"],
                    &[],
                    9113,
                    r"(^|[-_.])nginx([-_.]|$)",
                ),
            ),
            (
                "php-fpm".to_owned(),
                ExporterDefinition::new(
                    "hipages/php-fpm_exporter:2.2.0",
                    &[],
                    &["PHP_FPM_SCRAPE_URI=tcp://localhost:9000/status"],
                    9253,
                    r"(^|[-_.])php(-?fpm)?([-_.]|$)",
                ),
            ),
            (
                "redis".to_owned(),
                ExporterDefinition::new(
                    "oliver006/redis_exporter:v1.62.0",
                    &["-redis.addr=redis://localhost:6379"],
                    &[],
                    9121,
                    r"(^|[-_.])redis([-_.]|$)",
                ),
            ),
        ])
    }

    pub fn builtin() -> Result<Self> {
        Self::new(Self::builtin_definitions())
    }

    /// Loads the built-in definitions and overrides or extends them with the definitions
    /// found in a JSON file (an object keyed by exporter type).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let overrides: BTreeMap<String, ExporterDefinition> = fsutil::read_json_file(path)?;
        log::debug!(
            "Loaded {} exporter definitions from `{}`",
            overrides.len(),
            path.display()
        );

        let mut definitions = Self::builtin_definitions();
        definitions.extend(overrides);
        Self::new(definitions)
    }

    pub fn exporter_types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn build(&self, exporter_type: &str, entry: &Entry, task: &MonitoredTask) -> Result<Exporter> {
        let render_all = |field: &'static str, templates: &[String]| {
            templates
                .iter()
                .map(|tpl| template::render(tpl, task))
                .collect::<Result<Vec<_>>>()
                .map_err(|source| Error::Render {
                    exporter_type: exporter_type.to_owned(),
                    task: task.name.clone(),
                    field,
                    source: Box::new(source),
                })
        };

        Ok(Exporter {
            name: String::new(),
            exporter_type: exporter_type.to_owned(),
            image: entry.definition.image.clone(),
            command: render_all("command", &entry.definition.command)?,
            environment: render_all("environment", &entry.definition.environment)?,
            port: entry.definition.port,
            monitored_task: task.clone(),
        })
    }
}

impl ExporterFinder for PredefinedCatalog {
    fn find_matching_exporters(&self, task: &MonitoredTask) -> (Vec<(String, Exporter)>, Vec<Error>) {
        let mut matching = Vec::new();
        let mut warnings = Vec::new();

        for (exporter_type, entry) in self.entries.iter().filter(|(_, entry)| entry.matches(task)) {
            match self.build(exporter_type, entry, task) {
                Ok(exporter) => matching.push((exporter_type.clone(), exporter)),
                Err(err) => warnings.push(err),
            }
        }

        (matching, warnings)
    }

    fn exporter_for_type(&self, exporter_type: &str, task: &MonitoredTask) -> Result<Exporter> {
        let entry = self
            .entries
            .get(exporter_type)
            .ok_or_else(|| Error::UnknownExporter(exporter_type.to_owned()))?;
        self.build(exporter_type, entry, task)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;
    use crate::container::ContainerID;

    fn task(name: &str, labels: &[(&str, &str)]) -> MonitoredTask {
        MonitoredTask::new(
            ContainerID::new("c1").unwrap(),
            name,
            labels
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect::<HashMap<_, _>>(),
        )
    }

    #[test]
    fn test_builtin_matches_by_name() {
        let catalog = PredefinedCatalog::builtin().unwrap();

        let (matching, warnings) = catalog.find_matching_exporters(&task("/redis", &[]));
        assert!(warnings.is_empty());
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].0, "redis");
        assert_eq!(matching[0].1.image, "oliver006/redis_exporter:v1.62.0");
        assert_eq!(matching[0].1.port, 9121);

        let (matching, _) = catalog.find_matching_exporters(&task("shop-redis-1", &[]));
        assert_eq!(matching.len(), 1);

        let (matching, _) = catalog.find_matching_exporters(&task("credis", &[]));
        assert!(matching.is_empty());
    }

    #[test]
    fn test_matches_by_label_and_renders_templates() {
        let mut definitions = BTreeMap::new();
        definitions.insert(
            "postgres".to_owned(),
            ExporterDefinition {
                image: "prometheuscommunity/postgres-exporter".to_owned(),
                command: vec![],
                environment: vec![
                    r#"DATA_SOURCE_NAME={{index .Labels "pg.dsn"}}"#.to_owned(),
                ],
                port: 9187,
                matcher: MatchRule {
                    name: None,
                    label: Some("pg.dsn".to_owned()),
                },
            },
        );
        let catalog = PredefinedCatalog::new(definitions).unwrap();

        let (matching, warnings) =
            catalog.find_matching_exporters(&task("db", &[("pg.dsn", "postgresql://db")]));
        assert!(warnings.is_empty());
        assert_eq!(
            matching[0].1.environment,
            vec!["DATA_SOURCE_NAME=postgresql://db".to_owned()]
        );

        let (matching, _) = catalog.find_matching_exporters(&task("db", &[]));
        assert!(matching.is_empty());
    }

    #[test]
    fn test_render_failure_is_a_warning() {
        let mut definitions = PredefinedCatalog::builtin_definitions();
        definitions.insert(
            "broken".to_owned(),
            ExporterDefinition::new("some/image", &["{{.Image}}"], &[], 8080, "redis"),
        );
        let catalog = PredefinedCatalog::new(definitions).unwrap();

        let (matching, warnings) = catalog.find_matching_exporters(&task("redis", &[]));
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].0, "redis");
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], Error::Render { .. }));
    }

    #[test]
    fn test_exporter_for_type() {
        let catalog = PredefinedCatalog::builtin().unwrap();
        let exporter = catalog
            .exporter_for_type("nginx", &task("frontend", &[]))
            .unwrap();
        assert_eq!(exporter.exporter_type, "nginx");
        assert_eq!(exporter.monitored_task.name, "frontend");

        match catalog.exporter_for_type("unknown", &task("frontend", &[])) {
            Err(Error::UnknownExporter(name)) => assert_eq!(name, "unknown"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_pattern() {
        let mut definitions = BTreeMap::new();
        definitions.insert(
            "bad".to_owned(),
            ExporterDefinition::new("some/image", &[], &[], 8080, "("),
        );
        assert!(matches!(
            PredefinedCatalog::new(definitions),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_load_overrides_builtin() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmp,
            r#"{{
                "redis": {{"image": "my/redis_exporter:v2", "port": 9121, "match": {{"name": "^cache$"}}}},
                "mongodb": {{"image": "percona/mongodb_exporter:0.40", "port": 9216, "match": {{"label": "mongo"}}}}
            }}"#
        )
        .unwrap();

        let catalog = PredefinedCatalog::load(tmp.path()).unwrap();
        let types: Vec<&str> = catalog.exporter_types().collect();
        assert_eq!(types, ["memcached", "mongodb", "nginx", "php-fpm", "redis"]);

        let (matching, _) = catalog.find_matching_exporters(&task("cache", &[]));
        assert_eq!(matching[0].1.image, "my/redis_exporter:v2");
        let (matching, _) = catalog.find_matching_exporters(&task("redis", &[]));
        assert!(matching.is_empty());
    }
}
