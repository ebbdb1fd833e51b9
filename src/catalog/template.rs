//! Minimal template rendering against a [`MonitoredTask`].
//!
//! The syntax is the subset of Go templates operators already write in container labels:
//!
//! - `{{.ID}}` and `{{.Name}}`
//! - `{{index .Labels "some.label"}}` and `{{.Labels.key}}`
//!
//! Missing labels render as an empty string.
use std::sync::LazyLock;

use regex::Regex;

use super::{Error, Result};
use crate::container::MonitoredTask;

static INDEX_LABELS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^index\s+\.Labels\s+"([^"]*)"$"#).expect("valid index action pattern")
});

/// Renders `template` with the fields of `task`.
///
/// # Errors
///
/// Returns [`Error::UnterminatedAction`] if a `{{` is not closed and [`Error::UnknownAction`]
/// for actions outside the supported subset.
pub fn render(template: &str, task: &MonitoredTask) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or_else(|| Error::UnterminatedAction(template.to_owned()))?;
        let action = after_open[..end].trim();
        out.push_str(&evaluate(action, task).ok_or_else(|| Error::UnknownAction {
            action: action.to_owned(),
            template: template.to_owned(),
        })?);
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}

fn evaluate<'a>(action: &str, task: &'a MonitoredTask) -> Option<&'a str> {
    let label = |key: &str| Some(task.labels.get(key).map(String::as_str).unwrap_or_default());

    match action {
        ".ID" => Some(task.id.as_str()),
        ".Name" => Some(task.name.as_str()),
        _ => {
            if let Some(key) = action.strip_prefix(".Labels.") {
                return label(key);
            }
            let captures = INDEX_LABELS.captures(action)?;
            label(captures.get(1)?.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::container::ContainerID;

    fn task() -> MonitoredTask {
        MonitoredTask::new(
            ContainerID::new("012dfc9").unwrap(),
            "cache",
            HashMap::from([("exporter.kind".to_owned(), "redis".to_owned())]),
        )
    }

    #[test]
    fn test_render_plain_text() {
        assert_eq!(render("redis", &task()).unwrap(), "redis");
        assert_eq!(render("", &task()).unwrap(), "");
    }

    #[test]
    fn test_render_fields() {
        assert_eq!(
            render("{{.Name}}@{{ .ID }}", &task()).unwrap(),
            "cache@012dfc9"
        );
    }

    #[test]
    fn test_render_labels() {
        assert_eq!(
            render(r#"{{index .Labels "exporter.kind"}}"#, &task()).unwrap(),
            "redis"
        );
        assert_eq!(render("x{{.Labels.missing}}y", &task()).unwrap(), "xy");
    }

    #[test]
    fn test_render_errors() {
        match render("{{.Name", &task()).unwrap_err() {
            Error::UnterminatedAction(template) => assert_eq!(template, "{{.Name"),
            other => panic!("unexpected error: {other}"),
        }
        match render("{{.Image}}", &task()).unwrap_err() {
            Error::UnknownAction { action, .. } => assert_eq!(action, ".Image"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
