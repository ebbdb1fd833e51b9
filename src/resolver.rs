//! Decides which exporters a monitored task needs.
use crate::catalog::{self, ExporterFinder, template};
use crate::container::{LABEL_EXPORTER, MonitoredTask};
use crate::exporter::{Exporter, exporter_name};

/// Resolves the exporters for `task`.
///
/// An explicit [`LABEL_EXPORTER`] label wins: it is rendered against the task and names the
/// only exporter type used. Without it (or when it renders to an empty string), every catalog
/// entry matching the task is used; errors building individual matches are logged and skipped.
///
/// # Errors
///
/// Returns an error if the explicit label fails to render or names an unknown exporter type.
pub fn resolve_exporters<F>(finder: &F, task: &MonitoredTask) -> catalog::Result<Vec<Exporter>>
where
    F: ExporterFinder + ?Sized,
{
    if let Some(label) = task.labels.get(LABEL_EXPORTER) {
        let exporter_type = template::render(label, task)?;
        let exporter_type = exporter_type.trim();
        if !exporter_type.is_empty() {
            let mut exporter = finder.exporter_for_type(exporter_type, task)?;
            exporter.name = exporter_name(exporter_type, &task.name);
            return Ok(vec![exporter]);
        }
    }

    let (matching, warnings) = finder.find_matching_exporters(task);
    for warning in warnings {
        log::warn!("{}", warning);
    }
    log::debug!(
        "Resolved {} exporters for `{}`",
        matching.len(),
        task.name
    );

    Ok(matching
        .into_iter()
        .map(|(exporter_type, mut exporter)| {
            exporter.name = exporter_name(&exporter_type, &task.name);
            exporter
        })
        .collect())
}
