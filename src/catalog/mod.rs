//! Exporter catalog: which exporter types exist and which tasks they apply to.
mod error;
mod predefined;
pub mod template;

pub use error::{Error, Result};
pub use predefined::{ExporterDefinition, MatchRule, PredefinedCatalog};

use crate::container::MonitoredTask;
use crate::exporter::Exporter;

/// Looks up exporters for monitored tasks.
///
/// Exporters returned by a finder are partially filled: their `name` is assigned by the
/// resolver.
pub trait ExporterFinder: Send + Sync + 'static {
    /// Returns every exporter whose match rules the task satisfies, keyed by exporter type,
    /// along with non-fatal errors hit while building individual matches.
    fn find_matching_exporters(&self, task: &MonitoredTask) -> (Vec<(String, Exporter)>, Vec<Error>);

    /// Returns the fixed definition of `exporter_type` for the task.
    fn exporter_for_type(&self, exporter_type: &str, task: &MonitoredTask) -> Result<Exporter>;
}
