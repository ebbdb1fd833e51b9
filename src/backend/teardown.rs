use std::collections::HashSet;

use super::{Backend, Error, Result};
use crate::catalog::ExporterFinder;
use crate::container::{ContainerID, LABEL_EXPORTED_ID, LABEL_EXPORTED_NAME, MonitoredTask};
use crate::exporter::{Exporter, RunningExporter};
use crate::runtime::{ContainerRuntime, ContainerSummary, ListOptions};

impl<R, F> Backend<R, F>
where
    R: ContainerRuntime,
    F: ExporterFinder,
{
    /// Stops and removes the running sidecar named `name`.
    ///
    /// # Errors
    ///
    /// - [`Error::ExporterNotFound`] if no container has this name.
    /// - [`Error::AmbiguousExporter`] if several containers match.
    /// - [`Error::StillRunning`] if the exported container runs and `force` is false.
    pub async fn cleanup_exporter(&self, name: &str, force: bool) -> Result<()> {
        let mut containers = self
            .runtime
            .list(ListOptions {
                name: Some(name.to_owned()),
                ..Default::default()
            })
            .await?;

        match containers.len() {
            0 => Err(Error::ExporterNotFound(name.to_owned())),
            1 => {
                let sidecar = containers.remove(0);
                self.stop_exporter(&sidecar, force).await
            }
            count => Err(Error::AmbiguousExporter {
                name: name.to_owned(),
                count,
            }),
        }
    }

    /// Stops and removes every sidecar, stopped ones included.
    ///
    /// Sidecars whose exported container still runs are skipped unless `force` is set; they
    /// are reported together in [`Error::CleanupRefused`] once all others were processed. Any
    /// other failure aborts immediately.
    pub async fn cleanup_exporters(&self, force: bool) -> Result<()> {
        let sidecars = self.list_sidecars(LABEL_EXPORTED_ID.to_owned()).await?;
        log::debug!("Found {} exporters to clean up", sidecars.len());

        let mut refused = Vec::new();
        for sidecar in &sidecars {
            match self.stop_exporter(sidecar, force).await {
                Ok(()) => {}
                Err(err) if err.is_still_running() => {
                    log::warn!("{}", err);
                    refused.push(sidecar.name().to_owned());
                }
                Err(err) => return Err(err),
            }
        }

        if refused.is_empty() {
            Ok(())
        } else {
            Err(Error::CleanupRefused(refused))
        }
    }

    /// Stops and removes the sidecars of the container `exported_id`.
    pub async fn cleanup_exporters_of(&self, exported_id: &ContainerID) -> Result<()> {
        let sidecars = self
            .list_sidecars(format!("{LABEL_EXPORTED_ID}={exported_id}"))
            .await?;
        if sidecars.is_empty() {
            log::debug!("No exporter to stop for `{}`", exported_id);
        }
        for sidecar in &sidecars {
            self.stop_exporter(sidecar, false).await?;
        }

        Ok(())
    }

    /// Lists the sidecar containers that are running.
    pub async fn running_exporters(&self) -> Result<Vec<RunningExporter>> {
        let sidecars = self
            .runtime
            .list(ListOptions {
                all: false,
                label: Some(LABEL_EXPORTED_ID.to_owned()),
                name: None,
            })
            .await?;
        sidecars
            .iter()
            .map(|sidecar| {
                Ok(RunningExporter {
                    container_id: sidecar.id.clone(),
                    name: sidecar.name().to_owned(),
                    exported_id: exported_id(sidecar)?,
                    exported_name: sidecar
                        .labels
                        .get(LABEL_EXPORTED_NAME)
                        .cloned()
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Returns the exporters resolved for running containers that have no container
    /// carrying their name yet.
    ///
    /// Resolution failures for one container are logged and do not affect the others.
    pub async fn find_missing_exporters(&self) -> Result<Vec<Exporter>> {
        let containers = self.runtime.list(ListOptions::default()).await?;
        let taken: HashSet<&str> = containers
            .iter()
            .flat_map(|container| container.names.iter().map(String::as_str))
            .collect();

        let mut missing = Vec::new();
        for container in &containers {
            let task = MonitoredTask::new(
                container.id.clone(),
                container.name(),
                container.labels.clone(),
            );
            if task.is_sidecar() {
                continue;
            }

            match self.resolve_exporters(&task) {
                Ok(exporters) => missing.extend(
                    exporters
                        .into_iter()
                        .filter(|exporter| !taken.contains(exporter.name.as_str())),
                ),
                Err(err) => log::warn!("{}", err),
            }
        }
        log::debug!("Found {} missing exporters", missing.len());

        Ok(missing)
    }

    async fn list_sidecars(&self, label: String) -> Result<Vec<ContainerSummary>> {
        Ok(self
            .runtime
            .list(ListOptions {
                all: true,
                label: Some(label),
                name: None,
            })
            .await?)
    }

    async fn stop_exporter(&self, sidecar: &ContainerSummary, force: bool) -> Result<()> {
        let exported_id = exported_id(sidecar)?;

        match self.runtime.inspect(exported_id.as_str()).await {
            Ok(exported) if exported.running && !force => {
                return Err(Error::StillRunning {
                    exporter_id: sidecar.id.clone(),
                    exported_id: exported_id.to_string(),
                });
            }
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                log::debug!("Exported container `{}` is gone", exported_id);
            }
            Err(err) => return Err(err.into()),
        }

        self.runtime
            .disconnect_network(&self.network, &sidecar.id, force)
            .await?;
        self.runtime.stop(&sidecar.id).await?;
        self.runtime.remove(&sidecar.id, force).await?;

        log::info!(
            "Exporter `{}` ({}) stopped for `{}`",
            sidecar.name(),
            sidecar.id,
            exported_id
        );

        Ok(())
    }
}

fn exported_id(sidecar: &ContainerSummary) -> Result<ContainerID> {
    sidecar
        .labels
        .get(LABEL_EXPORTED_ID)
        .and_then(|raw| ContainerID::new(raw).ok())
        .ok_or_else(|| Error::NotAnExporter(sidecar.name().to_owned()))
}
