use std::collections::HashMap;
use std::fmt;

use tokio_util::sync::CancellationToken;

use super::{Backend, Error, Result};
use crate::catalog::ExporterFinder;
use crate::container::{ContainerID, LABEL_EXPORTED_ID, LABEL_EXPORTED_NAME};
use crate::exporter::Exporter;
use crate::runtime::{self, ContainerRuntime, CreateSpec, ListOptions, RestartPolicy};

/// Restart attempts granted to a sidecar by the runtime.
const SIDECAR_MAX_RESTARTS: i64 = 10;

/// Name of a pipeline step, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    PullImage,
    Create,
    Connect,
    Start,
    Finished,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::PullImage => "pull image",
            Step::Create => "create",
            Step::Connect => "connect",
            Step::Start => "start",
            Step::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Startup pipeline state. States after `Create` carry the sidecar container id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    PullImage,
    Create,
    Connect(ContainerID),
    Start(ContainerID),
    Finished(ContainerID),
}

impl State {
    pub fn step(&self) -> Step {
        match self {
            State::PullImage => Step::PullImage,
            State::Create => Step::Create,
            State::Connect(_) => Step::Connect,
            State::Start(_) => Step::Start,
            State::Finished(_) => Step::Finished,
        }
    }
}

/// How a pipeline run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The sidecar is running.
    Started(ContainerID),
    /// Cancellation was observed before entering the given step.
    Cancelled(Step),
}

impl<R, F> Backend<R, F>
where
    R: ContainerRuntime,
    F: ExporterFinder,
{
    /// Provisions the sidecar container for `exporter`.
    ///
    /// The steps run in order; `cancel` is checked before each of them and a cancelled run
    /// returns [`Outcome::Cancelled`] without issuing further runtime calls. Resources created
    /// by earlier steps are left in place. A rerun adopts the sidecar container left behind by
    /// an earlier run for the same task instead of failing on its name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Step`] with the failing step and the runtime error.
    pub async fn run_exporter(
        &self,
        exporter: &Exporter,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let mut state = State::PullImage;
        loop {
            if let State::Finished(container_id) = state {
                log::info!(
                    "Exporter `{}` ({}) started for `{}`",
                    exporter.name,
                    exporter.image,
                    exporter.monitored_task.name
                );
                return Ok(Outcome::Started(container_id));
            }
            if cancel.is_cancelled() {
                log::info!(
                    "Startup of exporter `{}` cancelled before {} step",
                    exporter.name,
                    state.step()
                );
                return Ok(Outcome::Cancelled(state.step()));
            }

            log::debug!("exporter={} step={}", exporter.name, state.step());
            let step = state.step();
            state = self
                .advance(state, exporter)
                .await
                .map_err(|source| Error::Step {
                    step,
                    exporter: exporter.name.clone(),
                    source,
                })?;
        }
    }

    /// Executes the step of `state` and returns the next state.
    async fn advance(&self, state: State, exporter: &Exporter) -> runtime::Result<State> {
        match state {
            State::PullImage => {
                self.runtime.pull_image(&exporter.image).await?;
                Ok(State::Create)
            }
            State::Create => {
                let container_id = match self.runtime.create(&create_spec(exporter)).await {
                    Ok(container_id) => container_id,
                    Err(err) if err.is_conflict() => match self.leftover_sidecar(exporter).await? {
                        Some(container_id) => container_id,
                        None => return Err(err),
                    },
                    Err(err) => return Err(err),
                };
                log::debug!(
                    "Exporter container `{}` created as {}",
                    exporter.name,
                    container_id
                );
                Ok(State::Connect(container_id))
            }
            State::Connect(container_id) => {
                match self
                    .runtime
                    .connect_network(&self.network, &container_id)
                    .await
                {
                    Err(err) if err.to_string().contains("endpoint with name") => {
                        log::debug!(
                            "Exporter `{}` already connected to `{}`",
                            exporter.name,
                            self.network
                        );
                    }
                    other => other?,
                }
                Ok(State::Start(container_id))
            }
            State::Start(container_id) => {
                self.runtime.start(&container_id).await?;
                Ok(State::Finished(container_id))
            }
            State::Finished(container_id) => Ok(State::Finished(container_id)),
        }
    }

    /// Finds the container an earlier run created under the exporter's name for the same
    /// task, stopped or not.
    async fn leftover_sidecar(&self, exporter: &Exporter) -> runtime::Result<Option<ContainerID>> {
        let mut containers = self
            .runtime
            .list(ListOptions {
                all: true,
                label: None,
                name: Some(exporter.name.clone()),
            })
            .await?;
        if containers.len() != 1 {
            return Ok(None);
        }

        let container = containers.remove(0);
        let task_id = exporter.monitored_task.id.as_str();
        if container.labels.get(LABEL_EXPORTED_ID).map(String::as_str) != Some(task_id) {
            return Ok(None);
        }
        log::debug!(
            "Reusing existing container {} for exporter `{}`",
            container.id,
            exporter.name
        );

        Ok(Some(container.id))
    }
}

fn create_spec(exporter: &Exporter) -> CreateSpec {
    let task = &exporter.monitored_task;
    CreateSpec {
        name: exporter.name.clone(),
        image: exporter.image.clone(),
        command: exporter.command.clone(),
        environment: exporter.environment.clone(),
        labels: HashMap::from([
            (LABEL_EXPORTED_ID.to_owned(), task.id.to_string()),
            (LABEL_EXPORTED_NAME.to_owned(), task.name.clone()),
        ]),
        network_container: task.id.clone(),
        restart_policy: RestartPolicy::OnFailure {
            max_retries: SIDECAR_MAX_RESTARTS,
        },
    }
}
