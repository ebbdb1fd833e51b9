use std::collections::HashMap;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointSettings, HostConfig, RestartPolicyNameEnum};
use bollard::network::{ConnectNetworkOptions, DisconnectNetworkOptions};
use bollard::system::EventsOptions;
use futures::StreamExt;
use futures::stream::BoxStream;

use super::{
    ContainerDetails, ContainerEvent, ContainerRuntime, ContainerSummary, CreateSpec, Error,
    ListOptions, RestartPolicy, Result,
};
use crate::container::{ContainerID, trim_leading_slash};

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connects using the local defaults (`DOCKER_HOST` or the default unix socket).
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(Error::Docker)?;
        log::debug!("Connected to docker daemon");
        Ok(Self::new(docker))
    }
}

/// Returns true if the image reference names a tag or a digest.
fn has_tag(image: &str) -> bool {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    last_segment.contains(':') || image.contains('@')
}

impl ContainerRuntime for DockerRuntime {
    fn events(
        &self,
        since: chrono::DateTime<chrono::Utc>,
    ) -> BoxStream<'static, Result<ContainerEvent>> {
        let filters = HashMap::from([
            ("type".to_owned(), vec!["container".to_owned()]),
            (
                "event".to_owned(),
                vec!["start".to_owned(), "die".to_owned()],
            ),
        ]);
        let options = EventsOptions::<String> {
            since: Some(since),
            until: None,
            filters,
        };

        self.docker
            .events(Some(options))
            .map(|msg| -> Result<ContainerEvent> {
                let msg = msg.map_err(Error::Docker)?;
                let actor = msg.actor.unwrap_or_default();
                Ok(ContainerEvent {
                    action: msg.action.as_deref().unwrap_or_default().into(),
                    actor_id: actor.id.unwrap_or_default(),
                    attributes: actor.attributes.unwrap_or_default(),
                })
            })
            .boxed()
    }

    async fn inspect(&self, id: &str) -> Result<ContainerDetails> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|err| Error::from_docker(id, err))?;

        Ok(ContainerDetails {
            id: ContainerID::new(response.id.as_deref().unwrap_or(id))?,
            name: trim_leading_slash(response.name.as_deref().unwrap_or_default()).to_owned(),
            running: response
                .state
                .and_then(|state| state.running)
                .unwrap_or(false),
            labels: response
                .config
                .and_then(|config| config.labels)
                .unwrap_or_default(),
        })
    }

    async fn list(&self, options: ListOptions) -> Result<Vec<ContainerSummary>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(label) = options.label {
            filters.insert("label".to_owned(), vec![label]);
        }
        if let Some(name) = options.name {
            // The daemon matches names as regular expressions against `/<name>`.
            filters.insert(
                "name".to_owned(),
                vec![format!("^/{}$", regex::escape(trim_leading_slash(&name)))],
            );
        }

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: options.all,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|err| Error::from_docker("", err))?;

        containers
            .into_iter()
            .map(|container| -> Result<ContainerSummary> {
                Ok(ContainerSummary {
                    id: ContainerID::new(container.id.unwrap_or_default())?,
                    names: container
                        .names
                        .unwrap_or_default()
                        .iter()
                        .map(|name| trim_leading_slash(name).to_owned())
                        .collect(),
                    labels: container.labels.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let options = CreateImageOptions {
            from_image: image,
            tag: if has_tag(image) { "" } else { "latest" },
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            let info = result.map_err(|err| Error::from_docker(image, err))?;
            if let Some(status) = info.status {
                log::trace!("Pulling {}: {}", image, status);
            }
        }

        Ok(())
    }

    async fn create(&self, spec: &CreateSpec) -> Result<ContainerID> {
        let RestartPolicy::OnFailure { max_retries } = spec.restart_policy;
        let host_config = HostConfig {
            network_mode: Some(format!("container:{}", spec.network_container)),
            restart_policy: Some(bollard::models::RestartPolicy {
                name: Some(RestartPolicyNameEnum::ON_FAILURE),
                maximum_retry_count: Some(max_retries),
            }),
            ..Default::default()
        };
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(spec.environment.clone()),
            labels: Some(spec.labels.clone()),
            user: Some("1000".to_owned()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|err| Error::from_docker(&spec.name, err))?;

        if !response.warnings.is_empty() {
            log::warn!(
                "Docker emitted warnings while creating `{}`: {:?}",
                spec.name,
                response.warnings
            );
        }

        Ok(ContainerID::new(response.id)?)
    }

    async fn connect_network(&self, network: &str, container: &ContainerID) -> Result<()> {
        self.docker
            .connect_network(
                network,
                ConnectNetworkOptions {
                    container: container.as_str(),
                    endpoint_config: EndpointSettings::default(),
                },
            )
            .await
            .map_err(|err| Error::from_docker(container.as_str(), err))
    }

    async fn disconnect_network(
        &self,
        network: &str,
        container: &ContainerID,
        force: bool,
    ) -> Result<()> {
        self.docker
            .disconnect_network(
                network,
                DisconnectNetworkOptions {
                    container: container.as_str(),
                    force,
                },
            )
            .await
            .map_err(|err| Error::from_docker(container.as_str(), err))
    }

    async fn start(&self, container: &ContainerID) -> Result<()> {
        match self
            .docker
            .start_container(container.as_str(), None::<StartContainerOptions<String>>)
            .await
        {
            // 304: already started
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            other => other.map_err(|err| Error::from_docker(container.as_str(), err)),
        }
    }

    async fn stop(&self, container: &ContainerID) -> Result<()> {
        match self.docker.stop_container(container.as_str(), None).await {
            // 304: already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            other => other.map_err(|err| Error::from_docker(container.as_str(), err)),
        }
    }

    async fn remove(&self, container: &ContainerID, force: bool) -> Result<()> {
        self.docker
            .remove_container(
                container.as_str(),
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|err| Error::from_docker(container.as_str(), err))
    }
}
