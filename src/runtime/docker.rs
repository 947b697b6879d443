//! Docker Engine implementation of [`ContainerRuntime`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerInspectResponse, EventMessage, EventMessageTypeEnum};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::{BoxStream, StreamExt};

use crate::runtime::{
    ContainerEvent, ContainerInfo, ContainerRuntime, ContainerSummary, EventAction, PortBinding,
    RuntimeError,
};

/// Docker client wrapper.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the environment's defaults (DOCKER_HOST or the local socket).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    fn event_options() -> EventsOptions<String> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert(
            "event".to_string(),
            EventAction::ALL.iter().map(|a| a.to_string()).collect(),
        );
        EventsOptions {
            filters,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn events(&self) -> BoxStream<'static, Result<ContainerEvent, RuntimeError>> {
        self.docker
            .events(Some(Self::event_options()))
            .filter_map(|res| async move {
                match res {
                    Ok(message) => event_from_message(message).map(Ok),
                    Err(e) => Some(Err(RuntimeError::from(e))),
                }
            })
            .boxed()
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInfo, RuntimeError> {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => Ok(info_from_inspect(id, response)),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(RuntimeError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                Some(ContainerSummary {
                    id,
                    running: c.state.as_deref() == Some("running"),
                })
            })
            .collect())
    }
}

/// Keep only container events with an action and actor we understand.
fn event_from_message(message: EventMessage) -> Option<ContainerEvent> {
    if message.typ != Some(EventMessageTypeEnum::CONTAINER) {
        return None;
    }
    let action = EventAction::parse(message.action.as_deref()?)?;
    let id = message.actor?.id?;
    Some(ContainerEvent::new(action, id))
}

fn info_from_inspect(id: &str, response: ContainerInspectResponse) -> ContainerInfo {
    let settings = response.network_settings.unwrap_or_default();

    let networks: BTreeMap<String, String> = settings
        .networks
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| (name, endpoint.ip_address.unwrap_or_default()))
        .collect();

    let ports: BTreeMap<String, Vec<PortBinding>> = settings
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|b| {
                    Some(PortBinding {
                        host_ip: b.host_ip,
                        host_port: b.host_port?,
                    })
                })
                .collect();
            (port, bindings)
        })
        .collect();

    ContainerInfo {
        id: response.id.unwrap_or_else(|| id.to_string()),
        name: response.name.unwrap_or_default(),
        running: response.state.and_then(|s| s.running).unwrap_or(false),
        network_mode: response.host_config.and_then(|h| h.network_mode),
        networks,
        ports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{EndpointSettings, EventActor, HostConfig, NetworkSettings};

    #[test]
    fn test_event_from_message() {
        let message = EventMessage {
            typ: Some(EventMessageTypeEnum::CONTAINER),
            action: Some("die".to_string()),
            actor: Some(EventActor {
                id: Some("abc123".to_string()),
                attributes: None,
            }),
            ..Default::default()
        };
        assert_eq!(
            event_from_message(message),
            Some(ContainerEvent::new(EventAction::Die, "abc123"))
        );
    }

    #[test]
    fn test_event_from_message_ignores_others() {
        let network_event = EventMessage {
            typ: Some(EventMessageTypeEnum::NETWORK),
            action: Some("start".to_string()),
            ..Default::default()
        };
        assert_eq!(event_from_message(network_event), None);

        let destroy = EventMessage {
            typ: Some(EventMessageTypeEnum::CONTAINER),
            action: Some("destroy".to_string()),
            actor: Some(EventActor {
                id: Some("abc123".to_string()),
                attributes: None,
            }),
            ..Default::default()
        };
        assert_eq!(event_from_message(destroy), None);
    }

    #[test]
    fn test_info_from_inspect() {
        let mut networks = HashMap::new();
        networks.insert(
            "bridge".to_string(),
            EndpointSettings {
                ip_address: Some("172.17.0.2".to_string()),
                ..Default::default()
            },
        );
        let mut ports = HashMap::new();
        ports.insert(
            "9000/tcp".to_string(),
            Some(vec![bollard::models::PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("33000".to_string()),
            }]),
        );
        ports.insert("9001/tcp".to_string(), None);

        let response = ContainerInspectResponse {
            name: Some("/my-api".to_string()),
            host_config: Some(HostConfig {
                network_mode: Some("bridge".to_string()),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(networks),
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = info_from_inspect("abc", response);
        assert_eq!(info.id, "abc");
        assert_eq!(info.name, "/my-api");
        assert!(!info.running);
        assert_eq!(info.network_mode.as_deref(), Some("bridge"));
        assert_eq!(info.networks["bridge"], "172.17.0.2");
        assert_eq!(info.ports["9000/tcp"][0].host_port, "33000");
        assert!(info.ports["9001/tcp"].is_empty());
    }
}
