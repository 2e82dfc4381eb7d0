//! Container runtime adapter.
//!
//! [`ContainerRuntime`] is the seam between the resolver and the runtime API:
//! listing running containers, inspecting one container's address and
//! streaming lifecycle events. [`DockerInventory`] implements it on top of the
//! Docker Engine API. Nothing is cached here; every call goes to the runtime.

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerSummary, EventMessage, NetworkSettings};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

use crate::config::DockerConfig;
use crate::error::{DnsError, InventoryError};
use crate::state::Snapshot;

/// A lifecycle event reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    /// Event category (e.g. "container", "network").
    pub kind: String,
    /// Action within the category (e.g. "start", "die", "exec_create: sh").
    pub action: String,
    /// Identifier of the object the event refers to.
    pub actor: Option<String>,
}

impl RuntimeEvent {
    /// Build an event from its parts.
    pub fn new(kind: &str, action: &str, actor: Option<&str>) -> Self {
        Self {
            kind: kind.to_string(),
            action: action.to_string(),
            actor: actor.map(String::from),
        }
    }
}

impl From<EventMessage> for RuntimeEvent {
    fn from(message: EventMessage) -> Self {
        Self {
            kind: message.typ.map(|t| t.to_string()).unwrap_or_default(),
            action: message.action.unwrap_or_default(),
            actor: message.actor.and_then(|actor| actor.id),
        }
    }
}

/// Stream of runtime events; ends when the runtime closes the feed.
pub type EventStream = BoxStream<'static, Result<RuntimeEvent, InventoryError>>;

/// Operations the resolver needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Map every published name of every running container to its identifier.
    async fn list_names(&self) -> Result<Snapshot, InventoryError>;

    /// Current IPv4 address of the container with the given identifier.
    async fn inspect_address(&self, id: &str) -> Result<Ipv4Addr, InventoryError>;

    /// Open the lifecycle event feed, replaying events from `since` onwards.
    fn events(&self, since: SystemTime) -> EventStream;
}

/// Run a runtime call with a deadline.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, InventoryError>
where
    F: Future<Output = Result<T, InventoryError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(InventoryError::Timeout),
    }
}

/// Strip the runtime's leading `/` from a published container name.
pub fn short_name(published: &str) -> &str {
    published.strip_prefix('/').unwrap_or(published)
}

/// Build the name -> id mapping from a container listing.
///
/// A container with several published names contributes one entry per name.
/// Containers without an id are skipped.
pub fn names_from_summaries(containers: Vec<ContainerSummary>) -> Snapshot {
    let mut names = HashMap::new();
    for container in containers {
        let Some(id) = container.id else {
            continue;
        };
        for published in container.names.unwrap_or_default() {
            let name = short_name(&published);
            if name.is_empty() {
                continue;
            }
            names.insert(name.to_string(), id.clone());
        }
    }
    names
}

/// Pick the container's IPv4 address from its network settings.
///
/// The top-level address wins when present; otherwise the first usable
/// per-network address, in network-name order.
pub fn container_address(
    id: &str,
    settings: Option<&NetworkSettings>,
) -> Result<Ipv4Addr, InventoryError> {
    let no_address = || InventoryError::NoAddress(id.to_string());
    let settings = settings.ok_or_else(no_address)?;

    if let Some(ip) = settings.ip_address.as_deref().and_then(parse_ipv4) {
        return Ok(ip);
    }

    let mut networks: Vec<_> = settings.networks.iter().flatten().collect();
    networks.sort_by(|a, b| a.0.cmp(b.0));
    networks
        .into_iter()
        .find_map(|(_, endpoint)| endpoint.ip_address.as_deref().and_then(parse_ipv4))
        .ok_or_else(no_address)
}

/// Unix timestamp for the runtime's `since` filter.
///
/// Rounded down a further second: the filter has second resolution, and a
/// replayed duplicate only costs one extra refresh.
pub fn since_timestamp(since: SystemTime) -> String {
    since
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs().saturating_sub(1))
        .unwrap_or(0)
        .to_string()
}

fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse().ok()
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerInventory {
    docker: Docker,
}

impl DockerInventory {
    /// Wrap an existing Docker client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using the configured socket, or the local defaults (honouring
    /// `DOCKER_HOST`) when none is set.
    pub fn connect(config: &DockerConfig) -> Result<Self, DnsError> {
        let docker = match config.socket {
            Some(ref socket) => Docker::connect_with_socket(
                socket,
                config.timeout_secs,
                bollard::API_DEFAULT_VERSION,
            )?,
            None => Docker::connect_with_local_defaults()?
                .with_timeout(Duration::from_secs(config.timeout_secs)),
        };
        Ok(Self::new(docker))
    }
}

#[async_trait]
impl ContainerRuntime for DockerInventory {
    async fn list_names(&self) -> Result<Snapshot, InventoryError> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        trace!(containers = containers.len(), "listed running containers");
        Ok(names_from_summaries(containers))
    }

    async fn inspect_address(&self, id: &str) -> Result<Ipv4Addr, InventoryError> {
        let details = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Err(InventoryError::ContainerNotFound(id.to_string())),
            Err(e) => return Err(e.into()),
        };

        let address = container_address(id, details.network_settings.as_ref())?;
        debug!(id, %address, "inspected container address");
        Ok(address)
    }

    fn events(&self, since: SystemTime) -> EventStream {
        let options = EventsOptions::<String> {
            since: Some(since_timestamp(since)),
            filters: HashMap::from([("type".to_string(), vec!["container".to_string()])]),
            ..Default::default()
        };
        self.docker
            .events(Some(options))
            .map(|event| event.map(RuntimeEvent::from).map_err(InventoryError::from))
            .boxed()
    }
}
