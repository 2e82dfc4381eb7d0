//! DNS server setup and lifecycle management.

use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::authority::DockerDnsHandler;
use crate::config::{parse_directive, Config, DnsConfig};
use crate::error::DnsError;
use crate::inventory::{ContainerRuntime, DockerInventory};
use crate::state::ContainerRegistry;
use crate::subscription::{refresh, EventSubscriber};

/// Validate the directive and load the initial inventory.
///
/// Fails when the directive carries arguments or the runtime cannot be listed:
/// the responder does not start with an empty registry.
pub async fn setup(
    config: &DnsConfig,
    runtime: Arc<dyn ContainerRuntime>,
    registry: ContainerRegistry,
) -> Result<DockerDnsHandler, DnsError> {
    parse_directive(&config.directive)?;

    let names = refresh(runtime.as_ref(), &registry, config.lookup_timeout()).await?;
    info!(names, "Loaded initial container inventory");

    Ok(DockerDnsHandler::new(registry, runtime, config.lookup_timeout()))
}

/// DNS server resolving container names.
pub struct DnsServer {
    config: Config,
    registry: ContainerRegistry,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: ContainerRegistry::new(),
        }
    }

    /// Connect to Docker, bind the configured address and serve until shutdown.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.config.dns.listen_addr,
            docker_socket = self.config.docker.socket.as_deref().unwrap_or("<default>"),
            "Starting docker-dns server"
        );

        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(DockerInventory::connect(&self.config.docker)?);

        let udp_socket = UdpSocket::bind(self.config.dns.listen_addr).await?;
        info!(addr = %self.config.dns.listen_addr, "DNS UDP listening");

        let tcp_listener = TcpListener::bind(self.config.dns.listen_addr).await?;
        info!(addr = %self.config.dns.listen_addr, "DNS TCP listening");

        self.serve(runtime, udp_socket, tcp_listener, shutdown).await
    }

    /// Serve on already-bound sockets until shutdown.
    pub async fn serve(
        self,
        runtime: Arc<dyn ContainerRuntime>,
        udp_socket: UdpSocket,
        tcp_listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), DnsError> {
        // The event feed replays from here, covering changes made while the
        // initial listing and the subscription are still in flight.
        let synced_at = SystemTime::now();
        let handler = setup(&self.config.dns, runtime.clone(), self.registry.clone()).await?;

        let subscriber = EventSubscriber::new(
            runtime,
            self.registry.clone(),
            self.config.dns.lookup_timeout(),
            self.config.events.clone(),
        )
        .synced_at(synced_at);
        let sub_shutdown = shutdown.child_token();
        let sub_handle = tokio::spawn(subscriber.run(sub_shutdown.clone()));

        let mut server = ServerFuture::new(handler);
        server.register_socket(udp_socket);
        server.register_listener(tcp_listener, self.config.dns.tcp_timeout());

        info!(names = self.registry.len(), "DNS server ready to serve queries");

        let served = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
                Ok(())
            }
            result = server.block_until_done() => {
                if let Err(ref e) = result {
                    error!("DNS server error: {}", e);
                }
                result
            }
        };

        sub_shutdown.cancel();
        info!("Waiting for event subscription to stop...");
        if let Err(e) = sub_handle.await {
            error!("Event subscription task panicked: {}", e);
        }

        info!("DNS server stopped");
        served.map_err(DnsError::from)
    }
}
