//! docker-dns - An authoritative DNS responder for local container names.
//!
//! Answers A queries for `<container>.<anything>` with the current IPv4
//! address of the running container published under `<container>`. The set of
//! known containers is kept in memory and rebuilt whenever Docker reports a
//! container starting, stopping or dying.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           docker-dns                             │
//! │                                                                  │
//! │  ┌──────────────────┐  refresh   ┌──────────────────┐            │
//! │  │ Event Subscriber │───────────▶│    Registry      │            │
//! │  │ (start/stop/die) │            │ name -> id       │            │
//! │  └────────┬─────────┘            └────────┬─────────┘            │
//! │           │ list                          │ lookup               │
//! │           ▼                               ▼                      │
//! │  ┌──────────────────┐  inspect   ┌──────────────────┐            │
//! │  │ Docker Inventory │◀───────────│  Query Handler   │◀── UDP/TCP │
//! │  └──────────────────┘            └──────────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! web.local.
//!   → short name "web" (first label)
//!   → registry: web -> container id
//!   → inspect container → 172.17.0.2
//!   → A record web.local. 172.17.0.2 (authoritative)
//!
//! anything else → NXDOMAIN + SOA for the queried name
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use docker_dns::{Config, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config: Config = load_config();
//!     let shutdown = CancellationToken::new();
//!
//!     let server = DnsServer::new(config);
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod authority;
pub mod config;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod server;
pub mod state;
pub mod subscription;
pub mod telemetry;

// Re-export main types
pub use authority::DockerDnsHandler;
pub use config::{Config, DnsConfig, DockerConfig, EventsConfig, TelemetryConfig, PLUGIN_NAME};
pub use error::{DnsError, InventoryError};
pub use inventory::{ContainerRuntime, DockerInventory, RuntimeEvent};
pub use server::DnsServer;
pub use state::ContainerRegistry;
pub use subscription::EventSubscriber;
