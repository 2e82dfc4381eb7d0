//! Configuration types for docker-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::DnsError;

/// Name the responder is registered under, and the only accepted directive.
pub const PLUGIN_NAME: &str = "dockerdns";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Docker client configuration.
    #[serde(default)]
    pub docker: DockerConfig,

    /// Event subscription configuration.
    #[serde(default)]
    pub events: EventsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// Directive enabling the responder. Must be exactly `dockerdns`.
    #[serde(default = "default_directive")]
    pub directive: String,

    /// Deadline for each container runtime call, in milliseconds.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Idle timeout for TCP connections, in seconds.
    #[serde(default = "default_tcp_timeout_secs")]
    pub tcp_timeout_secs: u64,
}

impl DnsConfig {
    /// Config listening on `listen_addr` with every other field defaulted.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            directive: default_directive(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            tcp_timeout_secs: default_tcp_timeout_secs(),
        }
    }

    /// Deadline applied to runtime calls.
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Idle timeout for TCP connections.
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_secs(self.tcp_timeout_secs)
    }
}

/// Docker client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Path to the Docker socket. Local defaults (and `DOCKER_HOST`) when unset.
    #[serde(default)]
    pub socket: Option<String>,

    /// Client-side request timeout in seconds.
    #[serde(default = "default_docker_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: None,
            timeout_secs: default_docker_timeout_secs(),
        }
    }
}

/// Event subscription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Reopen the event feed when it ends. Off by default: once the feed drops,
    /// the registry stops following the runtime until restart.
    #[serde(default)]
    pub reconnect: bool,

    /// Upper bound for the reconnect backoff, in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            reconnect: false,
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "docker_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

/// Validate the responder directive.
///
/// The directive takes no arguments: `dockerdns` is accepted, `dockerdns foo`
/// is a configuration error.
pub fn parse_directive(directive: &str) -> Result<(), DnsError> {
    let mut tokens = directive.split_whitespace();
    match tokens.next() {
        Some(PLUGIN_NAME) => {}
        Some(other) => {
            return Err(DnsError::Config(format!(
                "unknown directive '{other}', expected '{PLUGIN_NAME}'"
            )))
        }
        None => return Err(DnsError::Config("empty directive".to_string())),
    }

    let args: Vec<&str> = tokens.collect();
    if !args.is_empty() {
        return Err(DnsError::Config(format!(
            "'{PLUGIN_NAME}' takes no arguments, got: {}",
            args.join(" ")
        )));
    }
    Ok(())
}

fn default_directive() -> String {
    PLUGIN_NAME.to_string()
}

fn default_lookup_timeout_ms() -> u64 {
    2000
}

fn default_tcp_timeout_secs() -> u64 {
    30
}

fn default_docker_timeout_secs() -> u64 {
    120
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}
