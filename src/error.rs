//! Error types for docker-dns.

use thiserror::Error;

/// Errors that can occur in the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Container runtime error surfaced during setup
    #[error("Container runtime error: {0}")]
    Inventory(#[from] InventoryError),

    /// Docker client could not be constructed
    #[error("Docker client error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),
}

/// Failures talking to the container runtime.
///
/// `ContainerNotFound` and `NoAddress` are expected misses; the query path
/// answers them exactly like a registry miss.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryError {
    /// The runtime could not be reached at all.
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The runtime answered with an API-level failure.
    #[error("container runtime query failed: {0}")]
    RuntimeQueryFailed(String),

    /// No container with this identifier exists.
    #[error("container {0} not found")]
    ContainerNotFound(String),

    /// The container exists but has no usable IPv4 address.
    #[error("container {0} has no IPv4 address")]
    NoAddress(String),

    /// The runtime call did not complete before the deadline.
    #[error("container runtime call timed out")]
    Timeout,
}

impl InventoryError {
    /// Whether this error is an ordinary miss rather than an infrastructure fault.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::ContainerNotFound(_) | Self::NoAddress(_))
    }
}

impl From<bollard::errors::Error> for InventoryError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as Bollard;

        match err {
            Bollard::DockerResponseServerError {
                status_code,
                message,
            } => Self::RuntimeQueryFailed(format!("{status_code}: {message}")),
            Bollard::IOError { err } => Self::RuntimeUnavailable(err.to_string()),
            Bollard::SocketNotFoundError(path) => {
                Self::RuntimeUnavailable(format!("socket not found: {path}"))
            }
            Bollard::RequestTimeoutError => Self::Timeout,
            other => Self::RuntimeQueryFailed(other.to_string()),
        }
    }
}
