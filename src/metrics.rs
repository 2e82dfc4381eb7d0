//! Metrics instrumentation for docker-dns.
//!
//! All metrics are prefixed with `docker_dns.`

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Outcome of a single DNS query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// An A record was returned.
    Success,
    /// Short name not present in the registry.
    NxDomain,
    /// Name known but the container had no usable address.
    NoAddress,
    /// The runtime failed or timed out while resolving the address.
    RuntimeError,
}

impl QueryResult {
    fn as_str(self) -> &'static str {
        match self {
            QueryResult::Success => "success",
            QueryResult::NxDomain => "nxdomain",
            QueryResult::NoAddress => "no_address",
            QueryResult::RuntimeError => "runtime_error",
        }
    }
}

/// Record a DNS query.
pub fn record_query(result: QueryResult, duration: Duration) {
    counter!("docker_dns.query.count", "result" => result.as_str()).increment(1);
    histogram!("docker_dns.query.duration.seconds").record(duration.as_secs_f64());
}

/// Record a runtime event, and whether it triggered a refresh.
///
/// `action` must come from a fixed set of labels.
pub fn record_event(action: &'static str, relevant: bool) {
    counter!(
        "docker_dns.events.count",
        "action" => action,
        "relevant" => if relevant { "true" } else { "false" }
    )
    .increment(1);
}

/// Record a registry refresh attempt.
pub fn record_refresh(success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "error" };
    counter!("docker_dns.refresh.count", "outcome" => outcome).increment(1);
    histogram!("docker_dns.refresh.duration.seconds").record(duration.as_secs_f64());
}

/// Record an event stream (re)connection.
pub fn record_subscription_connect(initial: bool) {
    let reason = if initial { "initial_connect" } else { "reconnect" };
    counter!("docker_dns.subscription.connect.count", "reason" => reason).increment(1);
}

/// Record the event stream ending.
pub fn record_subscription_ended() {
    counter!("docker_dns.subscription.ended.count").increment(1);
}

/// Record the number of names in the current registry snapshot.
pub fn record_registry_size(names: usize) {
    gauge!("docker_dns.registry.names").set(names as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
