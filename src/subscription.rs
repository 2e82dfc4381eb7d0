//! Event-driven registry refresh.
//!
//! The [`EventSubscriber`] owns the runtime's lifecycle event feed for the life
//! of the process. Every container `start`, `stop` or `die` event triggers one
//! full refresh: list the running containers and replace the registry snapshot.
//! Refreshes run inline on the subscriber task, so they never overlap.

use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::EventsConfig;
use crate::error::InventoryError;
use crate::inventory::{with_deadline, ContainerRuntime, EventStream, RuntimeEvent};
use crate::metrics::{self, Timer};
use crate::state::ContainerRegistry;

/// Event category carrying container lifecycle events.
const CONTAINER_EVENT: &str = "container";

/// Label shared by every event that does not trigger a refresh.
pub const OTHER_ACTION: &str = "other";

/// Bounded label for `event`: the lifecycle action for container start, stop
/// and die, [`OTHER_ACTION`] for everything else.
///
/// Runtime actions carry free text (`exec_create: <cmd>`), so they are never
/// used as labels directly.
pub fn action_label(event: &RuntimeEvent) -> &'static str {
    if event.kind != CONTAINER_EVENT {
        return OTHER_ACTION;
    }
    match event.action.as_str() {
        "start" => "start",
        "stop" => "stop",
        "die" => "die",
        _ => OTHER_ACTION,
    }
}

/// Whether `event` changes the set of resolvable containers.
pub fn is_refresh_trigger(event: &RuntimeEvent) -> bool {
    action_label(event) != OTHER_ACTION
}

/// Rebuild the registry from the runtime's current container listing.
///
/// On failure the registry keeps its previous snapshot.
pub async fn refresh(
    runtime: &dyn ContainerRuntime,
    registry: &ContainerRegistry,
    deadline: Duration,
) -> Result<usize, InventoryError> {
    let timer = Timer::start();
    let result = with_deadline(deadline, runtime.list_names()).await;
    metrics::record_refresh(result.is_ok(), timer.elapsed());

    let names = result?;
    let count = names.len();
    registry.replace(names);
    Ok(count)
}

/// Why the subscriber stopped reading a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// The runtime closed the feed.
    Closed,
    /// Shutdown was requested.
    Shutdown,
}

/// Follows the runtime event feed and refreshes the registry.
pub struct EventSubscriber {
    runtime: Arc<dyn ContainerRuntime>,
    registry: ContainerRegistry,
    deadline: Duration,
    config: EventsConfig,
    synced_at: Option<SystemTime>,
}

impl EventSubscriber {
    /// Create a new subscriber.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: ContainerRegistry,
        deadline: Duration,
        config: EventsConfig,
    ) -> Self {
        Self {
            runtime,
            registry,
            deadline,
            config,
            synced_at: None,
        }
    }

    /// Replay events from `synced_at` on the first subscription.
    ///
    /// Pass the time the registry was last listed so that containers started
    /// or stopped before the feed connects still trigger a refresh.
    pub fn synced_at(mut self, synced_at: SystemTime) -> Self {
        self.synced_at = Some(synced_at);
        self
    }

    /// Consume events until shutdown, or until the feed ends when reconnect
    /// is disabled.
    pub async fn run(self, shutdown: CancellationToken) {
        let max_backoff = self.config.max_backoff_secs.max(1);
        let mut backoff_secs = 1u64;
        let mut first_connect = true;

        loop {
            if shutdown.is_cancelled() {
                info!("Event subscription shutting down");
                return;
            }

            // The feed replays from `since`; it is taken before any listing it
            // has to cover.
            let since = match self.synced_at {
                Some(synced_at) if first_connect => synced_at,
                _ => SystemTime::now(),
            };

            info!(reconnect = !first_connect, "Opening container event subscription");
            let stream = self.runtime.events(since);
            metrics::record_subscription_connect(first_connect);

            if !first_connect {
                // Events may have been missed while disconnected.
                self.refresh_logged("reconnect").await;
            }
            first_connect = false;

            let (end, seen) = self.follow(stream, &shutdown).await;
            if end == StreamEnd::Shutdown {
                info!("Event subscription received shutdown signal");
                return;
            }

            metrics::record_subscription_ended();
            if !self.config.reconnect {
                warn!(
                    "Container event stream ended; registry will not follow container \
                     lifecycle changes until restart"
                );
                return;
            }

            if seen > 0 {
                backoff_secs = 1;
            }
            warn!(backoff_secs, "Container event stream ended, reconnecting");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Event subscription received shutdown signal");
                    return;
                }
                _ = sleep(Duration::from_secs(backoff_secs)) => {}
            }
            backoff_secs = (backoff_secs * 2).min(max_backoff);
        }
    }

    /// Read one stream until it ends or shutdown is requested.
    /// Returns how the stream ended and how many events were read.
    async fn follow(
        &self,
        mut stream: EventStream,
        shutdown: &CancellationToken,
    ) -> (StreamEnd, usize) {
        let mut seen = 0usize;
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => return (StreamEnd::Shutdown, seen),

                next = stream.next() => match next {
                    Some(Ok(event)) => {
                        seen += 1;
                        self.handle_event(&event).await;
                    }
                    Some(Err(e)) => {
                        warn!("Container event stream error: {}", e);
                    }
                    None => {
                        info!(events = seen, "Container event stream ended");
                        return (StreamEnd::Closed, seen);
                    }
                },
            }
        }
    }

    /// Handle one event. Returns true if it triggered a refresh.
    pub async fn handle_event(&self, event: &RuntimeEvent) -> bool {
        let label = action_label(event);
        let relevant = label != OTHER_ACTION;
        metrics::record_event(label, relevant);

        if !relevant {
            trace!(kind = %event.kind, action = %event.action, "ignoring event");
            return false;
        }

        debug!(
            action = %event.action,
            container = event.actor.as_deref().unwrap_or("-"),
            "container lifecycle event"
        );
        self.refresh_logged(&event.action).await;
        true
    }

    async fn refresh_logged(&self, cause: &str) {
        match refresh(self.runtime.as_ref(), &self.registry, self.deadline).await {
            Ok(names) => debug!(cause, names, "registry refreshed"),
            Err(e) => warn!(cause, "Registry refresh failed, keeping previous snapshot: {}", e),
        }
    }
}
