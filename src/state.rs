//! In-memory container registry.
//!
//! Maps a container's short name (its published name without the leading `/`)
//! to the container identifier. The whole mapping is rebuilt from the runtime on
//! every refresh and swapped in as one immutable [`Snapshot`]; readers hold an
//! `Arc` to whichever snapshot was current when they asked.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::metrics;

/// One complete, immutable version of the registry contents.
pub type Snapshot = HashMap<String, String>;

/// Thread-safe registry of short name -> container id.
#[derive(Debug, Clone, Default)]
pub struct ContainerRegistry {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl ContainerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry already holding `names`.
    pub fn with_snapshot(names: Snapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(names))),
        }
    }

    /// Current snapshot. Later replacements do not affect the returned value.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// Replace the whole mapping in one step.
    pub fn replace(&self, names: Snapshot) {
        let size = names.len();
        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(names));
        debug!(previous = previous.len(), current = size, "replaced registry snapshot");
        metrics::record_registry_size(size);
    }

    /// Look up the container id for a short name.
    pub fn lookup(&self, short_name: &str) -> Option<String> {
        self.current.read().get(short_name).cloned()
    }

    /// Number of names in the current snapshot.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Whether the current snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}
