//! Liveness table for in-flight chat requests.
//!
//! A request is live while the registry holds its id. Removing the entry is how a request
//! gets cancelled, and the same removal runs when the request finishes normally, so there
//! is only one cleanup path.

use std::{
    sync::{Arc, Weak},
    time::Instant,
};

use dashmap::DashMap;
use uuid::Uuid;

type Entries = DashMap<Uuid, Instant>;

/// Process-wide set of live request identifiers.
///
/// Cloning is cheap and every clone refers to the same table.
#[derive(Clone, Default)]
pub struct RequestRegistry {
    entries: Arc<Entries>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh request id. The entry lives until the returned guard is dropped.
    pub fn register(&self) -> RequestGuard {
        let id = Uuid::new_v4();
        self.entries.insert(id, Instant::now());

        log::debug!("Registered request {id} ({} in flight)", self.entries.len());

        RequestGuard {
            id,
            entries: self.entries.clone(),
        }
    }

    /// Removes a request entry, cancelling the request if it is still streaming.
    ///
    /// Returns whether an entry was present. Removing an absent entry is a no-op.
    pub fn remove(&self, id: Uuid) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only view on one request's liveness. Owns no resources.
#[derive(Clone)]
pub struct RequestHandle {
    id: Uuid,
    entries: Weak<Entries>,
}

impl RequestHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once the entry is gone, or the registry itself no longer exists.
    pub fn is_cancelled(&self) -> bool {
        match self.entries.upgrade() {
            Some(entries) => !entries.contains_key(&self.id),
            None => true,
        }
    }
}

/// Scoped registration of a request. Dropping it removes the entry.
pub struct RequestGuard {
    id: Uuid,
    entries: Arc<Entries>,
}

impl RequestGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> RequestHandle {
        RequestHandle {
            id: self.id,
            entries: Arc::downgrade(&self.entries),
        }
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        match self.entries.remove(&self.id) {
            Some((_, started)) => {
                log::debug!("Request {} finished after {:?}", self.id, started.elapsed());
            }
            None => {
                log::debug!("Request {} was cancelled before it finished", self.id);
            }
        }
    }
}
