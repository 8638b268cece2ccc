//! Connection tracking for live dispatchers
//!
//! The tracker only holds weak references to per-connection state, so a torn
//! down or dropped connection is never kept alive by it.

use crate::state::{ActiveDispatchState, DispatchPhase};
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use uuid::Uuid;

/// Opaque per-connection identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracks the dispatch state of every open connection
#[derive(Clone, Default)]
pub struct ConnectionTracker {
    connections: Arc<DashMap<ConnectionId, Weak<ActiveDispatchState>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ConnectionId, state: &Arc<ActiveDispatchState>) {
        debug!("Tracking connection {}", id);
        self.connections.insert(id, Arc::downgrade(state));
    }

    pub fn deregister(&self, id: &ConnectionId) {
        if self.connections.remove(id).is_some() {
            debug!("Stopped tracking connection {}", id);
        }
    }

    /// Close a connection from any worker.
    ///
    /// Events delivered afterwards fail with a closed-connection error.
    /// Returns false if the connection is unknown or already gone.
    pub fn teardown(&self, id: &ConnectionId) -> bool {
        let Some((_, state)) = self.connections.remove(id) else {
            return false;
        };
        let Some(state) = state.upgrade() else {
            return false;
        };

        let previous = state.close();
        info!("Connection {} torn down (was {:?})", id, previous);
        previous != DispatchPhase::Closed
    }

    /// Tear down every tracked connection, returning how many were closed
    pub fn teardown_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter(|id| self.teardown(id)).count()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_teardown() {
        let tracker = ConnectionTracker::new();
        let id = ConnectionId::new();
        let state = Arc::new(ActiveDispatchState::new());

        tracker.register(id, &state);
        assert!(tracker.contains(&id));
        assert_eq!(tracker.count(), 1);

        assert!(tracker.teardown(&id));
        assert!(state.is_closed());
        assert!(!tracker.contains(&id));
        assert!(!tracker.teardown(&id));
    }

    #[test]
    fn test_dropped_state_is_not_kept_alive() {
        let tracker = ConnectionTracker::new();
        let id = ConnectionId::new();
        let state = Arc::new(ActiveDispatchState::new());
        tracker.register(id, &state);
        drop(state);

        assert!(!tracker.teardown(&id));
    }

    #[test]
    fn test_teardown_all() {
        let tracker = ConnectionTracker::new();
        let states: Vec<_> = (0..3)
            .map(|_| {
                let state = Arc::new(ActiveDispatchState::new());
                tracker.register(ConnectionId::new(), &state);
                state
            })
            .collect();

        assert_eq!(tracker.teardown_all(), 3);
        assert_eq!(tracker.count(), 0);
        assert!(states.iter().all(|s| s.is_closed()));
    }

    #[test]
    fn test_deregister() {
        let tracker = ConnectionTracker::new();
        let id = ConnectionId::new();
        let state = Arc::new(ActiveDispatchState::new());
        tracker.register(id, &state);
        tracker.deregister(&id);
        assert_eq!(tracker.count(), 0);
        assert!(!state.is_closed());
    }
}
