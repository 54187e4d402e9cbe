//! The set of live connections.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::handle::{ConnectionHandle, ConnectionId};

/// Outcome of [`ConnectionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The connection is now a member.
    Added,
    /// The connection was already a member; nothing changed.
    AlreadyPresent,
    /// The registry is at capacity; the connection was not added.
    Full,
}

/// Thread-safe registry of live connections.
///
/// Mutations take the write lock, so concurrent register/unregister calls
/// are serialized. Broadcasters iterate over [`snapshot_members`](Self::snapshot_members),
/// a copy taken under the read lock, so membership changes during a
/// fan-out never affect the sweep in progress.
#[derive(Debug)]
pub struct ConnectionRegistry {
    members: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    capacity: usize,
}

impl ConnectionRegistry {
    /// Creates an empty registry holding at most `capacity` connections.
    pub fn new(capacity: usize) -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Adds a connection. Registering the same ID twice is a no-op.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Registration {
        let mut members = self.write();
        if members.contains_key(&handle.id) {
            return Registration::AlreadyPresent;
        }
        if members.len() >= self.capacity {
            return Registration::Full;
        }
        members.insert(handle.id, handle);
        Registration::Added
    }

    /// Removes a connection, returning it if it was a member.
    pub fn unregister(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.write().remove(conn_id)
    }

    /// Point-in-time copy of the members.
    pub fn snapshot_members(&self) -> Vec<Arc<ConnectionHandle>> {
        self.read().values().cloned().collect()
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.read().get(conn_id).cloned()
    }

    /// Whether `conn_id` is a member.
    pub fn contains(&self, conn_id: &ConnectionId) -> bool {
        self.read().contains_key(conn_id)
    }

    /// Returns total number of members.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Maximum number of members.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Arc<ConnectionHandle>>> {
        self.members
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Arc<ConnectionHandle>>> {
        self.members
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use pulse_core::types::Principal;
    use pulse_resilience::{
        BackpressureHandler, CircuitBreaker, CircuitBreakerConfig, OverflowPolicy,
    };
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use super::*;

    fn handle() -> Arc<ConnectionHandle> {
        let id = Uuid::new_v4();
        Arc::new(ConnectionHandle::new(
            id,
            Principal::new(Uuid::new_v4(), "user"),
            BackpressureHandler::new(id.to_string(), 4, OverflowPolicy::DropNewest),
            Arc::new(CircuitBreaker::new(id.to_string(), CircuitBreakerConfig::default())),
            CancellationToken::new(),
        ))
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ConnectionRegistry::new(10);
        let h = handle();
        assert_eq!(registry.register(h.clone()), Registration::Added);
        assert_eq!(registry.register(h.clone()), Registration::AlreadyPresent);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&h.id));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new(10);
        let h = handle();
        registry.register(h.clone());
        assert!(registry.unregister(&h.id).is_some());
        assert!(registry.unregister(&h.id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_capacity_enforced() {
        let registry = ConnectionRegistry::new(1);
        assert_eq!(registry.register(handle()), Registration::Added);
        assert_eq!(registry.register(handle()), Registration::Full);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let registry = ConnectionRegistry::new(10);
        let a = handle();
        let b = handle();
        registry.register(a.clone());
        registry.register(b.clone());

        let snapshot = registry.snapshot_members();
        registry.unregister(&a.id);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.snapshot_members().len(), 1);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(ConnectionRegistry::new(1000));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let h = handle();
                        registry.register(h.clone());
                        if h.id.as_u128() % 2 == 0 {
                            registry.unregister(&h.id);
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(registry.len() <= 400);
        assert_eq!(registry.snapshot_members().len(), registry.len());
    }
}
