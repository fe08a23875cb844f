//! Connection registry.
//!
//! A lock-guarded map from [`ConnId`] to a lightweight [`ConnHandle`]. The
//! heavyweight per-connection state lives in the driver task that owns it;
//! the registry only tracks which connections exist so the server can
//! account for them and force them closed on shutdown.
//!
//! The mutex is held solely for the map operation, never across I/O, so a
//! slow connection cannot block unrelated ones.

use crate::conn::context::ConnId;
use crate::error::{constants, EngineError, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Shared view of a registered connection.
#[derive(Debug, Clone)]
pub struct ConnHandle {
    /// Peer address of the connection
    pub peer: SocketAddr,

    /// Signalled to make the owning driver task close the connection
    pub closer: Arc<Notify>,
}

impl ConnHandle {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            closer: Arc::new(Notify::new()),
        }
    }
}

/// Registry of live connections, keyed by [`ConnId`].
///
/// Iteration order is irrelevant; a connection is present exactly while its
/// socket is open and its driver task is running.
#[derive(Debug, Default)]
pub struct ConnRegistry {
    inner: Mutex<HashMap<ConnId, ConnHandle>>,
}

impl ConnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry for a newly accepted connection.
    ///
    /// A duplicate id indicates a bug in accept/registry coordination and is
    /// reported as [`EngineError::DuplicateDescriptor`].
    pub fn insert(&self, id: ConnId, handle: ConnHandle) -> Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| EngineError::Registry(constants::ERR_REGISTRY_LOCK.to_string()))?;

        if map.contains_key(&id) {
            return Err(EngineError::DuplicateDescriptor(id.value()));
        }
        map.insert(id, handle);
        Ok(())
    }

    /// Remove an entry; a no-op if the id is absent.
    pub fn remove(&self, id: ConnId) -> Result<Option<ConnHandle>> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| EngineError::Registry(constants::ERR_REGISTRY_LOCK.to_string()))?;
        Ok(map.remove(&id))
    }

    /// Look up the handle for a connection, if it is still registered.
    pub fn lookup(&self, id: ConnId) -> Result<Option<ConnHandle>> {
        let map = self
            .inner
            .lock()
            .map_err(|_| EngineError::Registry(constants::ERR_REGISTRY_LOCK.to_string()))?;
        Ok(map.get(&id).cloned())
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all current handles, for shutdown.
    pub fn handles(&self) -> Vec<(ConnId, ConnHandle)> {
        self.inner
            .lock()
            .map(|m| m.iter().map(|(id, h)| (*id, h.clone())).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn insert_lookup_remove() {
        let registry = ConnRegistry::new();
        let id = ConnId::next();

        registry.insert(id, ConnHandle::new(peer())).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(id).unwrap().is_some());

        let removed = registry.remove(id).unwrap();
        assert!(removed.is_some());
        assert!(registry.is_empty());
        assert!(registry.lookup(id).unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let registry = ConnRegistry::new();
        let id = ConnId::next();

        registry.insert(id, ConnHandle::new(peer())).unwrap();
        let err = registry.insert(id, ConnHandle::new(peer())).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateDescriptor(_)));

        // The original entry is untouched.
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let registry = ConnRegistry::new();
        assert!(registry.remove(ConnId::next()).unwrap().is_none());
        // Removing twice is equally a no-op.
        let id = ConnId::next();
        registry.insert(id, ConnHandle::new(peer())).unwrap();
        assert!(registry.remove(id).unwrap().is_some());
        assert!(registry.remove(id).unwrap().is_none());
    }

    #[test]
    fn handles_snapshot() {
        let registry = ConnRegistry::new();
        let a = ConnId::next();
        let b = ConnId::next();
        registry.insert(a, ConnHandle::new(peer())).unwrap();
        registry.insert(b, ConnHandle::new(peer())).unwrap();

        let mut ids: Vec<_> = registry.handles().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }
}
