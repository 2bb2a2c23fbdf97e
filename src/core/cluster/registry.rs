// src/core/cluster/registry.rs

//! The in-memory view of live peers: a primary index by id and a secondary
//! index by server type, kept in lockstep behind a single lock.

use crate::core::cluster::server::ServerInfo;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct RegistryInner {
    by_id: HashMap<String, Arc<ServerInfo>>,
    by_type: HashMap<String, HashMap<String, Arc<ServerInfo>>>,
}

/// Both indices live under one `RwLock`, so a reader can never observe a
/// descriptor present in one index and absent from the other. Readers don't
/// block each other; writers serialize among themselves.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    inner: RwLock<RegistryInner>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts a descriptor into both indices. Returns false if a server with
    /// the same id is already present, in which case nothing changes.
    pub fn insert(&self, server: Arc<ServerInfo>) -> bool {
        let mut inner = self.inner.write();
        if inner.by_id.contains_key(&server.id) {
            return false;
        }
        inner.by_id.insert(server.id.clone(), server.clone());
        inner
            .by_type
            .entry(server.server_type.clone())
            .or_default()
            .insert(server.id.clone(), server);
        true
    }

    /// Removes a descriptor from both indices (secondary first), returning it
    /// if it was present.
    pub fn remove(&self, id: &str) -> Option<Arc<ServerInfo>> {
        let mut inner = self.inner.write();
        let server = inner.by_id.get(id)?.clone();
        if let Some(of_type) = inner.by_type.get_mut(&server.server_type) {
            of_type.remove(id);
            if of_type.is_empty() {
                inner.by_type.remove(&server.server_type);
            }
        }
        inner.by_id.remove(id);
        Some(server)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ServerInfo>> {
        self.inner.read().by_id.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().by_id.contains_key(id)
    }

    /// A snapshot of every server of the given type, keyed by id. Empty map if
    /// none are known.
    pub fn get_by_type(&self, server_type: &str) -> HashMap<String, Arc<ServerInfo>> {
        self.inner
            .read()
            .by_type
            .get(server_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.read().by_id.keys().cloned().collect()
    }

    /// A snapshot of the primary index.
    pub fn all(&self) -> HashMap<String, Arc<ServerInfo>> {
        self.inner.read().by_id.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_id.is_empty()
    }
}
