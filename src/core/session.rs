// src/core/session.rs

//! Sessions owned by a frontend, the registry indexing them, and the remote
//! operations by which other nodes mutate them.

use crate::core::errors::GarrisonError;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

/// The payload pushed over the wire when a remote node reads or mutates a
/// session: identity plus a full copy of the data map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: i64,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

/// Per-client state owned by exactly one frontend.
///
/// `uid` is empty until the session is bound; the data map is opaque to the
/// framework and round-trips as JSON.
#[derive(Debug)]
pub struct Session {
    id: i64,
    frontend_id: String,
    uid: RwLock<String>,
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl Session {
    pub fn new(id: i64, frontend_id: impl Into<String>) -> Self {
        Self {
            id,
            frontend_id: frontend_id.into(),
            uid: RwLock::new(String::new()),
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// The id of the frontend that owns this session's connection.
    pub fn frontend_id(&self) -> &str {
        &self.frontend_id
    }

    pub fn uid(&self) -> String {
        self.uid.read().clone()
    }

    pub fn is_bound(&self) -> bool {
        !self.uid.read().is_empty()
    }

    pub fn data(&self) -> HashMap<String, serde_json::Value> {
        self.data.read().clone()
    }

    /// Replaces the whole data map.
    pub fn set_data(&self, data: HashMap<String, serde_json::Value>) {
        *self.data.write() = data;
    }

    /// Merges the given entries into the data map, overwriting on key clash.
    pub fn merge_data(&self, data: HashMap<String, serde_json::Value>) {
        self.data.write().extend(data);
    }

    /// The JSON encoding of the data map, as embedded in `Sys` envelopes.
    pub fn data_encoded(&self) -> Result<Vec<u8>, GarrisonError> {
        Ok(serde_json::to_vec(&*self.data.read())?)
    }

    /// Captures the transport-time value of this session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            uid: self.uid(),
            data: self.data(),
        }
    }

    fn set_uid(&self, uid: &str) {
        *self.uid.write() = uid.to_string();
    }
}

/// The frontend's table of live sessions, indexed by id and, once bound, by uid.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: AtomicI64,
    by_id: DashMap<i64, Arc<Session>>,
    by_uid: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a session with a fresh id and registers it.
    pub fn open_session(&self, frontend_id: &str) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(Session::new(id, frontend_id));
        self.by_id.insert(id, session.clone());
        session
    }

    pub fn session_by_id(&self, id: i64) -> Option<Arc<Session>> {
        self.by_id.get(&id).map(|s| s.clone())
    }

    pub fn session_by_uid(&self, uid: &str) -> Option<Arc<Session>> {
        self.by_uid.get(uid).map(|s| s.clone())
    }

    /// Binds a session to a uid and registers the uid index entry.
    pub fn bind(&self, session: &Arc<Session>, uid: &str) -> Result<(), GarrisonError> {
        if session.is_bound() {
            return Err(GarrisonError::SessionAlreadyBound);
        }
        session.set_uid(uid);
        self.by_uid.insert(uid.to_string(), session.clone());
        Ok(())
    }

    /// Drops a session from both indices, e.g. when its connection closes.
    pub fn close_session(&self, id: i64) {
        if let Some((_, session)) = self.by_id.remove(&id) {
            let uid = session.uid();
            if !uid.is_empty() {
                self.by_uid.remove(&uid);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// The system operations a frontend exposes over the RPC fabric so that any
/// node may mutate session state it does not own.
#[derive(Debug, Clone)]
pub struct SysRemote {
    sessions: Arc<SessionRegistry>,
}

impl SysRemote {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    /// Binds the session named by the snapshot to the snapshot's uid.
    ///
    /// Re-binding an already-bound session (same uid included) reports
    /// `SessionAlreadyBound`; callers re-issuing a bind must treat that as a
    /// no-op.
    pub fn bind_session(&self, snapshot: &SessionSnapshot) -> Result<Bytes, GarrisonError> {
        let session = self
            .sessions
            .session_by_id(snapshot.id)
            .ok_or(GarrisonError::SessionNotFound)?;
        self.sessions.bind(&session, &snapshot.uid)?;
        session.merge_data(snapshot.data.clone());
        debug!(session = snapshot.id, uid = %snapshot.uid, "session bound remotely");
        Ok(Bytes::from_static(b"ack"))
    }

    /// Overwrites the session's data map with the snapshot's. The uid is never
    /// touched by a push.
    pub fn push_session(&self, snapshot: &SessionSnapshot) -> Result<Bytes, GarrisonError> {
        let session = self
            .sessions
            .session_by_id(snapshot.id)
            .ok_or(GarrisonError::SessionNotFound)?;
        session.set_data(snapshot.data.clone());
        debug!(session = snapshot.id, "session data pushed remotely");
        Ok(Bytes::from_static(b"ack"))
    }
}
