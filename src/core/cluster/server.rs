// src/core/cluster/server.rs

//! The descriptor a node publishes about itself: identity plus metadata,
//! immutable for the lifetime of one registration epoch.

use crate::core::errors::GarrisonError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity and metadata of a cluster member.
///
/// The JSON codec tolerates unknown fields, so newer nodes can publish
/// additional keys without breaking older readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub server_type: String,
    /// True iff the node accepts external client connections and owns sessions.
    #[serde(default)]
    pub frontend: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub hostname: String,
}

impl ServerInfo {
    pub fn new(
        id: impl Into<String>,
        server_type: impl Into<String>,
        frontend: bool,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            server_type: server_type.into(),
            frontend,
            metadata,
            hostname: hostname_or_empty(),
        }
    }

    /// Builds a descriptor with a freshly generated unique id.
    pub fn with_random_id(
        server_type: impl Into<String>,
        frontend: bool,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), server_type, frontend, metadata)
    }

    /// The canonical JSON form stored in the coordination store.
    pub fn as_json(&self) -> Result<String, GarrisonError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, GarrisonError> {
        Ok(serde_json::from_slice(raw)?)
    }
}

fn hostname_or_empty() -> String {
    std::env::var("HOSTNAME").unwrap_or_default()
}
