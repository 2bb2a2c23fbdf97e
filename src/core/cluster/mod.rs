// src/core/cluster/mod.rs

//! Cluster membership and the RPC fabric between nodes.

use crate::core::errors::GarrisonError;
use std::sync::Arc;

pub mod discovery;
pub mod registry;
pub mod rpc_client;
pub mod server;

pub use discovery::EtcdServiceDiscovery;
pub use registry::ServerRegistry;
pub use rpc_client::NatsRpcClient;
pub use server::ServerInfo;

/// The change a discovery listener is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
}

/// Observer of cluster membership changes.
///
/// Listeners are invoked serially, in registration order, on the discovery
/// writer task. They must not block; anything slow hands off to its own task.
pub trait DiscoveryListener: Send + Sync {
    fn add_server(&self, server: &Arc<ServerInfo>);
    fn remove_server(&self, server: &Arc<ServerInfo>);
}

/// The coordination-store key for a server, relative to the cluster prefix.
pub fn server_key(server_type: &str, server_id: &str) -> String {
    format!("servers/{server_type}/{server_id}")
}

/// Inverse of [`server_key`]. A key parses iff it has exactly the
/// `servers/<type>/<id>` shape; ids containing `/` cannot be represented.
pub fn parse_server_key(key: &str) -> Result<(String, String), GarrisonError> {
    match key.split('/').collect::<Vec<_>>().as_slice() {
        ["servers", server_type, server_id] if !server_type.is_empty() && !server_id.is_empty() => {
            Ok((server_type.to_string(), server_id.to_string()))
        }
        _ => Err(GarrisonError::InvalidDiscoveryKey(key.to_string())),
    }
}

/// The messaging-bus subject on which a node receives RPCs.
pub fn inbox_topic(server_type: &str, server_id: &str) -> String {
    format!("pitaya/servers/{server_type}/{server_id}")
}
