// src/config.rs

//! Framework configuration: loading, defaults, and construction-time validation.

use crate::core::errors::GarrisonError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lease heartbeat settings. The TTL doubles as the lease lifetime granted in
/// the coordination store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeartbeatConfig {
    #[serde(with = "humantime_serde", default = "default_heartbeat_ttl")]
    pub ttl: Duration,
    /// Debug-log every successful lease renewal.
    #[serde(default)]
    pub log: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ttl: default_heartbeat_ttl(),
            log: false,
        }
    }
}

/// Cadence of the periodic full reconciliation against the store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SyncServersConfig {
    #[serde(with = "humantime_serde", default = "default_sync_interval")]
    pub interval: Duration,
}

impl Default for SyncServersConfig {
    fn default() -> Self {
        Self {
            interval: default_sync_interval(),
        }
    }
}

/// Connection settings for the etcd coordination store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EtcdConfig {
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(with = "humantime_serde", default = "default_dial_timeout")]
    pub dialtimeout: Duration,
    /// Key prefix isolating this cluster inside a shared store.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub syncservers: SyncServersConfig,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            dialtimeout: default_dial_timeout(),
            prefix: default_prefix(),
            heartbeat: HeartbeatConfig::default(),
            syncservers: SyncServersConfig::default(),
        }
    }
}

/// Service discovery configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SdConfig {
    #[serde(default)]
    pub etcd: EtcdConfig,
}

/// Connection settings for the NATS messaging bus.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NatsConfig {
    #[serde(default = "default_nats_connect")]
    pub connect: String,
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub requesttimeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            connect: default_nats_connect(),
            requesttimeout: default_request_timeout(),
        }
    }
}

/// RPC client configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RpcClientConfig {
    #[serde(default)]
    pub nats: NatsConfig,
}

/// RPC fabric configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RpcConfig {
    #[serde(default)]
    pub client: RpcClientConfig,
}

/// Everything cluster-related.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ClusterConfig {
    #[serde(default)]
    pub sd: SdConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

/// Top-level framework configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
}

impl Config {
    /// Loads configuration from a TOML file, with `GARRISON_`-prefixed
    /// environment variables layered on top.
    pub fn from_file(path: &str) -> Result<Self, GarrisonError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("GARRISON").separator("__"))
            .build()?;
        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects configurations the cluster core cannot start with.
    pub fn validate(&self) -> Result<(), GarrisonError> {
        let nats = &self.cluster.rpc.client.nats;
        if nats.connect.is_empty() {
            return Err(GarrisonError::MissingNatsConnectString);
        }
        if nats.requesttimeout.is_zero() {
            return Err(GarrisonError::MissingNatsRequestTimeout);
        }
        Ok(())
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_prefix() -> String {
    "garrison/".to_string()
}

fn default_heartbeat_ttl() -> Duration {
    Duration::from_secs(60)
}

fn default_sync_interval() -> Duration {
    Duration::from_secs(120)
}

fn default_nats_connect() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}
