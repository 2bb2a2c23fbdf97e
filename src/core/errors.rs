// src/core/errors.rs

//! Defines the primary error type for the entire framework, plus the wire-level
//! error bubble exchanged between cluster nodes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Error code assigned to failures that carry no classification of their own.
pub const UNKNOWN_ERROR_CODE: &str = "PIT-000";
/// Error code for a route that resolved to no registered handler.
pub const ROUTE_NOT_FOUND_CODE: &str = "PIT-404";
/// Error code for a failure signalled by the remote side of an RPC.
pub const REMOTE_ERROR_CODE: &str = "PIT-433";
/// Error code for an error raised inside a remote handler.
pub const HANDLER_ERROR_CODE: &str = "PIT-555";

/// A structured error as it travels inside a response envelope.
///
/// Remote failures are reconstituted on the caller side with the original
/// `code`, `msg` and `metadata` intact, so callers can branch on the code
/// without string matching.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("[{code}] {msg}")]
pub struct RemoteError {
    pub code: String,
    pub msg: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            msg: msg.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The main error enum, representing all possible failures within the framework.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum GarrisonError {
    // --- Configuration errors, fatal at construction ---
    #[error("no nats connection string provided")]
    MissingNatsConnectString,

    #[error("nats request timeout must be greater than zero")]
    MissingNatsRequestTimeout,

    #[error("configuration error: {0}")]
    Config(String),

    // --- Transient infrastructure errors ---
    #[error("service discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("messaging bus error: {0}")]
    Nats(String),

    // --- Logical errors, surfaced to the caller ---
    #[error("no server with id {0}")]
    NoServerWithId(String),

    #[error("no servers available of type {0}")]
    NoServersOfType(String),

    #[error("client is not initialized")]
    NotInitialized,

    #[error(
        "you are making a rpc that may be processed locally, either specify a different server type or specify a server id"
    )]
    LocalRpcForbidden,

    #[error("session not found")]
    SessionNotFound,

    #[error("session is already bound to an uid")]
    SessionAlreadyBound,

    #[error("there are no spans attached to this context")]
    NoSpanInContext,

    // --- Protocol errors ---
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("invalid discovery key: {0}")]
    InvalidDiscoveryKey(String),

    #[error("unsupported propagation value: {0}")]
    UnsupportedPropagationValue(String),

    #[error("envelope decode error: {0}")]
    Envelope(#[from] prost::DecodeError),

    #[error("serialization error: {0}")]
    Serialization(String),

    // --- Timeouts ---
    #[error("rpc request timed out")]
    RpcTimeout,

    /// A failure reported by the remote side of a call, reconstituted verbatim.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl GarrisonError {
    /// Converts this error into the wire-level bubble embedded in a response
    /// envelope. Errors without a dedicated code fall back to `PIT-000`.
    pub fn to_remote(&self) -> RemoteError {
        match self {
            GarrisonError::Remote(remote) => remote.clone(),
            other => RemoteError::new(UNKNOWN_ERROR_CODE, other.to_string()),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<serde_json::Error> for GarrisonError {
    fn from(e: serde_json::Error) -> Self {
        GarrisonError::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for GarrisonError {
    fn from(e: config::ConfigError) -> Self {
        GarrisonError::Config(e.to_string())
    }
}
