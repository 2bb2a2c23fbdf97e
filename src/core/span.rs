// src/core/span.rs

//! A serializable handle to a distributed-tracing span, small enough to travel
//! inside the propagation context of every RPC.

use crate::core::errors::GarrisonError;
use serde::{Deserialize, Serialize};

/// The identity of a span as seen by a remote process.
///
/// Carries only what a child span needs to attach itself to the trace. The
/// span itself (timings, tags) lives in whatever tracing backend the process
/// uses; this handle is the part that crosses the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub trace_id: String,
    pub span_id: String,
    pub sampled: bool,
}

impl SpanContext {
    /// Starts a fresh trace with random identifiers.
    pub fn root() -> Self {
        Self {
            trace_id: hex::encode(rand::random::<[u8; 16]>()),
            span_id: hex::encode(rand::random::<[u8; 8]>()),
            sampled: true,
        }
    }

    /// Derives a child context: same trace, new span id.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: hex::encode(rand::random::<[u8; 8]>()),
            sampled: self.sampled,
        }
    }

    /// Serializes the context to the string form stored under the reserved
    /// `span` propagation key.
    pub fn encode(&self) -> Result<String, GarrisonError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Inverse of [`SpanContext::encode`].
    pub fn decode(raw: &str) -> Result<Self, GarrisonError> {
        Ok(serde_json::from_str(raw)?)
    }
}
