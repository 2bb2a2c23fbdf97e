// src/core/context.rs

//! The propagation context: a side-channel key/value map forwarded with every
//! outbound RPC, including distributed-tracing span handles.
//!
//! Contexts are immutable snapshots. Every "mutation" returns a new context,
//! so the map captured at envelope-build time can never race with concurrent
//! handlers still holding the parent.

use crate::core::errors::GarrisonError;
use crate::core::span::SpanContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Reserved propagation key holding the encoded tracing span handle.
pub const SPAN_PROPAGATE_KEY: &str = "span";
/// Reserved propagation key holding the id of the peer that forwarded a request.
pub const PEER_ID_KEY: &str = "peer.id";
/// Reserved propagation key holding the route of the request being served.
pub const ROUTE_KEY: &str = "route";

/// A value that may travel inside the propagation map.
///
/// The set is closed: anything outside this union fails conversion with
/// [`GarrisonError::UnsupportedPropagationValue`], deterministically, instead
/// of producing a blob the other side cannot interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropagationValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Map(HashMap<String, PropagationValue>),
}

impl PropagationValue {
    /// Returns the string payload, if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropagationValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropagationValue {
    fn from(v: &str) -> Self {
        PropagationValue::Str(v.to_string())
    }
}

impl From<String> for PropagationValue {
    fn from(v: String) -> Self {
        PropagationValue::Str(v)
    }
}

impl From<i64> for PropagationValue {
    fn from(v: i64) -> Self {
        PropagationValue::Int(v)
    }
}

impl From<f64> for PropagationValue {
    fn from(v: f64) -> Self {
        PropagationValue::Float(v)
    }
}

impl From<bool> for PropagationValue {
    fn from(v: bool) -> Self {
        PropagationValue::Bool(v)
    }
}

impl TryFrom<serde_json::Value> for PropagationValue {
    type Error = GarrisonError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => Ok(PropagationValue::Str(s)),
            serde_json::Value::Bool(b) => Ok(PropagationValue::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(PropagationValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(PropagationValue::Float(f))
                } else {
                    Err(GarrisonError::UnsupportedPropagationValue(n.to_string()))
                }
            }
            serde_json::Value::Object(map) => {
                let mut out = HashMap::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k, PropagationValue::try_from(v)?);
                }
                Ok(PropagationValue::Map(out))
            }
            other => Err(GarrisonError::UnsupportedPropagationValue(format!(
                "{other:?}"
            ))),
        }
    }
}

/// An immutable snapshot of propagated key/value state, optionally carrying a
/// live span handle that has not yet been serialized into the map.
#[derive(Debug, Clone, Default)]
pub struct PropagateCtx {
    values: Arc<HashMap<String, PropagationValue>>,
    span: Option<SpanContext>,
}

impl PropagateCtx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new context whose propagation map equals this one plus
    /// `{key: value}`. A previous value for the key is replaced.
    pub fn add(&self, key: impl Into<String>, value: impl Into<PropagationValue>) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.into(), value.into());
        Self {
            values: Arc::new(values),
            span: self.span.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropagationValue> {
        self.values.get(key)
    }

    /// Returns a snapshot of the propagation map. Mutating the snapshot does
    /// not affect this context.
    pub fn to_map(&self) -> HashMap<String, PropagationValue> {
        (*self.values).clone()
    }

    /// Constructs a fresh context holding only the given propagation map.
    pub fn from_map(values: HashMap<String, PropagationValue>) -> Self {
        Self {
            values: Arc::new(values),
            span: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serializes the propagation map with a self-describing binary codec.
    /// An empty map encodes to empty bytes.
    pub fn encode(&self) -> Result<Vec<u8>, GarrisonError> {
        if self.values.is_empty() {
            return Ok(Vec::new());
        }
        rmp_serde::to_vec_named(&*self.values)
            .map_err(|e| GarrisonError::UnsupportedPropagationValue(e.to_string()))
    }

    /// Inverse of [`PropagateCtx::encode`]. Empty bytes decode to an empty
    /// context; anything the codec cannot interpret is rejected.
    pub fn decode(raw: &[u8]) -> Result<Self, GarrisonError> {
        if raw.is_empty() {
            return Ok(Self::new());
        }
        let values: HashMap<String, PropagationValue> = rmp_serde::from_slice(raw)
            .map_err(|e| GarrisonError::UnsupportedPropagationValue(e.to_string()))?;
        Ok(Self::from_map(values))
    }

    /// Attaches a live span handle to the context.
    pub fn with_span(&self, span: SpanContext) -> Self {
        Self {
            values: self.values.clone(),
            span: Some(span),
        }
    }

    /// Serializes the attached span handle under the reserved `span` key so it
    /// survives the hop to the next process. No-op if no span is attached.
    pub fn inject_span(&self) -> Self {
        match &self.span {
            Some(span) => match span.encode() {
                Ok(encoded) => self.add(SPAN_PROPAGATE_KEY, encoded),
                Err(e) => {
                    tracing::warn!("failed to encode span context for propagation: {e}");
                    self.clone()
                }
            },
            None => self.clone(),
        }
    }

    /// Returns the live span handle if one is attached, otherwise
    /// reconstitutes one from the `span` propagation entry.
    pub fn span_context(&self) -> Result<SpanContext, GarrisonError> {
        if let Some(span) = &self.span {
            return Ok(span.clone());
        }
        match self.values.get(SPAN_PROPAGATE_KEY) {
            Some(PropagationValue::Str(encoded)) => SpanContext::decode(encoded),
            Some(other) => Err(GarrisonError::UnsupportedPropagationValue(format!(
                "span entry holds {other:?}"
            ))),
            None => Err(GarrisonError::NoSpanInContext),
        }
    }
}
