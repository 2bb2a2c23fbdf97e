// src/core/protocol.rs

//! Wire format of the RPC fabric.
//!
//! Envelopes are length-delimited, field-tagged protobuf messages, so additive
//! schema evolution is safe: unknown tags are skipped on decode. The structs
//! are hand-tagged rather than generated, keeping the schema in one place.

use crate::core::errors::{GarrisonError, UNKNOWN_ERROR_CODE};
use crate::core::message::MessageKind;
use prost::Message as ProstMessage;
use std::collections::HashMap;

/// Whether a request travels on behalf of a client session (`Sys`) or between
/// services (`User`). Only `Sys` requests carry session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum RpcType {
    Sys = 0,
    User = 1,
}

/// Wire-level message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum MsgKind {
    MsgRequest = 0,
    MsgNotify = 1,
    MsgResponse = 2,
    MsgPush = 3,
}

impl From<MessageKind> for MsgKind {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Request => MsgKind::MsgRequest,
            MessageKind::Notify => MsgKind::MsgNotify,
            MessageKind::Response => MsgKind::MsgResponse,
            MessageKind::Push => MsgKind::MsgPush,
        }
    }
}

/// The routed payload inside a request envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Msg {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(string, tag = "2")]
    pub route: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
    #[prost(string, tag = "4")]
    pub reply: String,
    #[prost(enumeration = "MsgKind", tag = "5")]
    pub kind: i32,
}

/// A transport-time snapshot of session identity, present only on `Sys`
/// requests. Authoritative session state stays with the owning frontend.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SessionBlock {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub uid: String,
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,
}

/// An outbound request envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Request {
    #[prost(enumeration = "RpcType", tag = "1")]
    pub rpc_type: i32,
    #[prost(message, optional, tag = "2")]
    pub msg: Option<Msg>,
    #[prost(string, tag = "3")]
    pub frontend_id: String,
    #[prost(message, optional, tag = "4")]
    pub session: Option<SessionBlock>,
    #[prost(bytes = "vec", tag = "5")]
    pub metadata: Vec<u8>,
}

/// The error block of a response envelope.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Error {
    #[prost(string, tag = "1")]
    pub code: String,
    #[prost(string, tag = "2")]
    pub msg: String,
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,
}

/// A response envelope. A missing `error` means success.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Response {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub error: Option<Error>,
}

impl Request {
    pub fn encode_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn decode_bytes(raw: &[u8]) -> Result<Self, GarrisonError> {
        Ok(Self::decode(raw)?)
    }
}

impl Response {
    pub fn encode_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decodes a response envelope, stamping `PIT-000` on any error block that
    /// arrived without a code.
    pub fn decode_bytes(raw: &[u8]) -> Result<Self, GarrisonError> {
        let mut res = Self::decode(raw)?;
        if let Some(error) = res.error.as_mut()
            && error.code.is_empty()
        {
            error.code = UNKNOWN_ERROR_CODE.to_string();
        }
        Ok(res)
    }
}
