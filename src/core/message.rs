// src/core/message.rs

//! The in-process message model that RPC envelopes are built from.

/// The four kinds of messages exchanged with clients and peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Notify,
    Response,
    Push,
}

/// A message as handled inside the process, before envelope encoding.
///
/// `id` is the client-assigned correlation id; it is meaningful only for
/// requests and is carried as zero otherwise.
#[derive(Debug, Clone)]
pub struct Message {
    pub kind: MessageKind,
    pub id: u64,
    pub route: String,
    pub data: Vec<u8>,
}

impl Message {
    pub fn request(id: u64, route: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Request,
            id,
            route: route.into(),
            data,
        }
    }

    pub fn notify(route: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Notify,
            id: 0,
            route: route.into(),
            data,
        }
    }
}
