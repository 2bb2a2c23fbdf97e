// src/core/cluster/rpc_client.rs

//! The outbound half of the RPC fabric: envelope construction and publishing
//! over NATS, with request/reply handled on transport-managed reply inboxes.

use crate::config::NatsConfig;
use crate::core::cluster::inbox_topic;
use crate::core::cluster::server::ServerInfo;
use crate::core::context::PropagateCtx;
use crate::core::errors::{GarrisonError, RemoteError};
use crate::core::message::{Message, MessageKind};
use crate::core::protocol::{Msg, MsgKind, Request, Response, RpcType, SessionBlock};
use crate::core::route::Route;
use crate::core::session::Session;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time;
use tracing::debug;

/// RPC client publishing envelopes on per-target NATS inboxes.
pub struct NatsRpcClient {
    connect_string: String,
    request_timeout: Duration,
    server: Arc<ServerInfo>,
    conn: OnceCell<async_nats::Client>,
    running: AtomicBool,
}

impl NatsRpcClient {
    /// Validates the messaging-bus configuration and builds the client.
    pub fn new(config: &NatsConfig, server: Arc<ServerInfo>) -> Result<Self, GarrisonError> {
        if config.connect.is_empty() {
            return Err(GarrisonError::MissingNatsConnectString);
        }
        if config.requesttimeout.is_zero() {
            return Err(GarrisonError::MissingNatsRequestTimeout);
        }
        Ok(Self {
            connect_string: config.connect.clone(),
            request_timeout: config.requesttimeout,
            server,
            conn: OnceCell::new(),
            running: AtomicBool::new(false),
        })
    }

    pub async fn init(&self) -> Result<(), GarrisonError> {
        let conn = async_nats::connect(self.connect_string.as_str())
            .await
            .map_err(|e| GarrisonError::Nats(e.to_string()))?;
        let _ = self.conn.set(conn);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), GarrisonError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Publishes raw bytes on a topic, fire-and-forget.
    pub async fn send(&self, topic: &str, data: Vec<u8>) -> Result<(), GarrisonError> {
        if !self.is_running() {
            return Err(GarrisonError::NotInitialized);
        }
        let conn = self.conn.get().ok_or(GarrisonError::NotInitialized)?;
        conn.publish(topic.to_string(), data.into())
            .await
            .map_err(|e| GarrisonError::Nats(e.to_string()))
    }

    /// Builds the request envelope for an outbound call or notify.
    ///
    /// `Sys` requests carry the session block and the message id; `User`
    /// requests carry neither. The frontend id is stamped iff this node is a
    /// frontend.
    pub fn build_request(
        &self,
        ctx: &PropagateCtx,
        rpc_type: RpcType,
        route: &Route,
        session: Option<&Session>,
        msg: &Message,
    ) -> Result<Request, GarrisonError> {
        let (msg_id, session_block) = match rpc_type {
            RpcType::Sys => {
                let session = session.ok_or(GarrisonError::SessionNotFound)?;
                let msg_id = if msg.kind == MessageKind::Request {
                    msg.id
                } else {
                    0
                };
                let block = SessionBlock {
                    id: session.id(),
                    uid: session.uid(),
                    data: session.data_encoded()?,
                };
                (msg_id, Some(block))
            }
            RpcType::User => (0, None),
        };

        Ok(Request {
            rpc_type: rpc_type as i32,
            msg: Some(Msg {
                id: msg_id,
                route: route.to_string(),
                data: msg.data.clone(),
                reply: String::new(),
                kind: MsgKind::from(msg.kind) as i32,
            }),
            frontend_id: if self.server.frontend {
                self.server.id.clone()
            } else {
                String::new()
            },
            session: session_block,
            metadata: ctx.encode()?,
        })
    }

    /// Publishes a request on the target's inbox and waits for the reply, up
    /// to the configured request timeout. A remote-reported error is
    /// reconstituted as a typed [`RemoteError`].
    pub async fn call(
        &self,
        ctx: &PropagateCtx,
        rpc_type: RpcType,
        route: &Route,
        session: Option<&Session>,
        msg: &Message,
        target: &ServerInfo,
    ) -> Result<Response, GarrisonError> {
        if !self.is_running() {
            return Err(GarrisonError::NotInitialized);
        }
        let conn = self.conn.get().ok_or(GarrisonError::NotInitialized)?;

        let request = self.build_request(ctx, rpc_type, route, session, msg)?;
        let topic = inbox_topic(&target.server_type, &target.id);
        debug!(%route, %topic, "issuing rpc");

        let reply = match time::timeout(
            self.request_timeout,
            conn.request(topic, request.encode_bytes().into()),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(GarrisonError::Nats(e.to_string())),
            Err(_) => return Err(GarrisonError::RpcTimeout),
        };

        let response = Response::decode_bytes(&reply.payload)?;
        if let Some(error) = &response.error {
            return Err(RemoteError {
                code: error.code.clone(),
                msg: error.msg.clone(),
                metadata: error.metadata.clone(),
            }
            .into());
        }
        Ok(response)
    }
}
