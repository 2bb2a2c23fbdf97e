// src/node/mod.rs

//! The orchestrator: wires discovery and the RPC client together, owns the
//! node lifecycle, and routes outbound calls to a concrete target server.

use crate::config::Config;
use crate::core::cluster::{
    DiscoveryListener, EtcdServiceDiscovery, NatsRpcClient, ServerInfo, inbox_topic,
};
use crate::core::context::PropagateCtx;
use crate::core::errors::GarrisonError;
use crate::core::message::Message;
use crate::core::protocol::{Response, RpcType};
use crate::core::route::Route;
use crate::core::session::{Session, SessionRegistry, SysRemote};
use async_trait::async_trait;
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Lifecycle hooks for subsystems registered with a [`Node`].
///
/// `init` runs before the node is marked running, `after_init` just after;
/// shutdown mirrors that in reverse registration order.
#[async_trait]
pub trait Component: Send + Sync {
    async fn init(&self) -> Result<(), GarrisonError> {
        Ok(())
    }
    async fn after_init(&self) {}
    async fn before_shutdown(&self) {}
    async fn shutdown(&self) -> Result<(), GarrisonError> {
        Ok(())
    }
}

/// A cluster member: identity, membership view, RPC fabric, and (for
/// frontends) the session table.
pub struct Node {
    server: Arc<ServerInfo>,
    discovery: Arc<EtcdServiceDiscovery>,
    rpc_client: Arc<NatsRpcClient>,
    sessions: Arc<SessionRegistry>,
    sys_remote: SysRemote,
    components: RwLock<Vec<Arc<dyn Component>>>,
    running: AtomicBool,
}

impl Node {
    /// Validates the configuration and wires the subsystems. Nothing touches
    /// the network until [`Node::init`].
    pub fn new(config: &Config, server: ServerInfo) -> Result<Self, GarrisonError> {
        config.validate()?;
        let server = Arc::new(server);
        let discovery = Arc::new(EtcdServiceDiscovery::new(
            &config.cluster.sd.etcd,
            server.clone(),
        ));
        let rpc_client = Arc::new(NatsRpcClient::new(
            &config.cluster.rpc.client.nats,
            server.clone(),
        )?);
        let sessions = Arc::new(SessionRegistry::new());
        let sys_remote = SysRemote::new(sessions.clone());
        Ok(Self {
            server,
            discovery,
            rpc_client,
            sessions,
            sys_remote,
            components: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Registers a component whose lifecycle follows the node's.
    pub fn register_component(&self, component: Arc<dyn Component>) {
        self.components.write().push(component);
    }

    /// Joins the cluster: discovery first, then the RPC client, then
    /// registered components.
    pub async fn init(&self) -> Result<(), GarrisonError> {
        self.discovery.init().await?;
        self.rpc_client.init().await?;
        let components = self.components.read().clone();
        for component in &components {
            component.init().await?;
        }
        self.running.store(true, Ordering::SeqCst);
        for component in &components {
            component.after_init().await;
        }
        info!(
            id = %self.server.id,
            server_type = %self.server.server_type,
            frontend = self.server.frontend,
            "node is running"
        );
        Ok(())
    }

    /// Leaves the cluster in reverse dependency order. Idempotent.
    pub async fn shutdown(&self) -> Result<(), GarrisonError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let components = self.components.read().clone();
        for component in components.iter().rev() {
            component.before_shutdown().await;
        }
        for component in components.iter().rev() {
            component.shutdown().await?;
        }
        self.rpc_client.shutdown().await?;
        self.discovery.shutdown().await?;
        info!(id = %self.server.id, "node stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn server(&self) -> &Arc<ServerInfo> {
        &self.server
    }

    pub fn discovery(&self) -> &Arc<EtcdServiceDiscovery> {
        &self.discovery
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// The remote surface other nodes invoke to mutate sessions owned here.
    pub fn sys_remote(&self) -> &SysRemote {
        &self.sys_remote
    }

    pub fn server_by_id(&self, id: &str) -> Result<Arc<ServerInfo>, GarrisonError> {
        self.discovery.server_by_id(id)
    }

    pub fn servers_by_type(
        &self,
        server_type: &str,
    ) -> Result<HashMap<String, Arc<ServerInfo>>, GarrisonError> {
        self.discovery.servers_by_type(server_type)
    }

    pub fn add_listener(&self, listener: Arc<dyn DiscoveryListener>) {
        self.discovery.add_listener(listener);
    }

    /// Publishes raw bytes on a topic, fire-and-forget.
    pub async fn send(&self, topic: &str, data: Vec<u8>) -> Result<(), GarrisonError> {
        self.rpc_client.send(topic, data).await
    }

    /// Issues a request to a random server of the route's type and waits for
    /// the reply.
    pub async fn rpc(
        &self,
        ctx: &PropagateCtx,
        route_str: &str,
        data: Vec<u8>,
    ) -> Result<Response, GarrisonError> {
        let route = Route::parse(route_str)?;
        let target = self.resolve_target(&route)?;
        let ctx = ctx.inject_span();
        let msg = Message::request(0, route_str, data);
        self.rpc_client
            .call(&ctx, RpcType::User, &route, None, &msg, &target)
            .await
    }

    /// Issues a request to one specific server, identified by id. The target
    /// may share this node's type; only untargeted calls refuse that.
    pub async fn rpc_to(
        &self,
        ctx: &PropagateCtx,
        server_id: &str,
        route_str: &str,
        data: Vec<u8>,
    ) -> Result<Response, GarrisonError> {
        let route = Route::parse(route_str)?;
        let target = self.discovery.server_by_id(server_id)?;
        let ctx = ctx.inject_span();
        let msg = Message::request(0, route_str, data);
        self.rpc_client
            .call(&ctx, RpcType::User, &route, None, &msg, &target)
            .await
    }

    /// Fire-and-forget notify to a random server of the route's type.
    pub async fn notify(
        &self,
        ctx: &PropagateCtx,
        route_str: &str,
        data: Vec<u8>,
    ) -> Result<(), GarrisonError> {
        let route = Route::parse(route_str)?;
        let target = self.resolve_target(&route)?;
        self.notify_server(ctx, &route, data, &target).await
    }

    /// Fire-and-forget notify to one specific server.
    pub async fn notify_to(
        &self,
        ctx: &PropagateCtx,
        server_id: &str,
        route_str: &str,
        data: Vec<u8>,
    ) -> Result<(), GarrisonError> {
        let route = Route::parse(route_str)?;
        let target = self.discovery.server_by_id(server_id)?;
        self.notify_server(ctx, &route, data, &target).await
    }

    /// Asks the frontend owning the session to bind it to its uid.
    pub async fn bind_session_in_frontend(
        &self,
        ctx: &PropagateCtx,
        session: &Session,
    ) -> Result<(), GarrisonError> {
        self.session_rpc_to_owner(ctx, session, "bindsession").await
    }

    /// Pushes the session's data map to the frontend that owns it.
    pub async fn push_session_to_frontend(
        &self,
        ctx: &PropagateCtx,
        session: &Session,
    ) -> Result<(), GarrisonError> {
        self.session_rpc_to_owner(ctx, session, "pushsession").await
    }

    async fn session_rpc_to_owner(
        &self,
        ctx: &PropagateCtx,
        session: &Session,
        method: &str,
    ) -> Result<(), GarrisonError> {
        let owner = self.discovery.server_by_id(session.frontend_id())?;
        let route = Route::new(owner.server_type.clone(), "sys", method);
        let data = serde_json::to_vec(&session.snapshot())?;
        let ctx = ctx.inject_span();
        let msg = Message::request(0, route.to_string(), data);
        self.rpc_client
            .call(&ctx, RpcType::User, &route, None, &msg, &owner)
            .await?;
        Ok(())
    }

    async fn notify_server(
        &self,
        ctx: &PropagateCtx,
        route: &Route,
        data: Vec<u8>,
        target: &ServerInfo,
    ) -> Result<(), GarrisonError> {
        let ctx = ctx.inject_span();
        let msg = Message::notify(route.to_string(), data);
        let request = self
            .rpc_client
            .build_request(&ctx, RpcType::User, route, None, &msg)?;
        let topic = inbox_topic(&target.server_type, &target.id);
        self.rpc_client.send(&topic, request.encode_bytes()).await
    }

    /// Picks a server of the route's type, uniformly at random. Routes that
    /// resolve to this node's own type are refused: dispatching them over the
    /// bus would silently bypass the in-process handler path.
    fn resolve_target(&self, route: &Route) -> Result<Arc<ServerInfo>, GarrisonError> {
        if route.server_type.is_empty() {
            return Err(GarrisonError::InvalidRoute(route.to_string()));
        }
        if route.server_type == self.server.server_type {
            return Err(GarrisonError::LocalRpcForbidden);
        }
        let servers = self.discovery.servers_by_type(&route.server_type)?;
        let target = servers
            .values()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| GarrisonError::NoServersOfType(route.server_type.clone()))?;
        Ok(target)
    }
}
