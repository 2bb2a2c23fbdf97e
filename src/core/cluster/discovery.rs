// src/core/cluster/discovery.rs

//! Lease-based cluster membership on top of etcd.
//!
//! At init the node writes its own descriptor under a lease and starts three
//! background workers: a keep-alive driver for the lease, a watch reader for
//! peer changes, and a periodic full sync that repairs watch gaps. Losing the
//! lease triggers re-bootstrap, never process exit.

use crate::config::EtcdConfig;
use crate::core::cluster::registry::ServerRegistry;
use crate::core::cluster::server::ServerInfo;
use crate::core::cluster::{Action, DiscoveryListener, parse_server_key, server_key};
use crate::core::errors::GarrisonError;
use etcd_client::{
    Client, ConnectOptions, EventType, GetOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions,
    WatchOptions,
};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Backoff between re-bootstrap attempts after the lease is lost.
const REBOOTSTRAP_BACKOFF: Duration = Duration::from_secs(5);
/// How long shutdown waits for the best-effort lease revoke.
const REVOKE_GRACE: Duration = Duration::from_secs(3);

/// Cluster membership backed by an etcd prefix.
pub struct EtcdServiceDiscovery {
    endpoints: Vec<String>,
    dial_timeout: Duration,
    prefix: String,
    heartbeat_ttl: Duration,
    log_heartbeat: bool,
    sync_interval: Duration,
    server: Arc<ServerInfo>,
    registry: ServerRegistry,
    listeners: RwLock<Vec<Arc<dyn DiscoveryListener>>>,
    client: OnceCell<Client>,
    lease_id: AtomicI64,
    running: AtomicBool,
    sync_in_flight: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl EtcdServiceDiscovery {
    pub fn new(config: &EtcdConfig, server: Arc<ServerInfo>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            endpoints: config.endpoints.clone(),
            dial_timeout: config.dialtimeout,
            prefix: config.prefix.clone(),
            heartbeat_ttl: config.heartbeat.ttl,
            log_heartbeat: config.heartbeat.log,
            sync_interval: config.syncservers.interval,
            server,
            registry: ServerRegistry::new(),
            listeners: RwLock::new(Vec::new()),
            client: OnceCell::new(),
            lease_id: AtomicI64::new(0),
            running: AtomicBool::new(false),
            sync_in_flight: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// The descriptor this node registered about itself.
    pub fn local_server(&self) -> &Arc<ServerInfo> {
        &self.server
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Appends a membership listener. Listeners are invoked serially, in
    /// insertion order, from the task that applied the change.
    pub fn add_listener(&self, listener: Arc<dyn DiscoveryListener>) {
        self.listeners.write().push(listener);
    }

    /// Registers this node in the cluster and starts the background workers.
    pub async fn init(self: &Arc<Self>) -> Result<(), GarrisonError> {
        self.running.store(true, Ordering::SeqCst);

        let options = ConnectOptions::new().with_connect_timeout(self.dial_timeout);
        let client = Client::connect(&self.endpoints, Some(options))
            .await
            .map_err(|e| GarrisonError::DiscoveryUnavailable(e.to_string()))?;
        let _ = self.client.set(client);

        self.bootstrap().await?;

        // Periodic full sync repairs anything the watch missed.
        let sd = self.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(sd.sync_interval);
            let mut shutdown_rx = sd.shutdown_tx.subscribe();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => return,
                    _ = tick.tick() => {
                        if let Err(e) = sd.sync_servers().await {
                            error!("error resyncing servers: {e}");
                        }
                    }
                }
            }
        });

        let sd = self.clone();
        tokio::spawn(async move { sd.run_watch().await });

        Ok(())
    }

    /// Revokes the lease (best effort) and stops the background workers.
    /// Idempotent.
    pub async fn shutdown(&self) -> Result<(), GarrisonError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(());

        let lease_id = self.lease_id.load(Ordering::SeqCst);
        if lease_id != 0
            && let Some(client) = self.client.get()
        {
            let mut client = client.clone();
            match time::timeout(REVOKE_GRACE, client.lease_revoke(lease_id)).await {
                Ok(Ok(_)) => debug!("lease {lease_id:x} revoked"),
                Ok(Err(e)) => warn!("failed to revoke lease on shutdown: {e}"),
                Err(_) => warn!("timed out revoking lease on shutdown"),
            }
        }
        Ok(())
    }

    /// Returns the descriptor of a known peer, or `NoServerWithId`.
    pub fn server_by_id(&self, id: &str) -> Result<Arc<ServerInfo>, GarrisonError> {
        self.registry
            .get(id)
            .ok_or_else(|| GarrisonError::NoServerWithId(id.to_string()))
    }

    /// Returns all known servers of a type, or `NoServersOfType` if none.
    pub fn servers_by_type(
        &self,
        server_type: &str,
    ) -> Result<std::collections::HashMap<String, Arc<ServerInfo>>, GarrisonError> {
        let servers = self.registry.get_by_type(server_type);
        if servers.is_empty() {
            return Err(GarrisonError::NoServersOfType(server_type.to_string()));
        }
        Ok(servers)
    }

    /// Forces a full reconciliation against the store: fetch descriptors this
    /// node is missing, drop local entries whose keys are gone. Skips the pass
    /// entirely if a previous one is still running.
    pub async fn sync_servers(&self) -> Result<(), GarrisonError> {
        if self.sync_in_flight.swap(true, Ordering::SeqCst) {
            debug!("previous sync still running, skipping tick");
            return Ok(());
        }
        let result = self.sync_servers_inner().await;
        self.sync_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn sync_servers_inner(&self) -> Result<(), GarrisonError> {
        let mut client = self.client()?.clone();
        let keys = client
            .get(
                self.prefixed("servers/"),
                Some(GetOptions::new().with_prefix().with_keys_only()),
            )
            .await?;

        let mut live_ids = Vec::with_capacity(keys.kvs().len());
        for kv in keys.kvs() {
            let key = match kv.key_str() {
                Ok(key) => key,
                Err(e) => {
                    warn!("skipping non-utf8 discovery key: {e}");
                    continue;
                }
            };
            let (server_type, server_id) = match self.parse_prefixed_key(key) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("failed to parse discovery key {key}: {e}");
                    continue;
                }
            };
            live_ids.push(server_id.clone());
            if !self.registry.contains(&server_id) {
                debug!("loading info from missing server: {server_type}/{server_id}");
                match self.fetch_server(&server_type, &server_id).await {
                    Ok(server) => self.add_server(Arc::new(server)),
                    Err(e) => {
                        error!("error getting server {server_id} from etcd: {e}");
                        continue;
                    }
                }
            }
        }

        // Drop local entries whose registration is gone from the store.
        for id in self.registry.ids() {
            if !live_ids.iter().any(|live| live == &id) {
                warn!("deleting invalid local server {id}");
                self.delete_server(&id);
            }
        }

        Ok(())
    }

    /// Inserts a server into the local view, notifying listeners unless the
    /// entry is a duplicate or describes this node itself.
    pub fn add_server(&self, server: Arc<ServerInfo>) {
        if self.registry.insert(server.clone()) && server.id != self.server.id {
            self.notify_listeners(Action::Add, &server);
        }
    }

    /// Removes a server from the local view, notifying listeners if it was
    /// present.
    pub fn delete_server(&self, id: &str) {
        if let Some(server) = self.registry.remove(id) {
            self.notify_listeners(Action::Remove, &server);
        }
    }

    fn notify_listeners(&self, action: Action, server: &Arc<ServerInfo>) {
        for listener in self.listeners.read().iter() {
            match action {
                Action::Add => listener.add_server(server),
                Action::Remove => listener.remove_server(server),
            }
        }
    }

    fn bootstrap<'a>(
        self: &'a Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), GarrisonError>> + Send + 'a>>
    {
        Box::pin(async move {
            let (keeper, stream) = self.bootstrap_lease().await?;
            self.register_self().await?;
            self.sync_servers().await?;

            let sd = self.clone();
            tokio::spawn(async move { sd.run_keep_alive(keeper, stream).await });
            Ok(())
        })
    }

    /// Grants a lease with TTL = heartbeat ttl and confirms the first renewal
    /// before handing the stream to the keep-alive worker.
    async fn bootstrap_lease(
        &self,
    ) -> Result<(LeaseKeeper, LeaseKeepAliveStream), GarrisonError> {
        let mut client = self.client()?.clone();
        let lease = client
            .lease_grant(self.heartbeat_ttl.as_secs() as i64, None)
            .await?;
        self.lease_id.store(lease.id(), Ordering::SeqCst);
        debug!("got lease id: {:x}", lease.id());

        let (mut keeper, mut stream) = client.lease_keep_alive(lease.id()).await?;
        keeper.keep_alive().await?;
        match stream.message().await? {
            Some(resp) if resp.ttl() > 0 => Ok((keeper, stream)),
            _ => Err(GarrisonError::DiscoveryUnavailable(
                "lease expired immediately after grant".to_string(),
            )),
        }
    }

    /// Writes this node's descriptor under the current lease.
    async fn register_self(&self) -> Result<(), GarrisonError> {
        let mut client = self.client()?.clone();
        let key = self.prefixed(&server_key(&self.server.server_type, &self.server.id));
        let lease_id = self.lease_id.load(Ordering::SeqCst);
        client
            .put(key, self.server.as_json()?, Some(PutOptions::new().with_lease(lease_id)))
            .await?;
        Ok(())
    }

    /// Drives lease renewal at a third of the TTL. When renewal fails or the
    /// stream closes, the lease is assumed lost and the node re-bootstraps.
    async fn run_keep_alive(
        self: Arc<Self>,
        mut keeper: LeaseKeeper,
        mut stream: LeaseKeepAliveStream,
    ) {
        let period = Duration::from_secs((self.heartbeat_ttl.as_secs() / 3).max(1));
        let mut tick = time::interval(period);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = tick.tick() => {
                    if keeper.keep_alive().await.is_err() {
                        break;
                    }
                    match stream.message().await {
                        Ok(Some(resp)) if resp.ttl() > 0 => {
                            if self.log_heartbeat {
                                debug!("etcd lease {:x} renewed", resp.id());
                            }
                        }
                        _ => break,
                    }
                }
            }
        }
        if !self.is_running() {
            return;
        }
        warn!("error renewing etcd lease, rebootstrapping");
        self.rebootstrap().await;
    }

    /// Retries `grant + register + keep-alive` until it succeeds or shutdown
    /// is requested. The registry is left untouched while disconnected; peers
    /// stay reachable as long as their own leases hold.
    async fn rebootstrap(self: &Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            if !self.is_running() {
                return;
            }
            match self.bootstrap().await {
                Ok(()) => {
                    info!("lease rebootstrapped, server re-registered");
                    return;
                }
                Err(e) => {
                    warn!("error rebootstrapping lease, will retry in 5 seconds: {e}");
                    tokio::select! {
                        _ = shutdown_rx.recv() => return,
                        _ = time::sleep(REBOOTSTRAP_BACKOFF) => {}
                    }
                }
            }
        }
    }

    /// Consumes change events from the store and applies them to the registry.
    async fn run_watch(self: Arc<Self>) {
        let mut client = match self.client() {
            Ok(client) => client.clone(),
            Err(_) => return,
        };
        let (_watcher, mut stream) = match client
            .watch(
                self.prefixed("servers/"),
                Some(WatchOptions::new().with_prefix()),
            )
            .await
        {
            Ok(watch) => watch,
            Err(e) => {
                error!("failed to start discovery watch: {e}");
                return;
            }
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                msg = stream.message() => {
                    match msg {
                        Ok(Some(resp)) => {
                            for event in resp.events() {
                                self.handle_watch_event(event);
                            }
                        }
                        Ok(None) => {
                            warn!("discovery watch stream closed");
                            return;
                        }
                        Err(e) => {
                            error!("discovery watch error: {e}");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle_watch_event(&self, event: &etcd_client::Event) {
        let Some(kv) = event.kv() else { return };
        match event.event_type() {
            EventType::Put => match ServerInfo::from_json(kv.value()) {
                Ok(server) => {
                    debug!("server {} added", server.id);
                    self.add_server(Arc::new(server));
                }
                // A single undecodable descriptor must not poison the stream.
                Err(e) => warn!("failed to decode server descriptor from watch: {e}"),
            },
            EventType::Delete => {
                let key = match kv.key_str() {
                    Ok(key) => key,
                    Err(e) => {
                        warn!("non-utf8 key in discovery delete event: {e}");
                        return;
                    }
                };
                match self.parse_prefixed_key(key) {
                    Ok((_, server_id)) => {
                        debug!("server {server_id} deleted");
                        self.delete_server(&server_id);
                    }
                    Err(e) => warn!("failed to parse key from discovery delete event: {e}"),
                }
            }
        }
    }

    async fn fetch_server(
        &self,
        server_type: &str,
        server_id: &str,
    ) -> Result<ServerInfo, GarrisonError> {
        let mut client = self.client()?.clone();
        let key = self.prefixed(&server_key(server_type, server_id));
        let resp = client.get(key, None).await?;
        let kv = resp
            .kvs()
            .first()
            .ok_or_else(|| GarrisonError::NoServerWithId(server_id.to_string()))?;
        ServerInfo::from_json(kv.value())
    }

    fn client(&self) -> Result<&Client, GarrisonError> {
        self.client.get().ok_or(GarrisonError::NotInitialized)
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn parse_prefixed_key(&self, key: &str) -> Result<(String, String), GarrisonError> {
        let relative = key
            .strip_prefix(&self.prefix)
            .ok_or_else(|| GarrisonError::InvalidDiscoveryKey(key.to_string()))?;
        parse_server_key(relative)
    }
}
