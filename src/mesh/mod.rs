//! Proxy tier
//!
//! A deliberately small service-mesh data plane: one inbound listener, a
//! cluster registry, and header-matched routes. Downstream connections are
//! relayed byte-for-byte to a host selected from the routed cluster. The
//! harness treats this tier as an external collaborator; it is here so runs
//! are self-contained.

use anyhow::{bail, Context, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod cluster;

pub use cluster::{ClusterConfig, ClusterManager, ClusterType, Host, LbType};

/// Header predicate of a route rule. The value `".*"` matches anything.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    /// Header name to match on.
    pub name: String,
    /// Expected value, or `".*"` as a wildcard.
    pub value: String,
}

impl HeaderMatcher {
    /// Whether `value` satisfies this predicate.
    pub fn matches(&self, value: &str) -> bool {
        self.value == ".*" || self.value == value
    }
}

/// A route rule: header predicates mapped to a target cluster.
#[derive(Debug, Clone)]
pub struct Router {
    /// All predicates must match for the rule to apply.
    pub headers: Vec<HeaderMatcher>,
    /// Name of the cluster traffic is forwarded to.
    pub cluster_name: String,
}

/// A named group of route rules.
#[derive(Debug, Clone)]
pub struct VirtualHost {
    /// Virtual host name, for logs only.
    pub name: String,
    /// Domains this host serves; `"*"` for all.
    pub domains: Vec<String>,
    /// Route rules, first match wins.
    pub routers: Vec<Router>,
}

/// Proxy behavior attached to a listener.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Protocol tag expected from downstream clients.
    pub downstream_protocol: String,
    /// Protocol tag spoken toward upstream hosts.
    pub upstream_protocol: String,
    /// Virtual hosts with their route rules.
    pub virtual_hosts: Vec<VirtualHost>,
}

impl ProxyConfig {
    /// Resolve the target cluster for a request carrying `headers`.
    pub fn resolve_cluster(&self, headers: &[(&str, &str)]) -> Option<&str> {
        for vhost in &self.virtual_hosts {
            for router in &vhost.routers {
                let matched = router.headers.iter().all(|matcher| {
                    headers
                        .iter()
                        .find(|(name, _)| *name == matcher.name)
                        .map(|(_, value)| matcher.matches(value))
                        .unwrap_or_else(|| matcher.matches(""))
                });
                if matched {
                    return Some(&router.cluster_name);
                }
            }
        }
        None
    }
}

/// Descriptor of the mesh's inbound listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Listener name, for logs only.
    pub name: String,
    /// Address to bind.
    pub addr: SocketAddr,
    /// Whether the listener binds its port. [`MeshServer::start`] refuses
    /// a listener that does not.
    pub bind_to_port: bool,
    /// Per-connection relay buffer limit in bytes.
    pub per_conn_buffer_limit_bytes: usize,
    /// Log level recorded with the listener registration.
    pub log_level: tracing::Level,
}

/// The proxy tier: accepts downstream connections and relays them to hosts
/// selected from the routed cluster.
pub struct MeshServer {
    cluster_manager: Arc<ClusterManager>,
    listener: Mutex<Option<(ListenerConfig, ProxyConfig)>>,
    local_addr: Mutex<Option<SocketAddr>>,
    relays: Arc<DashMap<u64, JoinHandle<()>>>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl MeshServer {
    /// Create a mesh around an externally populated cluster registry.
    pub fn new(cluster_manager: Arc<ClusterManager>) -> Self {
        Self {
            cluster_manager,
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            relays: Arc::new(DashMap::new()),
            stop_tx: Mutex::new(None),
            accept_task: Mutex::new(None),
        }
    }

    /// Register the inbound listener and its proxy behavior. One listener
    /// is supported; a second registration replaces the first.
    pub fn add_listener(&self, listener: ListenerConfig, proxy: ProxyConfig) {
        info!(
            listener = %listener.name,
            addr = %listener.addr,
            level = %listener.log_level,
            downstream = %proxy.downstream_protocol,
            upstream = %proxy.upstream_protocol,
            "listener registered"
        );
        *self.listener.lock() = Some((listener, proxy));
    }

    /// The address the listener actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind the listener and start accepting downstream connections.
    /// Returns the bound address. Route and cluster registration never
    /// require the upstream hosts to be reachable.
    pub async fn start(&self) -> Result<SocketAddr> {
        let (listener_cfg, proxy_cfg) = self
            .listener
            .lock()
            .clone()
            .context("mesh started without a registered listener")?;
        if !listener_cfg.bind_to_port {
            bail!("listener {} does not bind a port", listener_cfg.name);
        }

        let socket = TcpListener::bind(listener_cfg.addr)
            .await
            .with_context(|| format!("binding mesh listener on {}", listener_cfg.addr))?;
        let addr = socket.local_addr().context("resolving bound address")?;
        *self.local_addr.lock() = Some(addr);

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.stop_tx.lock() = Some(stop_tx);

        info!(listener = %listener_cfg.name, %addr, "mesh accepting connections");

        let cluster_manager = Arc::clone(&self.cluster_manager);
        let relays = Arc::clone(&self.relays);
        let task = tokio::spawn(accept_loop(
            socket,
            listener_cfg,
            proxy_cfg,
            cluster_manager,
            relays,
            stop_rx,
        ));
        *self.accept_task.lock() = Some(task);

        Ok(addr)
    }

    /// Stop accepting, release the listener, and tear down active relays.
    /// Abrupt: in-flight downstream connections are closed out from under
    /// their clients.
    pub async fn close(&self) {
        info!("mesh shutting down");
        if let Some(stop) = self.stop_tx.lock().take() {
            let _ = stop.send(true);
        }
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        for entry in self.relays.iter() {
            entry.value().abort();
        }
        self.relays.clear();
        *self.local_addr.lock() = None;
    }
}

async fn accept_loop(
    socket: TcpListener,
    listener_cfg: ListenerConfig,
    proxy_cfg: ProxyConfig,
    cluster_manager: Arc<ClusterManager>,
    relays: Arc<DashMap<u64, JoinHandle<()>>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let next_relay_id = AtomicU64::new(1);
    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                debug!(listener = %listener_cfg.name, "accept loop stopping");
                return;
            }
            accepted = socket.accept() => {
                let (downstream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                };
                debug!(%peer, "downstream connection accepted");

                let relay_id = next_relay_id.fetch_add(1, Ordering::Relaxed);
                let proxy = proxy_cfg.clone();
                let manager = Arc::clone(&cluster_manager);
                let relays_done = Arc::clone(&relays);
                let buffer_limit = listener_cfg.per_conn_buffer_limit_bytes;
                let handle = tokio::spawn(async move {
                    relay(downstream, peer, proxy, manager, buffer_limit).await;
                    relays_done.remove(&relay_id);
                });
                relays.insert(relay_id, handle);
            }
        }
    }
}

/// Relay one downstream connection to a host of the routed cluster.
async fn relay(
    mut downstream: TcpStream,
    peer: SocketAddr,
    proxy: ProxyConfig,
    cluster_manager: Arc<ClusterManager>,
    buffer_limit: usize,
) {
    // The request's logical-service header is not decoded from the payload;
    // routes in this harness are wildcard matches, so resolution sees an
    // empty value.
    let cluster = match proxy.resolve_cluster(&[("service", "")]) {
        Some(cluster) => cluster.to_string(),
        None => {
            warn!(%peer, "no route matched, dropping connection");
            return;
        }
    };

    let host = match cluster_manager.select_host(&cluster) {
        Some(host) => host,
        None => {
            warn!(%peer, %cluster, "no host available, dropping connection");
            return;
        }
    };

    let mut upstream = match TcpStream::connect(host.address).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(%peer, upstream = %host.address, %err, "upstream connect failed");
            return;
        }
    };

    debug!(%peer, upstream = %host.address, %cluster, "relaying");
    // Downstream side honors the listener's limit, upstream side the
    // cluster's.
    let upstream_limit = cluster_manager.buffer_limit(&cluster).unwrap_or(buffer_limit);
    match tokio::io::copy_bidirectional_with_sizes(
        &mut downstream,
        &mut upstream,
        buffer_limit,
        upstream_limit,
    )
    .await
    {
        Ok((to_upstream, to_downstream)) => {
            debug!(%peer, to_upstream, to_downstream, "relay finished");
        }
        Err(err) => {
            debug!(%peer, %err, "relay ended with error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy_with_route(value: &str) -> ProxyConfig {
        ProxyConfig {
            downstream_protocol: "bolt".to_string(),
            upstream_protocol: "bolt".to_string(),
            virtual_hosts: vec![VirtualHost {
                name: "vh".to_string(),
                domains: vec!["*".to_string()],
                routers: vec![Router {
                    headers: vec![HeaderMatcher {
                        name: "service".to_string(),
                        value: value.to_string(),
                    }],
                    cluster_name: "c".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn wildcard_route_matches_anything() {
        let proxy = proxy_with_route(".*");
        assert_eq!(proxy.resolve_cluster(&[("service", "whatever")]), Some("c"));
        assert_eq!(proxy.resolve_cluster(&[("service", "")]), Some("c"));
        assert_eq!(proxy.resolve_cluster(&[]), Some("c"));
    }

    #[test]
    fn exact_route_requires_the_value() {
        let proxy = proxy_with_route("billing");
        assert_eq!(proxy.resolve_cluster(&[("service", "billing")]), Some("c"));
        assert_eq!(proxy.resolve_cluster(&[("service", "other")]), None);
        assert_eq!(proxy.resolve_cluster(&[]), None);
    }

    #[tokio::test]
    async fn start_without_listener_fails() {
        let mesh = MeshServer::new(Arc::new(ClusterManager::new()));
        assert!(mesh.start().await.is_err());
    }

    #[tokio::test]
    async fn unbound_listener_refuses_to_start() {
        let mesh = MeshServer::new(Arc::new(ClusterManager::new()));
        mesh.add_listener(
            ListenerConfig {
                name: "unbound".to_string(),
                addr: SocketAddr::from(([127, 0, 0, 1], 0)),
                bind_to_port: false,
                per_conn_buffer_limit_bytes: 32 * 1024,
                log_level: tracing::Level::DEBUG,
            },
            proxy_with_route(".*"),
        );
        assert!(mesh.start().await.is_err());
        assert!(mesh.local_addr().is_none());
    }
}
