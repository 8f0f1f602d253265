//! Harness orchestrator
//!
//! Sequences a whole run: upstream responder first, then the mesh with its
//! single cluster and wildcard route, then repeated waves of connection
//! drivers. A global timeout fires independently of wave progress and shuts
//! the mesh down abruptly; that race is part of the design, not a bug to
//! paper over.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::client::ConnectionDriver;
use crate::config::HarnessConfig;
use crate::mesh::{
    ClusterConfig, ClusterManager, ClusterType, HeaderMatcher, Host, LbType, ListenerConfig,
    MeshServer, ProxyConfig, Router, VirtualHost,
};
use crate::upstream::UpstreamResponder;
use crate::{HARNESS_CLUSTER, HARNESS_LISTENER};

/// Phase of the orchestrated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    /// Launching the upstream responder.
    StartingUpstream,
    /// Waiting for the upstream to bind before the mesh routes to it.
    WarmingUp,
    /// Constructing and starting the proxy tier.
    StartingMesh,
    /// Mesh ready; load generation is eligible.
    Ready,
    /// Waves of drivers are running.
    GeneratingLoad,
    /// Global timeout fired; stopping the mesh.
    ShuttingDown,
    /// The run is over.
    Done,
}

/// Top-level coordinator with full lifecycle authority over the run.
pub struct Harness {
    config: HarnessConfig,
    state: Mutex<HarnessState>,
}

impl Harness {
    /// A harness for one run with the given fixed parameters.
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HarnessState::StartingUpstream),
        }
    }

    /// Current phase of the run.
    pub fn state(&self) -> HarnessState {
        *self.state.lock()
    }

    fn enter(&self, next: HarnessState) {
        let mut state = self.state.lock();
        info!(from = ?*state, to = ?next, "harness state");
        *state = next;
    }

    /// Execute the whole run. Returns after the global timeout has fired
    /// and the mesh has shut down, regardless of wave progress.
    pub async fn run(&self) -> Result<()> {
        self.enter(HarnessState::StartingUpstream);
        let upstream = UpstreamResponder::spawn(self.config.upstream_addr)
            .await
            .context("starting upstream responder")?;

        self.enter(HarnessState::WarmingUp);
        tokio::time::sleep(self.config.warm_up).await;

        self.enter(HarnessState::StartingMesh);
        let mesh = Arc::new(build_mesh(&self.config, upstream.addr()));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let mesh_task = {
            let mesh = Arc::clone(&mesh);
            tokio::spawn(async move {
                match mesh.start().await {
                    Ok(addr) => {
                        let _ = ready_tx.send(addr);
                        // Parked until the stop signal; a dropped sender
                        // counts as stop too.
                        let _ = stop_rx.await;
                        mesh.close().await;
                    }
                    Err(err) => {
                        // Fatal to the run: readiness never fires.
                        error!("mesh failed to start: {err:#}");
                    }
                }
            })
        };

        let mesh_addr = ready_rx.await.context("mesh never became ready")?;
        self.enter(HarnessState::Ready);

        self.enter(HarnessState::GeneratingLoad);
        let load_task = tokio::spawn(run_waves(self.config.clone(), mesh_addr));

        // The global timeout is measured independently of wave progress.
        tokio::time::sleep(self.config.global_timeout).await;

        self.enter(HarnessState::ShuttingDown);
        info!("global timeout elapsed, closing mesh");
        let _ = stop_tx.send(());
        mesh_task.await.context("mesh task panicked")?;

        // Drivers have no cancellation contract; whatever is still running
        // when the mesh goes away is cut loose here.
        load_task.abort();

        self.enter(HarnessState::Done);
        Ok(())
    }
}

/// Run `waves` sequential waves of drivers against `mesh_addr`. Each wave
/// blocks on its completion barrier before the next one starts; at most one
/// wave's drivers are ever live.
pub async fn run_waves(config: HarnessConfig, mesh_addr: SocketAddr) {
    for wave in 0..config.waves {
        info!(wave, drivers = config.drivers_per_wave, "starting wave");

        let mut barrier = Vec::with_capacity(config.drivers_per_wave);
        for _ in 0..config.drivers_per_wave {
            let (done_tx, done_rx) = oneshot::channel();
            ConnectionDriver::start(&config, mesh_addr, done_tx);
            barrier.push(done_rx);
        }

        for done in barrier {
            // A dropped sender still counts as a completed driver; the
            // barrier must never lose or double-count a signal.
            let _ = done.await;
        }
        info!(wave, "wave complete");
    }
    info!("all waves complete");
}

fn build_mesh(config: &HarnessConfig, upstream_addr: SocketAddr) -> MeshServer {
    let cluster_manager = Arc::new(ClusterManager::new());
    cluster_manager.update_cluster_config(vec![ClusterConfig {
        name: HARNESS_CLUSTER.to_string(),
        cluster_type: ClusterType::Simple,
        lb_type: LbType::Random,
        max_request_per_conn: config.max_request_per_conn,
        conn_buffer_limit_bytes: config.conn_buffer_limit_bytes,
    }]);
    cluster_manager.update_cluster_host(
        HARNESS_CLUSTER,
        0,
        vec![Host {
            address: upstream_addr,
            weight: 100,
        }],
    );

    let mesh = MeshServer::new(cluster_manager);
    mesh.add_listener(
        ListenerConfig {
            name: HARNESS_LISTENER.to_string(),
            addr: config.mesh_addr,
            bind_to_port: true,
            per_conn_buffer_limit_bytes: config.conn_buffer_limit_bytes,
            log_level: tracing::Level::DEBUG,
        },
        ProxyConfig {
            downstream_protocol: "bolt".to_string(),
            upstream_protocol: "bolt".to_string(),
            virtual_hosts: vec![VirtualHost {
                name: "harness-route".to_string(),
                domains: vec!["*".to_string()],
                routers: vec![Router {
                    headers: vec![HeaderMatcher {
                        name: "service".to_string(),
                        value: ".*".to_string(),
                    }],
                    cluster_name: HARNESS_CLUSTER.to_string(),
                }],
            }],
        },
    );
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wave_barrier_tolerates_unreachable_targets() {
        let config = HarnessConfig {
            waves: 2,
            drivers_per_wave: 3,
            connect_timeout: Duration::from_millis(500),
            ..HarnessConfig::default()
        };
        // Nothing listens here; every driver completes via ConnectFailed.
        let target = SocketAddr::from(([127, 0, 0, 1], 1));

        tokio::time::timeout(Duration::from_secs(10), run_waves(config, target))
            .await
            .expect("waves never finished");
    }
}
