//! Harness configuration
//!
//! Every parameter of a run is a fixed constant collected here. There is no
//! config file and no CLI surface; tests shrink the time units and use
//! ephemeral ports.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Fixed parameters for one harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Address the upstream responder binds to.
    pub upstream_addr: SocketAddr,
    /// Public address of the mesh's inbound listener.
    pub mesh_addr: SocketAddr,
    /// Number of sequential waves of connection drivers.
    pub waves: usize,
    /// Drivers spawned per wave.
    pub drivers_per_wave: usize,
    /// Request frames each driver sends once connected.
    pub frames_per_connection: u32,
    /// Delay before the mesh starts, letting the upstream bind first.
    pub warm_up: Duration,
    /// Delay between the connected event and the first frame write.
    pub settle_delay: Duration,
    /// Window after the burst in which responses can still be observed
    /// before the driver closes its connection.
    pub drain_delay: Duration,
    /// Transport connect timeout per driver.
    pub connect_timeout: Duration,
    /// Global run timeout; fires regardless of wave progress.
    pub global_timeout: Duration,
    /// Per-connection buffer limit for the mesh listener and drivers.
    pub conn_buffer_limit_bytes: usize,
    /// Upper bound on in-flight requests per upstream connection,
    /// carried in the cluster registration.
    pub max_request_per_conn: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            upstream_addr: SocketAddr::from(([127, 0, 0, 1], 8088)),
            mesh_addr: SocketAddr::from(([127, 0, 0, 1], 2045)),
            waves: 20,
            drivers_per_wave: 1,
            frames_per_connection: 20,
            warm_up: Duration::from_secs(2),
            settle_delay: Duration::from_secs(3),
            drain_delay: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(5),
            global_timeout: Duration::from_secs(120),
            conn_buffer_limit_bytes: 32 * 1024,
            max_request_per_conn: 1024,
        }
    }
}
