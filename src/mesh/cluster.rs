//! Cluster registry and host selection

use dashmap::DashMap;
use rand::Rng;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Kind of upstream cluster. Only static member lists are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterType {
    /// Statically configured host list.
    Simple,
}

/// Load balancing policy over a cluster's hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbType {
    /// Weighted random selection.
    Random,
}

/// A named logical upstream group. Written once before the mesh starts,
/// read on every routing decision afterwards.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Cluster name, referenced by route rules.
    pub name: String,
    /// Cluster membership kind.
    pub cluster_type: ClusterType,
    /// Host selection policy.
    pub lb_type: LbType,
    /// Upper bound on in-flight requests per upstream connection.
    pub max_request_per_conn: u32,
    /// Per-connection buffer limit for upstream connections.
    pub conn_buffer_limit_bytes: usize,
}

/// One physical upstream address with its relative selection weight.
#[derive(Debug, Clone, Copy)]
pub struct Host {
    /// Upstream socket address.
    pub address: SocketAddr,
    /// Relative weight for random selection; zero means never picked
    /// while a positive-weight host exists.
    pub weight: u32,
}

struct ClusterEntry {
    config: ClusterConfig,
    hosts: Vec<Host>,
}

/// Registry of clusters and their hosts, exposed to the harness through the
/// update callbacks and to the serving loop through [`select_host`].
///
/// [`select_host`]: ClusterManager::select_host
#[derive(Default)]
pub struct ClusterManager {
    clusters: DashMap<String, ClusterEntry>,
}

impl ClusterManager {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace cluster configurations. Hosts registered earlier
    /// for a replaced cluster are kept.
    pub fn update_cluster_config(&self, configs: Vec<ClusterConfig>) {
        for config in configs {
            debug!(cluster = %config.name, "registering cluster");
            self.clusters
                .entry(config.name.clone())
                .and_modify(|entry| entry.config = config.clone())
                .or_insert_with(|| ClusterEntry {
                    config,
                    hosts: Vec::new(),
                });
        }
    }

    /// Replace the host list of `cluster`. The priority tier is carried for
    /// interface compatibility; only one tier exists.
    pub fn update_cluster_host(&self, cluster: &str, _priority: u32, hosts: Vec<Host>) {
        match self.clusters.get_mut(cluster) {
            Some(mut entry) => {
                debug!(cluster, hosts = hosts.len(), "updating cluster hosts");
                entry.hosts = hosts;
            }
            None => warn!(cluster, "host update for unknown cluster dropped"),
        }
    }

    /// Pick one host of `cluster` per its load balancing policy.
    pub fn select_host(&self, cluster: &str) -> Option<Host> {
        let entry = self.clusters.get(cluster)?;
        match entry.config.lb_type {
            LbType::Random => weighted_random(&entry.hosts),
        }
    }

    /// Buffer limit configured for `cluster`'s upstream connections.
    pub fn buffer_limit(&self, cluster: &str) -> Option<usize> {
        self.clusters
            .get(cluster)
            .map(|entry| entry.config.conn_buffer_limit_bytes)
    }
}

fn weighted_random(hosts: &[Host]) -> Option<Host> {
    let total: u64 = hosts.iter().map(|h| u64::from(h.weight)).sum();
    if total == 0 {
        return hosts.first().copied();
    }
    let mut roll = rand::thread_rng().gen_range(0..total);
    for host in hosts {
        let weight = u64::from(host.weight);
        if roll < weight {
            return Some(*host);
        }
        roll -= weight;
    }
    hosts.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(name: &str) -> ClusterConfig {
        ClusterConfig {
            name: name.to_string(),
            cluster_type: ClusterType::Simple,
            lb_type: LbType::Random,
            max_request_per_conn: 1024,
            conn_buffer_limit_bytes: 32 * 1024,
        }
    }

    #[test]
    fn unknown_cluster_yields_no_host() {
        let manager = ClusterManager::new();
        assert!(manager.select_host("nope").is_none());
    }

    #[test]
    fn zero_weight_host_is_shadowed() {
        let manager = ClusterManager::new();
        manager.update_cluster_config(vec![cluster("c")]);

        let dead = Host {
            address: SocketAddr::from(([127, 0, 0, 1], 1)),
            weight: 0,
        };
        let live = Host {
            address: SocketAddr::from(([127, 0, 0, 1], 2)),
            weight: 100,
        };
        manager.update_cluster_host("c", 0, vec![dead, live]);

        for _ in 0..64 {
            let picked = manager.select_host("c").unwrap();
            assert_eq!(picked.address, live.address);
        }
    }

    #[test]
    fn host_update_before_config_is_dropped() {
        let manager = ClusterManager::new();
        manager.update_cluster_host(
            "missing",
            0,
            vec![Host {
                address: SocketAddr::from(([127, 0, 0, 1], 3)),
                weight: 1,
            }],
        );
        assert!(manager.select_host("missing").is_none());
    }

    #[test]
    fn empty_host_list_yields_no_host() {
        let manager = ClusterManager::new();
        manager.update_cluster_config(vec![cluster("c")]);
        assert!(manager.select_host("c").is_none());
    }
}
