// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cluster connection over static connectors.
//!
//! Every node connects to every peer listed in its connectors. Once a peer is
//! reachable a bridge is recorded and a store-and-forward queue named after
//! the peer's node id is created locally. Messages are load-balanced
//! ON_DEMAND: a locally routed message is forwarded to each peer that has a
//! consuming queue for the address.

use crate::error::Result;
use crate::message::Message;
use crate::postoffice::PostOffice;
use crate::queue::QueueConfig;
use crate::settings::ClusterConfig;
use crate::transport::{Endpoint, Fabric, Protocol};
use dashmap::DashMap;
use std::time::Duration;

/// Prefix of store-and-forward queues.
pub const SF_QUEUE_PREFIX: &str = "$.artemis.internal.sf";

/// Delay between bridge connection attempts.
pub const BRIDGE_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Name of the store-and-forward queue towards `peer_node_id`.
pub fn store_and_forward_queue_name(cluster: &str, peer_node_id: &str) -> String {
    format!("{}.{}.{}", SF_QUEUE_PREFIX, cluster, peer_node_id)
}

/// Bridges from one node to its static peers.
pub struct ClusterConnection {
    name: String,
    node_id: String,
    connectors: Vec<Endpoint>,
    max_hops: u8,
    fabric: Fabric,
    /// Connector -> peer node id, for bridges that are up.
    bridges: DashMap<Endpoint, String>,
}

impl ClusterConnection {
    /// Build the connection; invalid connector URLs are logged and skipped.
    pub fn new(config: &ClusterConfig, node_id: &str, fabric: Fabric) -> Self {
        let connectors = config
            .static_connectors
            .iter()
            .filter_map(|url| match Endpoint::parse_url(url) {
                Ok(ep) => Some(ep),
                Err(e) => {
                    tracing::warn!("Cluster {}: ignoring connector {}: {}", config.name, url, e);
                    None
                }
            })
            .collect();
        Self {
            name: config.name.clone(),
            node_id: node_id.to_string(),
            connectors,
            max_hops: config.max_hops,
            fabric,
            bridges: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connectors(&self) -> &[Endpoint] {
        &self.connectors
    }

    /// Connect bridges to newly reachable peers and drop dead ones.
    ///
    /// Returns the number of bridges that came up during this call.
    pub fn refresh(&self, post_office: &PostOffice) -> Result<usize> {
        let mut connected = 0;
        for connector in &self.connectors {
            match self.fabric.connect(connector, Protocol::Core) {
                Ok(peer) => {
                    let peer_id = peer.node_id();
                    if peer_id == self.node_id {
                        continue;
                    }
                    let known = self
                        .bridges
                        .get(connector)
                        .map(|id| *id == peer_id)
                        .unwrap_or(false);
                    if known {
                        continue;
                    }
                    let sf = store_and_forward_queue_name(&self.name, &peer_id);
                    post_office.create_address(&sf)?;
                    post_office.bind_queue(QueueConfig::new(&sf).durable(true))?;
                    self.bridges.insert(connector.clone(), peer_id.clone());
                    connected += 1;
                    tracing::info!(
                        "Cluster {}: bridge to {} ({}) connected",
                        self.name,
                        connector,
                        peer_id
                    );
                }
                Err(_) => {
                    if self.bridges.remove(connector).is_some() {
                        tracing::info!("Cluster {}: bridge to {} disconnected", self.name, connector);
                    }
                }
            }
        }
        Ok(connected)
    }

    /// This node plus every reachable peer.
    pub fn member_count(&self) -> usize {
        1 + self
            .connectors
            .iter()
            .filter(|c| self.fabric.connect(c, Protocol::Core).is_ok())
            .count()
    }

    /// Forward a locally routed message to peers with consumers for `address`.
    pub fn forward(&self, address: &str, message: &Message) -> usize {
        if self.max_hops == 0 {
            return 0;
        }
        let mut forwarded = 0;
        for connector in &self.connectors {
            let Ok(peer) = self.fabric.connect(connector, Protocol::Core) else {
                continue;
            };
            let Ok(peer_office) = peer.post_office() else {
                continue;
            };
            if !peer_office.has_consumers_for(address) {
                continue;
            }
            match peer_office.route_bridged(address, message.clone(), &self.node_id) {
                Ok(_) => forwarded += 1,
                Err(e) => tracing::warn!(
                    "Cluster {}: forward of {} to {} failed: {}",
                    self.name,
                    address,
                    connector,
                    e
                ),
            }
        }
        forwarded
    }
}

impl std::fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("name", &self.name)
            .field("node_id", &self.node_id)
            .field("connectors", &self.connectors)
            .field("bridges", &self.bridges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sf_queue_name() {
        assert_eq!(
            store_and_forward_queue_name("wildleak-cluster", "abc"),
            "$.artemis.internal.sf.wildleak-cluster.abc"
        );
    }

    #[test]
    fn test_member_count_without_peers() {
        let config = ClusterConfig {
            name: "c".into(),
            static_connectors: vec!["tcp://localhost:61617".into(), "bogus".into()],
            max_hops: 1,
        };
        let cluster = ClusterConnection::new(&config, "node-a", Fabric::new());
        assert_eq!(cluster.connectors().len(), 1);
        assert_eq!(cluster.member_count(), 1);
    }
}
