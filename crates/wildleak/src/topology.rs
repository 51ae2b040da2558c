// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cluster topology: which nodes exist and how they reach each other.

use crate::config::{ConfigError, HarnessConfig};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use wildleak_broker::{BrokerConfig, ClusterConfig, Endpoint};

/// Number of peer nodes in the default topology.
pub const DEFAULT_PEER_COUNT: u16 = 2;

/// Role of a node within the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// The node the harness publishes to, consumes from and samples.
    Primary,
    Peer,
}

/// Static description of one broker node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerNodeSpec {
    pub name: String,
    pub role: NodeRole,
    pub core: Endpoint,
    pub mqtt: Endpoint,
    pub data_directory: PathBuf,
    /// Core endpoints of every peer (empty without clustering).
    pub peers: Vec<Endpoint>,
}

impl BrokerNodeSpec {
    pub fn core_url(&self) -> String {
        self.core.to_url()
    }

    /// Broker configuration for this node.
    pub fn broker_config(&self, harness: &HarnessConfig) -> BrokerConfig {
        let tuning = &harness.broker;
        let mut config = BrokerConfig::new(&self.name, &self.data_directory);
        config.host = self.core.host.clone();
        config.core_port = self.core.port;
        config.mqtt_port = self.mqtt.port;
        config.persistence_enabled = tuning.persistence_enabled;
        config.persist_id_cache = tuning.persist_id_cache;
        config.journal_file_size = tuning.journal_file_size;
        config.journal_min_files = tuning.journal_min_files;
        config.address_queue_scan_period =
            Duration::from_millis(tuning.address_queue_scan_period_ms);
        config.activation_delay = Duration::from_millis(tuning.activation_delay_ms);
        config.address_settings = tuning.address_settings();
        if !self.peers.is_empty() {
            config.cluster = Some(ClusterConfig {
                name: harness.amq.cluster_connection_name.clone(),
                static_connectors: self.peers.iter().map(Endpoint::to_url).collect(),
                max_hops: 1,
            });
        }
        config
    }
}

/// All nodes of the harness, primary first.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    nodes: Vec<BrokerNodeSpec>,
    clustered: bool,
}

impl ClusterTopology {
    /// Build the topology from configuration.
    ///
    /// Without an explicit node list: the primary from `[amq]` plus two
    /// peers `artemis-node1`, `artemis-node2` on the next ports up.
    pub fn from_config(config: &HarnessConfig) -> Result<Self, ConfigError> {
        let amq = &config.amq;
        let mut described: Vec<(String, u16, u16, Option<PathBuf>)> =
            if config.cluster.nodes.is_empty() {
                let mut nodes = vec![(amq.broker_name.clone(), amq.core_port, amq.mqtt_port, None)];
                for i in 1..=DEFAULT_PEER_COUNT {
                    let core = amq.core_port.checked_add(i);
                    let mqtt = amq.mqtt_port.checked_add(i);
                    let (Some(core), Some(mqtt)) = (core, mqtt) else {
                        return Err(ConfigError::Invalid(
                            "Default peer ports overflow the port range".into(),
                        ));
                    };
                    nodes.push((format!("artemis-node{}", i), core, mqtt, None));
                }
                nodes
            } else {
                config
                    .cluster
                    .nodes
                    .iter()
                    .map(|n| (n.name.clone(), n.core_port, n.mqtt_port, n.data_directory.clone()))
                    .collect()
            };

        // Primary first.
        let primary = described
            .iter()
            .position(|(name, ..)| *name == amq.broker_name)
            .ok_or_else(|| {
                ConfigError::Invalid(format!("Primary broker '{}' not in topology", amq.broker_name))
            })?;
        described.swap(0, primary);

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for (name, core, mqtt, _) in &described {
            if !names.insert(name.clone()) {
                return Err(ConfigError::Invalid(format!("Duplicate node name '{}'", name)));
            }
            if !ports.insert(*core) || !ports.insert(*mqtt) {
                return Err(ConfigError::Invalid(format!(
                    "Node '{}' reuses an endpoint port",
                    name
                )));
            }
        }

        let clustered = amq.cluster_enabled;
        let cores: Vec<Endpoint> = described
            .iter()
            .map(|(_, core, ..)| Endpoint::new(&amq.host, *core))
            .collect();

        let nodes = described
            .into_iter()
            .enumerate()
            .map(|(i, (name, core, mqtt, dir))| BrokerNodeSpec {
                role: if i == 0 {
                    NodeRole::Primary
                } else {
                    NodeRole::Peer
                },
                core: Endpoint::new(&amq.host, core),
                mqtt: Endpoint::new(&amq.host, mqtt),
                data_directory: dir.unwrap_or_else(|| amq.data_directory.join(&name)),
                peers: if clustered {
                    cores
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, ep)| ep.clone())
                        .collect()
                } else {
                    Vec::new()
                },
                name,
            })
            .collect();

        Ok(Self { nodes, clustered })
    }

    pub fn nodes(&self) -> &[BrokerNodeSpec] {
        &self.nodes
    }

    pub fn primary(&self) -> &BrokerNodeSpec {
        &self.nodes[0]
    }

    pub fn is_clustered(&self) -> bool {
        self.clustered
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
