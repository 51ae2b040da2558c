// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Harness configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use wildleak_broker::AddressSettings;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub amq: AmqConfig,

    #[serde(default)]
    pub repro: ReproConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub broker: BrokerTuning,

    #[serde(default)]
    pub cluster: ClusterNodesConfig,
}

/// Primary node identity and cluster switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmqConfig {
    /// Node the harness publishes to, consumes from and samples.
    #[serde(default = "default_broker_name")]
    pub broker_name: String,

    #[serde(default = "default_core_port")]
    pub core_port: u16,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Root of every node's data directory.
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    #[serde(default = "default_cluster_connection_name")]
    pub cluster_connection_name: String,

    #[serde(default = "default_true")]
    pub cluster_enabled: bool,
}

/// Workload shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReproConfig {
    /// Messages (and distinct addresses) per burst.
    #[serde(default = "default_address_count")]
    pub address_count: usize,

    /// `true` selects the core temporary-queue consumer, `false` the MQTT
    /// shared-subscription consumer.
    #[serde(default)]
    pub core_consumer_enabled: bool,
}

/// Tick timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Delay between the end of one tick and the start of the next.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Stop after this many bursts; absent runs until interrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bursts: Option<u64>,
}

/// Settings applied to every node of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerTuning {
    #[serde(default = "default_scan_period_ms")]
    pub address_queue_scan_period_ms: u64,

    #[serde(default = "default_id_cache_size")]
    pub id_cache_size: usize,

    #[serde(default = "default_true")]
    pub persist_id_cache: bool,

    #[serde(default = "default_true")]
    pub persistence_enabled: bool,

    #[serde(default = "default_journal_file_size")]
    pub journal_file_size: u64,

    #[serde(default = "default_journal_min_files")]
    pub journal_min_files: usize,

    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    #[serde(default = "default_page_size_bytes")]
    pub page_size_bytes: u64,

    /// Simulated node activation time.
    #[serde(default)]
    pub activation_delay_ms: u64,

    #[serde(default)]
    pub auto_delete_addresses_delay_ms: u64,

    #[serde(default)]
    pub auto_delete_queues_delay_ms: u64,

    #[serde(default)]
    pub auto_delete_queues_message_count: u64,

    /// Reap auto-created queues that never had a consumer.
    #[serde(default)]
    pub auto_delete_queues_skip_usage_check: bool,

    /// Let the reaper remove addresses held only by broker-created wildcard
    /// subscription queues.
    #[serde(default)]
    pub reap_through_implicit_links: bool,
}

/// Explicit node list; empty means the default three-node mesh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterNodesConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeConfig>,
}

/// One node of an explicit node list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub core_port: u16,
    pub mqtt_port: u16,
    /// Defaults to `<amq.data_directory>/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_broker_name() -> String {
    "artemis-broker".to_string()
}

fn default_core_port() -> u16 {
    61616
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_data_directory() -> PathBuf {
    PathBuf::from("target/wildleak-data")
}

fn default_cluster_connection_name() -> String {
    "wildleak-cluster".to_string()
}

fn default_true() -> bool {
    true
}

fn default_address_count() -> usize {
    1000
}

fn default_initial_delay_ms() -> u64 {
    5000
}

fn default_period_ms() -> u64 {
    10_000
}

fn default_scan_period_ms() -> u64 {
    500
}

fn default_id_cache_size() -> usize {
    2000
}

fn default_journal_file_size() -> u64 {
    1024 * 1024
}

fn default_journal_min_files() -> usize {
    2
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_page_size_bytes() -> u64 {
    1024 * 1024
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            amq: AmqConfig::default(),
            repro: ReproConfig::default(),
            schedule: ScheduleConfig::default(),
            broker: BrokerTuning::default(),
            cluster: ClusterNodesConfig::default(),
        }
    }
}

impl Default for AmqConfig {
    fn default() -> Self {
        Self {
            broker_name: default_broker_name(),
            core_port: default_core_port(),
            mqtt_port: default_mqtt_port(),
            host: default_host(),
            data_directory: default_data_directory(),
            cluster_connection_name: default_cluster_connection_name(),
            cluster_enabled: true,
        }
    }
}

impl Default for ReproConfig {
    fn default() -> Self {
        Self {
            address_count: default_address_count(),
            core_consumer_enabled: false,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            period_ms: default_period_ms(),
            max_bursts: None,
        }
    }
}

impl ScheduleConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for BrokerTuning {
    fn default() -> Self {
        Self {
            address_queue_scan_period_ms: default_scan_period_ms(),
            id_cache_size: default_id_cache_size(),
            persist_id_cache: true,
            persistence_enabled: true,
            journal_file_size: default_journal_file_size(),
            journal_min_files: default_journal_min_files(),
            max_size_bytes: default_max_size_bytes(),
            page_size_bytes: default_page_size_bytes(),
            activation_delay_ms: 0,
            auto_delete_addresses_delay_ms: 0,
            auto_delete_queues_delay_ms: 0,
            auto_delete_queues_message_count: 0,
            auto_delete_queues_skip_usage_check: false,
            reap_through_implicit_links: false,
        }
    }
}

impl BrokerTuning {
    /// Address policy shared by every node.
    pub fn address_settings(&self) -> AddressSettings {
        AddressSettings {
            auto_delete_addresses_delay_ms: self.auto_delete_addresses_delay_ms,
            auto_delete_queues_delay_ms: self.auto_delete_queues_delay_ms,
            auto_delete_queues_message_count: self.auto_delete_queues_message_count,
            auto_delete_queues_skip_usage_check: self.auto_delete_queues_skip_usage_check,
            max_size_bytes: self.max_size_bytes,
            page_size_bytes: self.page_size_bytes,
            id_cache_size: self.id_cache_size,
            reap_through_implicit_links: self.reap_through_implicit_links,
            ..AddressSettings::default()
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repro.address_count == 0 {
            return Err(ConfigError::Invalid("repro.address_count must be > 0".into()));
        }
        if self.schedule.period_ms == 0 {
            return Err(ConfigError::Invalid("schedule.period_ms must be > 0".into()));
        }
        if self.broker.id_cache_size == 0 {
            return Err(ConfigError::Invalid("broker.id_cache_size must be > 0".into()));
        }
        if self.amq.broker_name.is_empty() {
            return Err(ConfigError::Invalid("amq.broker_name cannot be empty".into()));
        }

        let nodes = &self.cluster.nodes;
        if nodes.is_empty() {
            return Ok(());
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for node in nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate node name '{}'",
                    node.name
                )));
            }
            for port in [node.core_port, node.mqtt_port] {
                if !ports.insert(port) {
                    return Err(ConfigError::Invalid(format!(
                        "Port {} used by more than one endpoint (node '{}')",
                        port, node.name
                    )));
                }
            }
        }
        if !names.contains(self.amq.broker_name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Primary broker '{}' is not in cluster.nodes",
                self.amq.broker_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: HarnessConfig = toml::from_str("").expect("parse");
        assert_eq!(config.amq.broker_name, "artemis-broker");
        assert_eq!(config.amq.core_port, 61616);
        assert_eq!(config.repro.address_count, 1000);
        assert!(!config.repro.core_consumer_enabled);
        assert_eq!(config.schedule.initial_delay_ms, 5000);
        assert_eq!(config.schedule.period_ms, 10_000);
        assert_eq!(config.schedule.max_bursts, None);
        assert!(config.amq.cluster_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
            log_level = "debug"

            [amq]
            broker_name = "primary"
            data_directory = "/tmp/wl"
            cluster_enabled = false

            [repro]
            address_count = 3
            core_consumer_enabled = true

            [schedule]
            initial_delay_ms = 0
            period_ms = 100
            max_bursts = 2

            [broker]
            reap_through_implicit_links = true

            [[cluster.nodes]]
            name = "primary"
            core_port = 7000
            mqtt_port = 7001
        "#;
        let config: HarnessConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.repro.address_count, 3);
        assert!(config.repro.core_consumer_enabled);
        assert_eq!(config.schedule.max_bursts, Some(2));
        assert!(config.broker.address_settings().reap_through_implicit_links);
        assert_eq!(config.cluster.nodes.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let mut config = HarnessConfig::default();
        config.repro.address_count = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.schedule.period_ms = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.broker.id_cache_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_node_list() {
        let node = |name: &str, core, mqtt| NodeConfig {
            name: name.into(),
            core_port: core,
            mqtt_port: mqtt,
            data_directory: None,
        };

        let mut config = HarnessConfig::default();
        config.cluster.nodes = vec![node("artemis-broker", 1, 2), node("artemis-broker", 3, 4)];
        assert!(config.validate().is_err());

        config.cluster.nodes = vec![node("artemis-broker", 1, 2), node("other", 2, 4)];
        assert!(config.validate().is_err());

        config.cluster.nodes = vec![node("a", 1, 2), node("b", 3, 4)];
        assert!(config.validate().is_err());

        config.cluster.nodes = vec![node("artemis-broker", 1, 2), node("b", 3, 4)];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = HarnessConfig::default();
        let text = config.to_toml().expect("serialize");
        let parsed: HarnessConfig = toml::from_str(&text).expect("parse");
        assert_eq!(parsed.amq.broker_name, config.amq.broker_name);
        assert_eq!(parsed.schedule.period_ms, config.schedule.period_ms);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wildleak.toml");
        std::fs::write(&path, "[repro]\naddress_count = 0\n").expect("write");
        assert!(matches!(
            HarnessConfig::from_file(&path),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HarnessConfig::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
