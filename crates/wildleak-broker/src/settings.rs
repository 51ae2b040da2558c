// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker configuration: persistence, journal, paging and address settings.

use crate::error::{BrokerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wildcard syntax used when matching subscriptions against addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardConfig {
    /// Segment delimiter.
    pub delimiter: char,
    /// Matches zero or more trailing segments.
    pub any_words: char,
    /// Matches exactly one segment.
    pub single_word: char,
}

impl Default for WildcardConfig {
    fn default() -> Self {
        Self {
            delimiter: '/',
            any_words: '#',
            single_word: '+',
        }
    }
}

/// Per-address policy applied to every address (the `#` match in a real broker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressSettings {
    #[serde(default = "default_true")]
    pub auto_create_addresses: bool,

    #[serde(default = "default_true")]
    pub auto_delete_addresses: bool,

    /// Idle time before an unbound auto-created address is removed.
    #[serde(default)]
    pub auto_delete_addresses_delay_ms: u64,

    #[serde(default = "default_true")]
    pub auto_create_queues: bool,

    #[serde(default = "default_true")]
    pub auto_delete_queues: bool,

    /// Idle time before a consumer-less auto-delete queue is removed.
    #[serde(default)]
    pub auto_delete_queues_delay_ms: u64,

    /// Queues holding more than this many messages are never auto-deleted.
    #[serde(default)]
    pub auto_delete_queues_message_count: u64,

    /// Let the reaper remove auto-created queues that never had a consumer.
    #[serde(default)]
    pub auto_delete_queues_skip_usage_check: bool,

    /// Address size beyond which durable messages are written to page files.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Size of a single page file.
    #[serde(default = "default_page_size_bytes")]
    pub page_size_bytes: u64,

    /// Slots in every duplicate-ID cache.
    #[serde(default = "default_id_cache_size")]
    pub id_cache_size: usize,

    /// Let the reaper delete addresses that are only held by links from
    /// broker-created (implicit) wildcard queues. Off by default, which keeps
    /// such addresses alive for as long as the implicit queue exists.
    #[serde(default)]
    pub reap_through_implicit_links: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_page_size_bytes() -> u64 {
    1024 * 1024
}

fn default_id_cache_size() -> usize {
    2000
}

impl Default for AddressSettings {
    fn default() -> Self {
        Self {
            auto_create_addresses: true,
            auto_delete_addresses: true,
            auto_delete_addresses_delay_ms: 0,
            auto_create_queues: true,
            auto_delete_queues: true,
            auto_delete_queues_delay_ms: 0,
            auto_delete_queues_message_count: 0,
            auto_delete_queues_skip_usage_check: false,
            max_size_bytes: default_max_size_bytes(),
            page_size_bytes: default_page_size_bytes(),
            id_cache_size: default_id_cache_size(),
            reap_through_implicit_links: false,
        }
    }
}

impl AddressSettings {
    pub fn auto_delete_addresses_delay(&self) -> Duration {
        Duration::from_millis(self.auto_delete_addresses_delay_ms)
    }

    pub fn auto_delete_queues_delay(&self) -> Duration {
        Duration::from_millis(self.auto_delete_queues_delay_ms)
    }
}

/// Static configuration of one broker node.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Node name, also used in cluster identification.
    pub name: String,
    /// Host the acceptors bind to.
    pub host: String,
    /// Core protocol acceptor port.
    pub core_port: u16,
    /// MQTT acceptor port.
    pub mqtt_port: u16,
    /// Root of journal, bindings, paging and large-message directories.
    pub data_directory: PathBuf,
    /// Enables the journal and paging stores.
    pub persistence_enabled: bool,
    /// Keep duplicate-ID caches for durable messages.
    pub persist_id_cache: bool,
    pub journal_file_size: u64,
    pub journal_min_files: usize,
    /// Period of the address/queue reaper; zero disables the reaper thread.
    pub address_queue_scan_period: Duration,
    /// Simulated activation time between `start()` and `Started`.
    pub activation_delay: Duration,
    pub wildcard: WildcardConfig,
    pub address_settings: AddressSettings,
    /// Cluster connection, `None` when clustering is disabled.
    pub cluster: Option<ClusterConfig>,
}

/// Cluster connection settings.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub name: String,
    /// `host:port` of every peer core acceptor.
    pub static_connectors: Vec<String>,
    pub max_hops: u8,
}

impl BrokerConfig {
    /// Configuration with the defaults used by the leak reproduction.
    pub fn new(name: impl Into<String>, data_directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            host: "localhost".to_string(),
            core_port: 61616,
            mqtt_port: 1883,
            data_directory: data_directory.into(),
            persistence_enabled: true,
            persist_id_cache: true,
            journal_file_size: 1024 * 1024,
            journal_min_files: 2,
            address_queue_scan_period: Duration::from_millis(500),
            activation_delay: Duration::ZERO,
            wildcard: WildcardConfig::default(),
            address_settings: AddressSettings::default(),
            cluster: None,
        }
    }

    pub fn journal_directory(&self) -> PathBuf {
        self.data_directory.join("journal")
    }

    pub fn bindings_directory(&self) -> PathBuf {
        self.data_directory.join("bindings")
    }

    pub fn paging_directory(&self) -> PathBuf {
        self.data_directory.join("paging")
    }

    pub fn large_messages_directory(&self) -> PathBuf {
        self.data_directory.join("largemessages")
    }

    pub fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BrokerError::Config("broker name cannot be empty".into()));
        }
        if self.core_port == self.mqtt_port {
            return Err(BrokerError::Config(format!(
                "broker '{}' uses port {} for both core and mqtt",
                self.name, self.core_port
            )));
        }
        if self.address_settings.id_cache_size == 0 {
            return Err(BrokerError::Config("id_cache_size cannot be 0".into()));
        }
        if self.persistence_enabled && self.journal_file_size == 0 {
            return Err(BrokerError::Config("journal_file_size cannot be 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BrokerConfig::new("broker", "target/data");
        assert!(config.validate().is_ok());
        assert_eq!(config.address_settings.id_cache_size, 2000);
        assert_eq!(config.journal_directory(), PathBuf::from("target/data/journal"));
    }

    #[test]
    fn test_port_clash_rejected() {
        let mut config = BrokerConfig::new("broker", "target/data");
        config.mqtt_port = config.core_port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_address_settings_serde_defaults() {
        let settings: AddressSettings = serde_json::from_str("{}").expect("parse");
        assert!(settings.auto_delete_addresses);
        assert_eq!(settings.max_size_bytes, 10 * 1024 * 1024);
        assert!(!settings.reap_through_implicit_links);
    }
}
