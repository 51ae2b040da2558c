// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process broker model for the wildleak harness.
//!
//! Reproduces the resource bookkeeping of a clustered, address-based message
//! broker: auto-created addresses and queues, wildcard bindings, duplicate-ID
//! caches, paging stores and a rolling journal on disk.
//!
//! # Features
//!
//! - **Address space**: hierarchical addresses with `+` / `#` wildcards
//! - **Auto-delete reaper**: periodic removal of idle queues and addresses
//! - **Cluster**: static full-mesh bridges with ON_DEMAND forwarding
//! - **Clients**: core sessions and an MQTT-style client with shared subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use wildleak_broker::{BrokerConfig, BrokerServer, Fabric};
//! use std::time::Duration;
//!
//! let fabric = Fabric::new();
//! let server = BrokerServer::new(BrokerConfig::new("node-a", "target/node-a"), &fabric)?;
//! server.start()?;
//! server.wait_for_start(Duration::from_secs(5));
//! let addresses = server.post_office()?.address_names();
//! server.stop()?;
//! # Ok::<(), wildleak_broker::BrokerError>(())
//! ```

pub mod address;
pub mod client;
pub mod cluster;
pub mod dupcache;
pub mod error;
pub mod journal;
pub mod message;
pub mod paging;
pub mod postoffice;
pub mod queue;
pub mod server;
pub mod settings;
pub mod transport;

pub use address::AddressPattern;
pub use client::core::{
    ClientConsumer, ClientProducer, ClientSession, ClientSessionFactory, ServerLocator,
};
pub use client::mqtt::{MqttClient, MqttClientBuilder, MqttMessage, QoS, MQTT_SESSIONS_ADDRESS};
pub use cluster::{ClusterConnection, SF_QUEUE_PREFIX};
pub use dupcache::{DuplicateIdCache, BRIDGE_CACHE_PREFIX};
pub use error::{BrokerError, Result};
pub use message::{Message, RoutingType};
pub use postoffice::{AddressInfo, BindingInfo, PostOffice, ReapStats, RouteOutcome};
pub use queue::{Delivery, Queue, QueueConfig, QueueOrigin};
pub use server::{BrokerServer, ServerState};
pub use settings::{AddressSettings, BrokerConfig, ClusterConfig, WildcardConfig};
pub use transport::{Endpoint, Fabric, Protocol};
