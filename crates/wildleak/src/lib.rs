// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wildcard subscription retention harness
//!
//! Stands up a small broker cluster, publishes bursts to many distinct
//! `publish/...` addresses, attaches one of two consumer variants on
//! `publish/#` and samples the primary node's bookkeeping on every tick.
//!
//! # Consumer variants
//!
//! - **Core** (`core_consumer_enabled = true`): the harness creates and
//!   owns a temporary queue. Unused addresses are reaped.
//! - **MQTT** (default): a `$share/ebs-group/publish/#` subscription whose
//!   queue is created by the broker. Addresses accumulate.
//!
//! # Quick Start
//!
//! ```bash
//! # Default three-node mesh, MQTT consumer, burst every 10 s
//! wildleak
//!
//! # Core consumer, small bursts, stop after 20
//! wildleak --core-consumer --address-count 50 --max-bursts 20
//!
//! # Using config file
//! wildleak --config wildleak.toml --snapshot-out snapshots.jsonl
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! [amq]
//! broker_name = "artemis-broker"
//! data_directory = "target/wildleak-data"
//!
//! [repro]
//! address_count = 1000
//! core_consumer_enabled = false
//!
//! [schedule]
//! period_ms = 10000
//! ```

pub mod config;
pub mod consumer;
pub mod diagnostics;
pub mod error;
pub mod orchestrator;
pub mod publisher;
pub mod topology;

pub use config::{ConfigError, HarnessConfig};
pub use consumer::{ConsumerVariant, CoreConsumer, MqttConsumer, SUBSCRIPTION_FILTER};
pub use diagnostics::{
    BrokerIntrospection, DiagnosticsSampler, DiagnosticsSnapshot, IntrospectionError,
    JsonLinesSink, LogSink, MemorySink, SampleError, SnapshotSink, TrendVerdict,
};
pub use error::HarnessError;
pub use orchestrator::{clean_data_directory, Harness, TickReport};
pub use publisher::{BurstReport, SyntheticPublisher, FIXED_ADDRESS, PUBLISH_PREFIX};
pub use topology::{BrokerNodeSpec, ClusterTopology, NodeRole};
