// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer variants attached to the primary node.
//!
//! - [`CoreConsumer`]: client-created temporary queue on `publish/#`.
//! - [`MqttConsumer`]: `$share/ebs-group/publish/#` subscription, backed by a
//!   broker-created queue.

mod core;
mod mqtt;

pub use self::core::CoreConsumer;
pub use self::mqtt::{
    shared_filter, wait_for_started, MqttConsumer, ACCEPTOR_SETTLE, SHARE_GROUP, STARTUP_BACKOFF,
    STARTUP_RETRIES,
};

use crate::error::HarnessError;
use wildleak_broker::{BrokerServer, Fabric};

/// Wildcard filter both variants consume from.
pub const SUBSCRIPTION_FILTER: &str = "publish/#";

/// The consumer attached for a run; chosen once at startup.
pub enum ConsumerVariant {
    Core(CoreConsumer),
    Mqtt(MqttConsumer),
}

impl ConsumerVariant {
    /// Start the variant selected by `core_consumer_enabled`.
    pub fn start(
        core_consumer_enabled: bool,
        fabric: &Fabric,
        primary: &BrokerServer,
        core_url: &str,
        log_every: u64,
    ) -> Result<Self, HarnessError> {
        if core_consumer_enabled {
            Ok(Self::Core(CoreConsumer::start(fabric, core_url, log_every)?))
        } else {
            Ok(Self::Mqtt(MqttConsumer::start(fabric, primary, log_every)?))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Core(_) => "core",
            Self::Mqtt(_) => "mqtt",
        }
    }

    /// Messages received so far.
    pub fn received(&self) -> u64 {
        match self {
            Self::Core(c) => c.received(),
            Self::Mqtt(m) => m.received(),
        }
    }

    /// Name of the queue owned by the harness, if the variant owns one.
    pub fn owned_queue(&self) -> Option<&str> {
        match self {
            Self::Core(c) => Some(c.queue_name()),
            Self::Mqtt(_) => None,
        }
    }

    pub fn shutdown(self) {
        match self {
            Self::Core(c) => c.shutdown(),
            Self::Mqtt(m) => m.shutdown(),
        }
    }
}
