// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT consumer: a shared subscription on `publish/#`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wildleak_broker::{BrokerServer, Fabric, MqttClient, QoS};

use super::SUBSCRIPTION_FILTER;
use crate::error::HarnessError;

/// Share group of the subscription.
pub const SHARE_GROUP: &str = "ebs-group";

/// Polls of the node state before giving up.
pub const STARTUP_RETRIES: u32 = 30;

/// Delay between node state polls.
pub const STARTUP_BACKOFF: Duration = Duration::from_millis(100);

/// Settle time for the MQTT acceptor after the node reports started.
pub const ACCEPTOR_SETTLE: Duration = Duration::from_millis(500);

/// Topic filter subscribed by the consumer.
pub fn shared_filter() -> String {
    format!("$share/{}/{}", SHARE_GROUP, SUBSCRIPTION_FILTER)
}

/// Poll `server` until it reports started.
pub fn wait_for_started(server: &BrokerServer, retries: u32, backoff: Duration) -> Result<(), HarnessError> {
    for attempt in 0..=retries {
        if server.is_started() {
            return Ok(());
        }
        if attempt < retries {
            std::thread::sleep(backoff);
        }
    }
    Err(HarnessError::StartupTimeout {
        node: server.name().to_string(),
        waited_ms: backoff.as_millis() as u64 * u64::from(retries),
    })
}

/// Consumer that relies on a broker-created shared subscription queue.
pub struct MqttConsumer {
    client_id: String,
    received: Arc<AtomicU64>,
    client: MqttClient,
}

impl MqttConsumer {
    /// Wait for `server`, connect to its MQTT acceptor and subscribe.
    pub fn start(fabric: &Fabric, server: &BrokerServer, log_every: u64) -> Result<Self, HarnessError> {
        wait_for_started(server, STARTUP_RETRIES, STARTUP_BACKOFF)?;
        std::thread::sleep(ACCEPTOR_SETTLE);

        let config = server.config();
        let client_id = format!("consumer-{}", Uuid::new_v4());
        let client = MqttClient::builder(fabric)
            .identifier(&client_id)
            .server_host(&config.host)
            .server_port(config.mqtt_port)
            .build()?;
        client.connect(true)?;

        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);
        let log_every = log_every.max(1);
        let label = client_id.clone();
        client.subscribe(&shared_filter(), QoS::AtLeastOnce, move |_message| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if n % log_every == 0 {
                tracing::info!("{}: received {} messages", label, n);
            }
        })?;

        tracing::info!(
            "MQTT consumer {} subscribed to {} on {}:{}",
            client_id,
            shared_filter(),
            config.host,
            config.mqtt_port
        );
        Ok(Self {
            client_id,
            received,
            client,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Disconnect; the shared queue is left to the broker.
    pub fn shutdown(self) {
        if let Err(e) = self.client.disconnect() {
            tracing::warn!("MQTT consumer disconnect failed: {}", e);
        }
        tracing::info!(
            "MQTT consumer {} stopped after {} messages",
            self.client_id,
            self.received()
        );
    }
}
