// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MQTT-style client.
//!
//! Subscriptions are backed by broker-created (implicit) queues:
//! `$share/<group>/<filter>` maps to `<group>.<filter>` shared by every member
//! of the group, a plain filter maps to `<client-id>.<filter>`.

use super::{invoke_handler, join_delivery_thread};
use crate::error::{BrokerError, Result};
use crate::queue::{Queue, QueueConfig, QueueOrigin};
use crate::server::ServerInner;
use crate::transport::{Endpoint, Fabric, Protocol};
use crossbeam::channel::unbounded;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Address and queue created by the first MQTT connection to a node.
pub const MQTT_SESSIONS_ADDRESS: &str = "$sys.mqtt.sessions";

const SHARE_PREFIX: &str = "$share/";

/// Delivery guarantee of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// A message handed to a subscription callback.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Parsed subscription filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub share_group: Option<String>,
    pub filter: String,
}

impl TopicFilter {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || BrokerError::InvalidAddress(format!("bad topic filter '{}'", raw));
        let parsed = match raw.strip_prefix(SHARE_PREFIX) {
            Some(rest) => {
                let (group, filter) = rest.split_once('/').ok_or_else(invalid)?;
                if group.is_empty() {
                    return Err(invalid());
                }
                Self {
                    share_group: Some(group.to_string()),
                    filter: filter.to_string(),
                }
            }
            None => Self {
                share_group: None,
                filter: raw.to_string(),
            },
        };
        if parsed.filter.is_empty() {
            return Err(invalid());
        }
        Ok(parsed)
    }

    /// Name of the queue backing this subscription for `client_id`.
    pub fn queue_name(&self, client_id: &str) -> String {
        match &self.share_group {
            Some(group) => format!("{}.{}", group, self.filter),
            None => format!("{}.{}", client_id, self.filter),
        }
    }

    pub fn is_shared(&self) -> bool {
        self.share_group.is_some()
    }
}

struct Subscription {
    filter: TopicFilter,
    queue: Arc<Queue>,
    consumer_id: u64,
    thread: Option<JoinHandle<()>>,
}

struct Connection {
    server: Arc<ServerInner>,
    clean_start: bool,
    subscriptions: Vec<Subscription>,
}

/// Builder for [`MqttClient`].
pub struct MqttClientBuilder {
    fabric: Fabric,
    identifier: Option<String>,
    host: String,
    port: u16,
}

impl MqttClientBuilder {
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn server_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn server_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn build(self) -> Result<MqttClient> {
        let identifier = self
            .identifier
            .unwrap_or_else(|| format!("client-{}", uuid::Uuid::new_v4().simple()));
        if identifier.is_empty() {
            return Err(BrokerError::Config("mqtt client identifier cannot be empty".into()));
        }
        Ok(MqttClient {
            identifier,
            endpoint: Endpoint::new(self.host, self.port),
            fabric: self.fabric,
            connection: Mutex::new(None),
        })
    }
}

/// MQTT 5 style client with shared-subscription support.
pub struct MqttClient {
    identifier: String,
    endpoint: Endpoint,
    fabric: Fabric,
    connection: Mutex<Option<Connection>>,
}

impl MqttClient {
    pub fn builder(fabric: &Fabric) -> MqttClientBuilder {
        MqttClientBuilder {
            fabric: fabric.clone(),
            identifier: None,
            host: "localhost".to_string(),
            port: 1883,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Connect to the MQTT acceptor. Connecting twice is a no-op.
    pub fn connect(&self, clean_start: bool) -> Result<()> {
        let mut connection = self.connection.lock();
        if connection.is_some() {
            return Ok(());
        }
        let server = self.fabric.connect(&self.endpoint, Protocol::Mqtt)?;
        let post_office = server.post_office()?;
        if post_office.queue(MQTT_SESSIONS_ADDRESS).is_none() {
            post_office.create_address(MQTT_SESSIONS_ADDRESS)?;
            post_office.bind_queue(QueueConfig::new(MQTT_SESSIONS_ADDRESS))?;
        }
        tracing::debug!(
            "MQTT client {} connected to {} (clean_start={})",
            self.identifier,
            self.endpoint,
            clean_start
        );
        *connection = Some(Connection {
            server,
            clean_start,
            subscriptions: Vec::new(),
        });
        Ok(())
    }

    /// Subscribe `filter`; `callback` runs on a delivery thread per subscription.
    ///
    /// QoS 0 messages are acknowledged before the callback, higher levels after.
    pub fn subscribe<F>(&self, filter: &str, qos: QoS, callback: F) -> Result<()>
    where
        F: Fn(&MqttMessage) + Send + 'static,
    {
        let filter = TopicFilter::parse(filter)?;
        let mut guard = self.connection.lock();
        let connection = guard
            .as_mut()
            .ok_or_else(|| BrokerError::NotConnected(self.identifier.clone()))?;
        let post_office = connection.server.post_office()?;

        let (tx, rx) = unbounded();
        let (queue, consumer_id) = post_office.bind_and_attach(
            QueueConfig::new(filter.queue_name(&self.identifier))
                .address(filter.filter.clone())
                .durable(qos > QoS::AtMostOnce)
                .auto_created(true)
                .origin(QueueOrigin::Implicit),
            tx,
        )?;

        let label = format!("mqtt[{}]", self.identifier);
        let thread = thread::Builder::new()
            .name(format!("mqtt-{}", consumer_id))
            .spawn(move || {
                for delivery in rx.iter() {
                    let message = MqttMessage {
                        topic: delivery.message().address.clone(),
                        payload: delivery.message().body.clone(),
                        qos,
                    };
                    if qos == QoS::AtMostOnce {
                        delivery.acknowledge();
                    }
                    invoke_handler(&label, || callback(&message));
                    delivery.acknowledge();
                }
            });
        let thread = match thread {
            Ok(handle) => handle,
            Err(e) => {
                queue.remove_consumer(consumer_id);
                return Err(e.into());
            }
        };

        tracing::debug!(
            "MQTT client {} subscribed to {} via queue {}",
            self.identifier,
            filter.filter,
            queue.name()
        );
        connection.subscriptions.push(Subscription {
            filter,
            queue,
            consumer_id,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Connected and the node is still started.
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .as_ref()
            .map(|c| c.server.is_started())
            .unwrap_or(false)
    }

    /// Detach all subscriptions. With clean start, the client's own
    /// (non-shared) subscription queues are removed; shared queues are left to
    /// the broker.
    pub fn disconnect(&self) -> Result<()> {
        let Some(mut connection) = self.connection.lock().take() else {
            return Ok(());
        };
        for sub in &mut connection.subscriptions {
            sub.queue.remove_consumer(sub.consumer_id);
            if let Some(handle) = sub.thread.take() {
                join_delivery_thread(handle);
            }
        }

        if connection.clean_start {
            if let Ok(post_office) = connection.server.post_office() {
                for sub in connection.subscriptions.iter().filter(|s| !s.filter.is_shared()) {
                    match post_office.destroy_queue(sub.queue.name()) {
                        Ok(()) | Err(BrokerError::QueueNotFound(_)) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        tracing::debug!("MQTT client {} disconnected", self.identifier);
        Ok(())
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::debug!("MQTT disconnect on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::server::BrokerServer;
    use crate::settings::BrokerConfig;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[test]
    fn test_parse_shared_filter() {
        let f = TopicFilter::parse("$share/ebs-group/publish/#").expect("parse");
        assert_eq!(f.share_group.as_deref(), Some("ebs-group"));
        assert_eq!(f.filter, "publish/#");
        assert_eq!(f.queue_name("c1"), "ebs-group.publish/#");

        let plain = TopicFilter::parse("publish/+").expect("parse");
        assert!(!plain.is_shared());
        assert_eq!(plain.queue_name("c1"), "c1.publish/+");

        assert!(TopicFilter::parse("$share/").is_err());
        assert!(TopicFilter::parse("$share//publish/#").is_err());
        assert!(TopicFilter::parse("").is_err());
    }

    #[test]
    fn test_subscribe_requires_connection() {
        let client = MqttClient::builder(&Fabric::new())
            .identifier("c")
            .build()
            .expect("build");
        let err = client
            .subscribe("publish/#", QoS::AtLeastOnce, |_| {})
            .expect_err("not connected");
        assert!(matches!(err, BrokerError::NotConnected(_)));
    }

    #[test]
    fn test_shared_subscription_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fabric = Fabric::new();
        let mut config = BrokerConfig::new("mqtt-test", dir.path());
        config.address_queue_scan_period = Duration::ZERO;
        let server = BrokerServer::new(config, &fabric).expect("server");
        server.start().expect("start");
        assert!(server.wait_for_start(Duration::from_secs(5)));

        let client = MqttClient::builder(&fabric)
            .identifier("consumer-1")
            .server_host("localhost")
            .server_port(1883)
            .build()
            .expect("build");
        client.connect(true).expect("connect");
        assert!(client.is_connected());

        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);
        client
            .subscribe("$share/ebs-group/publish/#", QoS::AtLeastOnce, move |msg| {
                assert!(msg.topic.starts_with("publish/"));
                seen.fetch_add(1, Ordering::Relaxed);
            })
            .expect("subscribe");

        let po = server.post_office().expect("post office");
        assert!(po.address(MQTT_SESSIONS_ADDRESS).is_some());
        let queue = po.queue("ebs-group.publish/#").expect("shared queue");
        assert_eq!(queue.origin(), QueueOrigin::Implicit);

        server
            .route("publish/a/b", Message::new(true))
            .expect("route");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.messages_acknowledged() == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(queue.message_count(), 0);

        client.disconnect().expect("disconnect");
        client.disconnect().expect("disconnect twice");
        assert!(!client.is_connected());
        // Shared queues outlive the subscriber.
        assert!(po.queue("ebs-group.publish/#").is_some());
        assert_eq!(queue.consumer_count(), 0);
        server.stop().expect("stop");
    }

    #[test]
    fn test_clean_start_removes_private_queue() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fabric = Fabric::new();
        let mut config = BrokerConfig::new("mqtt-test", dir.path());
        config.address_queue_scan_period = Duration::ZERO;
        let server = BrokerServer::new(config, &fabric).expect("server");
        server.start().expect("start");
        assert!(server.wait_for_start(Duration::from_secs(5)));

        let client = MqttClient::builder(&fabric)
            .identifier("c1")
            .build()
            .expect("build");
        client.connect(true).expect("connect");
        client
            .subscribe("publish/+", QoS::AtMostOnce, |_| {})
            .expect("subscribe");
        let po = server.post_office().expect("post office");
        assert!(po.queue("c1.publish/+").is_some());

        client.disconnect().expect("disconnect");
        assert!(po.queue("c1.publish/+").is_none());
        server.stop().expect("stop");
    }
}
