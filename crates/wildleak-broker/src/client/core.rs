// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core protocol client.
//!
//! `ServerLocator` -> `ClientSessionFactory` -> `ClientSession`, which creates
//! queues, producers and consumers. Consumers with a message handler get a
//! dedicated delivery thread; deliveries start once the session is started.

use super::{invoke_handler, join_delivery_thread, StartGate};
use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::postoffice::PostOffice;
use crate::queue::{Delivery, Queue, QueueConfig};
use crate::server::ServerInner;
use crate::transport::{Endpoint, Fabric, Protocol};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const GATE_POLL: Duration = Duration::from_millis(50);

/// Where to find a broker.
pub struct ServerLocator {
    fabric: Fabric,
    endpoint: Endpoint,
    closed: AtomicBool,
}

impl ServerLocator {
    /// Locator for `tcp://host:port`.
    pub fn new(fabric: &Fabric, url: &str) -> Result<Self> {
        Ok(Self {
            fabric: fabric.clone(),
            endpoint: Endpoint::parse_url(url)?,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Connect; fails with `ConnectionRefused` until the node is started.
    pub fn create_session_factory(&self) -> Result<ClientSessionFactory> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed("server locator"));
        }
        let server = self.fabric.connect(&self.endpoint, Protocol::Core)?;
        tracing::debug!("Connected to {} ({})", server.name(), self.endpoint);
        Ok(ClientSessionFactory {
            server,
            closed: AtomicBool::new(false),
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A connection to one node.
pub struct ClientSessionFactory {
    server: Arc<ServerInner>,
    closed: AtomicBool,
}

impl ClientSessionFactory {
    pub fn create_session(&self) -> Result<ClientSession> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed("session factory"));
        }
        self.server.post_office()?;
        Ok(ClientSession {
            shared: Arc::new(SessionShared {
                server: Arc::clone(&self.server),
                gate: StartGate::default(),
                closed: AtomicBool::new(false),
                temporary_queues: Mutex::new(Vec::new()),
                consumers: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct SessionShared {
    server: Arc<ServerInner>,
    gate: StartGate,
    closed: AtomicBool,
    temporary_queues: Mutex<Vec<String>>,
    consumers: Mutex<Vec<Weak<ConsumerShared>>>,
}

impl SessionShared {
    fn post_office(&self) -> Result<Arc<PostOffice>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed("session"));
        }
        self.server.post_office()
    }
}

/// A unit of work against one node.
pub struct ClientSession {
    shared: Arc<SessionShared>,
}

impl ClientSession {
    /// Allow deliveries to consumers of this session.
    pub fn start(&self) -> Result<()> {
        self.shared.post_office()?;
        self.shared.gate.open();
        Ok(())
    }

    pub fn create_message(&self, durable: bool) -> Message {
        Message::new(durable)
    }

    /// Create a queue; temporary queues are destroyed when the session closes.
    pub fn create_queue(&self, config: QueueConfig) -> Result<()> {
        let post_office = self.shared.post_office()?;
        let temporary = config.temporary;
        let queue = post_office.bind_queue(config)?;
        if temporary {
            self.shared
                .temporary_queues
                .lock()
                .push(queue.name().to_string());
        }
        Ok(())
    }

    pub fn delete_queue(&self, name: &str) -> Result<()> {
        self.shared.post_office()?.destroy_queue(name)?;
        self.shared.temporary_queues.lock().retain(|q| q != name);
        Ok(())
    }

    pub fn create_consumer(&self, queue_name: &str) -> Result<ClientConsumer> {
        let queue = self
            .shared
            .post_office()?
            .queue(queue_name)
            .ok_or_else(|| BrokerError::QueueNotFound(queue_name.to_string()))?;
        let (tx, rx) = unbounded();
        // Fails if the reaper retired the queue since the lookup.
        let consumer_id = queue.add_consumer(tx)?;
        let shared = Arc::new(ConsumerShared {
            queue,
            consumer_id,
            session: Arc::downgrade(&self.shared),
            rx: Mutex::new(Some(rx)),
            thread: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        self.shared.consumers.lock().push(Arc::downgrade(&shared));
        Ok(ClientConsumer { shared })
    }

    pub fn create_producer(&self, address: &str) -> Result<ClientProducer> {
        self.shared.post_office()?;
        Ok(ClientProducer {
            session: Arc::clone(&self.shared),
            address: address.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Close consumers and destroy temporary queues. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let consumers = std::mem::take(&mut *self.shared.consumers.lock());
        for consumer in consumers.iter().filter_map(Weak::upgrade) {
            consumer.close();
        }

        let temporary = std::mem::take(&mut *self.shared.temporary_queues.lock());
        if temporary.is_empty() {
            return Ok(());
        }
        // A stopped node has already dropped its queues.
        let Ok(post_office) = self.shared.server.post_office() else {
            return Ok(());
        };
        for name in temporary {
            match post_office.destroy_queue(&name) {
                Ok(()) | Err(BrokerError::QueueNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("Session close on drop failed: {}", e);
        }
    }
}

struct ConsumerShared {
    queue: Arc<Queue>,
    consumer_id: u64,
    session: Weak<SessionShared>,
    rx: Mutex<Option<Receiver<Delivery>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ConsumerShared {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the queue-side sender ends the delivery loop.
        self.queue.remove_consumer(self.consumer_id);
        self.rx.lock().take();
        if let Some(handle) = self.thread.lock().take() {
            join_delivery_thread(handle);
        }
    }
}

/// Receives messages from one queue.
pub struct ClientConsumer {
    shared: Arc<ConsumerShared>,
}

impl ClientConsumer {
    pub fn queue_name(&self) -> &str {
        self.shared.queue.name()
    }

    /// Deliver messages to `handler` on a dedicated thread.
    pub fn set_message_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Delivery) + Send + 'static,
    {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed("consumer"));
        }
        let rx = self
            .shared
            .rx
            .lock()
            .take()
            .ok_or_else(|| BrokerError::HandlerAlreadySet(self.queue_name().to_string()))?;

        let shared = Arc::downgrade(&self.shared);
        let label = format!("consumer[{}]", self.queue_name());
        let handle = thread::Builder::new()
            .name(format!("delivery-{}", self.shared.consumer_id))
            .spawn(move || {
                if !wait_for_start(&shared) {
                    return;
                }
                for delivery in rx.iter() {
                    invoke_handler(&label, || handler(delivery));
                }
            })?;
        *self.shared.thread.lock() = Some(handle);
        Ok(())
    }

    /// Pull one message; only valid when no handler is set.
    pub fn receive(&self, timeout: Duration) -> Result<Option<Delivery>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed("consumer"));
        }
        let guard = self.shared.rx.lock();
        let rx = guard
            .as_ref()
            .ok_or_else(|| BrokerError::HandlerAlreadySet(self.queue_name().to_string()))?;
        match rx.recv_timeout(timeout) {
            Ok(delivery) => Ok(Some(delivery)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BrokerError::Closed("queue")),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for ClientConsumer {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Block until the owning session starts; `false` if the consumer closes first.
fn wait_for_start(consumer: &Weak<ConsumerShared>) -> bool {
    loop {
        let Some(consumer) = consumer.upgrade() else {
            return false;
        };
        if consumer.closed.load(Ordering::Acquire) {
            return false;
        }
        let Some(session) = consumer.session.upgrade() else {
            return false;
        };
        drop(consumer);
        if session.gate.wait_timeout(GATE_POLL) {
            return true;
        }
    }
}

/// Sends messages to one address.
pub struct ClientProducer {
    session: Arc<SessionShared>,
    address: String,
    closed: AtomicBool,
}

impl ClientProducer {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn send(&self, message: Message) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed("producer"));
        }
        self.session.post_office()?;
        self.session.server.route(&self.address, message)?;
        Ok(())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::BrokerServer;
    use crate::settings::BrokerConfig;
    use std::sync::atomic::AtomicU64;

    fn started(dir: &std::path::Path, fabric: &Fabric) -> BrokerServer {
        let mut config = BrokerConfig::new("core-test", dir);
        config.address_queue_scan_period = Duration::ZERO;
        let server = BrokerServer::new(config, fabric).expect("server");
        server.start().expect("start");
        assert!(server.wait_for_start(Duration::from_secs(5)));
        server
    }

    #[test]
    fn test_refused_before_start() {
        let fabric = Fabric::new();
        let locator = ServerLocator::new(&fabric, "tcp://localhost:61616").expect("locator");
        assert!(matches!(
            locator.create_session_factory(),
            Err(BrokerError::ConnectionRefused(_))
        ));
    }

    #[test]
    fn test_handler_receives_after_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fabric = Fabric::new();
        let server = started(dir.path(), &fabric);

        let locator = ServerLocator::new(&fabric, "tcp://localhost:61616").expect("locator");
        let factory = locator.create_session_factory().expect("factory");
        let session = factory.create_session().expect("session");
        session
            .create_queue(QueueConfig::new("q").address("publish/#").durable(false))
            .expect("queue");
        let consumer = session.create_consumer("q").expect("consumer");

        let count = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&count);
        consumer
            .set_message_handler(move |delivery| {
                seen.fetch_add(1, Ordering::Relaxed);
                delivery.acknowledge();
            })
            .expect("handler");
        assert!(consumer.set_message_handler(|_| {}).is_err());

        let producer = session.create_producer("publish/a/b").expect("producer");
        producer
            .send(session.create_message(true).with_text("x"))
            .expect("send");
        producer.close();
        assert!(producer.send(Message::new(true)).is_err());

        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::Relaxed), 0);

        session.start().expect("start");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::Relaxed) == 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(count.load(Ordering::Relaxed), 1);

        consumer.close();
        session.close().expect("close");
        server.stop().expect("stop");
    }

    #[test]
    fn test_temporary_queue_dies_with_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fabric = Fabric::new();
        let server = started(dir.path(), &fabric);

        let locator = ServerLocator::new(&fabric, "tcp://localhost:61616").expect("locator");
        let factory = locator.create_session_factory().expect("factory");
        let session = factory.create_session().expect("session");
        session
            .create_queue(
                QueueConfig::new("tmp")
                    .address("publish/#")
                    .durable(false)
                    .temporary(true),
            )
            .expect("queue");
        let _consumer = session.create_consumer("tmp").expect("consumer");

        let po = server.post_office().expect("post office");
        assert!(po.queue("tmp").is_some());
        session.close().expect("close");
        session.close().expect("close twice");
        assert!(po.queue("tmp").is_none());
        server.stop().expect("stop");
    }

    #[test]
    fn test_pull_receive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fabric = Fabric::new();
        let server = started(dir.path(), &fabric);

        let locator = ServerLocator::new(&fabric, "tcp://localhost:61616").expect("locator");
        let session = locator
            .create_session_factory()
            .expect("factory")
            .create_session()
            .expect("session");
        session.create_queue(QueueConfig::new("q")).expect("queue");
        let consumer = session.create_consumer("q").expect("consumer");
        assert!(consumer
            .receive(Duration::from_millis(10))
            .expect("receive")
            .is_none());

        server.route("q", Message::new(false)).expect("route");
        let delivery = consumer
            .receive(Duration::from_secs(1))
            .expect("receive")
            .expect("message");
        assert_eq!(delivery.queue_name(), "q");
        server.stop().expect("stop");
    }
}
