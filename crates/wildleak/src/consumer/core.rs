// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core consumer: a temporary, auto-created queue on `publish/#`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use wildleak_broker::{
    BrokerError, ClientConsumer, ClientSession, ClientSessionFactory, Fabric, QueueConfig,
    RoutingType, ServerLocator,
};

use super::SUBSCRIPTION_FILTER;

/// Consumer that owns its queue through a core session.
pub struct CoreConsumer {
    queue_name: String,
    received: Arc<AtomicU64>,
    locator: ServerLocator,
    factory: ClientSessionFactory,
    session: ClientSession,
    consumer: ClientConsumer,
}

impl CoreConsumer {
    /// Create the queue and start consuming. `log_every` controls progress logging.
    pub fn start(fabric: &Fabric, url: &str, log_every: u64) -> Result<Self, BrokerError> {
        let locator = ServerLocator::new(fabric, url)?;
        let factory = locator.create_session_factory()?;
        let session = factory.create_session()?;

        let queue_name = format!("core-consumer-{}", Uuid::new_v4());
        session.create_queue(
            QueueConfig::new(&queue_name)
                .address(SUBSCRIPTION_FILTER)
                .routing_type(RoutingType::Multicast)
                .durable(false)
                .temporary(true)
                .auto_created(true),
        )?;
        let consumer = session.create_consumer(&queue_name)?;

        let received = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&received);
        let log_every = log_every.max(1);
        let label = queue_name.clone();
        consumer.set_message_handler(move |delivery| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if n % log_every == 0 {
                tracing::info!("{}: received {} messages", label, n);
            }
            delivery.acknowledge();
        })?;
        session.start()?;

        tracing::info!("Core consumer started on queue {}", queue_name);
        Ok(Self {
            queue_name,
            received,
            locator,
            factory,
            session,
            consumer,
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Close consumer, session, factory and locator in that order.
    pub fn shutdown(self) {
        self.consumer.close();
        if let Err(e) = self.session.close() {
            tracing::warn!("Core consumer session close failed: {}", e);
        }
        self.factory.close();
        self.locator.close();
        tracing::info!(
            "Core consumer on {} stopped after {} messages",
            self.queue_name,
            self.received()
        );
    }
}
