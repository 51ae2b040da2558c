// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synthetic publisher.
//!
//! Each burst sends one durable multicast message to the fixed address and
//! one to each of `address_count - 1` freshly generated addresses, so the
//! broker sees a steady stream of never-reused concrete addresses.

use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;
use wildleak_broker::{
    message::now_millis, BrokerError, ClientSession, ClientSessionFactory, Fabric, RoutingType,
    ServerLocator,
};

/// Address that receives index 0 of every burst.
pub const FIXED_ADDRESS: &str =
    "publish/00000000-0000-0000-0000-000000000001/00000000-0000-0000-0000-000000000001";

/// Prefix of every harness-published address.
pub const PUBLISH_PREFIX: &str = "publish/";

/// JSON body of a synthetic event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventPayload<'a> {
    event_type: &'a str,
    index: usize,
    timestamp: u64,
}

/// Address for message `index` of a burst.
pub fn burst_address(index: usize) -> String {
    if index == 0 {
        FIXED_ADDRESS.to_string()
    } else {
        format!("{}{}/{}", PUBLISH_PREFIX, Uuid::new_v4(), Uuid::new_v4())
    }
}

/// Outcome of one burst.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurstReport {
    pub burst: u64,
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    /// Addresses in send order.
    pub addresses: Vec<String>,
    pub elapsed_ms: u64,
}

/// Publishes bursts over one long-lived core session.
pub struct SyntheticPublisher {
    address_count: usize,
    locator: ServerLocator,
    factory: ClientSessionFactory,
    session: ClientSession,
    bursts: u64,
}

impl SyntheticPublisher {
    /// Connect to `url` and open the publishing session.
    pub fn open(fabric: &Fabric, url: &str, address_count: usize) -> Result<Self, BrokerError> {
        let locator = ServerLocator::new(fabric, url)?;
        let factory = locator.create_session_factory()?;
        let session = factory.create_session()?;
        session.start()?;
        tracing::info!("Publisher connected to {} ({} addresses per burst)", url, address_count);
        Ok(Self {
            address_count,
            locator,
            factory,
            session,
            bursts: 0,
        })
    }

    pub fn bursts(&self) -> u64 {
        self.bursts
    }

    /// Send one message to each of `address_count` distinct addresses.
    ///
    /// Per-message failures are logged and counted; the burst continues.
    pub fn publish_burst(&mut self) -> BurstReport {
        self.bursts += 1;
        let started = Instant::now();
        let mut report = BurstReport {
            burst: self.bursts,
            attempted: self.address_count,
            addresses: Vec::with_capacity(self.address_count),
            ..BurstReport::default()
        };

        for index in 0..self.address_count {
            let address = burst_address(index);
            match self.send_one(&address, index) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Publish to {} failed: {}", address, e);
                }
            }
            report.addresses.push(address);
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Burst {}: sent {}/{} messages in {} ms",
            report.burst,
            report.sent,
            report.attempted,
            report.elapsed_ms
        );
        report
    }

    fn send_one(&self, address: &str, index: usize) -> Result<(), BrokerError> {
        let payload = serde_json::to_string(&EventPayload {
            event_type: "test.event",
            index,
            timestamp: now_millis(),
        })?;
        let message = self
            .session
            .create_message(true)
            .with_text(payload)
            .with_routing_type(RoutingType::Multicast);

        let producer = self.session.create_producer(address)?;
        let result = producer.send(message);
        producer.close();
        result
    }

    /// Close session, factory and locator; failures are logged.
    pub fn close(self) {
        if let Err(e) = self.session.close() {
            tracing::warn!("Publisher session close failed: {}", e);
        }
        self.factory.close();
        self.locator.close();
        tracing::info!("Publisher closed after {} bursts", self.bursts);
    }
}
