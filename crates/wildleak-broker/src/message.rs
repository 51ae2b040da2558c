// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker messages.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Routing discipline of a queue or message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoutingType {
    /// Point-to-point: one matching queue receives the message.
    Anycast,
    /// Fan-out: every matching queue receives a copy.
    #[default]
    Multicast,
}

/// A message in flight through the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: Uuid,
    /// Destination address, set on send.
    pub address: String,
    /// Opaque body.
    pub body: Vec<u8>,
    /// Durable messages are journaled and duplicate-tracked.
    pub durable: bool,
    pub routing_type: RoutingType,
    /// Creation time (Unix milliseconds).
    pub timestamp_ms: u64,
    /// Explicit duplicate-detection id; falls back to `id` when absent.
    pub duplicate_id: Option<String>,
}

impl Message {
    /// Create an empty message.
    pub fn new(durable: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: String::new(),
            body: Vec::new(),
            durable,
            routing_type: RoutingType::default(),
            timestamp_ms: now_millis(),
            duplicate_id: None,
        }
    }

    /// Set the body from UTF-8 text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = text.into().into_bytes();
        self
    }

    pub fn with_routing_type(mut self, routing_type: RoutingType) -> Self {
        self.routing_type = routing_type;
        self
    }

    pub fn with_duplicate_id(mut self, id: impl Into<String>) -> Self {
        self.duplicate_id = Some(id.into());
        self
    }

    /// Body as UTF-8 text, if valid.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Key used by duplicate-ID caches.
    pub fn duplicate_key(&self) -> String {
        self.duplicate_id
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }

    /// Approximate in-memory footprint, used for paging accounting.
    pub fn encoded_size(&self) -> u64 {
        (self.body.len() + self.address.len() + 64) as u64
    }
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_prefers_explicit_id() {
        let msg = Message::new(true);
        assert_eq!(msg.duplicate_key(), msg.id.to_string());

        let msg = msg.with_duplicate_id("BRIDGE.node:1");
        assert_eq!(msg.duplicate_key(), "BRIDGE.node:1");
    }

    #[test]
    fn test_text_body() {
        let msg = Message::new(false).with_text("{\"index\": 1}");
        assert_eq!(msg.text(), Some("{\"index\": 1}"));
        assert!(msg.encoded_size() >= msg.body.len() as u64);
    }
}
