// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Queues, consumers and deliveries.

use crate::address::AddressPattern;
use crate::error::{BrokerError, Result};
use crate::journal::{Journal, JournalRecord};
use crate::message::{Message, RoutingType};
use crate::paging::PagingStore;
use crate::settings::{AddressSettings, WildcardConfig};
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Who created a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueOrigin {
    /// Created and owned by a client (core `create_queue`).
    #[default]
    Explicit,
    /// Created by the broker on behalf of a subscription filter.
    Implicit,
}

/// Queue creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub name: String,
    pub address: String,
    pub routing_type: RoutingType,
    pub durable: bool,
    /// Temporary queues die with the session that created them.
    pub temporary: bool,
    /// Auto-created queues are subject to auto-delete.
    pub auto_created: bool,
    pub origin: QueueOrigin,
}

impl QueueConfig {
    /// New durable multicast queue bound to an address of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            address: name.clone(),
            name,
            routing_type: RoutingType::Multicast,
            durable: true,
            temporary: false,
            auto_created: false,
            origin: QueueOrigin::Explicit,
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn routing_type(mut self, routing_type: RoutingType) -> Self {
        self.routing_type = routing_type;
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn auto_created(mut self, auto_created: bool) -> Self {
        self.auto_created = auto_created;
        self
    }

    pub fn origin(mut self, origin: QueueOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Two configs describe the same queue if everything but the origin agrees.
    pub fn compatible_with(&self, other: &QueueConfig) -> bool {
        self.name == other.name
            && self.address == other.address
            && self.routing_type == other.routing_type
            && self.durable == other.durable
            && self.temporary == other.temporary
    }
}

/// Side effects to run when a delivery is acknowledged.
#[derive(Clone, Default)]
pub(crate) struct AckContext {
    pub journal: Option<Arc<Journal>>,
    pub paging: Option<Arc<PagingStore>>,
}

/// A message handed to a consumer.
pub struct Delivery {
    message: Message,
    queue: Arc<Queue>,
    ctx: AckContext,
    acked: AtomicBool,
}

impl Delivery {
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Name of the queue the message was delivered from.
    pub fn queue_name(&self) -> &str {
        self.queue.name()
    }

    /// Acknowledge the message; repeated calls are ignored.
    pub fn acknowledge(&self) {
        if self.acked.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.acknowledged(&self.message, &self.ctx);
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }
}

struct ConsumerSlot {
    id: u64,
    tx: Sender<Delivery>,
}

/// A binding from consumers to an address (possibly a wildcard).
pub struct Queue {
    config: QueueConfig,
    pattern: AddressPattern,
    auto_delete: bool,
    auto_delete_delay: Duration,
    auto_delete_message_count: u64,
    skip_usage_check: bool,
    consumers: Mutex<Vec<ConsumerSlot>>,
    /// Set once the first consumer attaches.
    used: AtomicBool,
    next_consumer_id: AtomicU64,
    round_robin: AtomicUsize,
    pending: Mutex<VecDeque<(Message, AckContext)>>,
    message_count: AtomicU64,
    messages_added: AtomicU64,
    messages_acknowledged: AtomicU64,
    last_activity: Mutex<Instant>,
    deleted: AtomicBool,
}

impl Queue {
    pub(crate) fn new(
        config: QueueConfig,
        settings: &AddressSettings,
        wildcard: &WildcardConfig,
    ) -> Self {
        let pattern = AddressPattern::parse(&config.address, wildcard);
        Self {
            auto_delete: config.auto_created && settings.auto_delete_queues,
            auto_delete_delay: settings.auto_delete_queues_delay(),
            auto_delete_message_count: settings.auto_delete_queues_message_count,
            skip_usage_check: settings.auto_delete_queues_skip_usage_check,
            pattern,
            config,
            consumers: Mutex::new(Vec::new()),
            used: AtomicBool::new(false),
            next_consumer_id: AtomicU64::new(1),
            round_robin: AtomicUsize::new(0),
            pending: Mutex::new(VecDeque::new()),
            message_count: AtomicU64::new(0),
            messages_added: AtomicU64::new(0),
            messages_acknowledged: AtomicU64::new(0),
            last_activity: Mutex::new(Instant::now()),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn origin(&self) -> QueueOrigin {
        self.config.origin
    }

    pub fn pattern(&self) -> &AddressPattern {
        &self.pattern
    }

    pub fn is_wildcard(&self) -> bool {
        self.pattern.is_wildcard()
    }

    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }

    /// Messages added and not yet acknowledged.
    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    pub fn messages_added(&self) -> u64 {
        self.messages_added.load(Ordering::Relaxed)
    }

    pub fn messages_acknowledged(&self) -> u64 {
        self.messages_acknowledged.load(Ordering::Relaxed)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// True once a consumer has attached at least once.
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        let mut consumers = self.consumers.lock();
        self.deleted.store(true, Ordering::Release);
        // Dropping the senders ends every consumer delivery loop.
        consumers.clear();
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last add, ack or consumer change.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// True if the reaper may remove this queue now.
    ///
    /// A freshly created queue is held until its first consumer attaches.
    pub fn is_reapable(&self) -> bool {
        let consumers = self.consumers.lock();
        !self.is_deleted() && self.reapable_with(&consumers)
    }

    fn reapable_with(&self, consumers: &[ConsumerSlot]) -> bool {
        self.auto_delete
            && (self.skip_usage_check || self.is_used())
            && consumers.is_empty()
            && self.message_count() <= self.auto_delete_message_count
            && self.idle_for() >= self.auto_delete_delay
    }

    /// Mark the queue deleted if it is reapable, atomically with respect to
    /// `add_consumer`. Returns `true` if this call retired it.
    pub(crate) fn retire_if_reapable(&self) -> bool {
        let consumers = self.consumers.lock();
        if self.is_deleted() || !self.reapable_with(&consumers) {
            return false;
        }
        self.deleted.store(true, Ordering::Release);
        true
    }

    /// Attach a consumer; pending messages are flushed to it.
    ///
    /// Fails with [`BrokerError::QueueNotFound`] once the queue is deleted,
    /// so the caller can bind again.
    pub(crate) fn add_consumer(self: &Arc<Self>, tx: Sender<Delivery>) -> Result<u64> {
        let id = {
            let mut consumers = self.consumers.lock();
            if self.is_deleted() {
                return Err(BrokerError::QueueNotFound(self.config.name.clone()));
            }
            let id = self.next_consumer_id.fetch_add(1, Ordering::Relaxed);
            consumers.push(ConsumerSlot { id, tx });
            self.used.store(true, Ordering::Release);
            id
        };
        self.touch();

        let backlog: Vec<_> = self.pending.lock().drain(..).collect();
        for (message, ctx) in backlog {
            self.dispatch(message, ctx);
        }
        Ok(id)
    }

    pub(crate) fn remove_consumer(&self, id: u64) -> bool {
        let mut consumers = self.consumers.lock();
        let before = consumers.len();
        consumers.retain(|c| c.id != id);
        let removed = consumers.len() != before;
        drop(consumers);
        if removed {
            self.touch();
        }
        removed
    }

    /// Enqueue a message and hand it to a consumer if one is attached.
    pub(crate) fn add(self: &Arc<Self>, message: Message, ctx: AckContext) {
        if self.is_deleted() {
            return;
        }
        self.message_count.fetch_add(1, Ordering::Relaxed);
        self.messages_added.fetch_add(1, Ordering::Relaxed);
        self.touch();
        self.dispatch(message, ctx);
    }

    fn dispatch(self: &Arc<Self>, message: Message, ctx: AckContext) {
        let mut delivery = Delivery {
            message,
            queue: Arc::clone(self),
            ctx,
            acked: AtomicBool::new(false),
        };

        let mut consumers = self.consumers.lock();
        while !consumers.is_empty() {
            let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % consumers.len();
            match consumers[idx].tx.send(delivery) {
                Ok(()) => return,
                Err(err) => {
                    // Receiver went away without detaching.
                    delivery = err.into_inner();
                    let gone = consumers.remove(idx);
                    tracing::debug!(
                        "Queue {}: dropped dead consumer {}",
                        self.config.name,
                        gone.id
                    );
                }
            }
        }
        drop(consumers);

        self.pending
            .lock()
            .push_back((delivery.message, delivery.ctx));
    }

    fn acknowledged(&self, message: &Message, ctx: &AckContext) {
        if self.is_deleted() {
            return;
        }
        self.message_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .ok();
        self.messages_acknowledged.fetch_add(1, Ordering::Relaxed);
        self.touch();

        if let Some(paging) = &ctx.paging {
            paging.add_size(-(message.encoded_size() as i64));
        }
        if message.durable {
            if let Some(journal) = &ctx.journal {
                let record = JournalRecord::AckMessage {
                    id: message.id.to_string(),
                    queue: self.config.name.clone(),
                };
                if let Err(err) = journal.append(&record) {
                    tracing::warn!("Queue {}: failed to journal ack: {}", self.config.name, err);
                }
            }
        }
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.config.name)
            .field("address", &self.config.address)
            .field("origin", &self.config.origin)
            .field("consumers", &self.consumer_count())
            .field("messages", &self.message_count())
            .finish()
    }
}
