// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Post office: the address space of one node.
//!
//! Owns addresses, queue bindings, duplicate-ID caches, paging stores and the
//! journals. A wildcard queue (e.g. bound to `publish/#`) is *linked* into
//! every concrete address it matches; routing delivers to direct bindings and
//! links alike.
//!
//! # Reaping
//!
//! [`PostOffice::reap_idle`] removes idle auto-delete queues, then removes
//! auto-created addresses that are unbound. Links from client-created
//! (explicit) queues never keep an address alive. Links from broker-created
//! (implicit) queues do, unless
//! [`AddressSettings::reap_through_implicit_links`] is set.

use crate::address::{validate_address, AddressPattern};
use crate::dupcache::{bridge_cache_name, DuplicateIdCache};
use crate::error::{BrokerError, Result};
use crate::journal::{Journal, JournalRecord};
use crate::message::{Message, RoutingType};
use crate::paging::{PagingManager, PagingStore};
use crate::queue::{AckContext, Delivery, Queue, QueueConfig, QueueOrigin};
use crate::settings::{AddressSettings, BrokerConfig, WildcardConfig};
use crossbeam::channel::Sender;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BINDINGS_JOURNAL_PREFIX: &str = "wildleak-bindings";
const DATA_JOURNAL_PREFIX: &str = "wildleak-data";

/// Bind attempts before a queue that keeps getting retired is reported missing.
const ATTACH_ATTEMPTS: usize = 16;

/// One address and the queues reachable from it.
pub struct AddressInfo {
    name: String,
    pattern: AddressPattern,
    auto_created: bool,
    created_at: Instant,
    bindings: RwLock<Vec<Arc<Queue>>>,
    links: RwLock<Vec<Arc<Queue>>>,
    last_activity: Mutex<Instant>,
}

impl AddressInfo {
    fn new(name: &str, auto_created: bool, wildcard: &WildcardConfig) -> Self {
        let now = Instant::now();
        Self {
            name: name.to_string(),
            pattern: AddressPattern::parse(name, wildcard),
            auto_created,
            created_at: now,
            bindings: RwLock::new(Vec::new()),
            links: RwLock::new(Vec::new()),
            last_activity: Mutex::new(now),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_wildcard(&self) -> bool {
        self.pattern.is_wildcard()
    }

    pub fn is_auto_created(&self) -> bool {
        self.auto_created
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Queues bound directly to this address.
    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// Wildcard queues linked into this address.
    pub fn link_count(&self) -> usize {
        self.links.read().len()
    }

    /// Names of direct and linked queues.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .bindings
            .read()
            .iter()
            .map(|q| q.name().to_string())
            .collect();
        names.extend(self.links.read().iter().map(|q| q.name().to_string()));
        names
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    fn link(&self, queue: &Arc<Queue>) -> bool {
        let mut links = self.links.write();
        if links.iter().any(|q| Arc::ptr_eq(q, queue)) {
            return false;
        }
        links.push(Arc::clone(queue));
        true
    }

    /// Drop the link to this exact queue instance; a re-created queue of the
    /// same name keeps its own link.
    fn unlink(&self, queue: &Arc<Queue>) -> bool {
        let mut links = self.links.write();
        let before = links.len();
        links.retain(|q| !Arc::ptr_eq(q, queue));
        links.len() != before
    }

    fn unbind(&self, queue: &Arc<Queue>) -> bool {
        let mut bindings = self.bindings.write();
        let before = bindings.len();
        bindings.retain(|q| !Arc::ptr_eq(q, queue));
        let removed = bindings.len() != before;
        drop(bindings);
        if removed {
            self.touch();
        }
        removed
    }

    /// True if a binding or a pinning link keeps the address alive.
    fn is_pinned(&self, reap_through_implicit_links: bool) -> bool {
        if self.bindings.read().iter().any(|q| !q.is_deleted()) {
            return true;
        }
        !reap_through_implicit_links
            && self
                .links
                .read()
                .iter()
                .any(|q| q.origin() == QueueOrigin::Implicit && !q.is_deleted())
    }

    fn targets(&self, routing_type: RoutingType) -> Vec<Arc<Queue>> {
        self.bindings
            .read()
            .iter()
            .chain(self.links.read().iter())
            .filter(|q| q.config().routing_type == routing_type && !q.is_deleted())
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for AddressInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressInfo")
            .field("name", &self.name)
            .field("auto_created", &self.auto_created)
            .field("bindings", &self.binding_count())
            .field("links", &self.link_count())
            .finish()
    }
}

/// Queue binding as seen by introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingInfo {
    pub queue_name: String,
    pub address: String,
    pub origin: QueueOrigin,
    pub consumer_count: usize,
    pub message_count: u64,
}

/// Result of routing one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    /// Queues the message was delivered to.
    pub delivered: usize,
    /// The address did not exist and was auto-created.
    pub address_created: bool,
    /// Dropped by duplicate detection.
    pub duplicate: bool,
    /// Written to a page file.
    pub paged: bool,
}

/// Counts from one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    pub queues_removed: usize,
    pub addresses_removed: usize,
    pub links_dropped: usize,
}

/// Address space of one broker node.
pub struct PostOffice {
    node_name: String,
    wildcard: WildcardConfig,
    settings: AddressSettings,
    persist_id_cache: bool,
    addresses: DashMap<String, Arc<AddressInfo>>,
    queues: DashMap<String, Arc<Queue>>,
    dup_caches: DashMap<String, Arc<DuplicateIdCache>>,
    paging: Option<PagingManager>,
    bindings_journal: Option<Arc<Journal>>,
    data_journal: Option<Arc<Journal>>,
    anycast_cursor: AtomicUsize,
}

impl PostOffice {
    /// Create the address space, opening journals and paging when persistence is on.
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let (paging, bindings_journal, data_journal) = if config.persistence_enabled {
            let paging = PagingManager::new(
                Some(config.paging_directory()),
                config.address_settings.max_size_bytes,
                config.address_settings.page_size_bytes,
            )?;
            let bindings = Journal::open(
                &config.bindings_directory(),
                BINDINGS_JOURNAL_PREFIX,
                config.journal_file_size,
                config.journal_min_files,
            )?;
            let data = Journal::open(
                &config.journal_directory(),
                DATA_JOURNAL_PREFIX,
                config.journal_file_size,
                config.journal_min_files,
            )?;
            (Some(paging), Some(Arc::new(bindings)), Some(Arc::new(data)))
        } else {
            (None, None, None)
        };

        Ok(Self {
            node_name: config.name.clone(),
            wildcard: config.wildcard,
            settings: config.address_settings.clone(),
            persist_id_cache: config.persist_id_cache,
            addresses: DashMap::new(),
            queues: DashMap::new(),
            dup_caches: DashMap::new(),
            paging,
            bindings_journal,
            data_journal,
            anycast_cursor: AtomicUsize::new(0),
        })
    }

    pub fn settings(&self) -> &AddressSettings {
        &self.settings
    }

    pub fn wildcard(&self) -> &WildcardConfig {
        &self.wildcard
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    /// Return the auto-created address `name`, creating it if needed.
    ///
    /// Concurrent callers converge on one address (one paging store, one
    /// journal record).
    pub fn create_or_get_address(&self, name: &str) -> Result<Arc<AddressInfo>> {
        self.ensure_address(name, true).map(|(info, _)| info)
    }

    /// Create a permanent address that the reaper never removes.
    pub fn create_address(&self, name: &str) -> Result<Arc<AddressInfo>> {
        self.ensure_address(name, false).map(|(info, _)| info)
    }

    fn ensure_address(&self, name: &str, auto_created: bool) -> Result<(Arc<AddressInfo>, bool)> {
        validate_address(name)?;
        if let Some(info) = self.addresses.get(name) {
            return Ok((Arc::clone(info.value()), false));
        }

        let mut created = false;
        let info = {
            let entry = self
                .addresses
                .entry(name.to_string())
                .or_try_insert_with(|| -> Result<Arc<AddressInfo>> {
                    let info = AddressInfo::new(name, auto_created, &self.wildcard);
                    let paging = self.paging.as_ref().filter(|_| !info.is_wildcard());
                    if let Some(paging) = paging {
                        paging.get_or_create(name)?;
                    }
                    if let Some(journal) = &self.bindings_journal {
                        let appended = journal.append(&JournalRecord::AddAddress {
                            name: name.to_string(),
                        });
                        if let Err(e) = appended {
                            // The address was never created; neither is its store.
                            if let Some(paging) = paging {
                                if let Err(cleanup) = paging.remove(name) {
                                    tracing::warn!(
                                        "[{}] Failed to drop paging store of {}: {}",
                                        self.node_name,
                                        name,
                                        cleanup
                                    );
                                }
                            }
                            return Err(e);
                        }
                    }
                    created = true;
                    Ok(Arc::new(info))
                })?;
            Arc::clone(entry.value())
        };

        if created {
            tracing::debug!("[{}] Address created: {}", self.node_name, name);
            if !info.is_wildcard() {
                let matching: Vec<Arc<Queue>> = self
                    .queues
                    .iter()
                    .filter(|q| q.is_wildcard() && q.pattern().matches(name, &self.wildcard))
                    .map(|q| Arc::clone(q.value()))
                    .collect();
                for queue in &matching {
                    info.link(queue);
                }
            }
        }
        Ok((info, created))
    }

    pub fn address(&self, name: &str) -> Option<Arc<AddressInfo>> {
        self.addresses.get(name).map(|a| Arc::clone(a.value()))
    }

    /// Delete `name` unless a binding or a pinning link holds it.
    ///
    /// Returns `false` if the address is missing or still held.
    pub fn delete_address_if_unbound(&self, name: &str) -> Result<bool> {
        let through = self.settings.reap_through_implicit_links;
        Ok(self
            .remove_address_if(name, |info| !info.is_pinned(through))?
            .is_some())
    }

    /// Remove `name` if `pred` holds, returning the number of links dropped.
    ///
    /// The paging store and duplicate cache are released while the address
    /// entry is still locked, so a concurrent re-creation of the same name
    /// cannot have its fresh resources removed.
    fn remove_address_if<P>(&self, name: &str, pred: P) -> Result<Option<usize>>
    where
        P: FnOnce(&AddressInfo) -> bool,
    {
        let mut released = Ok(());
        let removed = self.addresses.remove_if(name, |_, info| {
            if !pred(info) {
                return false;
            }
            released = self.release_resources(&info.name);
            true
        });
        let Some((_, info)) = removed else {
            return Ok(None);
        };
        let dropped = self.finish_release(&info);
        released?;
        dropped.map(Some)
    }

    /// Caller holds the address entry lock.
    fn release_resources(&self, name: &str) -> Result<()> {
        self.dup_caches.remove(name);
        if let Some(paging) = &self.paging {
            paging.remove(name)?;
        }
        Ok(())
    }

    fn finish_release(&self, info: &AddressInfo) -> Result<usize> {
        let dropped = {
            let mut links = info.links.write();
            let n = links.len();
            links.clear();
            n
        };
        if let Some(journal) = &self.bindings_journal {
            journal.append(&JournalRecord::DeleteAddress {
                name: info.name.clone(),
            })?;
        }
        tracing::debug!(
            "[{}] Address deleted: {} ({} links dropped)",
            self.node_name,
            info.name,
            dropped
        );
        Ok(dropped)
    }

    // ------------------------------------------------------------------
    // Queues
    // ------------------------------------------------------------------

    /// Create (or return the compatible existing) queue and bind it.
    pub fn bind_queue(&self, config: QueueConfig) -> Result<Arc<Queue>> {
        validate_address(&config.name)?;
        if let Some(existing) = self.queues.get(&config.name) {
            return if existing.config().compatible_with(&config) {
                Ok(Arc::clone(existing.value()))
            } else {
                Err(BrokerError::QueueExists(config.name))
            };
        }
        if self.address(&config.address).is_none() && !self.settings.auto_create_addresses {
            return Err(BrokerError::AutoCreateDisabled(config.address));
        }

        let fresh = Arc::new(Queue::new(config, &self.settings, &self.wildcard));
        let queue = {
            let entry = self
                .queues
                .entry(fresh.name().to_string())
                .or_insert_with(|| Arc::clone(&fresh));
            Arc::clone(entry.value())
        };
        if !Arc::ptr_eq(&queue, &fresh) {
            // Lost a creation race.
            return if queue.config().compatible_with(fresh.config()) {
                Ok(queue)
            } else {
                Err(BrokerError::QueueExists(fresh.name().to_string()))
            };
        }

        // Bind under the address shard lock; retry if the reaper won the race.
        loop {
            self.ensure_address(queue.address(), true)?;
            if let Some(info) = self.addresses.get(queue.address()) {
                let mut bindings = info.bindings.write();
                if !bindings.iter().any(|q| Arc::ptr_eq(q, &queue)) {
                    bindings.push(Arc::clone(&queue));
                }
                drop(bindings);
                info.touch();
                break;
            }
        }

        if queue.is_wildcard() {
            let mut linked = 0;
            for info in self.addresses.iter() {
                if !info.is_wildcard() && queue.pattern().matches(info.key(), &self.wildcard) {
                    if info.link(&queue) {
                        linked += 1;
                    }
                }
            }
            tracing::debug!(
                "[{}] Wildcard queue {} linked into {} addresses",
                self.node_name,
                queue.name(),
                linked
            );
        }

        if queue.is_deleted() {
            // Retired by the reaper mid-bind; undo and let the caller retry.
            self.detach_queue(&queue);
            return Err(BrokerError::QueueNotFound(queue.name().to_string()));
        }

        if queue.config().durable {
            if let Some(journal) = &self.bindings_journal {
                journal.append(&JournalRecord::AddQueue {
                    name: queue.name().to_string(),
                    address: queue.address().to_string(),
                })?;
            }
        }
        tracing::debug!(
            "[{}] Queue bound: {} -> {} ({:?})",
            self.node_name,
            queue.name(),
            queue.address(),
            queue.origin()
        );
        Ok(queue)
    }

    /// Bind `config` and attach the consumer `tx` to the resulting queue.
    ///
    /// If the reaper retires the queue between bind and attach, the queue is
    /// bound again. On success the consumer is attached to a live queue that
    /// is registered under its name.
    pub(crate) fn bind_and_attach(
        &self,
        config: QueueConfig,
        tx: Sender<Delivery>,
    ) -> Result<(Arc<Queue>, u64)> {
        for attempt in 1..=ATTACH_ATTEMPTS {
            let attached = self
                .bind_queue(config.clone())
                .and_then(|queue| queue.add_consumer(tx.clone()).map(|id| (queue, id)));
            match attached {
                Err(BrokerError::QueueNotFound(_)) => {
                    tracing::debug!(
                        "[{}] Queue {} retired while attaching (attempt {})",
                        self.node_name,
                        config.name,
                        attempt
                    );
                }
                other => return other,
            }
        }
        Err(BrokerError::QueueNotFound(config.name))
    }

    pub fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.queues.get(name).map(|q| Arc::clone(q.value()))
    }

    /// Remove a queue, its binding and every link it holds.
    pub fn destroy_queue(&self, name: &str) -> Result<()> {
        let (_, queue) = self
            .queues
            .remove(name)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))?;
        queue.mark_deleted();
        self.release_queue(&queue)
    }

    fn detach_queue(&self, queue: &Arc<Queue>) {
        if let Some(info) = self.addresses.get(queue.address()) {
            info.unbind(queue);
        }
        if queue.is_wildcard() {
            for info in self.addresses.iter() {
                info.unlink(queue);
            }
        }
    }

    fn release_queue(&self, queue: &Arc<Queue>) -> Result<()> {
        let name = queue.name();
        self.detach_queue(queue);

        if queue.config().durable {
            if let Some(journal) = &self.bindings_journal {
                journal.append(&JournalRecord::DeleteQueue {
                    name: name.to_string(),
                })?;
            }
        }
        tracing::debug!("[{}] Queue destroyed: {}", self.node_name, name);
        Ok(())
    }

    /// True if any queue with consumers would receive a message sent to `address`.
    pub fn has_consumers_for(&self, address: &str) -> bool {
        self.queues.iter().any(|q| {
            q.consumer_count() > 0
                && (q.address() == address
                    || (q.is_wildcard() && q.pattern().matches(address, &self.wildcard)))
        })
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Route a locally produced message.
    pub fn route(&self, address: &str, message: Message) -> Result<RouteOutcome> {
        self.route_with_cache(address, message, None)
    }

    /// Route a message that arrived over a cluster bridge from `source_node_id`.
    pub fn route_bridged(
        &self,
        address: &str,
        message: Message,
        source_node_id: &str,
    ) -> Result<RouteOutcome> {
        self.route_with_cache(address, message, Some(bridge_cache_name(source_node_id)))
    }

    fn route_with_cache(
        &self,
        address: &str,
        mut message: Message,
        cache_name: Option<String>,
    ) -> Result<RouteOutcome> {
        validate_address(address)?;
        if AddressPattern::parse(address, &self.wildcard).is_wildcard() {
            return Err(BrokerError::InvalidAddress(format!(
                "cannot send to wildcard address '{}'",
                address
            )));
        }
        message.address = address.to_string();

        let mut outcome = RouteOutcome::default();
        loop {
            let created = match self.address(address) {
                Some(_) => false,
                None if self.settings.auto_create_addresses => {
                    self.ensure_address(address, true)?.1
                }
                None => return Err(BrokerError::AutoCreateDisabled(address.to_string())),
            };
            outcome.address_created |= created;

            // Deliver under the shard lock so the reaper cannot remove the
            // address mid-route.
            let Some(info) = self.addresses.get(address) else {
                continue;
            };

            let recorded = if message.durable {
                let cache_name = cache_name.clone().unwrap_or_else(|| address.to_string());
                let cache = self.dup_cache(&cache_name);
                let key = message.duplicate_key();
                if !cache.insert_if_absent(&key) {
                    tracing::debug!(
                        "[{}] Duplicate message {} dropped on {}",
                        self.node_name,
                        key,
                        address
                    );
                    outcome.duplicate = true;
                    return Ok(outcome);
                }
                Some((cache_name, cache, key))
            } else {
                None
            };

            let paging = self.paging.as_ref().and_then(|p| p.get(address));
            let ctx = AckContext {
                journal: self.data_journal.clone(),
                paging: paging.clone(),
            };

            let mut targets = info.targets(message.routing_type);
            if message.routing_type == RoutingType::Anycast && targets.len() > 1 {
                let idx = self.anycast_cursor.fetch_add(1, Ordering::Relaxed) % targets.len();
                targets = vec![targets.swap_remove(idx)];
            }

            let stored = self.store_message(
                address,
                &message,
                recorded.as_ref().map(|(name, _, key)| (name.as_str(), key.as_str())),
                paging.as_deref(),
                targets.len(),
            );
            outcome.paged = match stored {
                Ok(paged) => paged,
                Err(e) => {
                    // Not delivered: a retry of the same id must be accepted.
                    if let Some((_, cache, key)) = &recorded {
                        cache.remove(key);
                    }
                    return Err(e);
                }
            };
            for queue in &targets {
                queue.add(message.clone(), ctx.clone());
            }
            info.touch();
            outcome.delivered = targets.len();
            return Ok(outcome);
        }
    }

    /// Journal a durable message (and its duplicate id) and account paging.
    fn store_message(
        &self,
        address: &str,
        message: &Message,
        duplicate_id: Option<(&str, &str)>,
        paging: Option<&PagingStore>,
        copies: usize,
    ) -> Result<bool> {
        if let (Some((cache, id)), Some(journal)) = (duplicate_id, &self.data_journal) {
            if self.persist_id_cache {
                journal.append(&JournalRecord::AddDuplicateId {
                    cache: cache.to_string(),
                    id: id.to_string(),
                })?;
            }
            journal.append(&JournalRecord::AddMessage {
                id: message.id.to_string(),
                address: address.to_string(),
                size: message.encoded_size(),
            })?;
        }
        match paging {
            Some(store) => self.account_paging(store, message, copies),
            None => Ok(false),
        }
    }

    fn account_paging(&self, store: &PagingStore, message: &Message, copies: usize) -> Result<bool> {
        if copies == 0 {
            return Ok(false);
        }
        let size = message.encoded_size() as i64 * copies as i64;
        store.add_size(size);
        if !message.durable {
            return Ok(false);
        }
        let paged = store.page_if_needed(message);
        if paged.is_err() {
            store.add_size(-size);
        }
        paged
    }

    fn dup_cache(&self, name: &str) -> Arc<DuplicateIdCache> {
        if let Some(cache) = self.dup_caches.get(name) {
            return Arc::clone(cache.value());
        }
        let entry = self.dup_caches.entry(name.to_string()).or_insert_with(|| {
            Arc::new(DuplicateIdCache::new(name, self.settings.id_cache_size))
        });
        Arc::clone(entry.value())
    }

    // ------------------------------------------------------------------
    // Reaper
    // ------------------------------------------------------------------

    /// One reaper pass over queues, then addresses.
    pub fn reap_idle(&self) -> ReapStats {
        let mut stats = ReapStats::default();

        let idle: Vec<String> = self
            .queues
            .iter()
            .filter(|q| q.is_reapable())
            .map(|q| q.key().clone())
            .collect();
        for name in idle {
            // Re-checked under the queue's consumer lock; a consumer that
            // attached since the scan keeps the queue.
            let Some((_, queue)) = self.queues.remove_if(&name, |_, q| q.retire_if_reapable())
            else {
                continue;
            };
            stats.queues_removed += 1;
            if let Err(e) = self.release_queue(&queue) {
                tracing::warn!("[{}] Failed to reap queue {}: {}", self.node_name, name, e);
            }
        }

        if !self.settings.auto_delete_addresses {
            return stats;
        }
        let through = self.settings.reap_through_implicit_links;
        let delay = self.settings.auto_delete_addresses_delay();
        let candidates: Vec<String> = self
            .addresses
            .iter()
            .filter(|a| a.auto_created && a.idle_for() >= delay && !a.is_pinned(through))
            .map(|a| a.key().clone())
            .collect();
        for name in candidates {
            let removed = self.remove_address_if(&name, |info| {
                info.idle_for() >= delay && !info.is_pinned(through)
            });
            match removed {
                Ok(Some(dropped)) => {
                    stats.addresses_removed += 1;
                    stats.links_dropped += dropped;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    "[{}] Failed to release address {}: {}",
                    self.node_name,
                    name,
                    e
                ),
            }
        }

        if stats != ReapStats::default() {
            tracing::debug!(
                "[{}] Reaper: {} queues, {} addresses removed",
                self.node_name,
                stats.queues_removed,
                stats.addresses_removed
            );
        }
        stats
    }

    // ------------------------------------------------------------------
    // Introspection (snapshot copies, never mutating)
    // ------------------------------------------------------------------

    pub fn address_names(&self) -> Vec<String> {
        self.addresses.iter().map(|a| a.key().clone()).collect()
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|q| q.key().clone()).collect()
    }

    pub fn bindings(&self) -> Vec<BindingInfo> {
        self.queues
            .iter()
            .map(|q| BindingInfo {
                queue_name: q.name().to_string(),
                address: q.address().to_string(),
                origin: q.origin(),
                consumer_count: q.consumer_count(),
                message_count: q.message_count(),
            })
            .collect()
    }

    pub fn duplicate_cache_names(&self) -> Vec<String> {
        self.dup_caches.iter().map(|c| c.key().clone()).collect()
    }

    pub fn duplicate_cache(&self, name: &str) -> Option<Arc<DuplicateIdCache>> {
        self.dup_caches.get(name).map(|c| Arc::clone(c.value()))
    }

    pub fn paging_store_names(&self) -> Vec<String> {
        self.paging
            .as_ref()
            .map(PagingManager::store_names)
            .unwrap_or_default()
    }

    pub fn paging_store(&self, address: &str) -> Option<Arc<PagingStore>> {
        self.paging.as_ref().and_then(|p| p.get(address))
    }

    /// Close every queue and flush the journals.
    pub(crate) fn shutdown(&self) {
        for queue in self.queues.iter() {
            queue.mark_deleted();
        }
        for journal in [&self.bindings_journal, &self.data_journal].into_iter().flatten() {
            if let Err(e) = journal.sync() {
                tracing::warn!("[{}] Journal sync failed: {}", self.node_name, e);
            }
        }
    }
}
