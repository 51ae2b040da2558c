// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker node lifecycle.
//!
//! `start()` returns immediately; activation (directories, journals,
//! acceptors, cluster bridges) happens on a background thread after
//! `activation_delay`. Callers poll [`BrokerServer::is_started`].

use crate::cluster::{ClusterConnection, BRIDGE_RETRY_INTERVAL};
use crate::error::{BrokerError, Result};
use crate::message::Message;
use crate::postoffice::{PostOffice, RouteOutcome};
use crate::settings::BrokerConfig;
use crate::transport::{Endpoint, Fabric, Protocol};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

const NODE_ID_FILE: &str = "node.id";

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Started,
}

/// Shared state behind [`BrokerServer`], also reachable from the fabric.
pub(crate) struct ServerInner {
    config: BrokerConfig,
    fabric: Fabric,
    node_id: RwLock<String>,
    state: Mutex<ServerState>,
    post_office: RwLock<Option<Arc<PostOffice>>>,
    cluster: RwLock<Option<Arc<ClusterConnection>>>,
    shutdown: Mutex<Option<Sender<()>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ServerInner {
    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn node_id(&self) -> String {
        self.node_id.read().clone()
    }

    pub(crate) fn is_started(&self) -> bool {
        *self.state.lock() == ServerState::Started
    }

    pub(crate) fn post_office(&self) -> Result<Arc<PostOffice>> {
        if !self.is_started() {
            return Err(BrokerError::NotStarted(self.config.name.clone()));
        }
        self.post_office
            .read()
            .clone()
            .ok_or_else(|| BrokerError::NotStarted(self.config.name.clone()))
    }

    /// Route locally, then forward to interested peers.
    pub(crate) fn route(&self, address: &str, message: Message) -> Result<RouteOutcome> {
        let post_office = self.post_office()?;
        let forward_copy = self.cluster.read().clone().map(|c| (c, message.clone()));
        let outcome = post_office.route(address, message)?;
        if let Some((cluster, message)) = forward_copy {
            if !outcome.duplicate {
                cluster.forward(address, &message);
            }
        }
        Ok(outcome)
    }

    fn core_endpoint(&self) -> Endpoint {
        Endpoint::new(&self.config.host, self.config.core_port)
    }

    fn mqtt_endpoint(&self) -> Endpoint {
        Endpoint::new(&self.config.host, self.config.mqtt_port)
    }

    fn spawn(&self, label: &str, f: impl FnOnce() + Send + 'static) -> Result<()> {
        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.config.name, label))
            .spawn(f)?;
        self.threads.lock().push(handle);
        Ok(())
    }

    fn activate(self: Arc<Self>, shutdown: Receiver<()>) {
        let delay = self.config.activation_delay;
        if !delay.is_zero() {
            match shutdown.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => {
                    tracing::debug!("[{}] Activation aborted", self.config.name);
                    return;
                }
            }
        }

        if let Err(e) = Arc::clone(&self).activate_inner(&shutdown) {
            tracing::error!("[{}] Activation failed: {}", self.config.name, e);
            self.teardown();
            *self.state.lock() = ServerState::Stopped;
        }
    }

    fn activate_inner(self: Arc<Self>, shutdown: &Receiver<()>) -> Result<()> {
        let config = &self.config;
        if config.persistence_enabled {
            for dir in [
                config.journal_directory(),
                config.bindings_directory(),
                config.paging_directory(),
                config.large_messages_directory(),
            ] {
                fs::create_dir_all(dir)?;
            }
        } else {
            fs::create_dir_all(&config.data_directory)?;
        }
        let node_id = load_or_create_node_id(config)?;
        *self.node_id.write() = node_id.clone();

        let post_office = Arc::new(PostOffice::new(config)?);
        *self.post_office.write() = Some(Arc::clone(&post_office));

        self.fabric
            .bind(self.core_endpoint(), Protocol::Core, &self)?;
        self.fabric
            .bind(self.mqtt_endpoint(), Protocol::Mqtt, &self)?;

        let cluster = config
            .cluster
            .as_ref()
            .map(|c| Arc::new(ClusterConnection::new(c, &node_id, self.fabric.clone())));
        *self.cluster.write() = cluster.clone();

        {
            let mut state = self.state.lock();
            if *state != ServerState::Starting {
                drop(state);
                self.teardown();
                return Ok(());
            }
            *state = ServerState::Started;
        }
        tracing::info!(
            "[{}] Broker started (node {}, core {}, mqtt {})",
            config.name,
            node_id,
            self.core_endpoint(),
            self.mqtt_endpoint()
        );

        let period = config.address_queue_scan_period;
        if !period.is_zero() {
            let po = Arc::clone(&post_office);
            let rx = shutdown.clone();
            self.spawn("reaper", move || run_periodic(rx, period, || {
                po.reap_idle();
            }))?;
        }

        if let Some(cluster) = cluster {
            let po = Arc::clone(&post_office);
            let rx = shutdown.clone();
            self.spawn("cluster", move || {
                run_periodic(rx, BRIDGE_RETRY_INTERVAL, || {
                    if let Err(e) = cluster.refresh(&po) {
                        tracing::warn!("Cluster {}: refresh failed: {}", cluster.name(), e);
                    }
                })
            })?;
        }
        Ok(())
    }

    fn teardown(self: &Arc<Self>) {
        self.fabric.unbind(&self.core_endpoint(), self);
        self.fabric.unbind(&self.mqtt_endpoint(), self);
        self.cluster.write().take();
        if let Some(post_office) = self.post_office.write().take() {
            post_office.shutdown();
        }
    }
}

/// Call `tick` every `period` until the shutdown channel closes.
fn run_periodic(shutdown: Receiver<()>, period: Duration, mut tick: impl FnMut()) {
    loop {
        match shutdown.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => tick(),
            _ => return,
        }
    }
}

fn load_or_create_node_id(config: &BrokerConfig) -> Result<String> {
    let path = config.data_directory.join(NODE_ID_FILE);
    if let Ok(existing) = fs::read_to_string(&path) {
        let existing = existing.trim();
        if Uuid::parse_str(existing).is_ok() {
            return Ok(existing.to_string());
        }
    }
    let id = Uuid::new_v4().to_string();
    fs::write(&path, &id)?;
    Ok(id)
}

/// One broker node.
///
/// Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct BrokerServer {
    inner: Arc<ServerInner>,
}

impl BrokerServer {
    /// Create a stopped node attached to `fabric`.
    pub fn new(config: BrokerConfig, fabric: &Fabric) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ServerInner {
                config,
                fabric: fabric.clone(),
                node_id: RwLock::new(String::new()),
                state: Mutex::new(ServerState::Stopped),
                post_office: RwLock::new(None),
                cluster: RwLock::new(None),
                shutdown: Mutex::new(None),
                threads: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Begin activation; returns before the node is started.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != ServerState::Stopped {
                return Err(BrokerError::AlreadyRunning(self.inner.config.name.clone()));
            }
            *state = ServerState::Starting;
        }
        let (tx, rx) = channel::bounded::<()>(0);
        *self.inner.shutdown.lock() = Some(tx);

        let inner = Arc::clone(&self.inner);
        if let Err(e) = self.inner.spawn("activation", move || inner.activate(rx)) {
            *self.inner.state.lock() = ServerState::Stopped;
            return Err(e);
        }
        tracing::debug!("[{}] Broker starting", self.inner.config.name);
        Ok(())
    }

    /// Stop the node. Safe to call repeatedly.
    pub fn stop(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.inner.state.lock(), ServerState::Stopped);
        // Closing the channel wakes activation, reaper and cluster threads.
        self.inner.shutdown.lock().take();

        loop {
            let handles = std::mem::take(&mut *self.inner.threads.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if handle.join().is_err() {
                    tracing::warn!("[{}] Broker thread panicked", self.inner.config.name);
                }
            }
        }

        self.inner.teardown();
        if previous != ServerState::Stopped {
            tracing::info!("[{}] Broker stopped", self.inner.config.name);
        }
        Ok(())
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.lock()
    }

    pub fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    /// Block until started or `timeout` elapses.
    pub fn wait_for_start(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.is_started() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.is_started()
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Node id; empty until the first activation.
    pub fn node_id(&self) -> String {
        self.inner.node_id()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    pub fn fabric(&self) -> &Fabric {
        &self.inner.fabric
    }

    /// The address space; `NotStarted` unless the node is started.
    pub fn post_office(&self) -> Result<Arc<PostOffice>> {
        self.inner.post_office()
    }

    /// This node plus reachable peers; 1 without clustering.
    pub fn cluster_member_count(&self) -> usize {
        match self.inner.cluster.read().as_ref() {
            Some(cluster) if self.is_started() => cluster.member_count(),
            _ => 1,
        }
    }

    /// Route a message as if sent by a local producer.
    pub fn route(&self, address: &str, message: Message) -> Result<RouteOutcome> {
        self.inner.route(address, message)
    }

    pub(crate) fn inner(&self) -> &Arc<ServerInner> {
        &self.inner
    }
}

impl std::fmt::Debug for BrokerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerServer")
            .field("name", &self.inner.config.name)
            .field("state", &self.state())
            .finish()
    }
}
