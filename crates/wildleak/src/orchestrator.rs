// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Harness orchestration.
//!
//! Startup is a strict chain: nodes, primary started, consumer, publisher.
//! Each tick samples the primary and then publishes one burst. Shutdown
//! releases everything in reverse order.

use parking_lot::Mutex;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use wildleak_broker::{BrokerServer, Fabric};

use crate::config::HarnessConfig;
use crate::consumer::{wait_for_started, ConsumerVariant, STARTUP_BACKOFF, STARTUP_RETRIES};
use crate::diagnostics::{
    BrokerIntrospection, DiagnosticsSampler, DiagnosticsSnapshot, LogSink, MemorySink,
    SnapshotSink, TrendVerdict,
};
use crate::error::HarnessError;
use crate::publisher::{BurstReport, SyntheticPublisher};
use crate::topology::ClusterTopology;

/// Result of one scheduled tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    /// `None` when sampling failed (already logged).
    pub snapshot: Option<DiagnosticsSnapshot>,
    pub burst: BurstReport,
}

/// Remove a data directory left by a previous run.
pub fn clean_data_directory(dir: &Path) -> Result<(), HarnessError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::info!("Removed data directory {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A running harness: broker nodes, one consumer variant and the publisher.
pub struct Harness {
    config: HarnessConfig,
    topology: ClusterTopology,
    fabric: Fabric,
    nodes: Vec<BrokerServer>,
    consumer: Option<ConsumerVariant>,
    publisher: Arc<Mutex<Option<SyntheticPublisher>>>,
    sampler: Arc<DiagnosticsSampler>,
    history: MemorySink,
    ticks: u64,
    stopped: bool,
}

impl Harness {
    /// Start with the default sinks (log + in-memory history).
    ///
    /// Blocks until the primary node is started and both clients are
    /// attached.
    pub fn start(config: HarnessConfig, fabric: Fabric) -> Result<Self, HarnessError> {
        Self::start_with_sinks(config, fabric, Vec::new())
    }

    /// Start with additional snapshot sinks.
    pub fn start_with_sinks(
        config: HarnessConfig,
        fabric: Fabric,
        sinks: Vec<Box<dyn SnapshotSink>>,
    ) -> Result<Self, HarnessError> {
        config.validate()?;
        let topology = ClusterTopology::from_config(&config)?;

        let nodes = topology
            .nodes()
            .iter()
            .map(|spec| BrokerServer::new(spec.broker_config(&config), &fabric))
            .collect::<Result<Vec<_>, _>>()?;

        let primary: Arc<dyn BrokerIntrospection> = Arc::new(nodes[0].clone());
        let history = MemorySink::new();
        let mut sampler = DiagnosticsSampler::new(primary)
            .with_sink(LogSink)
            .with_sink(history.clone());
        for sink in sinks {
            sampler.add_sink(sink);
        }

        let mut harness = Self {
            config,
            topology,
            fabric,
            nodes,
            consumer: None,
            publisher: Arc::new(Mutex::new(None)),
            sampler: Arc::new(sampler),
            history,
            ticks: 0,
            stopped: false,
        };

        if let Err(e) = harness.bring_up() {
            tracing::error!("Harness startup failed: {}", e);
            harness.shutdown();
            return Err(e);
        }
        Ok(harness)
    }

    fn bring_up(&mut self) -> Result<(), HarnessError> {
        for node in &self.nodes {
            node.start()?;
        }
        tracing::info!(
            "Started {} broker node(s){}",
            self.nodes.len(),
            if self.topology.is_clustered() {
                " in a full mesh"
            } else {
                ""
            }
        );

        let primary = &self.nodes[0];
        wait_for_started(primary, STARTUP_RETRIES, STARTUP_BACKOFF)?;
        tracing::info!("Primary node {} is started", primary.name());

        let core_url = self.topology.primary().core_url();
        let log_every = self.config.repro.address_count as u64;
        let consumer = ConsumerVariant::start(
            self.config.repro.core_consumer_enabled,
            &self.fabric,
            primary,
            &core_url,
            log_every,
        )?;
        tracing::info!("Consumer variant: {}", consumer.kind());
        self.consumer = Some(consumer);

        let publisher =
            SyntheticPublisher::open(&self.fabric, &core_url, self.config.repro.address_count)?;
        *self.publisher.lock() = Some(publisher);
        Ok(())
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    pub fn nodes(&self) -> &[BrokerServer] {
        &self.nodes
    }

    /// The node the harness publishes to, consumes from and samples.
    pub fn primary(&self) -> &BrokerServer {
        &self.nodes[0]
    }

    pub fn consumer(&self) -> Option<&ConsumerVariant> {
        self.consumer.as_ref()
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Every snapshot taken so far.
    pub fn history(&self) -> Vec<DiagnosticsSnapshot> {
        self.history.history()
    }

    pub fn verdict(&self) -> TrendVerdict {
        TrendVerdict::from_history(&self.history.history())
    }

    /// Sample the primary, then publish one burst.
    pub async fn tick(&mut self) -> Result<TickReport, HarnessError> {
        if self.stopped {
            return Err(HarnessError::ShutDown);
        }
        let sampler = Arc::clone(&self.sampler);
        let publisher = Arc::clone(&self.publisher);
        let (snapshot, burst) = tokio::task::spawn_blocking(move || {
            let snapshot = sampler.sample_and_report();
            let burst = publisher.lock().as_mut().map(SyntheticPublisher::publish_burst);
            (snapshot, burst)
        })
        .await?;

        let burst = burst.ok_or(HarnessError::ShutDown)?;
        self.ticks += 1;
        Ok(TickReport {
            tick: self.ticks,
            snapshot,
            burst,
        })
    }

    /// Tick on the configured schedule until `shutdown` resolves or the
    /// burst limit is reached. Returns the number of ticks run.
    ///
    /// The period is measured from the end of one tick to the start of the
    /// next, so ticks never overlap.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<u64, HarnessError>
    where
        F: Future<Output = ()>,
    {
        let initial_delay = self.config.schedule.initial_delay();
        let period = self.config.schedule.period();
        let max_bursts = self.config.schedule.max_bursts;
        tokio::pin!(shutdown);

        tracing::info!(
            "Scheduling bursts: initial delay {:?}, period {:?}, limit {}",
            initial_delay,
            period,
            max_bursts.map_or_else(|| "none".to_string(), |n| n.to_string())
        );

        tokio::select! {
            _ = &mut shutdown => return Ok(0),
            _ = tokio::time::sleep(initial_delay) => {}
        }

        let mut ran = 0;
        while max_bursts.map_or(true, |max| ran < max) {
            self.tick().await?;
            ran += 1;
            if max_bursts == Some(ran) {
                tracing::info!("Reached burst limit of {}", ran);
                break;
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
        Ok(ran)
    }

    /// Shut down the consumer, then close the publisher.
    ///
    /// Nodes keep running, so their state can still be inspected.
    pub fn stop_clients(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            tracing::info!(
                "Stopping {} consumer ({} messages received)",
                consumer.kind(),
                consumer.received()
            );
            consumer.shutdown();
        }
        if let Some(publisher) = self.publisher.lock().take() {
            publisher.close();
        }
    }

    /// Release everything in reverse acquisition order and log the trend
    /// verdict. Safe to call repeatedly.
    pub fn shutdown(&mut self) -> TrendVerdict {
        let verdict = self.verdict();
        if self.stopped {
            return verdict;
        }
        self.stopped = true;

        self.stop_clients();
        for node in self.nodes.iter().rev() {
            if let Err(e) = node.stop() {
                tracing::warn!("Failed to stop node {}: {}", node.name(), e);
            }
        }

        verdict.log();
        let growing = verdict.growing();
        if !growing.is_empty() {
            tracing::warn!("Monotonic growth observed in: {}", growing.join(", "));
        }
        tracing::info!("Harness stopped after {} tick(s)", self.ticks);
        verdict
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if !self.stopped {
            self.shutdown();
        }
    }
}
