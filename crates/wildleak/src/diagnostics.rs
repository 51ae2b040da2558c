// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker diagnostics.
//!
//! [`DiagnosticsSampler`] reads bookkeeping counts from a node through the
//! read-only [`BrokerIntrospection`] trait, turns them into a
//! [`DiagnosticsSnapshot`] and hands it to every configured sink.
//! [`TrendVerdict`] summarizes a snapshot history.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use wildleak_broker::{BrokerError, BrokerServer};

use crate::publisher::PUBLISH_PREFIX;

/// Prefix that marks cluster-bridge duplicate caches (`BRIDGE.<node-id>`).
pub const BRIDGE_PREFIX: &str = "BRIDGE";

/// Failure to read broker state.
#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("Broker unavailable: {0}")]
    Unavailable(#[from] BrokerError),

    #[error("{0}")]
    Other(String),
}

/// Failure to take a snapshot.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Introspection failed: {0}")]
    Introspection(#[from] IntrospectionError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Introspection panicked: {0}")]
    Panicked(String),
}

/// Read-only view of one node's bookkeeping.
///
/// Implementations return snapshot copies and must not create or mutate
/// broker state.
pub trait BrokerIntrospection: Send + Sync {
    fn broker_name(&self) -> String;

    fn address_names(&self) -> Result<Vec<String>, IntrospectionError>;

    fn queue_names(&self) -> Result<Vec<String>, IntrospectionError>;

    fn duplicate_cache_names(&self) -> Result<Vec<String>, IntrospectionError>;

    fn paging_store_names(&self) -> Result<Vec<String>, IntrospectionError>;

    /// Members of the cluster as seen by this node (including itself).
    fn cluster_member_count(&self) -> Result<usize, IntrospectionError>;

    /// Directory whose on-disk size is reported as the journal size.
    fn data_directory(&self) -> PathBuf;
}

impl BrokerIntrospection for BrokerServer {
    fn broker_name(&self) -> String {
        self.name().to_string()
    }

    fn address_names(&self) -> Result<Vec<String>, IntrospectionError> {
        Ok(self.post_office()?.address_names())
    }

    fn queue_names(&self) -> Result<Vec<String>, IntrospectionError> {
        Ok(self.post_office()?.queue_names())
    }

    fn duplicate_cache_names(&self) -> Result<Vec<String>, IntrospectionError> {
        Ok(self.post_office()?.duplicate_cache_names())
    }

    fn paging_store_names(&self) -> Result<Vec<String>, IntrospectionError> {
        Ok(self.post_office()?.paging_store_names())
    }

    fn cluster_member_count(&self) -> Result<usize, IntrospectionError> {
        if !self.is_started() {
            return Err(BrokerError::NotStarted(self.name().to_string()).into());
        }
        Ok(BrokerServer::cluster_member_count(self))
    }

    fn data_directory(&self) -> PathBuf {
        self.config().data_directory.clone()
    }
}

/// One sample of a node's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub broker_name: String,
    pub tick: u64,
    pub taken_at: DateTime<Utc>,
    pub cluster_node_count: usize,
    pub address_count: usize,
    pub publish_address_count: usize,
    pub queue_count: usize,
    pub publish_queue_count: usize,
    pub dup_cache_count: usize,
    pub dup_cache_bridge_count: usize,
    pub paging_store_count: usize,
    pub paging_store_publish_count: usize,
    pub journal_mb: u64,
}

impl DiagnosticsSnapshot {
    /// Multi-line banner for human-readable logs.
    pub fn banner(&self, data_directory: &Path) -> String {
        format!(
            "\n=========================\n\
             ===== {} =====\n\
             =========================\n\
             Cluster Nodes:    {:5}\n\
             Addresses:        {:5} total, {:5} publish/* addresses\n\
             Queues:           {:5} total, {:5} publish/# wildcard queues\n\
             DuplicateIDCache: {:5} total, {:5} BRIDGE caches\n\
             PagingStores:     {:5} total, {:5} publish/* stores\n\
             Journal Size:     {:5} MB ({})\n\
             ==========================",
            self.broker_name,
            self.cluster_node_count,
            self.address_count,
            self.publish_address_count,
            self.queue_count,
            self.publish_queue_count,
            self.dup_cache_count,
            self.dup_cache_bridge_count,
            self.paging_store_count,
            self.paging_store_publish_count,
            self.journal_mb,
            data_directory.display()
        )
    }
}

/// Destination for snapshots.
pub trait SnapshotSink: Send + Sync {
    fn report(&self, snapshot: &DiagnosticsSnapshot, data_directory: &Path) -> Result<(), SampleError>;
}

/// Logs every snapshot through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink;

impl SnapshotSink for LogSink {
    fn report(&self, s: &DiagnosticsSnapshot, data_directory: &Path) -> Result<(), SampleError> {
        tracing::info!(
            broker = %s.broker_name,
            tick = s.tick,
            cluster_nodes = s.cluster_node_count,
            addresses = s.address_count,
            publish_addresses = s.publish_address_count,
            queues = s.queue_count,
            publish_queues = s.publish_queue_count,
            dup_caches = s.dup_cache_count,
            dup_cache_bridges = s.dup_cache_bridge_count,
            paging_stores = s.paging_store_count,
            paging_stores_publish = s.paging_store_publish_count,
            journal_mb = s.journal_mb,
            "{}",
            s.banner(data_directory)
        );
        Ok(())
    }
}

/// Appends one JSON object per snapshot to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SampleError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotSink for JsonLinesSink {
    fn report(&self, snapshot: &DiagnosticsSnapshot, _: &Path) -> Result<(), SampleError> {
        let mut line = serde_json::to_vec(snapshot)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Keeps the snapshot history in memory. Clones share the history.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    history: Arc<Mutex<Vec<DiagnosticsSnapshot>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<DiagnosticsSnapshot> {
        self.history.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }
}

impl SnapshotSink for MemorySink {
    fn report(&self, snapshot: &DiagnosticsSnapshot, _: &Path) -> Result<(), SampleError> {
        self.history.lock().push(snapshot.clone());
        Ok(())
    }
}

/// Samples one node and reports to sinks.
pub struct DiagnosticsSampler {
    source: Arc<dyn BrokerIntrospection>,
    sinks: Vec<Box<dyn SnapshotSink>>,
    ticks: AtomicU64,
}

impl DiagnosticsSampler {
    pub fn new(source: Arc<dyn BrokerIntrospection>) -> Self {
        Self {
            source,
            sinks: Vec::new(),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn with_sink(mut self, sink: impl SnapshotSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn SnapshotSink>) {
        self.sinks.push(sink);
    }

    /// Take one snapshot; errors propagate.
    pub fn sample(&self) -> Result<DiagnosticsSnapshot, SampleError> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let source = &self.source;

        let addresses = source.address_names()?;
        let queues = source.queue_names()?;
        let dup_caches = source.duplicate_cache_names()?;
        let stores = source.paging_store_names()?;
        let members = source.cluster_member_count()?;

        Ok(DiagnosticsSnapshot {
            broker_name: source.broker_name(),
            tick,
            taken_at: Utc::now(),
            cluster_node_count: members.max(1),
            address_count: addresses.len(),
            publish_address_count: count_prefixed(&addresses, PUBLISH_PREFIX),
            queue_count: queues.len(),
            publish_queue_count: count_prefixed(&queues, PUBLISH_PREFIX),
            dup_cache_count: dup_caches.len(),
            dup_cache_bridge_count: count_prefixed(&dup_caches, BRIDGE_PREFIX),
            paging_store_count: stores.len(),
            paging_store_publish_count: count_prefixed(&stores, PUBLISH_PREFIX),
            journal_mb: directory_size(&source.data_directory())? / (1024 * 1024),
        })
    }

    /// Sample and report; never propagates errors or panics.
    pub fn sample_and_report(&self) -> Option<DiagnosticsSnapshot> {
        let snapshot = match catch_unwind(AssertUnwindSafe(|| self.sample())) {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                tracing::error!("Error logging diagnostics: {}", e);
                return None;
            }
            Err(panic) => {
                let e = SampleError::Panicked(panic_message(panic.as_ref()));
                tracing::error!("Error logging diagnostics: {}", e);
                return None;
            }
        };

        let dir = self.source.data_directory();
        for sink in &self.sinks {
            if let Err(e) = sink.report(&snapshot, &dir) {
                tracing::warn!("Snapshot sink failed: {}", e);
            }
        }
        Some(snapshot)
    }
}

fn count_prefixed(names: &[String], prefix: &str) -> usize {
    names.iter().filter(|n| n.starts_with(prefix)).count()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Total size of regular files under `path`; a missing directory is empty.
pub fn directory_size(path: &Path) -> io::Result<u64> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += directory_size(&entry.path())?;
        } else if file_type.is_file() {
            // Files can vanish between listing and stat.
            match entry.metadata() {
                Ok(meta) => total += meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(total)
}

/// Growth of one metric across a snapshot history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricTrend {
    pub metric: &'static str,
    pub first: u64,
    pub last: u64,
    /// Never decreased and ended higher than it started.
    pub monotonic_growth: bool,
}

/// Per-metric growth summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrendVerdict {
    pub samples: usize,
    pub metrics: Vec<MetricTrend>,
}

impl DiagnosticsSnapshot {
    /// Metrics tracked by [`TrendVerdict`], in report order.
    fn tracked(&self) -> [(&'static str, u64); 8] {
        [
            ("addresses", self.address_count as u64),
            ("publish_addresses", self.publish_address_count as u64),
            ("queues", self.queue_count as u64),
            ("publish_queues", self.publish_queue_count as u64),
            ("dup_caches", self.dup_cache_count as u64),
            ("dup_cache_bridges", self.dup_cache_bridge_count as u64),
            ("paging_stores", self.paging_store_count as u64),
            ("paging_stores_publish", self.paging_store_publish_count as u64),
        ]
    }
}

impl TrendVerdict {
    pub fn from_history(history: &[DiagnosticsSnapshot]) -> Self {
        let series: Vec<[(&'static str, u64); 8]> =
            history.iter().map(DiagnosticsSnapshot::tracked).collect();
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Self::default();
        };

        let metrics = (0..first.len())
            .map(|i| {
                let (metric, start) = first[i];
                let end = last[i].1;
                MetricTrend {
                    metric,
                    first: start,
                    last: end,
                    monotonic_growth: series.len() >= 2
                        && series.windows(2).all(|w| w[1][i].1 >= w[0][i].1)
                        && end > start,
                }
            })
            .collect();
        Self {
            samples: history.len(),
            metrics,
        }
    }

    /// Names of metrics that grew monotonically.
    pub fn growing(&self) -> Vec<&'static str> {
        self.metrics
            .iter()
            .filter(|m| m.monotonic_growth)
            .map(|m| m.metric)
            .collect()
    }

    pub fn metric(&self, name: &str) -> Option<&MetricTrend> {
        self.metrics.iter().find(|m| m.metric == name)
    }

    pub fn log(&self) {
        if self.samples < 2 {
            tracing::info!("Trend: {} snapshot(s), not enough to judge growth", self.samples);
            return;
        }
        for m in &self.metrics {
            tracing::info!(
                "Trend: {:<22} {:>6} -> {:<6} {}",
                m.metric,
                m.first,
                m.last,
                if m.monotonic_growth { "GROWING" } else { "bounded" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use wildleak_broker::BRIDGE_CACHE_PREFIX;

    /// Introspection stub with fault injection.
    struct FakeBroker {
        dir: PathBuf,
        addresses: Mutex<Vec<String>>,
        fail: AtomicBool,
        panic: AtomicBool,
    }

    impl FakeBroker {
        fn new(dir: &Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                addresses: Mutex::new(vec![
                    "publish/#".into(),
                    "publish/a/b".into(),
                    "$sys.mqtt.sessions".into(),
                ]),
                fail: AtomicBool::new(false),
                panic: AtomicBool::new(false),
            }
        }
    }

    impl BrokerIntrospection for FakeBroker {
        fn broker_name(&self) -> String {
            "fake".into()
        }

        fn address_names(&self) -> Result<Vec<String>, IntrospectionError> {
            if self.panic.load(Ordering::Relaxed) {
                panic!("introspection blew up");
            }
            if self.fail.load(Ordering::Relaxed) {
                return Err(IntrospectionError::Other("injected".into()));
            }
            Ok(self.addresses.lock().clone())
        }

        fn queue_names(&self) -> Result<Vec<String>, IntrospectionError> {
            Ok(vec!["ebs-group.publish/#".into(), "publish/q".into()])
        }

        fn duplicate_cache_names(&self) -> Result<Vec<String>, IntrospectionError> {
            Ok(vec!["publish/a/b".into(), format!("{}node-2", BRIDGE_CACHE_PREFIX)])
        }

        fn paging_store_names(&self) -> Result<Vec<String>, IntrospectionError> {
            Ok(vec!["publish/a/b".into(), "$sys.mqtt.sessions".into()])
        }

        fn cluster_member_count(&self) -> Result<usize, IntrospectionError> {
            Ok(0)
        }

        fn data_directory(&self) -> PathBuf {
            self.dir.clone()
        }
    }

    #[test]
    fn test_sample_partitions_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("blob"), vec![0u8; 3 * 1024 * 1024]).expect("write");
        let sampler = DiagnosticsSampler::new(Arc::new(FakeBroker::new(dir.path())));

        let s = sampler.sample().expect("sample");
        assert_eq!(s.tick, 1);
        assert_eq!(s.broker_name, "fake");
        assert_eq!(s.cluster_node_count, 1);
        assert_eq!((s.address_count, s.publish_address_count), (3, 2));
        assert_eq!((s.queue_count, s.publish_queue_count), (2, 1));
        assert_eq!((s.dup_cache_count, s.dup_cache_bridge_count), (2, 1));
        assert_eq!((s.paging_store_count, s.paging_store_publish_count), (2, 1));
        assert_eq!(s.journal_mb, 3);
        assert_eq!(sampler.sample().expect("sample").tick, 2);
    }

    #[test]
    fn test_sample_and_report_swallows_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let broker = Arc::new(FakeBroker::new(dir.path()));
        let memory = MemorySink::new();
        let sampler = DiagnosticsSampler::new(broker.clone()).with_sink(memory.clone());

        broker.fail.store(true, Ordering::Relaxed);
        assert!(sampler.sample_and_report().is_none());

        broker.fail.store(false, Ordering::Relaxed);
        broker.panic.store(true, Ordering::Relaxed);
        assert!(sampler.sample_and_report().is_none());

        broker.panic.store(false, Ordering::Relaxed);
        assert!(sampler.sample_and_report().is_some());
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_missing_directory_is_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(directory_size(&dir.path().join("absent")).expect("size"), 0);

        fs::create_dir_all(dir.path().join("a/b")).expect("mkdir");
        fs::write(dir.path().join("a/b/f"), [1u8; 10]).expect("write");
        fs::write(dir.path().join("a/g"), [1u8; 5]).expect("write");
        assert_eq!(directory_size(dir.path()).expect("size"), 15);
    }

    #[test]
    fn test_json_lines_sink() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out/snapshots.jsonl");
        let sink = JsonLinesSink::create(&path).expect("sink");
        let sampler = DiagnosticsSampler::new(Arc::new(FakeBroker::new(dir.path()))).with_sink(sink);
        sampler.sample_and_report();
        sampler.sample_and_report();

        let text = fs::read_to_string(&path).expect("read");
        let lines: Vec<DiagnosticsSnapshot> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].tick, 2);
    }

    #[test]
    fn test_banner_lists_every_metric() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sampler = DiagnosticsSampler::new(Arc::new(FakeBroker::new(dir.path())));
        let banner = sampler.sample().expect("sample").banner(dir.path());
        for label in ["===== fake =====", "Cluster Nodes:", "Addresses:", "Queues:", "DuplicateIDCache:", "PagingStores:", "Journal Size:"] {
            assert!(banner.contains(label), "missing {}", label);
        }
    }

    #[test]
    fn test_trend_verdict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let broker = Arc::new(FakeBroker::new(dir.path()));
        let sampler = DiagnosticsSampler::new(broker.clone());

        let mut history = vec![sampler.sample().expect("sample")];
        broker.addresses.lock().push("publish/c/d".into());
        history.push(sampler.sample().expect("sample"));
        broker.addresses.lock().push("publish/e/f".into());
        history.push(sampler.sample().expect("sample"));

        let verdict = TrendVerdict::from_history(&history);
        assert_eq!(verdict.samples, 3);
        let addresses = verdict.metric("addresses").expect("addresses");
        assert_eq!((addresses.first, addresses.last), (3, 5));
        assert!(addresses.monotonic_growth);
        assert!(!verdict.metric("queues").expect("queues").monotonic_growth);
        assert_eq!(verdict.growing(), vec!["addresses", "publish_addresses"]);

        assert!(TrendVerdict::from_history(&[]).metrics.is_empty());
    }
}
