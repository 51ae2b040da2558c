// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability

//! Growth of the primary's bookkeeping under the MQTT variant, with and
//! without reaping through broker-created subscription links.

use std::path::Path;
use std::time::Duration;
use wildleak::{DiagnosticsSnapshot, Harness, HarnessConfig};
use wildleak_broker::Fabric;

const BURST: usize = 10;
const TICKS: usize = 4;

fn config(dir: &Path, reap_through_implicit_links: bool) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.amq.data_directory = dir.to_path_buf();
    config.amq.cluster_enabled = false;
    config.repro.address_count = BURST;
    config.repro.core_consumer_enabled = false;
    config.broker.address_queue_scan_period_ms = 20;
    config.broker.reap_through_implicit_links = reap_through_implicit_links;
    config
}

/// Tick `TICKS` times, leaving the reaper time to run between ticks.
async fn run_ticks(harness: &mut Harness) -> Vec<DiagnosticsSnapshot> {
    for _ in 0..TICKS {
        harness.tick().await.expect("tick");
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    harness.history()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_default_policy_grows_every_burst() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut harness = Harness::start(config(dir.path(), false), Fabric::new()).expect("start");
    let history = run_ticks(&mut harness).await;
    assert_eq!(history.len(), TICKS);

    for pair in history.windows(2) {
        assert!(pair[1].publish_address_count > pair[0].publish_address_count);
        assert!(pair[1].paging_store_publish_count > pair[0].paging_store_publish_count);
        assert!(pair[1].dup_cache_count > pair[0].dup_cache_count);
    }
    let growth = history[TICKS - 1].publish_address_count - history[0].publish_address_count;
    assert!(growth >= (TICKS - 1) * (BURST - 1));

    let verdict = harness.shutdown();
    for metric in ["addresses", "publish_addresses", "paging_stores", "dup_caches"] {
        assert!(verdict.growing().contains(&metric), "{} should grow", metric);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reaping_through_links_stays_bounded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut harness = Harness::start(config(dir.path(), true), Fabric::new()).expect("start");
    let history = run_ticks(&mut harness).await;
    assert_eq!(history.len(), TICKS);

    let baseline = history[0].publish_address_count;
    for snapshot in &history {
        assert!(snapshot.publish_address_count <= baseline + 1);
        assert!(snapshot.paging_store_publish_count <= baseline + 1);
    }

    let verdict = harness.shutdown();
    assert!(!verdict.growing().contains(&"publish_addresses"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mqtt_variant_detaches_from_shared_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut harness = Harness::start(config(dir.path(), false), Fabric::new()).expect("start");
    harness.tick().await.expect("tick");
    assert_eq!(harness.consumer().and_then(|c| c.owned_queue()), None);

    let po = harness.primary().post_office().expect("post office");
    let shared = po.queue("ebs-group.publish/#").expect("shared queue");
    assert_eq!(shared.consumer_count(), 1);

    harness.stop_clients();
    assert_eq!(shared.consumer_count(), 0);
    harness.shutdown();
}
