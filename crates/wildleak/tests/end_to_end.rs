// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability

//! Full harness runs against an in-process three-node mesh.

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, Instant};
use wildleak::{ConsumerVariant, Harness, HarnessConfig, FIXED_ADDRESS, PUBLISH_PREFIX};
use wildleak_broker::Fabric;

fn config(dir: &Path, address_count: usize, core_consumer: bool) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.amq.data_directory = dir.to_path_buf();
    config.repro.address_count = address_count;
    config.repro.core_consumer_enabled = core_consumer;
    config.schedule.initial_delay_ms = 0;
    config.schedule.period_ms = 200;
    config.schedule.max_bursts = Some(2);
    config.broker.address_queue_scan_period_ms = 50;
    config
}

fn wait_for_received(consumer: &ConsumerVariant, expected: u64) -> u64 {
    let deadline = Instant::now() + Duration::from_secs(5);
    while consumer.received() < expected && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    consumer.received()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_ticks_mqtt_variant() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut harness = Harness::start(config(dir.path(), 3, false), Fabric::new()).expect("start");
    assert_eq!(harness.nodes().len(), 3);
    assert_eq!(harness.consumer().map(ConsumerVariant::kind), Some("mqtt"));

    let ran = harness.run(std::future::pending()).await.expect("run");
    assert_eq!(ran, 2);

    let consumer = harness.consumer().expect("consumer");
    assert_eq!(wait_for_received(consumer, 6), 6);

    let history = harness.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].tick, 1);
    assert_eq!(history[1].tick, 2);
    assert!(history[1].address_count > history[0].address_count);
    assert!(history[1].publish_address_count >= history[0].publish_address_count + 3);
    assert!(history.iter().all(|s| s.broker_name == "artemis-broker"));

    let po = harness.primary().post_office().expect("post office");
    let published: HashSet<String> = po
        .address_names()
        .into_iter()
        .filter(|a| a.starts_with(PUBLISH_PREFIX) && a != "publish/#")
        .collect();
    assert_eq!(published.len(), 5);
    assert!(published.contains(FIXED_ADDRESS));

    let verdict = harness.shutdown();
    assert_eq!(verdict.samples, 2);
    assert!(verdict.growing().contains(&"addresses"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_reports_cover_distinct_addresses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), 4, true);
    config.amq.cluster_enabled = false;
    let mut harness = Harness::start(config, Fabric::new()).expect("start");

    let first = harness.tick().await.expect("tick");
    let second = harness.tick().await.expect("tick");
    assert_eq!((first.tick, second.tick), (1, 2));

    for report in [&first.burst, &second.burst] {
        assert_eq!(report.sent, 4);
        assert_eq!(report.failed, 0);
        assert_eq!(report.addresses[0], FIXED_ADDRESS);
        let unique: HashSet<&String> = report.addresses.iter().collect();
        assert_eq!(unique.len(), 4);
    }
    let first_fresh: HashSet<&String> = first.burst.addresses[1..].iter().collect();
    assert!(second.burst.addresses[1..].iter().all(|a| !first_fresh.contains(a)));

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_core_variant_shutdown_leaves_no_owned_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut harness = Harness::start(config(dir.path(), 5, true), Fabric::new()).expect("start");
    let owned = harness
        .consumer()
        .and_then(ConsumerVariant::owned_queue)
        .map(str::to_string)
        .expect("core consumer owns a queue");

    harness.run(std::future::pending()).await.expect("run");
    assert_eq!(wait_for_received(harness.consumer().expect("consumer"), 10), 10);

    harness.stop_clients();
    let po = harness.primary().post_office().expect("post office");
    let deadline = Instant::now() + Duration::from_secs(5);
    let concrete = || {
        po.address_names()
            .into_iter()
            .filter(|a| a.starts_with(PUBLISH_PREFIX) && a != "publish/#")
            .count()
    };
    while (po.queue(&owned).is_some() || concrete() > 0) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }

    assert!(po.queue(&owned).is_none());
    assert!(po.queue_names().iter().all(|q| !q.starts_with("core-consumer-")));
    assert_eq!(concrete(), 0);
    assert!(po
        .paging_store_names()
        .iter()
        .all(|s| !s.starts_with(PUBLISH_PREFIX) || s == "publish/#"));

    harness.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cleanup_and_snapshot_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(data.join("stale")).expect("mkdir");
    std::fs::write(data.join("stale/file"), b"x").expect("write");
    wildleak::clean_data_directory(&data).expect("cleanup");
    assert!(!data.exists());

    let out = dir.path().join("snapshots.jsonl");
    let sink = wildleak::JsonLinesSink::create(&out).expect("sink");
    let mut config = config(&data, 2, true);
    config.amq.cluster_enabled = false;
    let mut harness =
        Harness::start_with_sinks(config, Fabric::new(), vec![Box::new(sink)]).expect("start");
    harness.run(std::future::pending()).await.expect("run");
    harness.shutdown();

    let lines = std::fs::read_to_string(&out).expect("read");
    let snapshots: Vec<wildleak::DiagnosticsSnapshot> = lines
        .lines()
        .map(|l| serde_json::from_str(l).expect("json"))
        .collect();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].cluster_node_count, 1);
}
