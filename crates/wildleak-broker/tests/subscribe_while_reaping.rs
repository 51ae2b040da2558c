// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability

//! MQTT subscriptions made while the reaper thread runs back to back.
//!
//! A shared subscription queue left without consumers is reaped on the next
//! pass. Re-subscribing must always end with a live, registered queue that
//! holds the new consumer and receives messages.

use crossbeam::channel::unbounded;
use std::path::Path;
use std::thread;
use std::time::Duration;
use wildleak_broker::{BrokerConfig, BrokerServer, Fabric, Message, MqttClient, QoS};

const SHARED_FILTER: &str = "$share/ebs-group/publish/#";
const SHARED_QUEUE: &str = "ebs-group.publish/#";

fn reaping_server(dir: &Path, fabric: &Fabric) -> BrokerServer {
    let mut config = BrokerConfig::new("reaping", dir);
    config.address_queue_scan_period = Duration::from_millis(1);
    let server = BrokerServer::new(config, fabric).expect("server");
    server.start().expect("start");
    assert!(server.wait_for_start(Duration::from_secs(5)));
    server
}

fn connected(fabric: &Fabric, id: &str) -> MqttClient {
    let client = MqttClient::builder(fabric)
        .identifier(id)
        .build()
        .expect("build");
    client.connect(true).expect("connect");
    client
}

fn assert_live_shared_queue(server: &BrokerServer) {
    let po = server.post_office().expect("post office");
    let queue = po.queue(SHARED_QUEUE).expect("shared queue registered");
    assert!(!queue.is_deleted());
    assert!(queue.consumer_count() >= 1);
}

#[test]
fn test_resubscribe_receives_after_reap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fabric = Fabric::new();
    let server = reaping_server(dir.path(), &fabric);

    for round in 0..50 {
        let client = connected(&fabric, &format!("consumer-{}", round));
        let (tx, rx) = unbounded();
        client
            .subscribe(SHARED_FILTER, QoS::AtLeastOnce, move |msg| {
                let _ = tx.send(msg.topic.clone());
            })
            .expect("subscribe");
        assert_live_shared_queue(&server);

        let topic = format!("publish/round/{}", round);
        let outcome = server.route(&topic, Message::new(true)).expect("route");
        assert_eq!(outcome.delivered, 1, "round {}", round);
        let received = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("delivery to the new subscriber");
        assert_eq!(received, topic);

        client.disconnect().expect("disconnect");
        // Let the reaper retire the consumer-less queue before the next round.
        thread::sleep(Duration::from_millis(2));
    }
    server.stop().expect("stop");
}

#[test]
fn test_concurrent_subscribers_get_live_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fabric = Fabric::new();
    let server = reaping_server(dir.path(), &fabric);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let fabric = fabric.clone();
            let server = server.clone();
            thread::spawn(move || {
                for round in 0..25 {
                    let client = connected(&fabric, &format!("consumer-{}-{}", worker, round));
                    client
                        .subscribe(SHARED_FILTER, QoS::AtLeastOnce, |_| {})
                        .expect("subscribe");
                    assert_live_shared_queue(&server);
                    client.disconnect().expect("disconnect");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker");
    }
    server.stop().expect("stop");
}
