// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability

//! Address retention under a wildcard subscription with the reaper thread
//! running.
//!
//! An implicit (MQTT shared) subscription on `publish/#` keeps every concrete
//! address it was linked into, together with its paging store and duplicate
//! cache. A core temporary queue on the same filter does not.

use std::path::Path;
use std::thread;
use std::time::Duration;
use uuid::Uuid;
use wildleak_broker::{
    BrokerConfig, BrokerServer, Fabric, Message, MqttClient, QoS, QueueConfig, ServerLocator,
};

const SCAN: Duration = Duration::from_millis(20);

fn server(dir: &Path, fabric: &Fabric, reap_through_implicit_links: bool) -> BrokerServer {
    let mut config = BrokerConfig::new("retention", dir);
    config.address_queue_scan_period = SCAN;
    config.address_settings.reap_through_implicit_links = reap_through_implicit_links;
    let server = BrokerServer::new(config, fabric).expect("server");
    server.start().expect("start");
    assert!(server.wait_for_start(Duration::from_secs(5)));
    server
}

fn publish_unique(server: &BrokerServer, n: usize) {
    for _ in 0..n {
        let address = format!("publish/{}/{}", Uuid::new_v4(), Uuid::new_v4());
        server.route(&address, Message::new(true)).expect("route");
    }
}

fn publish_counts(server: &BrokerServer) -> (usize, usize, usize) {
    let po = server.post_office().expect("post office");
    let concrete = |names: Vec<String>| {
        names
            .into_iter()
            .filter(|n| n.starts_with("publish/") && n != "publish/#")
            .count()
    };
    (
        concrete(po.address_names()),
        concrete(po.paging_store_names()),
        concrete(po.duplicate_cache_names()),
    )
}

fn mqtt_subscriber(fabric: &Fabric) -> MqttClient {
    let client = MqttClient::builder(fabric)
        .identifier(format!("consumer-{}", Uuid::new_v4()))
        .build()
        .expect("build");
    client.connect(true).expect("connect");
    client
        .subscribe("$share/ebs-group/publish/#", QoS::AtLeastOnce, |_| {})
        .expect("subscribe");
    client
}

#[test]
fn test_implicit_subscription_retains_addresses() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fabric = Fabric::new();
    let server = server(dir.path(), &fabric, false);
    let client = mqtt_subscriber(&fabric);

    publish_unique(&server, 10);
    thread::sleep(SCAN * 10);
    assert_eq!(publish_counts(&server), (10, 10, 10));

    publish_unique(&server, 10);
    thread::sleep(SCAN * 10);
    assert_eq!(publish_counts(&server), (20, 20, 20));

    client.disconnect().expect("disconnect");
    server.stop().expect("stop");
}

#[test]
fn test_reap_through_implicit_links_stays_bounded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fabric = Fabric::new();
    let server = server(dir.path(), &fabric, true);
    let client = mqtt_subscriber(&fabric);

    publish_unique(&server, 10);
    thread::sleep(SCAN * 10);
    assert_eq!(publish_counts(&server), (0, 0, 0));

    client.disconnect().expect("disconnect");
    server.stop().expect("stop");
}

#[test]
fn test_core_temporary_queue_does_not_retain() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fabric = Fabric::new();
    let server = server(dir.path(), &fabric, false);

    let locator = ServerLocator::new(&fabric, "tcp://localhost:61616").expect("locator");
    let factory = locator.create_session_factory().expect("factory");
    let session = factory.create_session().expect("session");
    let queue = format!("core-consumer-{}", Uuid::new_v4());
    session
        .create_queue(
            QueueConfig::new(&queue)
                .address("publish/#")
                .durable(false)
                .temporary(true)
                .auto_created(true),
        )
        .expect("queue");
    let consumer = session.create_consumer(&queue).expect("consumer");
    consumer
        .set_message_handler(|delivery| delivery.acknowledge())
        .expect("handler");
    session.start().expect("start");

    publish_unique(&server, 10);
    thread::sleep(SCAN * 10);
    assert_eq!(publish_counts(&server), (0, 0, 0));

    consumer.close();
    session.close().expect("close");
    thread::sleep(SCAN * 10);
    let po = server.post_office().expect("post office");
    assert!(po.queue(&queue).is_none());
    server.stop().expect("stop");
}
