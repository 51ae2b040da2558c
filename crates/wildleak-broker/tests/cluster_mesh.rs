// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability

//! Three-node static cluster over one fabric.
//!
//! Validates bridge formation (store-and-forward queues, member count) and
//! ON_DEMAND forwarding into the peer's `BRIDGE.<node-id>` duplicate cache.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use wildleak_broker::{
    BrokerConfig, BrokerServer, ClusterConfig, Fabric, Message, MqttClient, QoS,
    BRIDGE_CACHE_PREFIX, SF_QUEUE_PREFIX,
};

const NODES: [(&str, u16, u16); 3] = [
    ("artemis-broker", 61616, 1883),
    ("artemis-node1", 61617, 1884),
    ("artemis-node2", 61618, 1885),
];

fn start_cluster(root: &Path, fabric: &Fabric) -> Vec<BrokerServer> {
    let servers: Vec<BrokerServer> = NODES
        .iter()
        .map(|(name, core, mqtt)| {
            let mut config = BrokerConfig::new(*name, root.join(name));
            config.core_port = *core;
            config.mqtt_port = *mqtt;
            config.address_queue_scan_period = Duration::from_millis(50);
            config.cluster = Some(ClusterConfig {
                name: "wildleak-cluster".into(),
                static_connectors: NODES
                    .iter()
                    .filter(|(peer, _, _)| peer != name)
                    .map(|(_, port, _)| format!("tcp://localhost:{}", port))
                    .collect(),
                max_hops: 1,
            });
            BrokerServer::new(config, fabric).expect("server")
        })
        .collect();
    for server in &servers {
        server.start().expect("start");
    }
    for server in &servers {
        assert!(server.wait_for_start(Duration::from_secs(5)), "{} start", server.name());
    }
    servers
}

fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    f()
}

#[test]
fn test_full_mesh_bridges() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fabric = Fabric::new();
    let servers = start_cluster(dir.path(), &fabric);

    for server in &servers {
        assert_eq!(server.cluster_member_count(), 3);
        let po = server.post_office().expect("post office");
        let formed = wait_until(Duration::from_secs(5), || {
            po.queue_names()
                .iter()
                .filter(|q| q.starts_with(SF_QUEUE_PREFIX))
                .count()
                == 2
        });
        assert!(formed, "{} bridges", server.name());
    }

    servers[2].stop().expect("stop");
    assert_eq!(servers[0].cluster_member_count(), 2);

    for server in &servers {
        server.stop().expect("stop");
    }
}

#[test]
fn test_on_demand_forwarding_feeds_bridge_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fabric = Fabric::new();
    let servers = start_cluster(dir.path(), &fabric);

    // Consumer only on node1; messages are published on the primary.
    let client = MqttClient::builder(&fabric)
        .identifier("remote")
        .server_port(1884)
        .build()
        .expect("build");
    client.connect(true).expect("connect");
    client
        .subscribe("$share/g/publish/#", QoS::AtLeastOnce, |_| {})
        .expect("subscribe");

    servers[0]
        .route("publish/a/b", Message::new(true))
        .expect("route");

    let primary_id = servers[0].node_id();
    let peer = servers[1].post_office().expect("post office");
    assert!(peer.address("publish/a/b").is_some());
    assert_eq!(
        peer.duplicate_cache_names(),
        vec![format!("{}{}", BRIDGE_CACHE_PREFIX, primary_id)]
    );

    // node2 has no consumer, so nothing was forwarded there.
    let idle = servers[2].post_office().expect("post office");
    assert!(idle.address("publish/a/b").is_none());

    client.disconnect().expect("disconnect");
    for server in &servers {
        server.stop().expect("stop");
    }
}
