//! End-to-end overlay tests over loopback TCP: public nodes and the
//! sub-nodes registered through them.

use std::sync::Arc;
use std::time::Duration;

use peerlink_crypto::KeyIdentity;
use peerlink_messages::UpdatePackageFeeReq;
use peerlink_network::ListenAddr;
use peerlink_node::{BootstrapNode, NodeConfig, PeerNode, Route, HEALTH_PRIORITY};
use peerlink_nullables::{NullHeightStore, NullIdentity};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(public: bool, bootstrap: Option<u16>) -> NodeConfig {
    NodeConfig {
        is_public_node: public,
        listen_ip: "127.0.0.1".parse().unwrap(),
        listen_port: 0,
        unix_domain_path: Default::default(),
        refresh_interval_secs: 1,
        work_threads: 2,
        bootstrap_nodes: bootstrap
            .map(|port| {
                vec![BootstrapNode {
                    ip: "127.0.0.1".into(),
                    port,
                }]
            })
            .unwrap_or_default(),
        ..NodeConfig::default()
    }
}

async fn spawn_node(seed: u8, public: bool, bootstrap: Option<u16>) -> (PeerNode, u16) {
    spawn_with(seed, config(public, bootstrap)).await
}

async fn spawn_with(seed: u8, config: NodeConfig) -> (PeerNode, u16) {
    let node = PeerNode::new(
        config,
        Arc::new(KeyIdentity::from_seed(&[seed; 32])),
        Arc::new(NullHeightStore::new()),
    )
    .expect("node builds");
    let bound = node.start().await.expect("node starts");
    let port = match &bound[0] {
        ListenAddr::Tcp(addr) => addr.port(),
        other => panic!("unexpected listener {other}"),
    };
    (node, port)
}

async fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

struct Overlay {
    public: PeerNode,
    first: PeerNode,
    second: PeerNode,
}

/// P is public; R registers first, then S, so S learns R from the ack.
async fn overlay() -> Overlay {
    let (public, port) = spawn_node(1, true, None).await;
    let (first, _) = spawn_node(2, false, Some(port)).await;
    let p = public.self_node().address;
    wait_for("R to register", || first.directory().self_gateway() == Some(p.clone())).await;

    let (second, _) = spawn_node(3, false, Some(port)).await;
    let r = first.self_node().address;
    wait_for("S to learn R", || second.directory().find_node(&r).is_some()).await;
    Overlay {
        public,
        first,
        second,
    }
}

async fn stop_all(overlay: Overlay) {
    overlay.second.stop().await.unwrap();
    overlay.first.stop().await.unwrap();
    overlay.public.stop().await.unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sub_nodes_register_with_the_public_node() {
    let overlay = overlay().await;
    let p = overlay.public.self_node().address;
    let r = overlay.first.self_node().address;
    let s = overlay.second.self_node().address;

    let seen_r = overlay.public.directory().find_node(&r).expect("P knows R");
    assert!(!seen_r.is_public_node);
    assert_eq!(seen_r.public_address, Some(p.clone()));
    assert!(seen_r.is_connected());
    assert!(overlay.public.directory().find_node(&s).is_some());

    let gateway = overlay.first.directory().find_node(&p).expect("R knows P");
    assert!(gateway.is_public_node);
    assert!(gateway.is_connected());
    assert_eq!(overlay.second.directory().self_gateway(), Some(p));

    stop_all(overlay).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fee_broadcast_reaches_sibling_sub_node() {
    let overlay = overlay().await;
    let r = overlay.first.self_node().address;

    overlay.first.broadcast_update_fee(9);
    assert_eq!(overlay.first.self_node().sign_fee, 9);

    let via_public = overlay.public.directory().clone();
    let via_sibling = overlay.second.directory().clone();
    wait_for("P to apply the fee", || {
        via_public.find_node(&r).map(|n| n.sign_fee) == Some(9)
    })
    .await;
    wait_for("S to apply the fee", || {
        via_sibling.find_node(&r).map(|n| n.sign_fee) == Some(9)
    })
    .await;

    stop_all(overlay).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sub_node_message_is_relayed_through_gateway() {
    let overlay = overlay().await;
    let p = overlay.public.self_node().address;
    let s = overlay.second.self_node().address;

    // Updates about the gateway itself are never overwritten by its sync.
    let update = UpdatePackageFeeReq {
        id: p.clone(),
        package_fee: 4,
    };
    let route = overlay
        .first
        .send_message_to_node(&s, &update, HEALTH_PRIORITY)
        .unwrap();
    assert_eq!(route, Route::Relayed { via: p.clone() });

    let directory = overlay.second.directory().clone();
    wait_for("S to apply the package fee", || {
        directory.find_node(&p).map(|n| n.package_fee) == Some(4)
    })
    .await;
    assert_eq!(overlay.first.metrics().messages_relayed.get(), 1);

    stop_all(overlay).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn losing_the_gateway_detaches_it() {
    let overlay = overlay().await;
    let p = overlay.public.self_node().address;

    overlay.public.stop().await.unwrap();
    let directory = overlay.first.directory().clone();
    wait_for("R to notice P is gone", || {
        directory.find_node(&p).map_or(true, |n| !n.is_connected())
    })
    .await;
    assert_eq!(overlay.public.registry().len(), 0);

    overlay.second.stop().await.unwrap();
    overlay.first.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn forged_registration_is_rejected() {
    let (public, port) = spawn_node(1, true, None).await;
    let identity = NullIdentity::new(7);
    identity.set_forging(true);
    let forger = PeerNode::new(
        config(false, Some(port)),
        Arc::new(identity),
        Arc::new(NullHeightStore::new()),
    )
    .unwrap();
    forger.start().await.unwrap();

    let metrics = public.metrics().clone();
    wait_for("P to reject the registration", || {
        metrics.handler_rejections.get() >= 1
    })
    .await;
    let forged = forger.self_node().address;
    assert!(public.directory().find_node(&forged).is_none());
    assert_eq!(forger.directory().self_gateway(), None);

    forger.stop().await.unwrap();
    public.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registered_sub_node_outlives_the_idle_timeout() {
    let short_idle = |public, bootstrap| NodeConfig {
        idle_timeout_secs: 3,
        reap_interval_secs: 1,
        ..config(public, bootstrap)
    };
    let (public, port) = spawn_with(1, short_idle(true, None)).await;
    let (sub, _) = spawn_with(2, short_idle(false, Some(port))).await;
    let p = public.self_node().address;
    let r = sub.self_node().address;
    wait_for("R to register", || sub.directory().self_gateway() == Some(p.clone())).await;

    let first = public.directory().find_node(&r).expect("P knows R");
    let first_id = *first.connection_id().expect("R is bound");
    for _ in 0..12 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let seen = public.directory().find_node(&r).expect("R stays known");
        assert!(seen.is_connected());
        assert_eq!(seen.connection_id(), Some(&first_id));
    }
    assert_eq!(public.metrics().handler_rejections.get(), 0);

    sub.stop().await.unwrap();
    public.stop().await.unwrap();
}

/// Three public nodes and one sub-node. P2 and P3 bootstrap to P1, so P3
/// learns P2 from its ack and has to dial it. S hangs off P2.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn public_mesh_relays_and_evicts_sub_nodes() {
    let (p1, port1) = spawn_node(1, true, None).await;
    let (p2, port2) = spawn_node(2, true, Some(port1)).await;
    let a1 = p1.self_node().address;
    let a2 = p2.self_node().address;
    wait_for("P2 to bind P1", || {
        p2.directory().find_node(&a1).is_some_and(|n| n.is_connected())
    })
    .await;

    let (p3, _) = spawn_node(3, true, Some(port1)).await;
    let a3 = p3.self_node().address;
    wait_for("P3 to dial P2", || {
        p3.directory().find_node(&a2).is_some_and(|n| n.is_connected())
    })
    .await;
    wait_for("P2 to accept P3", || {
        p2.directory().find_node(&a3).is_some_and(|n| n.is_connected())
    })
    .await;
    assert!(p1.directory().find_node(&a3).is_some_and(|n| n.is_public_node));

    let (sub, _) = spawn_node(4, false, Some(port2)).await;
    let s = sub.self_node().address;
    wait_for("S to register with P2", || {
        sub.directory().self_gateway() == Some(a2.clone())
    })
    .await;
    for (name, peer) in [("P1", &p1), ("P3", &p3)] {
        wait_for(&format!("{name} to learn S from P2's sync"), || {
            peer.directory()
                .find_node(&s)
                .is_some_and(|n| n.public_address == Some(a2.clone()))
        })
        .await;
    }

    let update = UpdatePackageFeeReq {
        id: a1.clone(),
        package_fee: 4,
    };
    let route = p1.send_message_to_node(&s, &update, HEALTH_PRIORITY).unwrap();
    assert_eq!(route, Route::Relayed { via: a2.clone() });
    let seen_by_sub = sub.directory().clone();
    wait_for("S to apply P1's package fee", || {
        seen_by_sub.find_node(&a1).map(|n| n.package_fee) == Some(4)
    })
    .await;
    assert_eq!(p1.metrics().messages_relayed.get(), 1);
    assert_eq!(p2.metrics().messages_relayed.get(), 0);

    sub.stop().await.unwrap();
    for (name, peer) in [("P1", &p1), ("P3", &p3)] {
        let directory = peer.directory().clone();
        wait_for(&format!("{name} to evict S"), || directory.find_node(&s).is_none()).await;
    }
    assert_eq!(p1.directory().public_count(), 2);

    p3.stop().await.unwrap();
    p2.stop().await.unwrap();
    p1.stop().await.unwrap();
}
