use std::time::Duration;

use bytes::Bytes;
use stampede_hub::hub::{Hub, PeerHandle};
use tokio::sync::mpsc;

async fn wait_for_peers(hub: &Hub, expected: usize) {
    for _ in 0..200 {
        if hub.connected_peers() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "registry never reached {} peers (still at {})",
        expected,
        hub.connected_peers()
    );
}

#[tokio::test]
async fn test_broadcast_reaches_every_registered_peer() {
    let hub = Hub::spawn();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    hub.register(PeerHandle::new(1, tx_a)).await;
    hub.register(PeerHandle::new(2, tx_b)).await;
    wait_for_peers(&hub, 2).await;

    hub.broadcast(Bytes::from_static(b"hello")).await;

    assert_eq!(rx_a.recv().await.unwrap(), Bytes::from_static(b"hello"));
    assert_eq!(rx_b.recv().await.unwrap(), Bytes::from_static(b"hello"));
}

#[tokio::test]
async fn test_full_queue_evicts_only_the_stalled_peer() {
    let hub = Hub::spawn();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    // Capacity one and never drained: the second broadcast finds it full.
    let (tx_c, mut rx_c) = mpsc::channel(1);
    hub.register(PeerHandle::new(1, tx_a)).await;
    hub.register(PeerHandle::new(2, tx_b)).await;
    hub.register(PeerHandle::new(3, tx_c)).await;
    wait_for_peers(&hub, 3).await;

    hub.broadcast(Bytes::from_static(b"m1")).await;
    hub.broadcast(Bytes::from_static(b"m2")).await;

    assert_eq!(rx_a.recv().await.unwrap(), Bytes::from_static(b"m1"));
    assert_eq!(rx_a.recv().await.unwrap(), Bytes::from_static(b"m2"));
    assert_eq!(rx_b.recv().await.unwrap(), Bytes::from_static(b"m1"));
    assert_eq!(rx_b.recv().await.unwrap(), Bytes::from_static(b"m2"));

    // The stalled peer got the first message, then its queue was closed.
    assert_eq!(rx_c.recv().await.unwrap(), Bytes::from_static(b"m1"));
    assert!(rx_c.recv().await.is_none(), "evicted peer's queue must close");
    assert_eq!(hub.connected_peers(), 2);

    // Survivors keep receiving.
    hub.broadcast(Bytes::from_static(b"m3")).await;
    assert_eq!(rx_a.recv().await.unwrap(), Bytes::from_static(b"m3"));
    assert_eq!(rx_b.recv().await.unwrap(), Bytes::from_static(b"m3"));
}

#[tokio::test]
async fn test_register_then_unregister_leaves_registry_empty() {
    let hub = Hub::spawn();
    let (tx, mut rx) = mpsc::channel(4);
    hub.register(PeerHandle::new(7, tx)).await;
    wait_for_peers(&hub, 1).await;

    hub.unregister(7).await;

    assert!(rx.recv().await.is_none(), "queue must close on unregister");
    assert_eq!(hub.connected_peers(), 0);
}

#[tokio::test]
async fn test_unregister_of_unknown_peer_is_a_noop() {
    let hub = Hub::spawn();
    hub.unregister(42).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(hub.connected_peers(), 0);

    // The registry must still be fully functional afterwards.
    let (tx, mut rx) = mpsc::channel(4);
    hub.register(PeerHandle::new(1, tx)).await;
    wait_for_peers(&hub, 1).await;
    hub.broadcast(Bytes::from_static(b"still alive")).await;
    assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"still alive"));
}

#[tokio::test]
async fn test_reregistering_an_id_replaces_the_handle() {
    let hub = Hub::spawn();
    let (tx_old, mut rx_old) = mpsc::channel(4);
    let (tx_new, mut rx_new) = mpsc::channel(4);
    hub.register(PeerHandle::new(1, tx_old)).await;
    hub.register(PeerHandle::new(1, tx_new)).await;

    assert!(
        rx_old.recv().await.is_none(),
        "replaced handle's queue must close"
    );
    assert_eq!(hub.connected_peers(), 1);

    hub.broadcast(Bytes::from_static(b"x")).await;
    assert_eq!(rx_new.recv().await.unwrap(), Bytes::from_static(b"x"));
}

#[tokio::test]
async fn test_concurrent_broadcast_and_unregister_close_cleanly() {
    let hub = Hub::spawn();
    let (tx, mut rx) = mpsc::channel(256);
    hub.register(PeerHandle::new(1, tx)).await;
    wait_for_peers(&hub, 1).await;

    let broadcaster = {
        let hub = hub.clone();
        tokio::spawn(async move {
            for i in 0..100u32 {
                hub.broadcast(Bytes::copy_from_slice(&i.to_be_bytes())).await;
            }
        })
    };
    let unregisterer = {
        let hub = hub.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            hub.unregister(1).await;
        })
    };

    broadcaster.await.unwrap();
    unregisterer.await.unwrap();

    // Whatever was delivered before the unregister ends in a clean close,
    // never a message after the close.
    let mut delivered = 0;
    while rx.recv().await.is_some() {
        delivered += 1;
    }
    assert!(delivered <= 100);
    assert_eq!(hub.connected_peers(), 0);
}
