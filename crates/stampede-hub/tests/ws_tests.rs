use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use stampede_hub::hub::Hub;
use stampede_hub::server;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

async fn wait_for_peers(hub: &Hub, expected: usize) {
    for _ in 0..200 {
        if hub.connected_peers() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "hub never reached {} peers (still at {})",
        expected,
        hub.connected_peers()
    );
}

#[tokio::test]
async fn test_inbound_frames_fan_out_to_other_peers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Hub::spawn();
    let shutdown = CancellationToken::new();
    tokio::spawn(server::serve(listener, hub.clone(), 16, shutdown.clone()));

    let (mut sender, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    let (mut receiver, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_peers(&hub, 2).await;

    sender
        .send(Message::Text("broadcast me".to_string()))
        .await
        .unwrap();

    let got = tokio::time::timeout(Duration::from_secs(2), receiver.next())
        .await
        .expect("delivery within bound")
        .expect("stream open")
        .expect("clean frame");
    assert_eq!(got.into_data(), b"broadcast me".to_vec());

    // The sender hears its own broadcast too.
    let echo = tokio::time::timeout(Duration::from_secs(2), sender.next())
        .await
        .expect("delivery within bound")
        .expect("stream open")
        .expect("clean frame");
    assert_eq!(echo.into_data(), b"broadcast me".to_vec());

    shutdown.cancel();
}

#[tokio::test]
async fn test_client_close_unregisters_the_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Hub::spawn();
    let shutdown = CancellationToken::new();
    tokio::spawn(server::serve(listener, hub.clone(), 16, shutdown.clone()));

    let (mut leaving, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    let (_staying, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_peers(&hub, 2).await;

    leaving.close(None).await.unwrap();
    wait_for_peers(&hub, 1).await;

    shutdown.cancel();
}

#[tokio::test]
async fn test_peer_ids_are_distinct_across_accepts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Hub::spawn();
    let shutdown = CancellationToken::new();
    tokio::spawn(server::serve(listener, hub.clone(), 16, shutdown.clone()));

    // Connect, disconnect, reconnect: the second accept must not collide
    // with the id of a still-registered first peer.
    let (mut first, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_peers(&hub, 1).await;
    first.close(None).await.unwrap();
    wait_for_peers(&hub, 0).await;

    let (_second, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    let (_third, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_peers(&hub, 2).await;

    shutdown.cancel();
}
