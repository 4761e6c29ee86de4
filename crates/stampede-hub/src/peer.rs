//! Per-peer pumps: the read pump forwards inbound frames to the hub, the
//! write pump drains the peer's delivery queue outward. The hub never
//! touches the socket; these pumps are its only collaborators.

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

use crate::hub::{Hub, PeerHandle};

/// Upgrades an accepted socket, registers the peer, and runs both pumps
/// until either side finishes. Always unregisters on the way out.
pub async fn serve(
    stream: TcpStream,
    peer_id: u64,
    hub: Hub,
    queue_depth: usize,
) -> Result<(), WsError> {
    let ws = accept_async(stream).await?;
    let (queue_tx, queue_rx) = mpsc::channel(queue_depth);
    hub.register(PeerHandle::new(peer_id, queue_tx)).await;
    debug!(peer = peer_id, "registered");

    let (sink, stream) = ws.split();
    let result = tokio::select! {
        res = read_pump(stream, &hub) => res,
        res = write_pump(sink, queue_rx) => res,
    };

    hub.unregister(peer_id).await;
    debug!(peer = peer_id, "unregistered");
    result
}

/// Forwards every inbound data frame to the hub for fan-out. Returns on
/// close, stream end, or transport error.
async fn read_pump<R>(mut stream: R, hub: &Hub) -> Result<(), WsError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => hub.broadcast(Bytes::from(text.into_bytes())).await,
            Message::Binary(payload) => hub.broadcast(Bytes::from(payload)).await,
            Message::Close(_) => break,
            // Ping/pong are answered by the protocol layer.
            _ => {}
        }
    }
    Ok(())
}

/// Drains the delivery queue into the socket. The hub closing the queue
/// (eviction or unregistration) ends the conversation with a normal close.
async fn write_pump<W>(mut sink: W, mut queue: mpsc::Receiver<Bytes>) -> Result<(), WsError>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(payload) = queue.recv().await {
        sink.send(Message::Binary(payload.to_vec())).await?;
    }
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };
    sink.send(Message::Close(Some(frame))).await?;
    Ok(())
}
