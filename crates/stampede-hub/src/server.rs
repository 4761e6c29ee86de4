//! Accept loop: hands each socket to a peer task with a fresh id.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::hub::Hub;
use crate::{metrics, peer};

/// Accepts connections until the shutdown token fires. Peer tasks are
/// detached; they unregister themselves and die with the process.
pub async fn serve(
    listener: TcpListener,
    hub: Hub,
    queue_depth: usize,
    shutdown: CancellationToken,
) {
    let mut next_peer_id: u64 = 0;
    loop {
        tokio::select! {
            res = listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        next_peer_id += 1;
                        let peer_id = next_peer_id;
                        metrics::ACCEPTED_CONNECTIONS.inc();
                        let hub = hub.clone();
                        tokio::spawn(async move {
                            if let Err(e) = peer::serve(socket, peer_id, hub, queue_depth).await {
                                error!(peer = peer_id, client_addr = %addr, error = %e, "peer failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown.cancelled() => {
                info!("accept loop shutting down");
                break;
            }
        }
    }
}
