//! Per-connection lifecycle: dial, concurrent read/write duties, and the
//! interrupt-driven graceful close.
//!
//! ## Lifecycle
//! A worker moves through `Dialing -> Active -> Closing -> Terminated`, with
//! a direct exit from `Dialing` to `Terminated` when the dial fails. While
//! `Active`, a read duty and a write duty run concurrently so a stalled
//! peer cannot wedge either direction.
//!
//! ## Accounting
//! Every established connection produces exactly one terminal event
//! (`alive` down, `failed` up), no matter which duty observes the failure
//! first or whether teardown was interrupt-driven. A failed dial only
//! increments `failed`.
//!
//! ## Shutdown
//! The write duty is the only place the shutdown token is observed. On
//! cancellation it sends a close frame, waits for the read duty's done
//! signal bounded by `close_wait`, then force-releases the transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::metrics::{Counter, Counters};

/// Drives one connection from dial to teardown.
pub struct ConnectionWorker {
    counters: Counters,
    shutdown: CancellationToken,
    write_interval: Duration,
    close_wait: Duration,
}

/// Records the terminal accounting event for one established connection.
/// Read and write duties race to observe a failure; whichever settles first
/// wins and every later call is a no-op.
struct Teardown {
    counters: Counters,
    settled: AtomicBool,
}

impl Teardown {
    fn new(counters: Counters) -> Arc<Self> {
        Arc::new(Self {
            counters,
            settled: AtomicBool::new(false),
        })
    }

    fn settle(&self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.counters.decrement(Counter::Alive);
            self.counters.increment(Counter::Failed);
        }
    }
}

enum WriteExit {
    SendFailed,
    Interrupted,
}

impl ConnectionWorker {
    pub fn new(
        counters: Counters,
        shutdown: CancellationToken,
        write_interval: Duration,
        close_wait: Duration,
    ) -> Self {
        Self {
            counters,
            shutdown,
            write_interval,
            close_wait,
        }
    }

    /// Dials `url` and runs the connection to completion. A failed dial is
    /// terminal: it is counted and never retried here.
    pub async fn run(self, url: String) {
        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                self.counters.increment(Counter::Failed);
                warn!(url = %url, error = %e, "dial failed");
                return;
            }
        };
        debug!(url = %url, "connected");
        self.drive(ws).await;
    }

    /// Runs an already-established connection: both duties in parallel,
    /// then the graceful-close handshake once the shutdown token fires.
    pub async fn drive<S>(self, ws: S)
    where
        S: Stream<Item = Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Send
            + 'static,
    {
        self.counters.increment(Counter::Alive);
        let teardown = Teardown::new(self.counters.clone());

        let (mut sink, stream) = ws.split();
        let (done_tx, done_rx) = oneshot::channel();
        let read_task = tokio::spawn(read_duty(stream, Arc::clone(&teardown), done_tx));

        match self.write_duty(&mut sink).await {
            WriteExit::SendFailed => teardown.settle(),
            WriteExit::Interrupted => {
                self.close(&mut sink, done_rx).await;
                teardown.settle();
            }
        }

        // Force-release the transport: the read duty may still be parked on
        // a peer that will never speak again.
        read_task.abort();
        let _ = read_task.await;
    }

    async fn write_duty<W>(&self, sink: &mut W) -> WriteExit
    where
        W: Sink<Message, Error = WsError> + Unpin,
    {
        // First tick lands one full interval after entering Active.
        let mut ticker = interval_at(Instant::now() + self.write_interval, self.write_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sink.send(Message::Text(timestamp_millis())).await {
                        warn!(error = %e, "keep-alive write failed");
                        return WriteExit::SendFailed;
                    }
                    trace!("keep-alive sent");
                }
                _ = self.shutdown.cancelled() => return WriteExit::Interrupted,
            }
        }
    }

    /// Tells the peer we are done, then waits for the read duty's done
    /// signal or the close-wait bound, whichever comes first.
    async fn close<W>(&self, sink: &mut W, done: oneshot::Receiver<()>)
    where
        W: Sink<Message, Error = WsError> + Unpin,
    {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "close frame not delivered");
            return;
        }
        if timeout(self.close_wait, done).await.is_err() {
            debug!("peer did not acknowledge close in time");
        }
    }
}

async fn read_duty<R>(mut stream: R, teardown: Arc<Teardown>, done: oneshot::Sender<()>)
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(message)) => trace!(len = message.len(), "inbound message"),
            Some(Err(e)) => {
                warn!(error = %e, "read failed");
                teardown.settle();
                break;
            }
            None => {
                // Stream end is the remote's side of the close handshake.
                teardown.settle();
                break;
            }
        }
    }
    // Fires at most once; the write duty bounds its close wait on this.
    let _ = done.send(());
}

fn timestamp_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_default()
}
