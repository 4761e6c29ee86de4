//! Rate-limited ramp: spawns workers in fixed-size batches until the
//! population ceiling is reached, then holds the process open.

use std::time::Duration;

use stampede_common::ClientConfig;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::engine::worker::ConnectionWorker;
use crate::metrics::{Counter, Counters};

pub struct Supervisor {
    url: String,
    connections_per_tick: usize,
    max_connections: usize,
    tick_interval: Duration,
    write_interval: Duration,
    close_wait: Duration,
    counters: Counters,
    shutdown: CancellationToken,
    workers: TaskTracker,
}

impl Supervisor {
    pub fn new(config: &ClientConfig, counters: Counters, shutdown: CancellationToken) -> Self {
        Self {
            url: config.target.url.clone(),
            connections_per_tick: config.ramp.connections_per_tick,
            max_connections: config.ramp.max_connections,
            tick_interval: Duration::from_millis(config.ramp.tick_interval_ms),
            write_interval: Duration::from_millis(config.worker.write_interval_ms),
            close_wait: Duration::from_millis(config.worker.close_wait_ms),
            counters,
            shutdown,
            workers: TaskTracker::new(),
        }
    }

    /// Ramps to the ceiling, parks until the shutdown token fires, then
    /// waits for every worker to finish its bounded teardown.
    pub async fn run(self) {
        self.ramp().await;
        info!(population = self.max_connections, "ramp complete, holding population");
        self.shutdown.cancelled().await;
        info!("interrupt received, draining workers");
        self.workers.close();
        self.workers.wait().await;
    }

    /// Spawns `connections_per_tick` workers per tick until `max_connections`
    /// have been issued. Issuance is counted here, at spawn, so the counter
    /// reflects attempts rather than successful dials.
    pub async fn ramp(&self) {
        let mut remaining = self.max_connections;
        while remaining > 0 {
            let batch = self.connections_per_tick.min(remaining);
            for _ in 0..batch {
                self.counters.increment(Counter::Issued);
                let worker = ConnectionWorker::new(
                    self.counters.clone(),
                    self.shutdown.clone(),
                    self.write_interval,
                    self.close_wait,
                );
                self.workers.spawn(worker.run(self.url.clone()));
            }
            remaining -= batch;
            debug!(batch, remaining, "batch spawned");
            if remaining > 0 {
                sleep(self.tick_interval).await;
            }
        }
    }
}
