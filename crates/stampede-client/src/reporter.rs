//! Periodic stats writer: one counter line per interval, appended to a
//! file that tooling can tail during a run.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::{interval_at, Instant};
use tracing::warn;

use crate::metrics::Counters;

pub struct Reporter {
    file: File,
    counters: Counters,
    interval: Duration,
}

impl Reporter {
    /// Opens the stats file, truncating whatever a previous run left behind.
    pub async fn create(
        path: impl AsRef<Path>,
        counters: Counters,
        interval: Duration,
    ) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        Ok(Self {
            file,
            counters,
            interval,
        })
    }

    /// Emits one line per interval until the task is dropped or the file
    /// becomes unwritable.
    pub async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        loop {
            ticker.tick().await;
            let snapshot = self.counters.snapshot();
            let line = format!(
                "Requests: {}, KeepAlives: {}, Faileds: {}\n",
                snapshot.issued, snapshot.alive, snapshot.failed
            );
            if let Err(e) = self.file.write_all(line.as_bytes()).await {
                warn!(error = %e, "stats line not written");
                return;
            }
            if let Err(e) = self.file.flush().await {
                warn!(error = %e, "stats file flush failed");
                return;
            }
        }
    }
}
