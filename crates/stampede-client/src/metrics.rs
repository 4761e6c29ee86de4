use std::sync::{Arc, Mutex, MutexGuard};

/// The three accounting events of a load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Connection attempts handed to workers by the supervisor.
    Issued,
    /// Connections currently established and exchanging traffic.
    Alive,
    /// Connections that failed to dial or later terminated for any reason.
    Failed,
}

/// Point-in-time view of all three counters, taken under the same lock
/// that guards mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub issued: u64,
    pub alive: u64,
    pub failed: u64,
}

#[derive(Default)]
struct State {
    issued: u64,
    alive: u64,
    failed: u64,
}

/// Process-wide connection accounting shared by the supervisor, every
/// worker, and the reporter. Cloning is cheap; all clones mutate one state.
#[derive(Clone, Default)]
pub struct Counters {
    state: Arc<Mutex<State>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: Counter) {
        let mut state = self.lock();
        match counter {
            Counter::Issued => state.issued += 1,
            Counter::Alive => state.alive += 1,
            Counter::Failed => state.failed += 1,
        }
    }

    /// Decrements saturate at zero: `alive` must never underflow no matter
    /// how teardown paths interleave.
    pub fn decrement(&self, counter: Counter) {
        let mut state = self.lock();
        match counter {
            Counter::Issued => state.issued = state.issued.saturating_sub(1),
            Counter::Alive => state.alive = state.alive.saturating_sub(1),
            Counter::Failed => state.failed = state.failed.saturating_sub(1),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        Snapshot {
            issued: state.issued,
            alive: state.alive,
            failed: state.failed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned lock still holds valid counts; recover rather than
        // take the whole run down.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
