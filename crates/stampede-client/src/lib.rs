pub mod engine;
pub mod metrics;
pub mod reporter;

pub use engine::supervisor::Supervisor;
pub use engine::worker::ConnectionWorker;
pub use metrics::{Counter, Counters};
