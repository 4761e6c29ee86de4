pub mod hub;
pub mod metrics;
pub mod peer;
pub mod server;

pub use hub::{Hub, PeerHandle};
