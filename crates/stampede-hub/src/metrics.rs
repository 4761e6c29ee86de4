use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CONNECTED_PEERS: IntGauge = IntGauge::new(
        "stampede_connected_peers",
        "Number of peers currently registered with the hub"
    )
    .expect("metric can be created");
    pub static ref ACCEPTED_CONNECTIONS: IntCounter = IntCounter::new(
        "stampede_accepted_connections_total",
        "Total number of sockets accepted by the listener"
    )
    .expect("metric can be created");
    pub static ref BROADCASTS: IntCounter = IntCounter::new(
        "stampede_broadcasts_total",
        "Total number of messages fanned out by the registry"
    )
    .expect("metric can be created");
    pub static ref EVICTED_PEERS: IntCounter = IntCounter::new(
        "stampede_evicted_peers_total",
        "Total number of peers evicted for not draining their delivery queue"
    )
    .expect("metric can be created");
}

pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(CONNECTED_PEERS.clone()));
    let _ = REGISTRY.register(Box::new(ACCEPTED_CONNECTIONS.clone()));
    let _ = REGISTRY.register(Box::new(BROADCASTS.clone()));
    let _ = REGISTRY.register(Box::new(EVICTED_PEERS.clone()));
}

pub fn render_metrics(connected_peers: usize) -> String {
    CONNECTED_PEERS.set(connected_peers as i64);

    let metric_families = REGISTRY.gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|_| "# Error: Invalid UTF8".to_string())
}
