use serde::Deserialize;

/// Settings for the load-generating client binary.
/// Every section falls back to built-in defaults, so a partial YAML file
/// (or no file at all) is a valid configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ClientConfig {
    pub target: TargetConfig,
    pub ramp: RampConfig,
    pub worker: WorkerConfig,
    pub reporter: ReporterConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TargetConfig {
    /// WebSocket endpoint the generated population connects to.
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RampConfig {
    /// New connections spawned on every ramp tick.
    pub connections_per_tick: usize,
    /// Total connection ceiling; the ramp stops issuing once reached.
    pub max_connections: usize,
    /// Pause between spawn batches.
    pub tick_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pause between keep-alive writes on one established connection.
    pub write_interval_ms: u64,
    /// Upper bound on waiting for the peer to acknowledge a graceful close.
    pub close_wait_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReporterConfig {
    /// Stats file; truncated at startup, one counter line appended per interval.
    pub path: String,
    pub interval_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
        }
    }
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            connections_per_tick: 5,
            max_connections: 1_000_000,
            tick_interval_ms: 1000,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            write_interval_ms: 1000,
            close_wait_ms: 1000,
        }
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            path: "stampede.log".to_string(),
            interval_secs: 5,
        }
    }
}

/// Settings for the broadcast hub binary.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub peer: PeerConfig,
    pub metrics: MetricsConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PeerConfig {
    /// Depth of each peer's delivery queue. A peer that lets the queue fill
    /// up is evicted on the next broadcast.
    pub send_queue_depth: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatsConfig {
    /// Pause between periodic hub stats lines in the log.
    pub interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            send_queue_depth: 32,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9100,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}
