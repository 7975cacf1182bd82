use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure parsed from `maxcpu.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub sampler: SamplerConfig,
    pub supervisor: SupervisorConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
}

/// CPU sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Time between two `/proc/stat` reads, in milliseconds.
    pub interval_ms: u64,
    /// Ring size including the baseline slot; holds `history_size - 1` samples.
    pub history_size: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms:  1_000,
            history_size: 361,
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Watchdog settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Exit once this many seconds pass without a stats query.
    pub max_idle_secs: u64,
    /// How often the daemon binary is checked for redeployment.
    pub update_check_secs: u64,
    /// How long a freshly spawned replacement gets to take over the socket.
    pub handoff_grace_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_idle_secs:      600,
            update_check_secs:  5,
            handoff_grace_secs: 10,
        }
    }
}

impl SupervisorConfig {
    pub fn update_check(&self) -> Duration {
        Duration::from_secs(self.update_check_secs)
    }

    pub fn handoff_grace(&self) -> Duration {
        Duration::from_secs(self.handoff_grace_secs)
    }
}

/// IPC endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// A connection that sends no command for this long is closed.
    pub conn_idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { conn_idle_timeout_secs: 5 }
    }
}

impl ServerConfig {
    pub fn conn_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.conn_idle_timeout_secs)
    }
}

/// Client-side timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Budget for the liveness probe, dial included.
    pub probe_timeout_ms: u64,
    /// Budget for the stats query, dial included.
    pub query_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 1_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl ClientConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
