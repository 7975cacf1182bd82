pub mod schema;

pub use schema::{ClientConfig, DaemonConfig, SamplerConfig, ServerConfig, SupervisorConfig};

use maxcpu_core::{MaxcpuError, Result};
use std::path::{Path, PathBuf};

/// Load configuration from a TOML file.  Returns `DaemonConfig::default()` if
/// the file doesn't exist so the daemon always has sensible defaults.
pub fn load(path: impl AsRef<Path>) -> Result<DaemonConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(
            "Config file not found at '{}'; using defaults.",
            path.display()
        );
        return Ok(DaemonConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| MaxcpuError::Config(format!("cannot read '{}': {e}", path.display())))?;

    let config: DaemonConfig =
        toml::from_str(&raw).map_err(|e| MaxcpuError::Config(format!("TOML parse error: {e}")))?;
    validate(&config)?;
    Ok(config)
}

/// Reject values the daemon cannot run with.
pub fn validate(config: &DaemonConfig) -> Result<()> {
    if config.sampler.history_size < 3 {
        return Err(MaxcpuError::Config(format!(
            "sampler.history_size must be at least 3, got {}",
            config.sampler.history_size
        )));
    }
    if config.sampler.interval_ms == 0 {
        return Err(MaxcpuError::Config("sampler.interval_ms must be non-zero".into()));
    }
    if config.supervisor.update_check_secs == 0 {
        return Err(MaxcpuError::Config(
            "supervisor.update_check_secs must be non-zero".into(),
        ));
    }
    if config.supervisor.handoff_grace_secs == 0 {
        return Err(MaxcpuError::Config(
            "supervisor.handoff_grace_secs must be non-zero".into(),
        ));
    }
    if config.server.conn_idle_timeout_secs == 0 {
        return Err(MaxcpuError::Config(
            "server.conn_idle_timeout_secs must be non-zero".into(),
        ));
    }
    Ok(())
}

/// Return the default config path, honouring `$XDG_CONFIG_HOME`.
pub fn default_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("maxcpu").join("maxcpu.toml")
}
