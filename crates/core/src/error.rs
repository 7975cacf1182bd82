use thiserror::Error;

/// Top-level error type used across the entire workspace.
#[derive(Debug, Error)]
pub enum MaxcpuError {
    #[error("config error: {0}")]
    Config(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("system error: {0}")]
    System(String),

    /// Fewer than two usable samples in the current window.
    #[error("{0}")]
    NotReady(String),

    #[error("spawn error: {0}")]
    Spawn(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl MaxcpuError {
    /// `true` for errors that mean the peer went away rather than misbehaved.
    pub fn is_disconnect(&self) -> bool {
        match self {
            MaxcpuError::Io { source } => matches!(
                source.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

pub type Result<T, E = MaxcpuError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_counts_as_disconnect() {
        let err = MaxcpuError::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(err.is_disconnect());
        let err = MaxcpuError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(err.is_disconnect());
    }

    #[test]
    fn protocol_error_is_not_disconnect() {
        assert!(!MaxcpuError::Protocol("bad".into()).is_disconnect());
    }
}
