use crate::protocol::{read_response, write_request, Status, Value};
use maxcpu_core::{MaxcpuError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time;

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

/// Client for the local socket endpoint.
///
/// Keeps one connection open across calls; any failure drops it so the next
/// call dials again.
pub struct Client {
    path:    PathBuf,
    timeout: Duration,
    conn:    Option<Connection>,
}

impl Client {
    /// `timeout` bounds every call, dial included.
    pub fn new(path: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            timeout,
            conn: None,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Fetch the payload stored under `key`.
    pub async fn get(&mut self, key: &str) -> Result<Vec<u8>> {
        let (values, status) = self.request(&format!("GET {key}")).await?;
        match status {
            Status::End => values
                .into_iter()
                .find(|v| v.key == key)
                .map(|v: Value| v.data)
                .ok_or_else(|| MaxcpuError::Ipc(format!("no value returned for '{key}'"))),
            Status::NotFound => Err(MaxcpuError::Ipc(format!("key '{key}' not found"))),
            other => Err(MaxcpuError::Ipc(format!("GET {key}: server answered {other}"))),
        }
    }

    /// Ask the server for its version string.
    pub async fn version(&mut self) -> Result<String> {
        match self.request("VERSION").await?.1 {
            Status::Version(v) => Ok(v),
            other => Err(MaxcpuError::Ipc(format!("VERSION: server answered {other}"))),
        }
    }

    async fn request(&mut self, line: &str) -> Result<(Vec<Value>, Status)> {
        let outcome = match time::timeout(self.timeout, self.exchange(line)).await {
            Ok(result) => result,
            Err(_) => Err(MaxcpuError::Ipc(format!(
                "no answer from '{}' within {:?}",
                self.path.display(),
                self.timeout
            ))),
        };
        if outcome.is_err() {
            self.conn = None;
        }
        outcome
    }

    async fn exchange(&mut self, line: &str) -> Result<(Vec<Value>, Status)> {
        let conn = self.connect().await?;
        write_request(&mut conn.writer, line).await?;
        read_response(&mut conn.reader).await
    }

    async fn connect(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            let stream = UnixStream::connect(&self.path).await.map_err(|e| {
                MaxcpuError::Ipc(format!("connect '{}': {e}", self.path.display()))
            })?;
            let (rd, wr) = stream.into_split();
            self.conn = Some(Connection {
                reader: BufReader::new(rd),
                writer: BufWriter::new(wr),
            });
        }
        self.conn
            .as_mut()
            .ok_or_else(|| MaxcpuError::Ipc("not connected".into()))
    }
}
