use crate::protocol::{parse_command, read_line, write_reply, Command, Reply, Status, Value};
use maxcpu_core::{MaxcpuError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Produces the payload served for one `GET` key.
///
/// Called concurrently from every connection; implementations do their own
/// locking.
pub trait KeyHandler: Send + Sync {
    fn get(&self, key: &str) -> Result<Vec<u8>>;
}

impl<F> KeyHandler for F
where
    F: Fn(&str) -> Result<Vec<u8>> + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self(key)
    }
}

/// Command dispatch table. Built once before serving and read-only after.
pub struct Router {
    version: String,
    keys:    HashMap<String, Arc<dyn KeyHandler>>,
}

impl Router {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            keys:    HashMap::new(),
        }
    }

    /// Serve `key` from `handler`.
    pub fn register(mut self, key: impl Into<String>, handler: impl KeyHandler + 'static) -> Self {
        self.keys.insert(key.into(), Arc::new(handler));
        self
    }

    /// Run `command`. `None` means the connection should close.
    pub fn dispatch(&self, command: &Command) -> Option<Reply> {
        match command {
            Command::Quit => None,
            Command::Version => Some(Reply::status(Status::Version(self.version.clone()))),
            Command::Get { key } => Some(self.get(key)),
        }
    }

    fn get(&self, key: &str) -> Reply {
        let Some(handler) = self.keys.get(key) else {
            return Reply::status(Status::NotFound);
        };
        match handler.get(key) {
            Ok(data) => Reply::value(Value::new(key, data)),
            Err(e) => {
                warn!("GET {key} failed: {e}");
                Reply::status(Status::Error)
            }
        }
    }
}

/// Accept loop for the local socket endpoint.
pub struct Server {
    router:       Arc<Router>,
    idle_timeout: Duration,
}

impl Server {
    pub fn new(router: Router, idle_timeout: Duration) -> Self {
        Self {
            router: Arc::new(router),
            idle_timeout,
        }
    }

    /// Accept connections until `shutdown` turns `true` (or its sender is
    /// dropped). The listener is closed on return; open connections notice the
    /// same signal and finish on their own.
    pub async fn serve(&self, listener: UnixListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let per_conn = shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("Shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let router   = self.router.clone();
                        let shutdown = per_conn.clone();
                        let timeout  = self.idle_timeout;
                        tokio::spawn(serve_connection(stream, router, timeout, shutdown));
                    }
                    Err(e) => {
                        error!("accept error: {e}");
                        return Err(e.into());
                    }
                },
            }
        }
    }
}

/// Run the request loop for one connection.
///
/// Reading a command line and writing its reply each get `idle_timeout`, and
/// both give way to shutdown. The loop ends on `QUIT`, end of stream, a
/// read/write error, an elapsed deadline, or shutdown.
pub async fn serve_connection<S>(
    stream: S,
    router: Arc<Router>,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (rd, wr) = tokio::io::split(stream);
    let mut reader = BufReader::new(rd);
    let mut writer = BufWriter::new(wr);

    loop {
        let line = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => return,
            read = time::timeout(idle_timeout, read_line(&mut reader)) => match read {
                Err(_) => {
                    debug!("connection idle for {idle_timeout:?}; closing");
                    return;
                }
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => return,
                Ok(Err(e)) => {
                    log_io_failure("read", &e);
                    return;
                }
            },
        };

        let reply = match parse_command(&line) {
            Ok(command) => match router.dispatch(&command) {
                Some(reply) => reply,
                None => return,
            },
            Err(e) => {
                debug!("parse command error: {e}");
                Reply::status(Status::Error)
            }
        };

        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => return,
            written = time::timeout(idle_timeout, write_reply(&mut writer, &reply)) => match written {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log_io_failure("write", &MaxcpuError::from(e));
                    return;
                }
                Err(_) => {
                    debug!("peer not reading for {idle_timeout:?}; closing");
                    return;
                }
            },
        }
    }
}

fn log_io_failure(op: &str, e: &MaxcpuError) {
    if e.is_disconnect() {
        debug!("peer went away during {op}: {e}");
    } else {
        warn!("{op} error: {e}");
    }
}
