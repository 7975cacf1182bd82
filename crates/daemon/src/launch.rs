use maxcpu_core::{MaxcpuError, Result};
use maxcpu_ipc::Client;
use std::ffi::OsString;
use std::os::unix::fs::MetadataExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::debug;

/// How a daemon process is (re)started: binary plus full argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relaunch {
    pub exe:  PathBuf,
    pub args: Vec<OsString>,
}

impl Relaunch {
    /// Start `exe` as a daemon serving `socket`.
    pub fn daemon(exe: impl Into<PathBuf>, socket: &Path, config: Option<&Path>) -> Self {
        let mut args: Vec<OsString> = vec!["--as-daemon".into(), "--socket".into(), socket.into()];
        if let Some(config) = config {
            args.push("--config".into());
            args.push(config.into());
        }
        Self {
            exe: exe.into(),
            args,
        }
    }

    /// Re-run the current process with the arguments it was started with.
    pub fn current() -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|e| MaxcpuError::Spawn(format!("cannot locate own binary: {e}")))?;
        Ok(Self {
            exe,
            args: std::env::args_os().skip(1).collect(),
        })
    }

    /// Detached command: own process group, no stdio.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);
        cmd
    }

    /// Fire and forget; the child outlives this process.
    pub fn spawn_detached(&self) -> Result<u32> {
        let child = self
            .command()
            .spawn()
            .map_err(|e| MaxcpuError::Spawn(format!("{}: {e}", self.exe.display())))?;
        Ok(child.id())
    }

    /// Spawn a child that can still be killed if it never takes over.
    pub fn spawn_supervised(&self) -> Result<tokio::process::Child> {
        tokio::process::Command::from(self.command())
            .spawn()
            .map_err(|e| MaxcpuError::Spawn(format!("{}: {e}", self.exe.display())))
    }
}

/// Inode currently bound at `socket`.
pub fn socket_inode(socket: &Path) -> Result<u64> {
    Ok(std::fs::metadata(socket)?.ino())
}

/// Wait until a process other than ourselves serves `socket`.
///
/// A replacement removes the old path and binds a fresh socket, so the path
/// must name a new inode *and* answer `GET hello` before `grace` runs out.
/// Fails early if `child` exits.
pub async fn confirm_takeover(
    socket: &Path,
    own_inode: u64,
    child: &mut tokio::process::Child,
    grace: Duration,
) -> Result<()> {
    const POLL: Duration = Duration::from_millis(200);

    let deadline = Instant::now() + grace;
    let mut client = Client::new(socket, Duration::from_secs(1));

    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Err(MaxcpuError::Spawn(format!("replacement exited early: {status}")));
        }

        match socket_inode(socket) {
            Ok(inode) if inode != own_inode => match crate::client::hello(&mut client).await {
                Ok(_) => return Ok(()),
                Err(e) => debug!("replacement not answering yet: {e}"),
            },
            Ok(_) => debug!("socket still bound by this process"),
            Err(e) => debug!("socket path not present: {e}"),
        }

        time::sleep(POLL).await;
    }

    Err(MaxcpuError::Spawn(format!(
        "replacement did not take over '{}' within {grace:?}",
        socket.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HelloHandler;
    use maxcpu_ipc::{Router, Server};
    use tokio::net::UnixListener;
    use tokio::sync::watch;

    fn serve_hello(listener: UnixListener) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        let server = Server::new(
            Router::new("test").register("hello", HelloHandler),
            Duration::from_secs(5),
        );
        tokio::spawn(async move { server.serve(listener, rx).await });
        tx
    }

    #[test]
    fn daemon_arguments() {
        let r = Relaunch::daemon("/usr/bin/maxcpu", Path::new("/tmp/m.sock"), None);
        assert_eq!(r.args, ["--as-daemon", "--socket", "/tmp/m.sock"]);

        let r = Relaunch::daemon("/usr/bin/maxcpu", Path::new("/tmp/m.sock"), Some(Path::new("/etc/m.toml")));
        assert_eq!(r.args.len(), 5);
        assert_eq!(r.args[4], "/etc/m.toml");
    }

    #[test]
    fn missing_binary_is_spawn_error() {
        let r = Relaunch::daemon("/nonexistent/maxcpu", Path::new("/tmp/m.sock"), None);
        assert!(matches!(r.spawn_detached(), Err(MaxcpuError::Spawn(_))));
    }

    #[tokio::test]
    async fn child_exiting_early_fails_takeover() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("m.sock");
        let r = Relaunch {
            exe:  "true".into(),
            args: Vec::new(),
        };
        let mut child = r.spawn_supervised().unwrap();

        let result = confirm_takeover(&socket, 0, &mut child, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(MaxcpuError::Spawn(_))));
    }

    #[tokio::test]
    async fn takeover_needs_new_inode_answering_hello() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("m.sock");
        let _own = serve_hello(UnixListener::bind(&socket).unwrap());
        let own_inode = socket_inode(&socket).unwrap();

        let r = Relaunch {
            exe:  "sleep".into(),
            args: vec!["5".into()],
        };
        let mut child = r.spawn_supervised().unwrap();

        // our own socket answers hello too, but it is not a takeover
        let early = confirm_takeover(&socket, own_inode, &mut child, Duration::from_millis(500)).await;
        assert!(matches!(early, Err(MaxcpuError::Spawn(_))));
        assert!(child.try_wait().unwrap().is_none());

        // bind beside the old socket and rename over it, as a replacement would
        let staged = dir.path().join("m.sock.new");
        let _replacement = serve_hello(UnixListener::bind(&staged).unwrap());
        std::fs::rename(&staged, &socket).unwrap();
        assert_ne!(socket_inode(&socket).unwrap(), own_inode);

        confirm_takeover(&socket, own_inode, &mut child, Duration::from_secs(5))
            .await
            .unwrap();
        child.kill().await.unwrap();
    }
}
