//! Platform channel: a named pipe on Windows, a Unix domain socket elsewhere.
//!
//! Both sides derive the OS endpoint from the same well-known name, so the
//! producer and the collector only have to agree on that string.

use std::io;
use std::time::Duration;

use tracing::debug;

use crate::error::TransportError;

/// Channel name the native producer connects to by default
pub const DEFAULT_CHANNEL_NAME: &str = "ManagedLogger";

/// Attempts a client makes while every server instance is busy
const CONNECT_ATTEMPTS: u32 = 50;

/// Delay between client connect attempts
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Resolve a channel name to its OS endpoint, for display and diagnostics
pub fn channel_endpoint(name: &str) -> String {
    #[cfg(unix)]
    {
        unix::socket_path(name).display().to_string()
    }
    #[cfg(windows)]
    {
        windows::pipe_path(name)
    }
}

#[cfg(unix)]
pub(crate) use unix::{ChannelListener, ChannelStream, connect};

#[cfg(windows)]
pub(crate) use windows::{ChannelListener, ChannelStream, connect};

#[cfg(unix)]
mod unix {
    use super::*;
    use std::path::{Path, PathBuf};
    use tokio::net::{UnixListener, UnixStream};

    pub type ChannelStream = UnixStream;

    /// Socket path for a channel name.
    ///
    /// Priority:
    /// 1. the name itself if it contains a path separator
    /// 2. `XDG_RUNTIME_DIR/<name>.sock` if `XDG_RUNTIME_DIR` is set
    /// 3. `<temp dir>/<name>.sock`
    pub fn socket_path(name: &str) -> PathBuf {
        if name.contains('/') {
            return PathBuf::from(name);
        }
        let file = format!("{name}.sock");
        std::env::var_os("XDG_RUNTIME_DIR").map_or_else(
            || std::env::temp_dir().join(&file),
            |dir| PathBuf::from(dir).join(&file),
        )
    }

    /// Listening side of the channel. Removes its socket file on drop.
    #[derive(Debug)]
    pub struct ChannelListener {
        listener: UnixListener,
        path: PathBuf,
    }

    impl ChannelListener {
        /// Bind the channel. Must be called from within a Tokio runtime.
        pub fn bind(name: &str) -> Result<Self, TransportError> {
            let path = socket_path(name);
            let endpoint = path.display().to_string();
            let bind_err = |source: io::Error| TransportError::Bind {
                endpoint: endpoint.clone(),
                source,
            };

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(bind_err)?;
                }
            }

            remove_stale_socket(&path).map_err(|e| match e.kind() {
                io::ErrorKind::AddrInUse => TransportError::ChannelInUse(endpoint.clone()),
                _ => bind_err(e),
            })?;

            let listener = UnixListener::bind(&path).map_err(|e| match e.kind() {
                io::ErrorKind::AddrInUse => TransportError::ChannelInUse(endpoint.clone()),
                _ => bind_err(e),
            })?;

            Ok(Self { listener, path })
        }

        /// Wait for the next client
        pub async fn accept(&mut self) -> io::Result<ChannelStream> {
            let (stream, _addr) = self.listener.accept().await?;
            Ok(stream)
        }
    }

    impl Drop for ChannelListener {
        fn drop(&mut self) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "Could not remove socket file");
            }
        }
    }

    /// Remove a socket file left behind by a collector that exited uncleanly.
    ///
    /// A socket that still accepts connections belongs to a live collector and
    /// is reported as `AddrInUse`; a path that is not a socket is refused. The
    /// check connects and closes at once, which the live collector counts as
    /// an empty connection.
    fn remove_stale_socket(path: &Path) -> io::Result<()> {
        use std::os::unix::fs::FileTypeExt;

        let metadata = match std::fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if !metadata.file_type().is_socket() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists but is not a socket", path.display()),
            ));
        }

        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Err(io::Error::from(io::ErrorKind::AddrInUse));
        }

        std::fs::remove_file(path)?;
        debug!(path = %path.display(), "Removed stale socket file");
        Ok(())
    }

    /// Connect to a collector as a producer
    pub async fn connect(name: &str) -> io::Result<ChannelStream> {
        let path = socket_path(name);
        let mut attempt = 0;
        loop {
            match UnixStream::connect(&path).await {
                Ok(stream) => return Ok(stream),
                // Backlog full: the collector is alive but saturated
                Err(e) if e.kind() == io::ErrorKind::WouldBlock && attempt < CONNECT_ATTEMPTS => {
                    attempt += 1;
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::*;
    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };

    pub type ChannelStream = NamedPipeServer;

    const ERROR_FILE_NOT_FOUND: i32 = 2;
    const ERROR_ACCESS_DENIED: i32 = 5;
    const ERROR_PIPE_BUSY: i32 = 231;
    const ERROR_NO_DATA: i32 = 232;

    /// Pipe path for a channel name
    pub fn pipe_path(name: &str) -> String {
        if name.starts_with(r"\\") {
            name.to_string()
        } else {
            format!(r"\\.\pipe\{name}")
        }
    }

    /// Listening side of the channel.
    ///
    /// Always holds one unconnected pipe instance so a client arriving while
    /// another is being read finds a free instance.
    #[derive(Debug)]
    pub struct ChannelListener {
        pending: NamedPipeServer,
        path: String,
    }

    impl ChannelListener {
        /// Create the first pipe instance. Fails if another process owns the name.
        pub fn bind(name: &str) -> Result<Self, TransportError> {
            let path = pipe_path(name);
            let pending = ServerOptions::new()
                .first_pipe_instance(true)
                .create(&path)
                .map_err(|e| match e.raw_os_error() {
                    Some(ERROR_ACCESS_DENIED) => TransportError::ChannelInUse(path.clone()),
                    _ => TransportError::Bind {
                        endpoint: path.clone(),
                        source: e,
                    },
                })?;

            Ok(Self { pending, path })
        }

        /// Wait for the next client.
        ///
        /// A fresh instance replaces the pending one whatever the connect
        /// outcome, so a client that fails mid-handshake cannot leave the
        /// channel without a listening instance.
        pub async fn accept(&mut self) -> io::Result<ChannelStream> {
            let connected = self.pending.connect().await;
            let next = ServerOptions::new().create(&self.path)?;
            let instance = std::mem::replace(&mut self.pending, next);

            match connected {
                Ok(()) => Ok(instance),
                // Client wrote and closed before the connect; hand the
                // instance over so any buffered bytes are still read
                Err(e) if e.raw_os_error() == Some(ERROR_NO_DATA) => {
                    debug!(path = %self.path, "Client closed before connect");
                    Ok(instance)
                }
                Err(e) => Err(e),
            }
        }
    }

    /// Connect to a collector as a producer
    pub async fn connect(name: &str) -> io::Result<NamedPipeClient> {
        let path = pipe_path(name);
        let mut attempt = 0;
        loop {
            match ClientOptions::new().open(&path) {
                Ok(client) => return Ok(client),
                // Busy, or between two server instances
                Err(e)
                    if matches!(e.raw_os_error(), Some(ERROR_PIPE_BUSY | ERROR_FILE_NOT_FOUND))
                        && attempt < CONNECT_ATTEMPTS =>
                {
                    attempt += 1;
                    debug!(path = %path, attempt, "Pipe busy, retrying");
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
