use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use pipelog_types::LogRecord;

use crate::channel::{self, ChannelListener, ChannelStream, DEFAULT_CHANNEL_NAME};
use crate::codec::{RECORD_SIZE, decode};
use crate::error::{TransportError, WireError};
use crate::queue::RecordSender;

/// Default bound on how long a connected client may take to send its record
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed accept so a persistent OS error cannot spin the loop
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Pipe server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Well-known channel name shared with the producer
    pub channel: String,

    /// Maximum time to wait for a connected client's payload
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL_NAME.to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Default::default()
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    received: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of server activity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Connections accepted
    pub accepted: u64,
    /// Records decoded and enqueued
    pub received: u64,
    /// Connections closed before sending a single byte, such as another
    /// collector's liveness check
    pub empty: u64,
    /// Connections abandoned because of a transport or framing error
    pub failed: u64,
}

/// Accepts producer connections on the channel and enqueues one record per
/// connection.
///
/// The accept loop hands every connection to its own task and immediately
/// waits for the next client, so a slow producer never delays another.
pub struct PipeServer {
    /// Resolved OS endpoint
    endpoint: String,

    /// Cancellation token for the accept loop
    cancel: CancellationToken,

    /// Accept loop handle; `None` once stopped
    accept_task: Option<JoinHandle<()>>,

    /// In-flight connection reads
    connections: TaskTracker,

    counters: Arc<Counters>,
}

impl PipeServer {
    /// Bind the channel and start accepting.
    ///
    /// Binding happens before this returns, so a name collision or OS error
    /// is reported here rather than discovered later. Must be called from
    /// within a Tokio runtime.
    pub fn start(config: &ServerConfig, queue: RecordSender) -> Result<Self, TransportError> {
        let listener = ChannelListener::bind(&config.channel)?;
        let endpoint = channel::channel_endpoint(&config.channel);

        info!(endpoint = %endpoint, record_size = RECORD_SIZE, "Pipe server listening");

        let cancel = CancellationToken::new();
        let connections = TaskTracker::new();
        let counters = Arc::new(Counters::default());

        let accept_task = tokio::spawn(accept_loop(
            listener,
            queue,
            cancel.clone(),
            connections.clone(),
            Arc::clone(&counters),
            config.read_timeout,
        ));

        Ok(Self {
            endpoint,
            cancel,
            accept_task: Some(accept_task),
            connections,
            counters,
        })
    }

    /// Stop accepting and wait for in-flight reads to finish.
    ///
    /// When this returns the channel is released and no further record will
    /// be enqueued. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        let Some(task) = self.accept_task.take() else {
            return;
        };

        self.cancel.cancel();
        if let Err(e) = task.await {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        self.connections.close();
        self.connections.wait().await;

        info!(endpoint = %self.endpoint, "Pipe server stopped");
    }

    /// Whether the accept loop is still running
    pub fn is_running(&self) -> bool {
        self.accept_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Resolved OS endpoint the server listens on
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of connections currently being read
    pub fn in_flight(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            empty: self.counters.empty.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PipeServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    mut listener: ChannelListener,
    queue: RecordSender,
    cancel: CancellationToken,
    connections: TaskTracker,
    counters: Arc<Counters>,
    read_timeout: Duration,
) {
    loop {
        let stream = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = listener.accept() => match result {
                Ok(stream) => stream,
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            },
        };

        counters.accepted.fetch_add(1, Ordering::Relaxed);
        connections.spawn(handle_connection(
            stream,
            queue.clone(),
            Arc::clone(&counters),
            read_timeout,
        ));
    }

    // Dropping the listener releases the channel
    drop(listener);
    debug!("Accept loop exited");
}

async fn handle_connection(
    mut stream: ChannelStream,
    queue: RecordSender,
    counters: Arc<Counters>,
    read_timeout: Duration,
) {
    let result = read_record(&mut stream, read_timeout)
        .await
        .and_then(|record| queue.enqueue(record));

    match result {
        Ok(()) => {
            counters.received.fetch_add(1, Ordering::Relaxed);
        }
        Err(TransportError::Wire(WireError::Truncated { actual: 0, .. })) => {
            counters.empty.fetch_add(1, Ordering::Relaxed);
            debug!("Client closed without sending a record");
        }
        Err(TransportError::QueueClosed) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            debug!("Record queue closed, dropping record");
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Dropping connection");
        }
    }
}

/// Read and decode exactly one record from a connected stream
pub async fn read_record<S>(stream: &mut S, timeout: Duration) -> Result<LogRecord, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; RECORD_SIZE];
    let filled = tokio::time::timeout(timeout, read_full(stream, &mut buf))
        .await
        .map_err(|_| TransportError::ReadTimeout(timeout))??;

    Ok(decode(&buf[..filled])?)
}

/// Fill `buf` or stop at end of stream, returning the byte count
async fn read_full<S>(stream: &mut S, buf: &mut [u8]) -> std::io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use pipelog_types::LogLevel;

    #[tokio::test]
    async fn test_read_record_complete() {
        let record = LogRecord::new(LogLevel::Warning, "low memory").at("a.cpp", "f", 3);
        let bytes = encode(&record);
        let mut reader = &bytes[..];

        let decoded = read_record(&mut reader, Duration::from_secs(1)).await.unwrap();
        assert_eq!(decoded, record);
    }

    #[tokio::test]
    async fn test_read_record_short_payload() {
        let bytes = encode(&LogRecord::default());
        let mut reader = &bytes[..10];

        let err = read_record(&mut reader, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Wire(WireError::Truncated { actual: 10, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_record_split_across_writes() {
        let record = LogRecord::new(LogLevel::Error, "split");
        let bytes = encode(&record);
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for chunk in bytes.chunks(100) {
                client.write_all(chunk).await.unwrap();
            }
        });

        let decoded = read_record(&mut server, Duration::from_secs(1)).await.unwrap();
        writer.await.unwrap();
        assert_eq!(decoded, record);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_record_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);

        let err = read_record(&mut server, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ReadTimeout(_)));
    }
}
