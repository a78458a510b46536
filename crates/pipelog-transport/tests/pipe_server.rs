use std::collections::HashSet;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use pipelog_transport::{
    LevelFlags, LogClient, LogLevel, LogRecord, PipeServer, RECORD_SIZE, RecordReceiver,
    ServerConfig, TransportError, encode, pipelog_emit, record_queue,
};

const WAIT: Duration = Duration::from_secs(5);

#[cfg(unix)]
type RawStream = tokio::net::UnixStream;

#[cfg(windows)]
type RawStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// A channel name private to one test
struct TestChannel {
    name: String,
    #[cfg(unix)]
    _dir: tempfile::TempDir,
}

impl TestChannel {
    #[cfg(unix)]
    fn new(label: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let name = dir
            .path()
            .join(format!("{label}.sock"))
            .to_str()
            .unwrap()
            .to_string();
        Self { name, _dir: dir }
    }

    #[cfg(windows)]
    fn new(label: &str) -> Self {
        Self {
            name: format!("pipelog-test-{}-{label}", std::process::id()),
        }
    }

    fn config(&self) -> ServerConfig {
        ServerConfig::new(&self.name).with_read_timeout(Duration::from_secs(30))
    }

    fn client(&self) -> LogClient {
        LogClient::new(&self.name)
    }

    /// Connect without going through the client, to misbehave on purpose
    #[cfg(unix)]
    async fn raw_connect(&self) -> RawStream {
        tokio::net::UnixStream::connect(&self.name).await.unwrap()
    }

    #[cfg(windows)]
    async fn raw_connect(&self) -> RawStream {
        use tokio::net::windows::named_pipe::ClientOptions;
        const ERROR_PIPE_BUSY: i32 = 231;

        let path = pipelog_transport::channel_endpoint(&self.name);
        tokio::time::timeout(WAIT, async {
            loop {
                match ClientOptions::new().open(&path) {
                    Ok(client) => return client,
                    Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) => {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    Err(e) => panic!("failed to open {path}: {e}"),
                }
            }
        })
        .await
        .expect("pipe stayed busy")
    }
}

async fn next_record(rx: &mut RecordReceiver) -> LogRecord {
    tokio::time::timeout(WAIT, rx.dequeue())
        .await
        .expect("timed out waiting for record")
        .expect("queue closed")
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn delivers_record_from_client() {
    let channel = TestChannel::new("deliver");
    let (tx, mut rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx).unwrap();

    let record = LogRecord::new(LogLevel::Warning, "shader cache miss").at(
        r"C:\Crystal\Graphics\ShaderCache.cpp",
        "ShaderCache::Load",
        77,
    );
    channel.client().send(&record).await.unwrap();

    assert_eq!(next_record(&mut rx).await, record);
    server.stop().await;
    assert_eq!(server.stats().received, 1);
}

#[tokio::test]
async fn emit_macro_tags_call_site() {
    let channel = TestChannel::new("macro");
    let (tx, mut rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx).unwrap();
    let client = channel.client();

    let line = line!() as i32 + 1;
    pipelog_emit!(client, LogLevel::Warning, "frame took {} ms", 16).await.unwrap();

    let record = next_record(&mut rx).await;
    assert_eq!(record.message, "frame took 16 ms");
    assert_eq!(record.level, LevelFlags::WARNING);
    assert!(record.source_file.ends_with("pipe_server.rs"));
    assert_eq!(record.source_function, module_path!());
    assert_eq!(record.line, line);

    server.stop().await;
}

#[tokio::test]
async fn silent_client_does_not_block_others() {
    let channel = TestChannel::new("silent");
    let (tx, mut rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx).unwrap();

    // Connected but never sends
    let silent = channel.raw_connect().await;
    wait_until(|| server.stats().accepted == 1).await;

    channel
        .client()
        .emit(LogLevel::Info, "second client", "b.cpp", "main", 1)
        .await
        .unwrap();

    assert_eq!(next_record(&mut rx).await.message, "second client");
    wait_until(|| server.in_flight() == 1).await;

    drop(silent);
    server.stop().await;
}

#[tokio::test]
async fn survives_client_that_disconnects_immediately() {
    let channel = TestChannel::new("hangup");
    let (tx, mut rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx).unwrap();

    drop(channel.raw_connect().await);
    wait_until(|| {
        let stats = server.stats();
        stats.empty + stats.failed == 1
    })
    .await;
    #[cfg(unix)]
    assert_eq!(server.stats().empty, 1);

    channel
        .client()
        .emit(LogLevel::Error, "still alive", "c.cpp", "f", 9)
        .await
        .unwrap();

    assert_eq!(next_record(&mut rx).await.message, "still alive");
    assert!(server.is_running());
    server.stop().await;
}

#[tokio::test]
async fn burst_of_hangups_keeps_channel_open() {
    let channel = TestChannel::new("burst");
    let (tx, mut rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx).unwrap();

    // Open and close faster than the accept loop re-arms
    for _ in 0..20 {
        drop(channel.raw_connect().await);
    }
    wait_until(|| {
        let stats = server.stats();
        stats.empty + stats.failed == 20
    })
    .await;

    channel
        .client()
        .emit(LogLevel::Info, "after burst", "e.cpp", "h", 4)
        .await
        .unwrap();
    assert_eq!(next_record(&mut rx).await.message, "after burst");

    server.stop().await;
    assert_eq!(server.stats().accepted, 21);
}

#[tokio::test]
async fn truncated_payload_is_dropped() {
    let channel = TestChannel::new("truncated");
    let (tx, mut rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx).unwrap();

    let bytes = encode(&LogRecord::new(LogLevel::Info, "partial"));
    let mut stream = channel.raw_connect().await;
    stream.write_all(&bytes[..RECORD_SIZE / 2]).await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    wait_until(|| server.stats().failed == 1).await;
    assert!(rx.try_dequeue().is_none());

    server.stop().await;
    assert_eq!(server.stats().received, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_are_all_delivered() {
    let channel = TestChannel::new("concurrent");
    let (tx, mut rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx).unwrap();

    let producers = (0..16).map(|producer| {
        let client = channel.client();
        tokio::spawn(async move {
            for i in 0..25 {
                client
                    .emit(LogLevel::Info, format!("{producer}:{i}"), "p.cpp", "run", i)
                    .await
                    .unwrap();
            }
        })
    });
    for result in futures::future::join_all(producers).await {
        result.unwrap();
    }

    server.stop().await;

    let mut seen = HashSet::new();
    while let Some(record) = rx.try_dequeue() {
        assert!(seen.insert(record.message), "duplicate record");
    }
    assert_eq!(seen.len(), 400);
    assert_eq!(server.stats().received, 400);
}

#[tokio::test]
async fn stop_waits_for_in_flight_read() {
    let channel = TestChannel::new("inflight");
    let (tx, mut rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx).unwrap();

    let bytes = encode(&LogRecord::new(LogLevel::Info, "slow producer"));
    let mut stream = channel.raw_connect().await;
    stream.write_all(&bytes[..400]).await.unwrap();
    wait_until(|| server.stats().accepted == 1).await;

    let stopping = tokio::spawn(async move {
        server.stop().await;
        server
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());

    stream.write_all(&bytes[400..]).await.unwrap();
    let server = stopping.await.unwrap();

    assert_eq!(rx.try_dequeue().unwrap().message, "slow producer");
    assert!(!server.is_running());
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_channel() {
    let channel = TestChannel::new("release");
    let (tx, _rx) = record_queue();
    let mut server = PipeServer::start(&channel.config(), tx.clone()).unwrap();

    server.stop().await;
    let after_first = server.stats();
    server.stop().await;

    assert_eq!(server.stats(), after_first);
    assert!(!server.is_running());
    assert!(channel.client().send(&LogRecord::default()).await.is_err());

    let mut restarted = PipeServer::start(&channel.config(), tx).unwrap();
    restarted.stop().await;
}

#[tokio::test]
async fn second_server_on_same_channel_is_rejected() {
    let channel = TestChannel::new("taken");
    let (tx, _rx) = record_queue();
    let mut first = PipeServer::start(&channel.config(), tx.clone()).unwrap();

    let second = PipeServer::start(&channel.config(), tx);
    assert!(matches!(second, Err(TransportError::ChannelInUse(_))));

    // The liveness check shows up as an empty connection, not a failure
    #[cfg(unix)]
    wait_until(|| first.stats().empty == 1).await;
    assert_eq!(first.stats().failed, 0);

    first.stop().await;
}

#[cfg(unix)]
mod unix_socket {
    use super::*;

    #[tokio::test]
    async fn socket_file_removed_on_stop() {
        let channel = TestChannel::new("cleanup");
        let path = std::path::PathBuf::from(&channel.name);
        let (tx, _rx) = record_queue();
        let mut server = PipeServer::start(&channel.config(), tx).unwrap();
        assert!(path.exists());

        server.stop().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced() {
        let channel = TestChannel::new("stale");
        drop(std::os::unix::net::UnixListener::bind(&channel.name).unwrap());

        let (tx, mut rx) = record_queue();
        let mut server = PipeServer::start(&channel.config(), tx).unwrap();

        channel
            .client()
            .emit(LogLevel::Info, "after restart", "d.cpp", "g", 2)
            .await
            .unwrap();
        assert_eq!(next_record(&mut rx).await.message, "after restart");

        server.stop().await;
    }

    #[tokio::test]
    async fn non_socket_path_is_a_bind_error() {
        let channel = TestChannel::new("regular");
        std::fs::write(&channel.name, b"not a socket").unwrap();

        let (tx, _rx) = record_queue();
        let result = PipeServer::start(&channel.config(), tx);
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }
}

#[cfg(windows)]
mod named_pipe {
    use super::*;
    use pipelog_transport::channel_endpoint;

    #[test]
    fn names_map_into_pipe_namespace() {
        assert_eq!(channel_endpoint("ManagedLogger"), r"\\.\pipe\ManagedLogger");
        assert_eq!(channel_endpoint(r"\\.\pipe\Custom"), r"\\.\pipe\Custom");
    }

    #[tokio::test]
    async fn connected_instances_do_not_block_new_clients() {
        let channel = TestChannel::new("busy");
        let (tx, mut rx) = record_queue();
        let mut server = PipeServer::start(&channel.config(), tx).unwrap();

        // Each held connection keeps its own instance
        let holders = [channel.raw_connect().await, channel.raw_connect().await];
        wait_until(|| server.stats().accepted == 2).await;

        channel
            .client()
            .emit(LogLevel::Warning, "waited", "w.cpp", "busy", 5)
            .await
            .unwrap();
        assert_eq!(next_record(&mut rx).await.message, "waited");

        drop(holders);
        server.stop().await;
    }
}
