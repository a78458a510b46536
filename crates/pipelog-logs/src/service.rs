use tracing::info;

use pipelog_transport::{PipeServer, ServerConfig, ServerStats, TransportError, record_queue};

use crate::collector::Collector;
use crate::sink::LogSink;

/// The transport and the collector started and stopped as one unit
pub struct LogService {
    server: PipeServer,
    collector: Collector,
    sink: LogSink,
}

impl LogService {
    /// Bind the channel and start forwarding records into `sink`.
    ///
    /// Nothing is spawned if the channel cannot be bound.
    pub fn start(config: &ServerConfig, sink: LogSink) -> Result<Self, TransportError> {
        let (tx, rx) = record_queue();
        let server = PipeServer::start(config, tx)?;
        let collector = Collector::spawn(rx, sink.clone());

        info!(endpoint = %server.endpoint(), "Log service started");

        Ok(Self {
            server,
            collector,
            sink,
        })
    }

    /// Stop accepting, then flush every accepted record into the sink
    pub async fn stop(&mut self) {
        self.server.stop().await;
        self.collector.stop().await;
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    pub fn endpoint(&self) -> &str {
        self.server.endpoint()
    }

    pub fn server_stats(&self) -> ServerStats {
        self.server.stats()
    }

    pub fn is_running(&self) -> bool {
        self.server.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelog_transport::LogClient;
    use pipelog_types::{LevelFlags, LogLevel};
    use std::time::Duration;

    /// Socket path inside `dir` on Unix, a per-process pipe name on Windows
    fn test_channel(dir: &tempfile::TempDir, label: &str) -> String {
        if cfg!(windows) {
            format!("pipelog-service-{}-{label}", std::process::id())
        } else {
            dir.path().join(format!("{label}.sock")).to_str().unwrap().to_string()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_filtering() {
        let dir = tempfile::tempdir().unwrap();
        let channel = test_channel(&dir, "service");

        let sink = LogSink::new();
        let mut service = LogService::start(&ServerConfig::new(&channel), sink.clone()).unwrap();

        let client = LogClient::new(&channel);
        client.emit(LogLevel::Info, "loaded", "a.cpp", "Load", 1).await.unwrap();
        client.emit(LogLevel::Warning, "slow", "b.cpp", "Tick", 2).await.unwrap();
        client.emit(LogLevel::Error, "lost device", "c.cpp", "Present", 3).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        sink.set_filter(LevelFlags::WARNING | LevelFlags::ERROR);
        let visible = sink.visible();
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|e| e.level != LevelFlags::INFO));

        service.stop().await;
        service.stop().await;
        assert!(!service.is_running());
        assert_eq!(service.server_stats().received, 3);
    }

    #[tokio::test]
    async fn test_start_fails_when_channel_taken() {
        let dir = tempfile::tempdir().unwrap();
        let channel = test_channel(&dir, "taken");

        let mut first = LogService::start(&ServerConfig::new(&channel), LogSink::new()).unwrap();
        let second = LogService::start(&ServerConfig::new(&channel), LogSink::new());
        assert!(matches!(second, Err(TransportError::ChannelInUse(_))));

        first.stop().await;
    }
}
