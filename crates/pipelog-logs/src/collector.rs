use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use pipelog_transport::RecordReceiver;
use pipelog_types::{DisplayLogEntry, LogRecord};

use crate::sink::LogSink;

/// Background task moving records from the queue into the sink
pub struct Collector {
    /// Cancellation token for stopping the loop
    cancel: CancellationToken,

    /// Loop task handle; `None` once stopped
    task: Option<JoinHandle<()>>,

    /// Records forwarded so far
    collected: Arc<AtomicU64>,
}

impl Collector {
    /// Start draining `queue` into `sink`
    pub fn spawn(queue: RecordReceiver, sink: LogSink) -> Self {
        let cancel = CancellationToken::new();
        let collected = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(collect_loop(
            queue,
            sink,
            cancel.clone(),
            Arc::clone(&collected),
        ));

        Self {
            cancel,
            task: Some(task),
            collected,
        }
    }

    /// Stop the loop after forwarding whatever is already queued
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.cancel.cancel();
        if let Err(e) = task.await {
            warn!(error = %e, "Collector loop ended abnormally");
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Number of records forwarded to the sink
    pub fn collected(&self) -> u64 {
        self.collected.load(Ordering::Relaxed)
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn collect_loop(
    mut queue: RecordReceiver,
    sink: LogSink,
    cancel: CancellationToken,
    collected: Arc<AtomicU64>,
) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            record = queue.dequeue() => match record {
                Some(record) => forward(&sink, record, &collected),
                None => {
                    // Every producer handle is gone
                    debug!("Record queue closed");
                    return;
                }
            },
        }
    }

    let mut drained = 0usize;
    while let Some(record) = queue.try_dequeue() {
        forward(&sink, record, &collected);
        drained += 1;
    }
    debug!(drained, "Collector loop stopped");
}

fn forward(sink: &LogSink, record: LogRecord, collected: &AtomicU64) {
    sink.append(DisplayLogEntry::from_record(record, Local::now()));
    collected.fetch_add(1, Ordering::Relaxed);
}
