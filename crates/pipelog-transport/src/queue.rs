use tokio::sync::mpsc;

use pipelog_types::LogRecord;

use crate::error::TransportError;

/// Create the queue connecting connection handlers to the collector
pub fn record_queue() -> (RecordSender, RecordReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RecordSender { tx }, RecordReceiver { rx })
}

/// Producer half of the record queue, cloned into every connection task
#[derive(Clone, Debug)]
pub struct RecordSender {
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl RecordSender {
    /// Enqueue a record without blocking
    pub fn enqueue(&self, record: LogRecord) -> Result<(), TransportError> {
        self.tx.send(record).map_err(|_| TransportError::QueueClosed)
    }

    /// Whether the consumer half has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the record queue; there is exactly one
#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::UnboundedReceiver<LogRecord>,
}

impl RecordReceiver {
    /// Take the next record if one is ready
    pub fn try_dequeue(&mut self) -> Option<LogRecord> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next record.
    ///
    /// Returns `None` once every sender is gone and the queue is drained.
    pub async fn dequeue(&mut self) -> Option<LogRecord> {
        self.rx.recv().await
    }

    /// Number of records waiting
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
