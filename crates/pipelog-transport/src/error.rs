use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while decoding a record from its wire form
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The peer sent fewer bytes than one record occupies
    #[error("truncated record: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Errors raised by the channel, the server, or the producer client
#[derive(Debug, Error)]
pub enum TransportError {
    /// Another live collector already owns the channel name
    #[error("channel '{0}' is already in use by another collector")]
    ChannelInUse(String),

    /// The OS refused to create the channel
    #[error("failed to bind channel '{endpoint}': {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// A connected client did not deliver its payload in time
    #[error("timed out after {0:?} waiting for record payload")]
    ReadTimeout(Duration),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The consumer side of the record queue has been dropped
    #[error("record queue closed")]
    QueueClosed,
}
