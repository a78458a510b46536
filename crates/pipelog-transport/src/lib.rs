//! Named pipe transport for pipelog
//!
//! This crate owns the local channel a native producer writes to, the
//! fixed-layout record codec, and the queue that hands decoded records to the
//! collector.

mod channel;
mod client;
mod codec;
mod error;
mod queue;
mod server;

pub use channel::{DEFAULT_CHANNEL_NAME, channel_endpoint};
pub use client::LogClient;
pub use codec::{RECORD_SIZE, decode, encode};
pub use error::{TransportError, WireError};
pub use queue::{RecordReceiver, RecordSender, record_queue};
pub use server::{PipeServer, ServerConfig, ServerStats, read_record};

// Re-export types that are used in our public API
pub use pipelog_types::{LevelFlags, LogLevel, LogRecord};
