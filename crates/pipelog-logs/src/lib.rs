//! Log collection for pipelog
//!
//! This crate provides the filtered sink, the collector loop that feeds it
//! from the transport queue, and the service bundling both with the server.

mod collector;
mod filter;
mod service;
mod sink;

pub use collector::Collector;
pub use filter::TextFilter;
pub use service::LogService;
pub use sink::{ArcLogEntry, LevelCounts, LogSink, SinkEvent};

// Re-export types used in our public API
pub use pipelog_types::{DisplayLogEntry, LevelFlags, LogLevel};
