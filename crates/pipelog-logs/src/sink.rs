use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use pipelog_types::{DisplayLogEntry, LevelFlags, LogLevel};

/// Shared handle to a stored entry
pub type ArcLogEntry = Arc<DisplayLogEntry>;

/// Capacity of the change notification channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Lock-free atomic counters for each log level
#[derive(Default)]
struct AtomicLevelCounts {
    info: AtomicUsize,
    warning: AtomicUsize,
    error: AtomicUsize,
    unknown: AtomicUsize,
}

impl AtomicLevelCounts {
    fn increment(&self, level: LogLevel) {
        match level {
            LogLevel::Info => self.info.fetch_add(1, Ordering::Relaxed),
            LogLevel::Warning => self.warning.fetch_add(1, Ordering::Relaxed),
            LogLevel::Error => self.error.fetch_add(1, Ordering::Relaxed),
            LogLevel::Unknown => self.unknown.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn to_counts(&self) -> LevelCounts {
        LevelCounts {
            info: self.info.load(Ordering::Relaxed),
            warning: self.warning.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.info.store(0, Ordering::Relaxed);
        self.warning.store(0, Ordering::Relaxed);
        self.error.store(0, Ordering::Relaxed);
        self.unknown.store(0, Ordering::Relaxed);
    }
}

/// Counts per log level
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub unknown: usize,
}

impl LevelCounts {
    pub fn total(&self) -> usize {
        self.info + self.warning + self.error + self.unknown
    }
}

/// Change notification published by the sink
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    /// An entry with this id was appended
    Appended(u64),
    /// The level mask changed
    FilterChanged(LevelFlags),
    /// All entries were dropped
    Cleared,
}

/// Entries and mask live under one lock so a filtered read never observes a
/// half-applied append or filter change.
struct SinkState {
    entries: Vec<ArcLogEntry>,
    mask: LevelFlags,
    next_id: u64,
}

/// Thread-safe, append-only store of display entries with a level filter.
///
/// Cloning yields another handle to the same store. Observers subscribe to
/// [`SinkEvent`]s instead of being referenced by the sink.
#[derive(Clone)]
pub struct LogSink {
    state: Arc<RwLock<SinkState>>,

    /// Lock-free level counts (O(1) instead of O(n) scan)
    level_counts: Arc<AtomicLevelCounts>,

    events: broadcast::Sender<SinkEvent>,
}

impl LogSink {
    /// Create an empty sink showing all levels
    pub fn new() -> Self {
        Self::with_filter(LevelFlags::ALL)
    }

    /// Create an empty sink with the given initial mask
    pub fn with_filter(mask: LevelFlags) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(SinkState {
                entries: Vec::new(),
                mask,
                next_id: 0,
            })),
            level_counts: Arc::new(AtomicLevelCounts::default()),
            events,
        }
    }

    /// Append an entry, assigning its sequential id
    pub fn append(&self, mut entry: DisplayLogEntry) -> ArcLogEntry {
        let entry = {
            let mut state = self.state.write();
            entry.id = state.next_id;
            state.next_id += 1;
            self.level_counts.increment(entry.severity());

            let entry = Arc::new(entry);
            state.entries.push(Arc::clone(&entry));
            entry
        };

        // No subscribers is fine
        let _ = self.events.send(SinkEvent::Appended(entry.id));
        entry
    }

    /// Replace the active level mask
    pub fn set_filter(&self, mask: LevelFlags) {
        self.state.write().mask = mask;
        let _ = self.events.send(SinkEvent::FilterChanged(mask));
    }

    /// Current level mask
    pub fn filter(&self) -> LevelFlags {
        self.state.read().mask
    }

    /// Drop every entry; the mask is kept
    pub fn clear(&self) {
        {
            let mut state = self.state.write();
            state.entries.clear();
            self.level_counts.reset();
        }
        let _ = self.events.send(SinkEvent::Cleared);
    }

    /// Entries passing the current mask, in append order
    pub fn visible(&self) -> Vec<ArcLogEntry> {
        let state = self.state.read();
        state
            .entries
            .iter()
            .filter(|e| e.is_visible(state.mask))
            .cloned()
            .collect()
    }

    /// Entries passing the current mask and a further predicate
    pub fn visible_where<F>(&self, predicate: F) -> Vec<ArcLogEntry>
    where
        F: Fn(&DisplayLogEntry) -> bool,
    {
        let state = self.state.read();
        state
            .entries
            .iter()
            .filter(|e| e.is_visible(state.mask) && predicate(e))
            .cloned()
            .collect()
    }

    /// Get all entries regardless of the mask
    pub fn all(&self) -> Vec<ArcLogEntry> {
        self.state.read().entries.clone()
    }

    /// Visible entries appended after the entry with id `after`
    pub fn visible_since(&self, after: Option<u64>) -> Vec<ArcLogEntry> {
        let state = self.state.read();
        let start = match after {
            // Ids increase monotonically
            Some(id) => state.entries.partition_point(|e| e.id <= id),
            None => 0,
        };
        state.entries[start..]
            .iter()
            .filter(|e| e.is_visible(state.mask))
            .cloned()
            .collect()
    }

    /// Get entry count per log level
    pub fn level_counts(&self) -> LevelCounts {
        self.level_counts.to_counts()
    }

    /// Total stored entries
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }

    /// Write the given entries as JSON lines, returning how many were written
    pub fn export_json_lines<W: Write>(
        entries: &[ArcLogEntry],
        mut writer: W,
    ) -> std::io::Result<usize> {
        for entry in entries {
            serde_json::to_writer(&mut writer, entry.as_ref())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(entries.len())
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}
