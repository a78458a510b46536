//! Shared types for pipelog
//!
//! This crate contains the record carried over the channel, the level flags
//! used both on the wire and as a display filter, and the entry type the
//! sink stores for display.

use chrono::{DateTime, Local};
use ratatui::style::Color;
use serde::Serialize;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Level Types
// ============================================================================

/// Log severity level of a single record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
    /// Anything that is not exactly one known flag
    Unknown,
}

impl LogLevel {
    /// All levels a producer may legitimately send
    pub const KNOWN: [LogLevel; 3] = [Self::Info, Self::Warning, Self::Error];

    /// Parse log level from common spellings
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" | "inf" | "information" => Some(Self::Info),
            "warn" | "warning" | "wrn" => Some(Self::Warning),
            "error" | "err" | "erro" => Some(Self::Error),
            _ => None,
        }
    }

    /// Map raw level flags to a level; multi-bit or empty values are `Unknown`
    pub fn from_flags(flags: LevelFlags) -> Self {
        match flags {
            LevelFlags::INFO => Self::Info,
            LevelFlags::WARNING => Self::Warning,
            LevelFlags::ERROR => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// The single flag bit for this level
    pub fn flag(&self) -> LevelFlags {
        match self {
            Self::Info => LevelFlags::INFO,
            Self::Warning => LevelFlags::WARNING,
            Self::Error => LevelFlags::ERROR,
            Self::Unknown => LevelFlags::NONE,
        }
    }

    /// Get display color for this level
    pub fn color(&self) -> Color {
        match self {
            Self::Info => Color::Green,
            Self::Warning => Color::Yellow,
            Self::Error => Color::Red,
            Self::Unknown => Color::White,
        }
    }

    /// Short display string (3 chars)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INF",
            Self::Warning => "WRN",
            Self::Error => "ERR",
            Self::Unknown => "???",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bit-flag set of levels.
///
/// A record carries exactly one bit in the well-formed case, but the value
/// travels opaquely so a producer bug never breaks decoding. The sink reuses
/// the same type as its filter mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct LevelFlags(u32);

impl LevelFlags {
    pub const NONE: LevelFlags = LevelFlags(0);
    pub const INFO: LevelFlags = LevelFlags(0x01);
    pub const WARNING: LevelFlags = LevelFlags(0x02);
    pub const ERROR: LevelFlags = LevelFlags(0x04);
    pub const ALL: LevelFlags = LevelFlags(0x01 | 0x02 | 0x04);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// True if any bit is shared with `other`
    pub const fn intersects(&self, other: LevelFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// True if every bit of `other` is set here
    pub const fn contains(&self, other: LevelFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Flip the bits of `other`
    pub fn toggle(&mut self, other: LevelFlags) {
        self.0 ^= other.0;
    }
}

impl BitOr for LevelFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LevelFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for LevelFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<LogLevel> for LevelFlags {
    fn from(level: LogLevel) -> Self {
        level.flag()
    }
}

impl fmt::Display for LevelFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = LogLevel::KNOWN
            .iter()
            .filter(|l| self.contains(l.flag()))
            .map(|l| match l {
                LogLevel::Info => "info",
                LogLevel::Warning => "warning",
                _ => "error",
            })
            .collect();

        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}

/// Error returned when a level list cannot be parsed
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for LevelFlags {
    type Err = ParseLevelError;

    /// Parse a comma separated list such as `warning,error`, or `all`/`none`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" | "*" => return Ok(Self::ALL),
            "none" | "" => return Ok(Self::NONE),
            _ => {}
        }

        s.split(',')
            .map(|part| {
                LogLevel::from_name(part)
                    .map(|l| l.flag())
                    .ok_or_else(|| ParseLevelError(part.trim().to_string()))
            })
            .try_fold(Self::NONE, |acc, flag| flag.map(|f| acc | f))
    }
}

// ============================================================================
// Record Types
// ============================================================================

/// Width in bytes of the message field on the wire
pub const MESSAGE_WIDTH: usize = 512;

/// Width in bytes of the source file field on the wire
pub const SOURCE_FILE_WIDTH: usize = 260;

/// Width in bytes of the source function field on the wire
pub const SOURCE_FUNCTION_WIDTH: usize = 64;

/// One structured log record as sent by a producer
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LogRecord {
    pub message: String,
    pub source_file: String,
    pub source_function: String,
    pub line: i32,
    pub level: LevelFlags,
}

impl LogRecord {
    /// Create a record with the given level and message and no source location
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: level.flag(),
            ..Default::default()
        }
    }

    /// Attach a source location
    pub fn at(
        mut self,
        source_file: impl Into<String>,
        source_function: impl Into<String>,
        line: i32,
    ) -> Self {
        self.source_file = source_file.into();
        self.source_function = source_function.into();
        self.line = line;
        self
    }
}

// ============================================================================
// Display Types
// ============================================================================

/// A record as stored by the sink for display
#[derive(Clone, Debug, Serialize)]
pub struct DisplayLogEntry {
    /// Unique sequential ID assigned by the sink
    pub id: u64,

    /// Wall-clock time the collector picked the record up
    pub captured_at: DateTime<Local>,

    /// Raw level flags as received
    pub level: LevelFlags,

    pub message: String,

    /// Full path as supplied by the producer
    pub source_file: String,

    /// File name component of `source_file`
    pub file_name: String,

    pub function: String,

    pub line: i32,

    /// "file: function (line)"
    pub label: String,
}

impl DisplayLogEntry {
    /// Convert a received record, stamping it with the capture time
    pub fn from_record(record: LogRecord, captured_at: DateTime<Local>) -> Self {
        let file_name = file_name_of(&record.source_file).to_string();
        let label = format!(
            "{}: {} ({})",
            file_name, record.source_function, record.line
        );

        Self {
            id: 0,
            captured_at,
            level: record.level,
            message: record.message,
            source_file: record.source_file,
            file_name,
            function: record.source_function,
            line: record.line,
            label,
        }
    }

    /// Severity for display purposes
    pub fn severity(&self) -> LogLevel {
        LogLevel::from_flags(self.level)
    }

    /// Whether this entry passes the given level mask
    pub fn is_visible(&self, mask: LevelFlags) -> bool {
        self.level.intersects(mask)
    }
}

/// File name component of a producer path, accepting both separator styles
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of(r"C:\engine\Core\Renderer.cpp"), "Renderer.cpp");
        assert_eq!(file_name_of("/src/core/renderer.rs"), "renderer.rs");
        assert_eq!(file_name_of("main.cpp"), "main.cpp");
        assert_eq!(file_name_of(""), "");
    }

    #[test]
    fn test_display_entry_label() {
        let record = LogRecord::new(LogLevel::Warning, "swapchain resized").at(
            r"D:\Crystal\Graphics\SwapChain.cpp",
            "Resize",
            42,
        );
        let entry = DisplayLogEntry::from_record(record, Local::now());

        assert_eq!(entry.file_name, "SwapChain.cpp");
        assert_eq!(entry.label, "SwapChain.cpp: Resize (42)");
        assert_eq!(entry.severity(), LogLevel::Warning);
    }

    #[test]
    fn test_level_flags_parse() {
        assert_eq!(
            "warning,error".parse::<LevelFlags>().unwrap(),
            LevelFlags::WARNING | LevelFlags::ERROR
        );
        assert_eq!("all".parse::<LevelFlags>().unwrap(), LevelFlags::ALL);
        assert_eq!("none".parse::<LevelFlags>().unwrap(), LevelFlags::NONE);
        let err = "info, verbose".parse::<LevelFlags>().unwrap_err();
        assert_eq!(err, ParseLevelError("verbose".to_string()));
        assert_eq!(err.to_string(), "unknown log level 'verbose'");
    }

    #[test]
    fn test_level_flags_display() {
        assert_eq!(LevelFlags::ALL.to_string(), "info,warning,error");
        assert_eq!(LevelFlags::NONE.to_string(), "none");
        assert_eq!((LevelFlags::INFO | LevelFlags::ERROR).to_string(), "info,error");
    }

    #[test]
    fn test_multi_bit_level_is_unknown() {
        let flags = LevelFlags::WARNING | LevelFlags::ERROR;
        assert_eq!(LogLevel::from_flags(flags), LogLevel::Unknown);
        assert!(flags.intersects(LevelFlags::ERROR));
    }
}
