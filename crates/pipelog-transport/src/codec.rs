//! Fixed-layout record codec.
//!
//! A record occupies exactly [`RECORD_SIZE`] bytes laid out like the
//! producer's sequential C struct:
//!
//! | offset | width | field             |
//! |--------|-------|-------------------|
//! | 0      | 512   | message           |
//! | 512    | 260   | source file       |
//! | 772    | 64    | source function   |
//! | 836    | 4     | line (i32 LE)     |
//! | 840    | 4     | level flags (LE)  |
//!
//! Text fields are zero padded. There is no header and no length prefix, so
//! the fixed size is the only framing.

use pipelog_types::{
    LevelFlags, LogRecord, MESSAGE_WIDTH, SOURCE_FILE_WIDTH, SOURCE_FUNCTION_WIDTH,
};

use crate::error::WireError;

const MESSAGE_OFFSET: usize = 0;
const SOURCE_FILE_OFFSET: usize = MESSAGE_OFFSET + MESSAGE_WIDTH;
const SOURCE_FUNCTION_OFFSET: usize = SOURCE_FILE_OFFSET + SOURCE_FILE_WIDTH;
const LINE_OFFSET: usize = SOURCE_FUNCTION_OFFSET + SOURCE_FUNCTION_WIDTH;
const LEVEL_OFFSET: usize = LINE_OFFSET + 4;

/// Size in bytes of one encoded record
pub const RECORD_SIZE: usize = LEVEL_OFFSET + 4;

/// Encode a record into its fixed wire form.
///
/// Text longer than its field is truncated to the field width, backing off to
/// the previous character boundary so the stored bytes stay valid UTF-8.
pub fn encode(record: &LogRecord) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];

    write_text(
        &mut buf[MESSAGE_OFFSET..SOURCE_FILE_OFFSET],
        &record.message,
    );
    write_text(
        &mut buf[SOURCE_FILE_OFFSET..SOURCE_FUNCTION_OFFSET],
        &record.source_file,
    );
    write_text(
        &mut buf[SOURCE_FUNCTION_OFFSET..LINE_OFFSET],
        &record.source_function,
    );
    buf[LINE_OFFSET..LEVEL_OFFSET].copy_from_slice(&record.line.to_le_bytes());
    buf[LEVEL_OFFSET..RECORD_SIZE].copy_from_slice(&record.level.bits().to_le_bytes());

    buf
}

/// Decode a record from its wire form.
///
/// Bytes past [`RECORD_SIZE`] are ignored. Each text field ends at its first
/// zero byte; invalid UTF-8 is replaced rather than rejected.
pub fn decode(bytes: &[u8]) -> Result<LogRecord, WireError> {
    if bytes.len() < RECORD_SIZE {
        return Err(WireError::Truncated {
            expected: RECORD_SIZE,
            actual: bytes.len(),
        });
    }

    Ok(LogRecord {
        message: read_text(&bytes[MESSAGE_OFFSET..SOURCE_FILE_OFFSET]),
        source_file: read_text(&bytes[SOURCE_FILE_OFFSET..SOURCE_FUNCTION_OFFSET]),
        source_function: read_text(&bytes[SOURCE_FUNCTION_OFFSET..LINE_OFFSET]),
        line: i32::from_le_bytes(read_word(&bytes[LINE_OFFSET..LEVEL_OFFSET])),
        level: LevelFlags::from_bits(u32::from_le_bytes(read_word(
            &bytes[LEVEL_OFFSET..RECORD_SIZE],
        ))),
    })
}

fn write_text(field: &mut [u8], text: &str) {
    let mut len = text.len().min(field.len());
    while len > 0 && !text.is_char_boundary(len) {
        len -= 1;
    }
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
}

fn read_text(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn read_word(bytes: &[u8]) -> [u8; 4] {
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    word
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipelog_types::LogLevel;

    fn sample() -> LogRecord {
        LogRecord::new(LogLevel::Error, "device removed").at(
            r"C:\Crystal\RHI\Device.cpp",
            "Device::Present",
            218,
        )
    }

    #[test]
    fn test_record_size() {
        assert_eq!(RECORD_SIZE, 844);
    }

    #[test]
    fn test_round_trip() {
        let record = sample();
        assert_eq!(decode(&encode(&record)).unwrap(), record);
    }

    #[test]
    fn test_round_trip_negative_line_and_raw_level() {
        let mut record = sample();
        record.line = -1;
        record.level = LevelFlags::from_bits(0x06);
        assert_eq!(decode(&encode(&record)).unwrap(), record);
    }

    #[test]
    fn test_layout_matches_native_struct() {
        let bytes = encode(&sample());

        assert_eq!(&bytes[..14], b"device removed");
        assert_eq!(bytes[14], 0);
        assert_eq!(&bytes[512..515], b"C:\\");
        assert_eq!(&bytes[772..787], b"Device::Present");
        assert_eq!(&bytes[836..840], &218i32.to_le_bytes());
        assert_eq!(&bytes[840..844], &[0x04, 0, 0, 0]);
    }

    #[test]
    fn test_overlong_message_is_truncated() {
        let long: String = (0..700).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let record = LogRecord::new(LogLevel::Info, long.clone());

        let bytes = encode(&record);
        assert_eq!(bytes.len(), RECORD_SIZE);

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.message, &long[..MESSAGE_WIDTH]);
    }

    #[test]
    fn test_truncation_respects_char_boundary() {
        // 511 ASCII bytes followed by a two byte character straddling the edge
        let text = format!("{}é", "x".repeat(MESSAGE_WIDTH - 1));
        let decoded = decode(&encode(&LogRecord::new(LogLevel::Info, text))).unwrap();

        assert_eq!(decoded.message.len(), MESSAGE_WIDTH - 1);
        assert!(decoded.message.chars().all(|c| c == 'x'));
    }

    #[test]
    fn test_exact_width_function_name() {
        let name = "f".repeat(SOURCE_FUNCTION_WIDTH);
        let record = LogRecord::new(LogLevel::Info, "m").at("a.cpp", name.clone(), 1);
        assert_eq!(decode(&encode(&record)).unwrap().source_function, name);
    }

    #[test]
    fn test_short_buffer_is_framing_error() {
        let bytes = encode(&sample());
        assert_eq!(
            decode(&bytes[..100]),
            Err(WireError::Truncated {
                expected: RECORD_SIZE,
                actual: 100
            })
        );
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut bytes = encode(&sample());
        bytes[0] = 0xFF;
        let decoded = decode(&bytes).unwrap();
        assert!(decoded.message.starts_with('\u{FFFD}'));
    }
}
