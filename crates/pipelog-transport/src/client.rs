use tokio::io::AsyncWriteExt;

use pipelog_types::{LogLevel, LogRecord};

use crate::channel::{self, DEFAULT_CHANNEL_NAME};
use crate::codec::encode;
use crate::error::TransportError;

/// Producer side of the channel.
///
/// Every record opens its own connection, writes the fixed-size payload and
/// closes again; the collector never answers.
#[derive(Clone, Debug)]
pub struct LogClient {
    channel: String,
}

impl LogClient {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    /// Channel name this client sends to
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Send one record
    pub async fn send(&self, record: &LogRecord) -> Result<(), TransportError> {
        let payload = encode(record);
        let mut stream = channel::connect(&self.channel).await?;
        stream.write_all(&payload).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Build and send a record from its parts
    pub async fn emit(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        source_file: impl Into<String>,
        source_function: impl Into<String>,
        line: i32,
    ) -> Result<(), TransportError> {
        let record = LogRecord::new(level, message).at(source_file, source_function, line);
        self.send(&record).await
    }
}

impl Default for LogClient {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_NAME)
    }
}

/// Send a formatted record tagged with the caller's file, module and line.
///
/// Expands to a future resolving to `Result<(), TransportError>`.
///
/// ```ignore
/// pipelog_emit!(client, LogLevel::Warning, "frame took {} ms", elapsed).await?;
/// ```
#[macro_export]
macro_rules! pipelog_emit {
    ($client:expr, $level:expr, $($arg:tt)+) => {
        $client.emit(
            $level,
            format!($($arg)+),
            file!(),
            module_path!(),
            line!() as i32,
        )
    };
}
