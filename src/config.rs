//! Config file and CLI override resolution.
//!
//! Lookup order is an explicit `--config` path, then
//! `<config_dir>/pipelog/config.toml`, then built-in defaults. Command-line
//! flags always win over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use pipelog_transport::DEFAULT_CHANNEL_NAME;
use pipelog_types::LevelFlags;

const CONFIG_DIR_NAME: &str = "pipelog";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default per-connection read timeout
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Values accepted in `config.toml`; all optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Channel name or, when it contains '/', a socket path
    pub channel: Option<String>,

    pub read_timeout_ms: Option<u64>,

    /// Initial level mask, e.g. `"warning,error"`
    pub levels: Option<String>,

    /// Where `e` in the viewer writes exports
    pub export_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid config file")
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load `explicit` if given (it must exist), else the per-user file if
    /// present, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "Using config file");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

/// `<config_dir>/pipelog/config.toml`, if the platform has a config dir
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Command-line values that override the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub channel: Option<String>,
    pub read_timeout_ms: Option<u64>,
    pub levels: Option<LevelFlags>,
}

/// Fully resolved listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub channel: String,
    pub read_timeout: Duration,
    pub levels: LevelFlags,
    pub export_dir: PathBuf,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let levels = match (overrides.levels, file.levels) {
            (Some(levels), _) => levels,
            (None, Some(text)) => text
                .parse()
                .with_context(|| format!("invalid 'levels' value '{}'", text))?,
            (None, None) => LevelFlags::ALL,
        };

        let read_timeout_ms = overrides
            .read_timeout_ms
            .or(file.read_timeout_ms)
            .unwrap_or(DEFAULT_READ_TIMEOUT_MS);
        if read_timeout_ms == 0 {
            anyhow::bail!("read timeout must be greater than zero");
        }

        Ok(Self {
            channel: overrides
                .channel
                .or(file.channel)
                .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string()),
            read_timeout: Duration::from_millis(read_timeout_ms),
            levels,
            export_dir: file.export_dir.unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(FileConfig::default(), Overrides::default()).unwrap();
        assert_eq!(settings.channel, "ManagedLogger");
        assert_eq!(settings.read_timeout, Duration::from_secs(5));
        assert_eq!(settings.levels, LevelFlags::ALL);
        assert_eq!(settings.export_dir, PathBuf::from("."));
    }

    #[test]
    fn test_file_values() {
        let file = FileConfig::from_toml(
            r#"
            channel = "EngineLog"
            read_timeout_ms = 250
            levels = "warning,error"
            export_dir = "/var/tmp/logs"
            "#,
        )
        .unwrap();

        let settings = Settings::resolve(file, Overrides::default()).unwrap();
        assert_eq!(settings.channel, "EngineLog");
        assert_eq!(settings.read_timeout, Duration::from_millis(250));
        assert_eq!(settings.levels, LevelFlags::WARNING | LevelFlags::ERROR);
        assert_eq!(settings.export_dir, PathBuf::from("/var/tmp/logs"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            channel: Some("FromFile".to_string()),
            read_timeout_ms: Some(100),
            levels: Some("info".to_string()),
            export_dir: None,
        };
        let overrides = Overrides {
            channel: Some("FromCli".to_string()),
            read_timeout_ms: Some(900),
            levels: Some(LevelFlags::ERROR),
        };

        let settings = Settings::resolve(file, overrides).unwrap();
        assert_eq!(settings.channel, "FromCli");
        assert_eq!(settings.read_timeout, Duration::from_millis(900));
        assert_eq!(settings.levels, LevelFlags::ERROR);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = FileConfig {
            levels: Some("verbose".to_string()),
            ..FileConfig::default()
        };
        assert!(Settings::resolve(file, Overrides::default()).is_err());

        let overrides = Overrides {
            read_timeout_ms: Some(0),
            ..Overrides::default()
        };
        assert!(Settings::resolve(FileConfig::default(), overrides).is_err());

        assert!(FileConfig::from_toml("colour = true").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipelog.toml");
        std::fs::write(&path, "channel = \"Custom\"\n").unwrap();

        let file = FileConfig::load(Some(&path)).unwrap();
        assert_eq!(file.channel.as_deref(), Some("Custom"));

        assert!(FileConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
