//! # Config Module
//!
//! Application settings, read from a TOML file.
//!
//! ```toml
//! [directories]
//! processing = "/scans/incoming"
//! error = "/scans/error"
//! done = "/scans/done"
//!
//! [options]
//! auto_open_error_folder = false
//!
//! [watch]
//! mode = "polling"
//! poll_interval_secs = 3
//! retry_window_secs = 30
//!
//! [raster]
//! render_scale = 3.0
//! ```
//!
//! Every key is optional. A missing file means all defaults.

use crate::core::raster::RasterConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The three directories documents flow through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Directories {
    /// Watched input directory
    pub processing: PathBuf,
    /// Documents without a barcode, or that failed
    pub error: PathBuf,
    /// Documents filed as `<identifier>.pdf`
    pub done: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            processing: PathBuf::from("processing"),
            error: PathBuf::from("error"),
            done: PathBuf::from("done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Show the error directory after a document lands there
    pub auto_open_error_folder: bool,
    /// Ignore dot-files in the processing directory
    pub skip_hidden_files: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            auto_open_error_folder: true,
            skip_hidden_files: false,
        }
    }
}

/// How new documents are noticed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Filesystem notifications
    Events,
    /// Re-list the directory on an interval
    Polling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub mode: WatchMode,
    pub poll_interval_secs: u64,
    /// Pause after a creation event before the file is read. In polling
    /// mode, files modified more recently than this wait for the next
    /// listing unless their size and timestamp have stopped changing.
    pub settle_delay_ms: u64,
    /// How long after its last modification an unreadable document is
    /// retried instead of being moved to the error directory
    pub retry_window_secs: u64,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_window_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Events,
            poll_interval_secs: 3,
            settle_delay_ms: 1000,
            retry_window_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Everything read from the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub directories: Directories,
    pub options: Options,
    pub watch: WatchConfig,
    pub raster: RasterConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// `<config dir>/barcode-pdf/config.toml`, if the platform has a
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("barcode-pdf").join("config.toml"))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(&text).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Load from `path` when given, otherwise from the default location.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert!(config.options.auto_open_error_folder);
        assert_eq!(config.watch.mode, WatchMode::Events);
        assert_eq!(config.watch.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.watch.retry_window(), Duration::from_secs(30));
        assert!(!config.options.skip_hidden_files);
        assert_eq!(config.raster.contrast_factor, 2.0);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[directories]\nprocessing = \"/scans/in\"\n\n[watch]\nmode = \"polling\"\n",
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.directories.processing, PathBuf::from("/scans/in"));
        assert_eq!(config.directories.done, PathBuf::from("done"));
        assert_eq!(config.watch.mode, WatchMode::Polling);
        assert_eq!(config.watch.settle_delay_ms, 1000);
    }

    #[test]
    fn missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(&temp.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[watch]\nmode = \"sometimes\"\n").unwrap();

        let result = AppConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = AppConfig::default();
        config.options.auto_open_error_folder = false;
        let text = toml::to_string(&config).unwrap();
        assert_eq!(AppConfig::parse(&text).unwrap(), config);
    }
}
