//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where finished renders are written by default.
    pub output_dir: PathBuf,

    /// Root for per-render scratch directories. `None` uses the OS temp dir.
    pub temp_dir: Option<PathBuf>,

    /// Default render settings.
    pub render: RenderDefaults,

    /// Export wall-clock and polling limits.
    pub export: ExportLimits,

    /// Memory pressure thresholds.
    pub memory: MemoryLimits,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default render parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Output frame rate.
    pub fps: u32,

    /// Output preset name (e.g., "mp4-h264").
    pub preset: String,

    /// Enable richer animation and easing.
    pub premium: bool,

    /// Beat tempo for audio-synced effects (0 disables beat sync).
    pub bpm: f64,
}

/// Export limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportLimits {
    /// Interval at which the export monitor polls memory and cancellation.
    pub poll_interval_ms: u64,

    /// Wall-clock ceiling for fast-mode exports.
    pub fast_timeout_secs: f64,

    /// Wall-clock ceiling for full-quality exports.
    pub full_timeout_secs: f64,
}

/// Memory pressure thresholds, in megabytes of resident memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLimits {
    /// Usage at or above this is classified as elevated.
    pub elevated_mb: u64,

    /// Usage at or above this is classified as critical and aborts exports.
    pub critical_mb: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelsmith=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_output(),
            temp_dir: None,
            render: RenderDefaults::default(),
            export: ExportLimits::default(),
            memory: MemoryLimits::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            preset: "mp4-h264".to_string(),
            premium: false,
            bpm: 0.0,
        }
    }
}

impl Default for ExportLimits {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            fast_timeout_secs: 25.0,
            full_timeout_secs: 60.0,
        }
    }
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            elevated_mb: 1536,
            critical_mb: 3072,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Root directory for render scratch space.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("reelsmith"))
    }
}

impl MemoryLimits {
    pub fn elevated_bytes(&self) -> u64 {
        self.elevated_mb.saturating_mul(1024 * 1024)
    }

    pub fn critical_bytes(&self) -> u64 {
        self.critical_mb.saturating_mul(1024 * 1024)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelsmith").join("config.json")
}

/// Default render output directory.
fn dirs_default_output() -> PathBuf {
    let base = std::env::var("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Videos")
        });
    base.join("reelsmith")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "export": { "fast_timeout_secs": 10.0 } }"#).unwrap();
        assert_eq!(config.export.fast_timeout_secs, 10.0);
        assert_eq!(config.export.full_timeout_secs, 60.0);
        assert_eq!(config.export.poll_interval_ms, 500);
        assert_eq!(config.render.fps, 30);
    }

    #[test]
    fn test_memory_limits_in_bytes() {
        let limits = MemoryLimits {
            elevated_mb: 1,
            critical_mb: 2,
        };
        assert_eq!(limits.elevated_bytes(), 1_048_576);
        assert_eq!(limits.critical_bytes(), 2_097_152);

        let huge = MemoryLimits {
            elevated_mb: u64::MAX / 2,
            critical_mb: u64::MAX,
        };
        assert_eq!(huge.elevated_bytes(), u64::MAX);
        assert_eq!(huge.critical_bytes(), u64::MAX);
    }
}
