//! Configuration for capture, matching and logging.
//!
//! Loads settings from config.json at startup. Every field has a default, so
//! a partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::codec::EncodingKind;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Defaults applied to full-screen and monitor captures.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Encoding used when the caller does not pick one
    pub format: EncodingKind,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Bounding box for the default downscale (vision-model friendly)
    pub max_width: u32,
    pub max_height: u32,
    /// Draw the pointer into captured frames
    pub include_cursor: bool,
    /// AcquireNextFrame timeout for the duplication path (milliseconds)
    pub acquire_timeout_ms: u32,
    /// Skip the GPU duplication path entirely
    pub disable_gpu: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: EncodingKind::Lossy,
            quality: 75,
            max_width: 1024,
            max_height: 768,
            include_cursor: true,
            acquire_timeout_ms: 500,
            disable_gpu: false,
        }
    }
}

/// Template matching parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum NCC score for a candidate (0.0-1.0)
    pub threshold: f64,
    /// Suppression radius as a fraction of the template size
    pub suppression_factor: f64,
    /// Threads used for the sliding-window search
    pub workers: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            suppression_factor: 0.5,
            workers: 1,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "deskshot=debug,warn")
    pub level: String,
    /// Append to `<exe_dir>/logs/deskshot.log` in addition to stderr
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub matching: MatchingConfig,
    pub logging: LoggingConfig,
}

/// What happened when the configuration file was read. Loading runs before
/// the subscriber exists, so the result is reported afterwards via
/// [`LoadOutcome::log`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(PathBuf),
    Missing(PathBuf),
    /// Unreadable or unparsable; defaults were used
    Invalid { path: PathBuf, reason: String },
}

impl LoadOutcome {
    pub fn used_defaults(&self) -> bool {
        !matches!(self, Self::Loaded(_))
    }

    /// Emits the outcome through `tracing`. Call once logging is initialized.
    pub fn log(&self) {
        match self {
            Self::Loaded(_) | Self::Missing(_) => tracing::info!("{}", self),
            Self::Invalid { .. } => tracing::warn!("{}", self),
        }
    }
}

impl std::fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded(path) => write!(f, "Config loaded from {}", path.display()),
            Self::Missing(path) => write!(f, "{} not found. Using default config.", path.display()),
            Self::Invalid { path, reason } => {
                write!(f, "Failed to load {}: {}. Using defaults.", path.display(), reason)
            }
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file is missing or cannot be parsed. Nothing is logged here; the
    /// returned outcome says what happened.
    pub fn load_from(path: &Path) -> (Self, LoadOutcome) {
        if !path.exists() {
            return (Self::default(), LoadOutcome::Missing(path.to_path_buf()));
        }

        let parsed = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|contents| {
                serde_json::from_str::<Self>(&contents).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(config) => (config, LoadOutcome::Loaded(path.to_path_buf())),
            Err(reason) => (
                Self::default(),
                LoadOutcome::Invalid {
                    path: path.to_path_buf(),
                    reason,
                },
            ),
        }
    }
}

/// Initializes the global configuration from `path`. Call once at startup,
/// before logging; later calls keep the first configuration.
pub fn init_config(path: &Path) -> LoadOutcome {
    let (config, outcome) = AppConfig::load_from(path);
    let _ = CONFIG.set(config);
    outcome
}

/// Returns a reference to the global configuration, or the defaults when
/// `init_config` was never called.
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(AppConfig::default)
}
