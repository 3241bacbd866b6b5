//! Configuration file management.
//!
//! The collector reads an optional TOML file:
//!
//! ```toml
//! [collector]
//! scan_timeout = 10
//! collection_period = 300
//! idle_delay_ms = 1000
//! max_passes = 20
//! anchor_ids = ["a0", "a1", ...]
//!
//! [output]
//! format = "csv"
//! directory = "/var/lib/tray-sensor"
//! file_base = "tray_sensor_data"
//! ```
//!
//! Command-line flags override values from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use tray_core::RegistryConfig;
use tray_types::ANCHOR_COUNT;

/// Default base of output file names.
pub const DEFAULT_FILE_BASE: &str = "tray_sensor_data";

/// Record output format.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One header row, then one row per record
    #[default]
    Csv,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "jsonl",
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Collection loop settings.
    pub collector: CollectorConfig,
    /// Record output settings.
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`. A missing default file yields the default config.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Check every setting, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = self.collector.validate();
        errors.extend(self.output.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Build the registry configuration for the collection loop.
    pub fn registry_config(&self) -> RegistryConfig {
        let collector = &self.collector;
        let mut config = RegistryConfig::new()
            .scan_timeout(Duration::from_secs(collector.scan_timeout))
            .collection_period(Duration::from_secs(collector.collection_period))
            .idle_delay(Duration::from_millis(collector.idle_delay_ms));
        if let Some(max) = collector.max_passes {
            config = config.max_passes(max);
        }
        if let Some(ids) = &collector.anchor_ids {
            config = config.anchor_ids(ids.clone());
        }
        config
    }
}

/// Collection loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Discovery scan duration in seconds.
    pub scan_timeout: u64,
    /// Seconds between full resets of the tag set.
    pub collection_period: u64,
    /// Pause between passes while no tag is tracked, in milliseconds.
    pub idle_delay_ms: u64,
    /// Stop after this many passes.
    pub max_passes: Option<u64>,
    /// Anchor ids bound to the sixteen reading slots, in slot order.
    pub anchor_ids: Option<Vec<String>>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            scan_timeout: 10,
            collection_period: 300,
            idle_delay_ms: 1000,
            max_passes: None,
            anchor_ids: None,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.scan_timeout == 0 {
            errors.push(ValidationError {
                field: "collector.scan_timeout".to_string(),
                message: "scan timeout must be at least 1 second".to_string(),
            });
        }
        if self.collection_period == 0 {
            errors.push(ValidationError {
                field: "collector.collection_period".to_string(),
                message: "collection period must be at least 1 second".to_string(),
            });
        }
        if self.max_passes == Some(0) {
            errors.push(ValidationError {
                field: "collector.max_passes".to_string(),
                message: "max passes must be at least 1".to_string(),
            });
        }

        if let Some(ids) = &self.anchor_ids {
            if ids.len() != ANCHOR_COUNT {
                errors.push(ValidationError {
                    field: "collector.anchor_ids".to_string(),
                    message: format!(
                        "expected {} anchor ids, found {}",
                        ANCHOR_COUNT,
                        ids.len()
                    ),
                });
            }
            for (i, id) in ids.iter().enumerate() {
                if id.trim().is_empty() {
                    errors.push(ValidationError {
                        field: format!("collector.anchor_ids[{}]", i),
                        message: "anchor id cannot be empty".to_string(),
                    });
                }
            }
        }

        errors
    }
}

/// Record output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format.
    pub format: OutputFormat,
    /// Directory for timestamped output files. Records go to stdout when unset.
    pub directory: Option<PathBuf>,
    /// Base of output file names.
    pub file_base: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            directory: None,
            file_base: DEFAULT_FILE_BASE.to_string(),
        }
    }
}

impl OutputConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.file_base.is_empty() {
            errors.push(ValidationError {
                field: "output.file_base".to_string(),
                message: "file base cannot be empty".to_string(),
            });
        } else if self.file_base.contains(['/', '\\']) {
            errors.push(ValidationError {
                field: "output.file_base".to_string(),
                message: format!(
                    "file base '{}' must not contain path separators",
                    self.file_base
                ),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `collector.anchor_ids`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tray-sensor")
        .join("config.toml")
}
