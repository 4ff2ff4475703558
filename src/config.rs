//! FieldQuest configuration.
//!
//! Loaded from `~/.fieldquest/config.toml`. Every field has a default,
//! so a missing file is the same as an empty one.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHome,

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// FieldQuest configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Where the local database lives. Defaults to `~/.fieldquest/`.
    pub data_dir: Option<PathBuf>,

    pub verification: VerificationConfig,

    pub retry: RetryConfig,

    pub logging: LoggingConfig,
}

/// Thresholds applied before any claim leaves the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct VerificationConfig {
    /// Fixes less accurate than this are rejected for check-ins.
    pub trust_threshold_meters: f64,

    /// How long to wait for the positioning capability.
    pub fix_timeout_ms: u64,

    /// A fix younger than this is reused instead of asking again.
    pub fix_max_age_ms: u64,

    /// Fastest believable travel between two accepted fixes.
    pub max_travel_speed_mps: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            trust_threshold_meters: 50.0,
            fix_timeout_ms: 10_000,
            fix_max_age_ms: 5_000,
            max_travel_speed_mps: 40.0,
        }
    }
}

impl VerificationConfig {
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }

    pub fn fix_max_age(&self) -> Duration {
        Duration::from_millis(self.fix_max_age_ms)
    }
}

/// How submissions to the remote authority are retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Attempts per submission round.
    pub max_attempts: u32,

    /// Delay unit for linear backoff.
    pub base_delay_ms: u64,

    /// Lifetime attempts after which an action is abandoned.
    pub abandon_after_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            abandon_after_attempts: 9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    /// `tracing` filter directive. `RUST_LOG` wins when set.
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "fieldquest=info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from `~/.fieldquest/config.toml`, or defaults if it is missing.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path().ok_or(ConfigError::NoHome)?;
        Self::load_from(&path)
    }

    /// Load config from an explicit path, or defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The config file path: `~/.fieldquest/config.toml`.
    pub fn path() -> Option<PathBuf> {
        Self::home().map(|h| h.join("config.toml"))
    }

    /// The directory holding the local database.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir.clone().or_else(Self::home)
    }

    fn home() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".fieldquest"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let v = &self.verification;
        if !(v.trust_threshold_meters.is_finite() && v.trust_threshold_meters > 0.0) {
            return Err(ConfigError::Invalid(
                "trust-threshold-meters must be positive".into(),
            ));
        }
        if !(v.max_travel_speed_mps.is_finite() && v.max_travel_speed_mps > 0.0) {
            return Err(ConfigError::Invalid(
                "max-travel-speed-mps must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("max-attempts must be at least 1".into()));
        }
        if self.retry.abandon_after_attempts < self.retry.max_attempts {
            return Err(ConfigError::Invalid(
                "abandon-after-attempts must be at least max-attempts".into(),
            ));
        }
        Ok(())
    }
}
