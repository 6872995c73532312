use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_RETENTION_PERIOD_SECS: u64 = 86_400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("inactivity timeout must be a positive number of seconds")]
    ZeroInactivityTimeout,
    #[error("retention period must be a positive number of seconds")]
    ZeroRetentionPeriod,
}

/// Live engine configuration. Changes apply to subsequent operations only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Gap after which the next event in a bucket starts a new segment
    pub inactivity_timeout_secs: u64,

    /// Maximum age of ended segments (and stale empty active ones)
    pub retention_period_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: DEFAULT_INACTIVITY_TIMEOUT_SECS,
            retention_period_secs: DEFAULT_RETENTION_PERIOD_SECS,
        }
    }
}

impl EngineConfig {
    pub fn new(inactivity_timeout_secs: u64, retention_period_secs: u64) -> Result<Self, ConfigError> {
        let config = Self {
            inactivity_timeout_secs,
            retention_period_secs,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inactivity_timeout_secs == 0 {
            return Err(ConfigError::ZeroInactivityTimeout);
        }
        if self.retention_period_secs == 0 {
            return Err(ConfigError::ZeroRetentionPeriod);
        }
        Ok(())
    }

    pub fn inactivity_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(clamp_secs(self.inactivity_timeout_secs))
    }

    pub fn retention_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(clamp_secs(self.retention_period_secs))
    }
}

// chrono::Duration panics above roughly i64::MAX milliseconds.
fn clamp_secs(secs: u64) -> i64 {
    const MAX_SECS: u64 = (i64::MAX / 1_000) as u64;
    secs.min(MAX_SECS) as i64
}
