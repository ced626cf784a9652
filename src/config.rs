//! Pipeline configuration
//!
//! Defaults mirror the documented contract: a 1000-entry log buffer,
//! medium reporting threshold, batches of 10 flushed every 30 seconds, and
//! a 100-report durable backup cap.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::ErrorSeverity;
use crate::error::ConfigError;

/// Configuration for the whole error pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Logger settings
    pub logger: LoggerConfig,
    /// Reporter settings
    pub reporter: ReporterConfig,
}

/// Settings for [`crate::logger::ErrorLogger`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Maximum buffered entries; oldest are evicted beyond this
    pub max_logs: usize,

    /// Minimum severity forwarded to the remote endpoint in production
    pub forward_min_severity: ErrorSeverity,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_logs: 1000,
            forward_min_severity: ErrorSeverity::Medium,
        }
    }
}

/// Settings for [`crate::reporter::ErrorReporter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReporterConfig {
    /// Minimum severity that qualifies an error for reporting
    pub severity_threshold: ErrorSeverity,

    /// Queue length that triggers an immediate flush
    pub batch_size: usize,

    /// Fixed interval between background flushes
    pub flush_interval: Duration,

    /// Maximum reports kept in the durable backup
    pub store_cap: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            severity_threshold: ErrorSeverity::Medium,
            batch_size: 10,
            flush_interval: Duration::from_secs(30),
            store_cap: 100,
        }
    }
}

impl PipelineConfig {
    /// Check the configuration for unusable values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logger.max_logs == 0 {
            return Err(ConfigError::Invalid(
                "logger.max_logs must be at least 1".to_string(),
            ));
        }
        if self.reporter.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "reporter.batch_size must be at least 1".to_string(),
            ));
        }
        if self.reporter.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "reporter.flush_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_contract() {
        let config = PipelineConfig::default();
        assert_eq!(config.logger.max_logs, 1000);
        assert_eq!(config.logger.forward_min_severity, ErrorSeverity::Medium);
        assert_eq!(config.reporter.severity_threshold, ErrorSeverity::Medium);
        assert_eq!(config.reporter.batch_size, 10);
        assert_eq!(config.reporter.flush_interval, Duration::from_secs(30));
        assert_eq!(config.reporter.store_cap, 100);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = PipelineConfig::default();
        config.reporter.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_max_logs() {
        let mut config = PipelineConfig::default();
        config.logger.max_logs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pipeline.json");

        let mut config = PipelineConfig::default();
        config.reporter.batch_size = 25;
        config.save_to_path(&path).expect("save");

        let loaded = PipelineConfig::load_from_path(&path).expect("load");
        assert_eq!(loaded.reporter.batch_size, 25);
        assert_eq!(loaded.logger.max_logs, 1000);
    }

    #[test]
    fn test_load_invalid_json_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{this is not valid JSON}").expect("write");

        assert!(PipelineConfig::load_from_path(&path).is_err());
    }
}
