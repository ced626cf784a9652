//! Injected platform context
//!
//! The core components never touch the environment directly: process
//! identity, the remote endpoints and durable report storage all sit behind
//! the types in this module, so the pipeline is testable without any real
//! network or filesystem.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, TransportError};
use crate::logger::ErrorLogEntry;
use crate::reporter::{ErrorReport, ReportBatch};

/// Which deployment environment the host runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

/// Static facts about the host process, injected at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Host application name
    pub app_name: String,
    /// Host application version
    pub app_version: String,
    /// Where the host is running (service URL, hostname, page origin)
    pub origin: String,
    /// Deployment environment
    pub environment: Environment,
}

impl PlatformInfo {
    /// Describe the current process, defaulting to a development environment
    pub fn host<S: Into<String>>(app_name: S, app_version: S) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            origin: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            environment: Environment::Development,
        }
    }

    /// Set the origin
    pub fn with_origin<S: Into<String>>(mut self, origin: S) -> Self {
        self.origin = origin.into();
        self
    }

    /// Set the environment
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// User-agent style identification string sent with report batches
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} ({}; {})",
            self.app_name,
            self.app_version,
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }
}

/// Outbound channel for report batches and forwarded log entries
///
/// Implementations own the wire format, endpoints and authentication; the
/// pipeline only cares whether a send succeeded.
#[async_trait]
pub trait ReportTransport: Send + Sync {
    /// Deliver a batch of error reports
    async fn send_reports(&self, batch: &ReportBatch) -> Result<(), TransportError>;

    /// Deliver a single forwarded log entry, fire-and-forget semantics
    async fn send_log_entry(&self, entry: &ErrorLogEntry) -> Result<(), TransportError>;
}

/// Durable backup for reports that could not be delivered
pub trait ReportStore: Send + Sync {
    /// Load every stored report
    fn load(&self) -> Result<Vec<ErrorReport>, StoreError>;

    /// Replace the stored reports
    fn save(&self, reports: &[ErrorReport]) -> Result<(), StoreError>;

    /// Remove all stored reports
    fn clear(&self) -> Result<(), StoreError>;
}

/// Report store backed by a JSON file in the platform data directory
pub struct FileReportStore {
    path: PathBuf,
}

impl FileReportStore {
    /// Create a store under the local data directory for the given app name
    pub fn new(app_name: &str) -> Result<Self, StoreError> {
        let data_dir = dirs::data_local_dir().ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine local data directory",
            ))
        })?;

        let app_dir = data_dir.join(app_name);
        if !app_dir.exists() {
            std::fs::create_dir_all(&app_dir)?;
        }

        Ok(Self {
            path: app_dir.join("pending_error_reports.json"),
        })
    }

    /// Create a store at an explicit path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the backing file
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ReportStore for FileReportStore {
    fn load(&self) -> Result<Vec<ErrorReport>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let json = std::fs::read_to_string(&self.path)?;
        let reports = serde_json::from_str(&json)?;
        Ok(reports)
    }

    fn save(&self, reports: &[ErrorReport]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(reports)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-memory report store, for embedding and tests
#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<ErrorReport>>,
}

impl MemoryReportStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for MemoryReportStore {
    fn load(&self) -> Result<Vec<ErrorReport>, StoreError> {
        match self.reports.lock() {
            Ok(reports) => Ok(reports.clone()),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn save(&self, reports: &[ErrorReport]) -> Result<(), StoreError> {
        if let Ok(mut stored) = self.reports.lock() {
            *stored = reports.to_vec();
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        if let Ok(mut stored) = self.reports.lock() {
            stored.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ErrorCategory, ErrorSeverity};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_report(message: &str) -> ErrorReport {
        ErrorReport {
            error_id: Uuid::new_v4(),
            message: message.to_string(),
            stack: None,
            category: ErrorCategory::Network,
            severity: ErrorSeverity::High,
            component: "test".to_string(),
            operation: "sample".to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileReportStore::with_path(dir.path().join("reports.json"));

        assert!(store.load().expect("load empty").is_empty());

        let reports = vec![sample_report("one"), sample_report("two")];
        store.save(&reports).expect("save");

        let loaded = store.load().expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].message, "one");

        store.clear().expect("clear");
        assert!(store.load().expect("load cleared").is_empty());
    }

    #[test]
    fn test_file_store_clear_when_missing_is_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileReportStore::with_path(dir.path().join("never_written.json"));
        assert!(store.clear().is_ok());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryReportStore::new();
        store.save(&[sample_report("only")]).expect("save");
        assert_eq!(store.load().expect("load").len(), 1);
        store.clear().expect("clear");
        assert!(store.load().expect("load").is_empty());
    }

    #[test]
    fn test_user_agent_shape() {
        let platform = PlatformInfo::host("faultline-demo", "0.1.0");
        let ua = platform.user_agent();
        assert!(ua.starts_with("faultline-demo/0.1.0 ("));
    }
}
