//! Bounded in-memory error log with console mirroring and export
//!
//! The logger subscribes to manager events and keeps a denormalized,
//! append-only projection of every captured error. Entries are patched in
//! place when the source error resolves or retries; their core fields never
//! change after the first write. The buffer is a FIFO ring: once `max_logs`
//! is exceeded the oldest entries are dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{ErrorCategory, ErrorSeverity};
use crate::config::LoggerConfig;
use crate::error::ExportError;
use crate::events::ErrorEvent;
use crate::manager::{ErrorId, ManagedError};
use crate::platform::{Environment, PlatformInfo, ReportTransport};

/// A denormalized projection of a managed error at the moment it was seen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// Id of the source error
    pub error_id: ErrorId,
    /// Failure message
    pub message: String,
    /// Stack trace text, if any
    pub stack: Option<String>,
    /// Category at capture time
    pub category: ErrorCategory,
    /// Severity at capture time
    pub severity: ErrorSeverity,
    /// Component that raised the error
    pub component: String,
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Patched in place when the source error resolves
    pub resolved: bool,
    /// Patched in place on each retry of the source error
    pub retry_count: u32,
}

impl From<&ManagedError> for ErrorLogEntry {
    fn from(error: &ManagedError) -> Self {
        Self {
            error_id: error.id,
            message: error.message.clone(),
            stack: error.stack.clone(),
            category: error.category,
            severity: error.severity,
            component: error.context.component.clone(),
            timestamp: error.timestamp,
            resolved: error.resolved,
            retry_count: error.retry_count,
        }
    }
}

/// Criteria for selecting log entries; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Match a single category
    pub category: Option<ErrorCategory>,
    /// Match a single severity
    pub severity: Option<ErrorSeverity>,
    /// Match the resolved flag
    pub resolved: Option<bool>,
    /// Match the originating component
    pub component: Option<String>,
    /// Entries at or after this time
    pub since: Option<DateTime<Utc>>,
    /// Entries at or before this time
    pub until: Option<DateTime<Utc>>,
}

impl LogFilter {
    fn matches(&self, entry: &ErrorLogEntry) -> bool {
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if entry.severity != severity {
                return false;
            }
        }
        if let Some(resolved) = self.resolved {
            if entry.resolved != resolved {
                return false;
            }
        }
        if let Some(component) = &self.component {
            if &entry.component != component {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Serialization formats for [`ErrorLogger::export`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Full-fidelity JSON array
    Json,
    /// Header row plus one row per entry; messages quote-escaped by doubling
    Csv,
}

/// Bounded error log fed by manager events
pub struct ErrorLogger {
    config: LoggerConfig,
    platform: PlatformInfo,
    transport: Option<Arc<dyn ReportTransport>>,
    entries: VecDeque<ErrorLogEntry>,
}

impl ErrorLogger {
    /// Create a logger; pass a transport to enable remote forwarding in
    /// production environments
    pub fn new(
        config: LoggerConfig,
        platform: PlatformInfo,
        transport: Option<Arc<dyn ReportTransport>>,
    ) -> Self {
        Self {
            config,
            platform,
            transport,
            entries: VecDeque::new(),
        }
    }

    /// React to a manager event
    pub fn observe(&mut self, event: &ErrorEvent) {
        match event {
            ErrorEvent::Captured(error) => self.append(error),
            ErrorEvent::Resolved { error } => self.patch(error.id, true, error.retry_count),
            ErrorEvent::Retried { error, retry_count } => {
                self.patch(error.id, error.resolved, *retry_count)
            }
        }
    }

    fn append(&mut self, error: &ManagedError) {
        let entry = ErrorLogEntry::from(error);

        // Console mirror at a severity-derived level
        match entry.severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log::error!(
                "[{}] {} ({})",
                entry.component,
                entry.message,
                entry.category
            ),
            ErrorSeverity::Medium => log::warn!(
                "[{}] {} ({})",
                entry.component,
                entry.message,
                entry.category
            ),
            ErrorSeverity::Low => log::info!(
                "[{}] {} ({})",
                entry.component,
                entry.message,
                entry.category
            ),
        }

        self.forward(&entry);

        self.entries.push_back(entry);
        while self.entries.len() > self.config.max_logs {
            self.entries.pop_front();
        }
    }

    /// Fire-and-forget remote forwarding; production environments only.
    /// Failures are logged, never retried.
    fn forward(&self, entry: &ErrorLogEntry) {
        if self.platform.environment != Environment::Production {
            return;
        }
        if entry.severity < self.config.forward_min_severity {
            return;
        }
        let Some(transport) = &self.transport else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = Arc::clone(transport);
                let entry = entry.clone();
                handle.spawn(async move {
                    if let Err(e) = transport.send_log_entry(&entry).await {
                        log::warn!("failed to forward log entry {}: {}", entry.error_id, e);
                    }
                });
            }
            Err(_) => {
                log::debug!("no async runtime available; skipping remote log forward");
            }
        }
    }

    /// Update an entry's mutable fields in place, keyed by error id
    fn patch(&mut self, error_id: ErrorId, resolved: bool, retry_count: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.error_id == error_id) {
            entry.resolved = resolved;
            entry.retry_count = retry_count;
        }
    }

    /// Entries matching the filter, newest first
    pub fn logs(&self, filter: &LogFilter) -> Vec<ErrorLogEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every buffered entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serialize the full buffer, oldest first
    pub fn export(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Json => {
                let entries: Vec<&ErrorLogEntry> = self.entries.iter().collect();
                Ok(serde_json::to_string_pretty(&entries)?)
            }
            ExportFormat::Csv => {
                let mut out = String::from(
                    "error_id,timestamp,category,severity,component,message,resolved,retry_count\n",
                );
                for entry in &self.entries {
                    out.push_str(&format!(
                        "{},{},{},{},{},{},{},{}\n",
                        entry.error_id,
                        entry.timestamp.to_rfc3339(),
                        entry.category,
                        entry.severity,
                        csv_field(&entry.component),
                        csv_field(&entry.message),
                        entry.resolved,
                        entry.retry_count
                    ));
                }
                Ok(out)
            }
        }
    }
}

/// Quote a CSV field, doubling embedded double-quotes
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{ErrorContext, Fault};

    fn logger(max_logs: usize) -> ErrorLogger {
        ErrorLogger::new(
            LoggerConfig {
                max_logs,
                ..LoggerConfig::default()
            },
            PlatformInfo::host("test", "0.0.0"),
            None,
        )
    }

    fn captured(message: &str) -> (ManagedError, ErrorEvent) {
        let error = ManagedError::from_fault(
            Fault::new(message).with_context(ErrorContext::new("checkout", "submit")),
        );
        (error.clone(), ErrorEvent::Captured(error))
    }

    #[test]
    fn test_buffer_is_bounded_fifo() {
        let mut logger = logger(3);
        for i in 0..5 {
            let (_, event) = captured(&format!("failure {}", i));
            logger.observe(&event);
        }

        assert_eq!(logger.len(), 3);
        let logs = logger.logs(&LogFilter::default());
        // Newest first; oldest two were evicted
        assert_eq!(logs[0].message, "failure 4");
        assert_eq!(logs[2].message, "failure 2");
    }

    #[test]
    fn test_patch_in_place_on_resolve_and_retry() {
        let mut logger = logger(10);
        let (mut error, event) = captured("network timeout");
        logger.observe(&event);

        error.retry_count = 2;
        logger.observe(&ErrorEvent::Retried {
            error: error.clone(),
            retry_count: 2,
        });

        error.resolved = true;
        logger.observe(&ErrorEvent::Resolved { error });

        let logs = logger.logs(&LogFilter::default());
        assert_eq!(logs.len(), 1);
        assert!(logs[0].resolved);
        assert_eq!(logs[0].retry_count, 2);
        assert_eq!(logs[0].message, "network timeout", "core fields never change");
    }

    #[test]
    fn test_filters() {
        let mut logger = logger(10);
        logger.observe(&captured("request timeout").1);
        logger.observe(&captured("invalid email").1);
        logger.observe(&captured("odd happening").1);

        let network = logger.logs(&LogFilter {
            category: Some(ErrorCategory::Network),
            ..LogFilter::default()
        });
        assert_eq!(network.len(), 1);
        assert_eq!(network[0].message, "request timeout");

        let low = logger.logs(&LogFilter {
            severity: Some(ErrorSeverity::Low),
            ..LogFilter::default()
        });
        assert_eq!(low.len(), 1);

        let by_component = logger.logs(&LogFilter {
            component: Some("checkout".to_string()),
            ..LogFilter::default()
        });
        assert_eq!(by_component.len(), 3);

        let none = logger.logs(&LogFilter {
            component: Some("inventory".to_string()),
            ..LogFilter::default()
        });
        assert!(none.is_empty());
    }

    #[test]
    fn test_csv_export_escapes_quotes() {
        let mut logger = logger(10);
        logger.observe(&captured(r#"expected "json" body"#).1);
        logger.observe(&captured("plain message").1);

        let csv = logger.export(ExportFormat::Csv).expect("csv export");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3, "header plus one row per entry");
        assert!(lines[1].contains(r#""expected ""json"" body""#));
    }

    #[test]
    fn test_json_export_roundtrips() {
        let mut logger = logger(10);
        logger.observe(&captured("first").1);
        logger.observe(&captured("second").1);

        let json = logger.export(ExportFormat::Json).expect("json export");
        let parsed: Vec<ErrorLogEntry> = serde_json::from_str(&json).expect("parse back");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].message, "first", "export is oldest first");
    }
}
