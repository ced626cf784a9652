//! Batched remote error reporting
//!
//! The reporter queues qualifying errors and delivers them in batches:
//! when the queue reaches the batch size, on a fixed interval, or
//! immediately for critical severity. Failed sends push the batch back to
//! the front of the queue and persist a capped backup through the injected
//! store, so reports survive a process restart. Consumers of the remote
//! endpoint must tolerate duplicates: delivery is at-least-once.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::classify::{ErrorCategory, ErrorSeverity};
use crate::config::ReporterConfig;
use crate::error::TransportError;
use crate::events::ErrorEvent;
use crate::manager::{ErrorId, ManagedError};
use crate::platform::{PlatformInfo, ReportStore, ReportTransport};

/// An outbound-queue entity derived from a managed error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
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
    /// Operation that was in progress
    pub operation: String,
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Retry count at enqueue time
    pub retry_count: u32,
}

impl From<&ManagedError> for ErrorReport {
    fn from(error: &ManagedError) -> Self {
        Self {
            error_id: error.id,
            message: error.message.clone(),
            stack: error.stack.clone(),
            category: error.category,
            severity: error.severity,
            component: error.context.component.clone(),
            operation: error.context.operation.clone(),
            timestamp: error.timestamp,
            retry_count: error.retry_count,
        }
    }
}

/// Envelope delivered to the transport in one send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBatch {
    /// The queued reports
    pub reports: Vec<ErrorReport>,
    /// When the batch was assembled
    pub timestamp: DateTime<Utc>,
    /// Identification of the sending process
    pub user_agent: String,
    /// Where the sender is running
    pub origin: String,
}

struct ReporterInner {
    config: ReporterConfig,
    platform: PlatformInfo,
    transport: Arc<dyn ReportTransport>,
    store: Arc<dyn ReportStore>,
    queue: Mutex<VecDeque<ErrorReport>>,
    in_flight: AtomicBool,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl ReporterInner {
    fn enqueue(&self, report: ErrorReport) -> usize {
        match self.queue.lock() {
            Ok(mut queue) => {
                queue.push_back(report);
                queue.len()
            }
            Err(_) => 0,
        }
    }

    /// Drain the queue and send it as one batch
    ///
    /// Reentrancy-guarded: a flush requested while another is in progress is
    /// a no-op. On failure the batch goes back to the front of the queue and
    /// a capped backup is persisted.
    async fn flush(&self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            log::debug!("flush already in progress; skipping");
            return;
        }

        let reports: Vec<ErrorReport> = match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        if reports.is_empty() {
            self.in_flight.store(false, Ordering::SeqCst);
            return;
        }

        let batch = ReportBatch {
            reports,
            timestamp: Utc::now(),
            user_agent: self.platform.user_agent(),
            origin: self.platform.origin.clone(),
        };

        match self.transport.send_reports(&batch).await {
            Ok(()) => {
                log::debug!("delivered {} error reports", batch.reports.len());
            }
            Err(e) => {
                log::warn!(
                    "failed to deliver {} error reports: {}",
                    batch.reports.len(),
                    e
                );
                self.requeue_front(batch.reports);
                self.persist_backup();
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn requeue_front(&self, reports: Vec<ErrorReport>) {
        if let Ok(mut queue) = self.queue.lock() {
            for report in reports.into_iter().rev() {
                queue.push_front(report);
            }
        }
    }

    /// Best-effort backup of the current queue, capped at the newest
    /// `store_cap` reports
    fn persist_backup(&self) {
        let snapshot: Vec<ErrorReport> = match self.queue.lock() {
            Ok(queue) => queue.iter().cloned().collect(),
            Err(_) => return,
        };

        let excess = snapshot.len().saturating_sub(self.config.store_cap);
        let capped = &snapshot[excess..];

        if let Err(e) = self.store.save(capped) {
            log::warn!("failed to persist report backup: {}", e);
        }
    }
}

impl Drop for ReporterInner {
    fn drop(&mut self) {
        if let Ok(mut task) = self.flush_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

/// Batched error reporter fed by manager events
///
/// Cheap to clone; clones share the queue and the background flush task.
#[derive(Clone)]
pub struct ErrorReporter {
    inner: Arc<ReporterInner>,
}

impl ErrorReporter {
    /// Create a reporter; call [`ErrorReporter::start`] to run the interval
    /// flush task
    pub fn new(
        config: ReporterConfig,
        platform: PlatformInfo,
        transport: Arc<dyn ReportTransport>,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                config,
                platform,
                transport,
                store,
                queue: Mutex::new(VecDeque::new()),
                in_flight: AtomicBool::new(false),
                flush_task: Mutex::new(None),
            }),
        }
    }

    /// Spawn the periodic flush task; must run inside a tokio runtime.
    /// Calling twice is a no-op.
    pub fn start(&self) {
        let Ok(mut slot) = self.inner.flush_task.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.flush_interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                inner.flush().await;
            }
        }));
    }

    /// React to a manager event
    ///
    /// Only `Captured` events at or above the severity threshold are
    /// enqueued. Critical errors and a full batch trigger an immediate
    /// background flush when a runtime is available.
    pub fn observe(&self, event: &ErrorEvent) {
        let ErrorEvent::Captured(error) = event else {
            return;
        };
        if error.severity < self.inner.config.severity_threshold {
            return;
        }

        let queued = self.inner.enqueue(ErrorReport::from(error));
        let flush_now =
            error.severity == ErrorSeverity::Critical || queued >= self.inner.config.batch_size;

        if flush_now {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let inner = Arc::clone(&self.inner);
                    handle.spawn(async move {
                        inner.flush().await;
                    });
                }
                Err(_) => {
                    log::debug!("no async runtime available; flush deferred");
                }
            }
        }
    }

    /// Flush the queue now
    pub async fn flush(&self) {
        self.inner.flush().await;
    }

    /// Number of queued, unsent reports
    pub fn queue_len(&self) -> usize {
        match self.inner.queue.lock() {
            Ok(queue) => queue.len(),
            Err(_) => 0,
        }
    }

    /// Resend any reports persisted by a failed flush, clearing the backup
    /// on success. Returns how many reports were delivered.
    pub async fn retry_stored_reports(&self) -> Result<usize, TransportError> {
        let stored = match self.inner.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("failed to load stored reports: {}", e);
                return Ok(0);
            }
        };

        if stored.is_empty() {
            return Ok(0);
        }

        let batch = ReportBatch {
            timestamp: Utc::now(),
            user_agent: self.inner.platform.user_agent(),
            origin: self.inner.platform.origin.clone(),
            reports: stored,
        };

        self.inner.transport.send_reports(&batch).await?;

        if let Err(e) = self.inner.store.clear() {
            log::warn!("failed to clear stored reports after delivery: {}", e);
        }

        Ok(batch.reports.len())
    }

    /// Stop the interval task and perform one final best-effort flush
    pub async fn shutdown(&self) {
        if let Ok(mut task) = self.inner.flush_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }

        self.inner.flush().await;
    }
}
