//! Composition root wiring the four components together
//!
//! One [`ErrorPipeline`] owns one manager, logger, reporter and recovery
//! engine, and subscribes the downstream components to the manager's
//! events. This preserves single-instance semantics without module-level
//! statics: construct the pipeline once at startup and pass clones of the
//! handles down.

use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::config::PipelineConfig;
use crate::error::{RecoveryError, TransportError};
use crate::events::EventFilter;
use crate::logger::{ErrorLogEntry, ErrorLogger, ExportFormat, LogFilter};
use crate::manager::{ErrorId, ErrorManager, ErrorStats, Fault, ManagedError};
use crate::platform::{PlatformInfo, ReportStore, ReportTransport};
use crate::recovery::{ErrorRecovery, RecoveryOutcome};
use crate::reporter::ErrorReporter;

/// The assembled error pipeline
///
/// Cheap to clone; clones share the same underlying components.
#[derive(Clone)]
pub struct ErrorPipeline {
    manager: Arc<AsyncMutex<ErrorManager>>,
    logger: Arc<Mutex<ErrorLogger>>,
    reporter: ErrorReporter,
    recovery: Arc<AsyncMutex<ErrorRecovery>>,
}

impl ErrorPipeline {
    /// Build and wire the pipeline
    ///
    /// The logger and reporter are subscribed to the manager before this
    /// returns, so the very first `handle_error` reaches all of them. Call
    /// [`ErrorPipeline::start`] inside a runtime to run the reporter's
    /// interval flush.
    pub fn new(
        config: PipelineConfig,
        platform: PlatformInfo,
        transport: Arc<dyn ReportTransport>,
        store: Arc<dyn ReportStore>,
    ) -> Self {
        let mut manager = ErrorManager::new();

        let logger = Arc::new(Mutex::new(ErrorLogger::new(
            config.logger.clone(),
            platform.clone(),
            Some(Arc::clone(&transport)),
        )));

        let reporter = ErrorReporter::new(config.reporter.clone(), platform, transport, store);
        let recovery = Arc::new(AsyncMutex::new(ErrorRecovery::new()));

        {
            let logger = Arc::clone(&logger);
            manager.subscribe(EventFilter::all(), move |event| {
                if let Ok(mut logger) = logger.lock() {
                    logger.observe(event);
                }
                Ok(())
            });
        }

        {
            let reporter = reporter.clone();
            manager.subscribe(EventFilter::all(), move |event| {
                reporter.observe(event);
                Ok(())
            });
        }

        {
            // try_lock: the engine holds its lock only while a recovery is
            // running, and observe ignores the Retried events emitted then
            let recovery = Arc::clone(&recovery);
            manager.subscribe(EventFilter::all(), move |event| {
                if let Ok(mut recovery) = recovery.try_lock() {
                    recovery.observe(event);
                }
                Ok(())
            });
        }

        Self {
            manager: Arc::new(AsyncMutex::new(manager)),
            logger,
            reporter,
            recovery,
        }
    }

    /// Start the reporter's periodic flush; must run inside a tokio runtime
    pub fn start(&self) {
        self.reporter.start();
    }

    /// Install a process-wide panic hook feeding this pipeline's manager
    pub fn install_panic_hook(&self) {
        crate::manager::install_panic_hook(Arc::clone(&self.manager));
    }

    /// Capture a failure; see [`ErrorManager::handle_error`]
    pub async fn handle_error(&self, fault: Fault) -> ErrorId {
        self.manager.lock().await.handle_error(fault)
    }

    /// Mark an error resolved; see [`ErrorManager::resolve_error`]
    pub async fn resolve_error(&self, id: ErrorId) {
        self.manager.lock().await.resolve_error(id);
    }

    /// Attempt a retry; see [`ErrorManager::begin_retry`]
    ///
    /// The manager lock is released while the backoff delay elapses, so
    /// captures, resolutions and queries proceed during the wait.
    pub async fn retry_error(&self, id: ErrorId) -> bool {
        let pending = match self.manager.lock().await.begin_retry(id) {
            Some(pending) => pending,
            None => return false,
        };

        if !pending.delay.is_zero() {
            tokio::time::sleep(pending.delay).await;
        }

        self.manager.lock().await.complete_retry(pending);
        true
    }

    /// Walk the recovery chain for an error
    pub async fn attempt_recovery(&self, id: ErrorId) -> RecoveryOutcome {
        let mut manager = self.manager.lock().await;
        self.recovery
            .lock()
            .await
            .attempt_recovery(&mut manager, id)
            .await
    }

    /// Recover with a substituted fallback value
    pub async fn recover_with_fallback<T, F>(
        &self,
        id: ErrorId,
        fallback: F,
    ) -> Result<T, RecoveryError>
    where
        F: FnOnce() -> T,
    {
        let mut manager = self.manager.lock().await;
        self.recovery
            .lock()
            .await
            .recover_with_fallback(&mut manager, id, fallback)
            .await
    }

    /// Look up a snapshot of an error
    pub async fn get(&self, id: ErrorId) -> Option<ManagedError> {
        self.manager.lock().await.get(id).cloned()
    }

    /// All unresolved errors, oldest first
    pub async fn unresolved(&self) -> Vec<ManagedError> {
        self.manager.lock().await.unresolved()
    }

    /// Aggregate registry counts
    pub async fn stats(&self) -> ErrorStats {
        self.manager.lock().await.stats()
    }

    /// Drop resolved errors from the registry
    pub async fn clear_resolved(&self) {
        self.manager.lock().await.clear_resolved();
    }

    /// Buffered log entries matching a filter, newest first
    pub fn logs(&self, filter: &LogFilter) -> Vec<ErrorLogEntry> {
        match self.logger.lock() {
            Ok(logger) => logger.logs(filter),
            Err(_) => Vec::new(),
        }
    }

    /// Serialize the log buffer
    pub fn export_logs(&self, format: ExportFormat) -> crate::error::Result<String> {
        let logger = match self.logger.lock() {
            Ok(logger) => logger,
            Err(_) => return Ok(String::new()),
        };
        Ok(logger.export(format)?)
    }

    /// Flush queued reports now
    pub async fn flush_reports(&self) {
        self.reporter.flush().await;
    }

    /// Number of queued, unsent reports
    pub fn queued_reports(&self) -> usize {
        self.reporter.queue_len()
    }

    /// Resend reports persisted by a failed flush
    pub async fn retry_stored_reports(&self) -> Result<usize, TransportError> {
        self.reporter.retry_stored_reports().await
    }

    /// Stop background work and flush once more, best effort
    pub async fn shutdown(&self) {
        self.reporter.shutdown().await;
    }

    /// Direct access to the manager for advanced wiring (extra subscribers,
    /// custom strategies)
    pub fn manager(&self) -> Arc<AsyncMutex<ErrorManager>> {
        Arc::clone(&self.manager)
    }

    /// Direct access to the recovery engine for custom action chains
    pub fn recovery(&self) -> Arc<AsyncMutex<ErrorRecovery>> {
        Arc::clone(&self.recovery)
    }
}
