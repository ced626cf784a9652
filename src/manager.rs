//! Central error registry and lifecycle management
//!
//! The [`ErrorManager`] owns the single source of truth for every captured
//! failure. Call sites funnel failures through [`ErrorManager::handle_error`],
//! which classifies, stores and broadcasts them; downstream components
//! (logger, reporter, recovery) react to the broadcast and hold only
//! snapshots, never references into the registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::classify::{classify_category, classify_severity, ErrorCategory, ErrorSeverity};
use crate::events::{ErrorEvent, EventDispatcher, EventFilter, SubscriberId};

/// Unique identifier for a managed error, assigned at creation
pub type ErrorId = Uuid;

/// Open-ended metadata describing where and how an error occurred
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    /// Component that raised the error
    pub component: String,

    /// Operation that was in progress
    pub operation: String,

    /// Free-form key/value metadata
    pub metadata: HashMap<String, String>,

    /// Optional message suitable for showing to a user
    pub user_message: Option<String>,
}

impl ErrorContext {
    /// Create a context for a component/operation pair
    pub fn new<S: Into<String>>(component: S, operation: S) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            metadata: HashMap::new(),
            user_message: None,
        }
    }

    /// Attach a metadata key/value pair
    pub fn with_metadata<S: Into<String>>(mut self, key: S, value: S) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach a user-facing message
    pub fn with_user_message<S: Into<String>>(mut self, message: S) -> Self {
        self.user_message = Some(message.into());
        self
    }
}

/// A failure on its way into the registry
///
/// Category and severity may be supplied explicitly; anything left out is
/// classified heuristically by [`crate::classify`].
#[derive(Debug, Clone, Default)]
pub struct Fault {
    /// Failure message
    pub message: String,
    /// Optional stack trace or backtrace text
    pub stack: Option<String>,
    /// Explicit category override
    pub category: Option<ErrorCategory>,
    /// Explicit severity override
    pub severity: Option<ErrorSeverity>,
    /// Where the failure happened
    pub context: ErrorContext,
}

impl Fault {
    /// Create a fault from a message
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Create a fault from any std error, capturing its source chain as the
    /// stack text
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut frames = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            frames.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        Self {
            message: error.to_string(),
            stack: if frames.is_empty() {
                None
            } else {
                Some(frames.join("\n"))
            },
            ..Self::default()
        }
    }

    /// Set an explicit category, bypassing classification
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set an explicit severity, bypassing classification
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attach stack trace text
    pub fn with_stack<S: Into<String>>(mut self, stack: S) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attach a context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }
}

/// The canonical record for a captured failure
///
/// Category, severity, context and timestamp are immutable once assigned.
/// Only `resolved` (false to true, never back), `retry_count` (monotonic)
/// and `last_retry` ever change.
#[derive(Debug, Clone, Serialize)]
pub struct ManagedError {
    /// Unique id, immutable
    pub id: ErrorId,
    /// Failure message
    pub message: String,
    /// Stack trace text, if any
    pub stack: Option<String>,
    /// Category, assigned once
    pub category: ErrorCategory,
    /// Severity, assigned once
    pub severity: ErrorSeverity,
    /// Context captured at creation
    pub context: ErrorContext,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Whether the error has been resolved
    pub resolved: bool,
    /// Number of retry attempts made
    pub retry_count: u32,
    /// Time of the most recent retry attempt
    pub last_retry: Option<DateTime<Utc>>,
}

impl ManagedError {
    /// Build a registry entry from a fault, classifying where needed
    pub fn from_fault(fault: Fault) -> Self {
        let category = fault
            .category
            .unwrap_or_else(|| classify_category(&fault.message, fault.stack.as_deref()));
        let severity = fault
            .severity
            .unwrap_or_else(|| classify_severity(&fault.message, category));

        Self {
            id: Uuid::new_v4(),
            message: fault.message,
            stack: fault.stack,
            category,
            severity,
            context: fault.context,
            timestamp: Utc::now(),
            resolved: false,
            retry_count: 0,
            last_retry: None,
        }
    }
}

/// Hook invoked when a retry attempt fires, with the attempt number
pub type RetryHook = Arc<dyn Fn(&ManagedError, u32) + Send + Sync>;

/// Hook invoked when an error has exhausted its retries
pub type FailureHook = Arc<dyn Fn(&ManagedError) + Send + Sync>;

/// Per-category retry policy
#[derive(Clone, Default)]
pub struct RecoveryStrategy {
    /// Maximum number of retry attempts before giving up
    pub max_retries: u32,
    /// Base delay before a retry fires
    pub retry_delay: Duration,
    /// Double the delay on each successive attempt
    pub exponential_backoff: bool,
    /// Called on each retry attempt
    pub on_retry: Option<RetryHook>,
    /// Called once retries are exhausted
    pub on_failure: Option<FailureHook>,
}

impl std::fmt::Debug for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryStrategy")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("exponential_backoff", &self.exponential_backoff)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "<hook>"))
            .field("on_failure", &self.on_failure.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl RecoveryStrategy {
    /// Create a strategy with no hooks
    pub fn new(max_retries: u32, retry_delay: Duration, exponential_backoff: bool) -> Self {
        Self {
            max_retries,
            retry_delay,
            exponential_backoff,
            on_retry: None,
            on_failure: None,
        }
    }

    /// Set the retry hook
    pub fn with_on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ManagedError, u32) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Set the exhaustion hook
    pub fn with_on_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ManagedError) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(hook));
        self
    }

    /// Compute the wait before the given (1-based) retry attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential_backoff && attempt > 1 {
            self.retry_delay
                .saturating_mul(2u32.saturating_pow(attempt - 1))
        } else {
            self.retry_delay
        }
    }
}

/// A retry admitted by [`ErrorManager::begin_retry`], waiting out its
/// backoff delay
#[derive(Clone)]
pub struct PendingRetry {
    /// Snapshot of the error with the incremented retry count
    pub error: ManagedError,
    /// 1-based attempt number
    pub attempt: u32,
    /// Backoff wait before the attempt fires
    pub delay: Duration,
    on_retry: Option<RetryHook>,
}

/// Aggregate counts over the registry
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    /// Total errors currently in the registry
    pub total: usize,
    /// Errors not yet resolved
    pub unresolved: usize,
    /// Counts keyed by category
    pub by_category: HashMap<ErrorCategory, usize>,
    /// Counts keyed by severity
    pub by_severity: HashMap<ErrorSeverity, usize>,
}

/// Central registry of errors: classifies, stores and broadcasts
pub struct ErrorManager {
    registry: HashMap<ErrorId, ManagedError>,
    strategies: HashMap<ErrorCategory, RecoveryStrategy>,
    dispatcher: EventDispatcher,
}

impl ErrorManager {
    /// Create a manager with the default per-category retry strategies
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
            strategies: Self::default_strategies(),
            dispatcher: EventDispatcher::new(),
        }
    }

    /// Default retry policies per category
    ///
    /// Categories without an entry (permission, unknown) never retry.
    fn default_strategies() -> HashMap<ErrorCategory, RecoveryStrategy> {
        let mut strategies = HashMap::new();
        strategies.insert(
            ErrorCategory::Api,
            RecoveryStrategy::new(3, Duration::from_millis(1000), true),
        );
        strategies.insert(
            ErrorCategory::Network,
            RecoveryStrategy::new(5, Duration::from_millis(2000), true),
        );
        strategies.insert(
            ErrorCategory::Validation,
            RecoveryStrategy::new(0, Duration::ZERO, false),
        );
        strategies.insert(
            ErrorCategory::Runtime,
            RecoveryStrategy::new(1, Duration::ZERO, false),
        );
        strategies
    }

    /// Replace the retry strategy for a category
    pub fn set_strategy(&mut self, category: ErrorCategory, strategy: RecoveryStrategy) {
        self.strategies.insert(category, strategy);
    }

    /// Get the retry strategy for a category, if one is configured
    pub fn strategy(&self, category: ErrorCategory) -> Option<&RecoveryStrategy> {
        self.strategies.get(&category)
    }

    /// Capture a failure: classify, store, log and broadcast
    ///
    /// Never fails. The `Captured` event is delivered synchronously to all
    /// subscribers before this returns.
    pub fn handle_error(&mut self, fault: Fault) -> ErrorId {
        let error = ManagedError::from_fault(fault);
        let id = error.id;

        match error.severity {
            ErrorSeverity::Critical => {
                log::error!("CRITICAL [{}] {}", error.category, error.message)
            }
            ErrorSeverity::High => log::error!("[{}] {}", error.category, error.message),
            ErrorSeverity::Medium => log::warn!("[{}] {}", error.category, error.message),
            ErrorSeverity::Low => log::info!("[{}] {}", error.category, error.message),
        }

        self.registry.insert(id, error.clone());
        self.dispatcher.emit(&ErrorEvent::Captured(error));
        id
    }

    /// Mark an error resolved
    ///
    /// Idempotent; emits `Resolved` only on the first transition. Unknown ids
    /// are a no-op.
    pub fn resolve_error(&mut self, id: ErrorId) {
        let snapshot = match self.registry.get_mut(&id) {
            Some(error) if !error.resolved => {
                error.resolved = true;
                error.clone()
            }
            _ => return,
        };

        log::debug!("error {} resolved", id);
        self.dispatcher.emit(&ErrorEvent::Resolved { error: snapshot });
    }

    /// Admit a retry attempt without waiting out its backoff
    ///
    /// Returns `None` when the error is unknown, already resolved, or out of
    /// retries (invoking the strategy's failure hook in the last case).
    /// Otherwise increments the retry count and returns a ticket carrying
    /// the backoff delay. Callers holding the manager behind a lock should
    /// release it, wait out `delay`, then pass the ticket to
    /// [`ErrorManager::complete_retry`]. Severity never affects retry
    /// eligibility; only category does.
    pub fn begin_retry(&mut self, id: ErrorId) -> Option<PendingRetry> {
        let (strategy, attempt) = match self.registry.get(&id) {
            None => {
                log::debug!("retry requested for unknown error {}", id);
                return None;
            }
            Some(error) if error.resolved => return None,
            Some(error) => {
                let strategy = self
                    .strategies
                    .get(&error.category)
                    .cloned()
                    .unwrap_or_default();

                if error.retry_count >= strategy.max_retries {
                    log::warn!(
                        "error {} exhausted its {} retries ({})",
                        id,
                        strategy.max_retries,
                        error.category
                    );
                    if let Some(hook) = &strategy.on_failure {
                        hook(error);
                    }
                    return None;
                }

                (strategy, error.retry_count + 1)
            }
        };

        let error = self.registry.get_mut(&id)?;
        error.retry_count = attempt;
        error.last_retry = Some(Utc::now());

        Some(PendingRetry {
            error: error.clone(),
            attempt,
            delay: strategy.delay_for(attempt),
            on_retry: strategy.on_retry,
        })
    }

    /// Fire the retry hook and emit `Retried` for an admitted attempt
    pub fn complete_retry(&mut self, pending: PendingRetry) {
        if let Some(hook) = &pending.on_retry {
            hook(&pending.error, pending.attempt);
        }

        log::debug!(
            "retry attempt {} for error {}",
            pending.attempt,
            pending.error.id
        );
        self.dispatcher.emit(&ErrorEvent::Retried {
            retry_count: pending.attempt,
            error: pending.error,
        });
    }

    /// Attempt a retry for an error, honoring its category's strategy
    ///
    /// Returns `false` immediately when the error is unknown, already
    /// resolved, or out of retries (invoking the strategy's failure hook in
    /// the last case). Otherwise increments the retry count, waits out the
    /// backoff delay, fires the retry hook, emits `Retried` and returns
    /// `true`.
    pub async fn retry_error(&mut self, id: ErrorId) -> bool {
        let pending = match self.begin_retry(id) {
            Some(pending) => pending,
            None => return false,
        };

        if !pending.delay.is_zero() {
            tokio::time::sleep(pending.delay).await;
        }

        self.complete_retry(pending);
        true
    }

    /// Look up an error by id
    pub fn get(&self, id: ErrorId) -> Option<&ManagedError> {
        self.registry.get(&id)
    }

    /// All unresolved errors, oldest first
    pub fn unresolved(&self) -> Vec<ManagedError> {
        let mut errors: Vec<ManagedError> = self
            .registry
            .values()
            .filter(|e| !e.resolved)
            .cloned()
            .collect();
        errors.sort_by_key(|e| e.timestamp);
        errors
    }

    /// Aggregate counts over the registry
    pub fn stats(&self) -> ErrorStats {
        let mut stats = ErrorStats {
            total: self.registry.len(),
            ..ErrorStats::default()
        };

        for error in self.registry.values() {
            if !error.resolved {
                stats.unresolved += 1;
            }
            *stats.by_category.entry(error.category).or_insert(0) += 1;
            *stats.by_severity.entry(error.severity).or_insert(0) += 1;
        }

        stats
    }

    /// Drop all resolved errors from the registry
    pub fn clear_resolved(&mut self) {
        self.registry.retain(|_, error| !error.resolved);
    }

    /// Drop every error from the registry
    pub fn clear_all(&mut self) {
        self.registry.clear();
    }

    /// Subscribe to lifecycle events
    pub fn subscribe<F>(&mut self, filter: EventFilter, listener: F) -> SubscriberId
    where
        F: FnMut(&ErrorEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.dispatcher.subscribe(filter, listener)
    }

    /// Remove an event subscriber
    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.dispatcher.unsubscribe(id);
    }
}

impl Default for ErrorManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a process-wide panic hook that funnels panics into the manager
///
/// This is the runtime's uncaught-failure surface: every panic is captured
/// as a `Runtime`-category fault. The previous hook still runs afterwards.
/// The hook uses a non-blocking lock so a panic while the manager is busy is
/// dropped rather than deadlocked.
pub fn install_panic_hook(manager: Arc<tokio::sync::Mutex<ErrorManager>>) {
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };

        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));

        if let Ok(mut manager) = manager.try_lock() {
            let mut fault = Fault::new(message)
                .with_category(ErrorCategory::Runtime)
                .with_context(ErrorContext::new("panic", "unwind"));
            if let Some(location) = location {
                fault = fault.with_stack(location);
            }
            manager.handle_error(fault);
        }

        previous(info);
    }));
}
