//! Category-driven recovery engine
//!
//! For each category the engine holds an ordered chain of recovery actions
//! (retry, fallback, notify). [`ErrorRecovery::attempt_recovery`] walks the
//! chain until one action reports success; every attempt, successful or not,
//! lands in an append-only history. An action that errors is caught, logged
//! and treated as a failed attempt.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::classify::ErrorCategory;
use crate::error::RecoveryError;
use crate::events::ErrorEvent;
use crate::manager::{ErrorId, ErrorManager, ManagedError};

/// Well-known action and outcome names
pub mod action {
    pub const RETRY: &str = "retry";
    pub const FALLBACK: &str = "fallback";
    pub const NOTIFY: &str = "notify";

    pub const ERROR_NOT_FOUND: &str = "error_not_found";
    pub const ALREADY_RESOLVED: &str = "already_resolved";
    pub const ALL_ACTIONS_FAILED: &str = "all_recovery_actions_failed";
}

/// A single recovery step in a category's chain
///
/// `execute` returns `Ok(true)` when the action recovered the error,
/// `Ok(false)` when it declined, and `Err` when it failed outright; the
/// engine treats the last two the same way and moves on to the next action.
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    /// Name of this action, recorded in history and outcomes
    fn kind(&self) -> &str;

    /// Try to recover the error
    async fn execute(
        &self,
        manager: &mut ErrorManager,
        error: &ManagedError,
    ) -> anyhow::Result<bool>;
}

/// Drives the manager's retry machinery for one attempt
pub struct RetryAction;

#[async_trait]
impl RecoveryAction for RetryAction {
    fn kind(&self) -> &str {
        action::RETRY
    }

    async fn execute(
        &self,
        manager: &mut ErrorManager,
        error: &ManagedError,
    ) -> anyhow::Result<bool> {
        Ok(manager.retry_error(error.id).await)
    }
}

/// Switches to degraded behavior instead of the failed operation
///
/// With no handler installed the fallback always succeeds; a handler can
/// veto by returning false.
pub struct FallbackAction {
    handler: Option<Arc<dyn Fn(&ManagedError) -> bool + Send + Sync>>,
}

impl FallbackAction {
    /// Fallback that always succeeds
    pub fn new() -> Self {
        Self { handler: None }
    }

    /// Fallback gated by a handler
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&ManagedError) -> bool + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
        }
    }
}

impl Default for FallbackAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryAction for FallbackAction {
    fn kind(&self) -> &str {
        action::FALLBACK
    }

    async fn execute(
        &self,
        _manager: &mut ErrorManager,
        error: &ManagedError,
    ) -> anyhow::Result<bool> {
        match &self.handler {
            Some(handler) => Ok(handler(error)),
            None => {
                log::info!("falling back for error {}", error.id);
                Ok(true)
            }
        }
    }
}

/// Surfaces the error to a human and reports success
pub struct NotifyAction {
    notifier: Option<Arc<dyn Fn(&ManagedError) + Send + Sync>>,
}

impl NotifyAction {
    /// Notify via the log only
    pub fn new() -> Self {
        Self { notifier: None }
    }

    /// Notify through a callback (toast, dialog, pager)
    pub fn with_notifier<F>(notifier: F) -> Self
    where
        F: Fn(&ManagedError) + Send + Sync + 'static,
    {
        Self {
            notifier: Some(Arc::new(notifier)),
        }
    }
}

impl Default for NotifyAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecoveryAction for NotifyAction {
    fn kind(&self) -> &str {
        action::NOTIFY
    }

    async fn execute(
        &self,
        _manager: &mut ErrorManager,
        error: &ManagedError,
    ) -> anyhow::Result<bool> {
        let message = error
            .context
            .user_message
            .clone()
            .unwrap_or_else(|| error.message.clone());
        log::warn!("notifying user about error {}: {}", error.id, message);

        if let Some(notifier) = &self.notifier {
            notifier(error);
        }
        Ok(true)
    }
}

/// One recorded recovery attempt
#[derive(Debug, Clone)]
pub struct RecoveryAttempt {
    /// The error being recovered
    pub error_id: ErrorId,
    /// Which action ran
    pub action: String,
    /// Whether the action reported success
    pub succeeded: bool,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
}

/// The result of walking a recovery chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Whether any action succeeded
    pub success: bool,
    /// The winning action, or a failure reason
    pub action: String,
}

impl RecoveryOutcome {
    fn success(action: &str) -> Self {
        Self {
            success: true,
            action: action.to_string(),
        }
    }

    fn failure(action: &str) -> Self {
        Self {
            success: false,
            action: action.to_string(),
        }
    }
}

/// Walks per-category recovery action chains
pub struct ErrorRecovery {
    actions: HashMap<ErrorCategory, Vec<Arc<dyn RecoveryAction>>>,
    history: Vec<RecoveryAttempt>,
    pending: HashSet<ErrorId>,
}

impl ErrorRecovery {
    /// Create an engine with the default per-category chains
    pub fn new() -> Self {
        let mut actions: HashMap<ErrorCategory, Vec<Arc<dyn RecoveryAction>>> = HashMap::new();

        actions.insert(
            ErrorCategory::Api,
            vec![Arc::new(RetryAction), Arc::new(FallbackAction::new())],
        );
        actions.insert(
            ErrorCategory::Network,
            vec![Arc::new(RetryAction), Arc::new(NotifyAction::new())],
        );
        actions.insert(ErrorCategory::Validation, vec![Arc::new(NotifyAction::new())]);
        actions.insert(
            ErrorCategory::Runtime,
            vec![Arc::new(RetryAction), Arc::new(NotifyAction::new())],
        );
        actions.insert(ErrorCategory::Permission, vec![Arc::new(NotifyAction::new())]);
        actions.insert(ErrorCategory::Unknown, vec![Arc::new(NotifyAction::new())]);

        Self {
            actions,
            history: Vec::new(),
            pending: HashSet::new(),
        }
    }

    /// Replace the action chain for a category
    pub fn set_actions(&mut self, category: ErrorCategory, chain: Vec<Arc<dyn RecoveryAction>>) {
        self.actions.insert(category, chain);
    }

    /// React to a manager event, tracking which errors still await recovery
    ///
    /// `Captured` marks an error pending; `Resolved` and a successful
    /// [`ErrorRecovery::attempt_recovery`] clear it. `Retried` is ignored.
    pub fn observe(&mut self, event: &ErrorEvent) {
        match event {
            ErrorEvent::Captured(error) => {
                self.pending.insert(error.id);
            }
            ErrorEvent::Resolved { error } => {
                self.pending.remove(&error.id);
            }
            ErrorEvent::Retried { .. } => {}
        }
    }

    /// Whether an error awaits recovery
    pub fn is_pending(&self, id: ErrorId) -> bool {
        self.pending.contains(&id)
    }

    /// Errors captured but neither resolved nor successfully recovered
    pub fn pending(&self) -> Vec<ErrorId> {
        self.pending.iter().copied().collect()
    }

    /// Walk the error's category chain until an action succeeds
    pub async fn attempt_recovery(
        &mut self,
        manager: &mut ErrorManager,
        error_id: ErrorId,
    ) -> RecoveryOutcome {
        let error = match manager.get(error_id) {
            None => {
                log::debug!("recovery requested for unknown error {}", error_id);
                return RecoveryOutcome::failure(action::ERROR_NOT_FOUND);
            }
            Some(error) if error.resolved => {
                self.pending.remove(&error_id);
                return RecoveryOutcome::success(action::ALREADY_RESOLVED);
            }
            Some(error) => error.clone(),
        };

        let chain = self
            .actions
            .get(&error.category)
            .cloned()
            .unwrap_or_default();

        for recovery_action in chain {
            let kind = recovery_action.kind().to_string();
            let succeeded = match recovery_action.execute(manager, &error).await {
                Ok(succeeded) => succeeded,
                Err(e) => {
                    log::warn!(
                        "recovery action '{}' failed for error {}: {}",
                        kind,
                        error_id,
                        e
                    );
                    false
                }
            };

            self.history.push(RecoveryAttempt {
                error_id,
                action: kind.clone(),
                succeeded,
                timestamp: Utc::now(),
            });

            if succeeded {
                log::info!("recovered error {} via '{}'", error_id, kind);
                self.pending.remove(&error_id);
                return RecoveryOutcome::success(&kind);
            }
        }

        log::warn!("all recovery actions failed for error {}", error_id);
        RecoveryOutcome::failure(action::ALL_ACTIONS_FAILED)
    }

    /// Recover, substituting a fallback value on fallback success
    ///
    /// Returns the fallback value only when the chain succeeded through the
    /// fallback action; any other outcome is an error.
    pub async fn recover_with_fallback<T, F>(
        &mut self,
        manager: &mut ErrorManager,
        error_id: ErrorId,
        fallback: F,
    ) -> Result<T, RecoveryError>
    where
        F: FnOnce() -> T,
    {
        let outcome = self.attempt_recovery(manager, error_id).await;

        if outcome.success && outcome.action == action::FALLBACK {
            Ok(fallback())
        } else if outcome.success {
            Err(RecoveryError::NotViaFallback {
                action: outcome.action,
            })
        } else {
            Err(RecoveryError::Unrecovered {
                action: outcome.action,
            })
        }
    }

    /// Every recorded attempt, oldest first
    pub fn history(&self) -> &[RecoveryAttempt] {
        &self.history
    }

    /// Recorded attempts for one error, oldest first
    pub fn history_for(&self, error_id: ErrorId) -> Vec<&RecoveryAttempt> {
        self.history
            .iter()
            .filter(|attempt| attempt.error_id == error_id)
            .collect()
    }
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Generic exponential-backoff retry loop over an arbitrary async operation
///
/// Independent of the error registry: the k-th wait is
/// `base_delay * 2^(k-1)`. The last error is returned once `max_retries`
/// attempts have been added to the initial one.
pub async fn recover_with_retry<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(e);
                }

                let delay = base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                log::debug!("operation failed, retry {} in {:?}", attempt, delay);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
