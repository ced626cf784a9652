//! Typed event system for error lifecycle notifications
//!
//! The manager broadcasts every lifecycle transition through an
//! [`EventDispatcher`]. Listeners fire synchronously, in subscription order,
//! on the caller's thread; a listener that returns an error is logged and
//! isolated so it can never block other listeners or the emitter.

use crate::manager::{ErrorId, ManagedError};

/// The kind of a lifecycle event, for exhaustive filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new error was captured and stored
    Captured,
    /// An error transitioned to resolved
    Resolved,
    /// A retry attempt was made for an error
    Retried,
}

/// A lifecycle event with its payload
///
/// Payloads are snapshots of the registry entry at emission time; holding on
/// to one never observes later mutation.
#[derive(Debug, Clone)]
pub enum ErrorEvent {
    /// A new error was captured
    Captured(ManagedError),
    /// An error was resolved for the first time
    Resolved { error: ManagedError },
    /// A retry attempt completed its backoff wait
    Retried { error: ManagedError, retry_count: u32 },
}

impl ErrorEvent {
    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Captured(_) => EventKind::Captured,
            Self::Resolved { .. } => EventKind::Resolved,
            Self::Retried { .. } => EventKind::Retried,
        }
    }

    /// Get the id of the error this event concerns
    pub fn error_id(&self) -> ErrorId {
        match self {
            Self::Captured(error)
            | Self::Resolved { error }
            | Self::Retried { error, .. } => error.id,
        }
    }

    /// Get the error snapshot carried by this event
    pub fn error(&self) -> &ManagedError {
        match self {
            Self::Captured(error)
            | Self::Resolved { error }
            | Self::Retried { error, .. } => error,
        }
    }
}

/// Defines which events a subscriber is interested in
pub enum EventFilter {
    /// Accept all events
    All,
    /// Only specific event kinds
    Kinds(Vec<EventKind>),
    /// Custom filter function
    Custom(Box<dyn Fn(&ErrorEvent) -> bool + Send>),
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "EventFilter::All"),
            Self::Kinds(kinds) => write!(f, "EventFilter::Kinds({:?})", kinds),
            Self::Custom(_) => write!(f, "EventFilter::Custom(<function>)"),
        }
    }
}

impl EventFilter {
    /// Create a filter that includes all events
    pub fn all() -> Self {
        Self::All
    }

    /// Create a filter for specific event kinds
    pub fn kinds(kinds: Vec<EventKind>) -> Self {
        Self::Kinds(kinds)
    }

    /// Create a custom filter with a closure
    pub fn custom<F>(filter_fn: F) -> Self
    where
        F: Fn(&ErrorEvent) -> bool + Send + 'static,
    {
        Self::Custom(Box::new(filter_fn))
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &ErrorEvent) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&event.kind()),
            Self::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Subscriber ID type
pub type SubscriberId = u32;

/// A subscribed listener. Returning `Err` marks the delivery failed; the
/// dispatcher logs it and carries on.
pub type EventListener = Box<dyn FnMut(&ErrorEvent) -> anyhow::Result<()> + Send>;

struct Subscriber {
    id: SubscriberId,
    filter: EventFilter,
    listener: EventListener,
}

/// Synchronous dispatcher for error lifecycle events
pub struct EventDispatcher {
    next_subscriber_id: SubscriberId,
    subscribers: Vec<Subscriber>,
}

impl EventDispatcher {
    /// Create a new dispatcher with no subscribers
    pub fn new() -> Self {
        Self {
            next_subscriber_id: 1,
            subscribers: Vec::new(),
        }
    }

    /// Subscribe a listener with a filter, returning an id for unsubscribing
    pub fn subscribe<F>(&mut self, filter: EventFilter, listener: F) -> SubscriberId
    where
        F: FnMut(&ErrorEvent) -> anyhow::Result<()> + Send + 'static,
    {
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;

        self.subscribers.push(Subscriber {
            id,
            filter,
            listener: Box::new(listener),
        });

        id
    }

    /// Remove a subscriber
    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.subscribers.retain(|s| s.id != id);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Deliver an event to every matching subscriber, in subscription order
    ///
    /// A failing listener is logged and skipped; delivery to the remaining
    /// listeners continues.
    pub fn emit(&mut self, event: &ErrorEvent) {
        for subscriber in self.subscribers.iter_mut() {
            if !subscriber.filter.matches(event) {
                continue;
            }

            if let Err(e) = (subscriber.listener)(event) {
                log::warn!(
                    "event listener {} failed handling {:?} event: {}",
                    subscriber.id,
                    event.kind(),
                    e
                );
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
