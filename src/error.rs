//! Error types for observation and notification.

use std::sync::Arc;

use thiserror::Error;

use crate::change::EventKind;

/// Errors surfaced by mutators, binds, and reconciliation.
///
/// Subscriber callbacks return `Result<(), anyhow::Error>`, so `?` works on
/// any error type inside them. A failing subscriber aborts the remaining
/// deliveries of its notification pass and the error propagates synchronously
/// out of the call that triggered the pass. Collection state is finalized
/// before delivery starts, so an aborted pass never repeats on the next one.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ObserveError {
    /// A subscriber callback failed during a notification pass.
    #[error("{kind} subscriber failed: {error}")]
    Subscriber {
        /// The event kind being delivered when the callback failed.
        kind: EventKind,
        /// The callback's error.
        error: Arc<anyhow::Error>,
    },
}

impl ObserveError {
    pub(crate) fn subscriber(kind: EventKind, error: anyhow::Error) -> Self {
        ObserveError::Subscriber {
            kind,
            error: Arc::new(error),
        }
    }

    /// The event kind whose delivery failed.
    pub fn event_kind(&self) -> EventKind {
        match self {
            ObserveError::Subscriber { kind, .. } => *kind,
        }
    }

    /// Returns a reference to the failing subscriber's error.
    pub fn subscriber_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            ObserveError::Subscriber { error, .. } => Some(error),
        }
    }

    /// Attempts to downcast the subscriber error to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.subscriber_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns `true` if the subscriber error is of type `E`.
    pub fn is<E: std::error::Error + Send + Sync + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}
