//! The change event model shared by the detector and the notification layer.

use std::fmt;

/// The four subscriber event kinds.
///
/// `Generic` subscribers receive the full before/after state; the other three
/// receive one call per affected index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Fires once per notification batch with `(new_full_state, old_full_state)`.
    Generic,
    /// Fires with `(new_item, index)` for every created element.
    Create,
    /// Fires with `(new_item, old_item, index)` for every replaced element.
    Update,
    /// Fires with `(removed_item, index)` for every deleted element.
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Generic => "generic",
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        };
        write!(f, "{}", name)
    }
}

/// A single structural difference between two collection states.
///
/// Produced by [`diff`](crate::detect::diff) and by the intercepted mutators'
/// operation-specific event computation. The order of a `Vec<Change<T>>` is
/// the delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    /// An element appeared at `index`.
    Created {
        /// Index the element occupies in the new state.
        index: usize,
        /// The created element.
        value: T,
    },
    /// The element at `index` was removed.
    Deleted {
        /// Index the element occupied in the old state.
        index: usize,
        /// The removed element.
        value: T,
    },
    /// The element at `index` was replaced by a structurally different value.
    Updated {
        /// The affected index.
        index: usize,
        /// The value now at `index`.
        new: T,
        /// The value previously at `index`.
        old: T,
    },
}

impl<T> Change<T> {
    /// The index this change applies to.
    pub fn index(&self) -> usize {
        match self {
            Change::Created { index, .. }
            | Change::Deleted { index, .. }
            | Change::Updated { index, .. } => *index,
        }
    }

    /// The subscriber kind this change is dispatched to.
    ///
    /// Never returns [`EventKind::Generic`]; generic notification is a
    /// per-batch concern, not a per-change one.
    pub fn kind(&self) -> EventKind {
        match self {
            Change::Created { .. } => EventKind::Create,
            Change::Deleted { .. } => EventKind::Delete,
            Change::Updated { .. } => EventKind::Update,
        }
    }
}
