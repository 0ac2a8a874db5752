//! Per-kind subscriber registry.
//!
//! Each tracked collection owns one [`SubscriberSet`]: four insertion-ordered
//! lists, one per [`EventKind`]. Registering the same closure twice yields two
//! independent entries, both invoked. Callbacks live behind
//! `Arc<Mutex<dyn FnMut ...>>` so a notification pass can invoke them after
//! the collection's state lock is released; a callback may therefore call back
//! into the collection or the runtime without deadlocking.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::change::EventKind;

/// Outcome of a subscriber callback. Any error aborts the remaining
/// deliveries of the current notification pass.
pub type SubscriberResult = Result<(), anyhow::Error>;

/// Generic callback: `(new_full_state, old_full_state)`.
pub type GenericFn<T> = dyn FnMut(&[T], &[T]) -> SubscriberResult + Send;
/// Create callback: `(new_item, index)`.
pub type CreateFn<T> = dyn FnMut(&T, usize) -> SubscriberResult + Send;
/// Update callback: `(new_item, old_item, index)`.
pub type UpdateFn<T> = dyn FnMut(&T, &T, usize) -> SubscriberResult + Send;
/// Delete callback: `(removed_item, index)`.
pub type DeleteFn<T> = dyn FnMut(&T, usize) -> SubscriberResult + Send;

/// Identifies one registered callback on one collection.
///
/// Returned by the `bind_*`/`observe_*` methods and used for targeted
/// removal. Serials are monotonically increasing per collection and never
/// reused, so a stale id can never alias a newer subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    kind: EventKind,
    serial: u64,
}

impl SubscriptionId {
    /// The event kind this subscription was registered under.
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct Entry<F: ?Sized> {
    serial: u64,
    callback: Arc<Mutex<F>>,
}

pub(crate) struct SubscriberSet<T> {
    generic: Vec<Entry<GenericFn<T>>>,
    create: Vec<Entry<CreateFn<T>>>,
    update: Vec<Entry<UpdateFn<T>>>,
    delete: Vec<Entry<DeleteFn<T>>>,
    next_serial: u64,
}

/// The callback lists of one notification pass, captured under the state
/// lock. Callbacks added mid-pass are absent; callbacks removed mid-pass are
/// still present (removal affects future passes only).
pub(crate) struct SubscriberSnapshot<T> {
    pub generic: Vec<Arc<Mutex<GenericFn<T>>>>,
    pub create: Vec<Arc<Mutex<CreateFn<T>>>>,
    pub update: Vec<Arc<Mutex<UpdateFn<T>>>>,
    pub delete: Vec<Arc<Mutex<DeleteFn<T>>>>,
}

impl<T: 'static> SubscriberSet<T> {
    pub fn new() -> Self {
        Self {
            generic: Vec::new(),
            create: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
            next_serial: 0,
        }
    }

    fn next_id(&mut self, kind: EventKind) -> SubscriptionId {
        let serial = self.next_serial;
        self.next_serial += 1;
        SubscriptionId { kind, serial }
    }

    pub fn add_generic<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&[T], &[T]) -> SubscriberResult + Send + 'static,
    {
        let id = self.next_id(EventKind::Generic);
        self.generic.push(Entry {
            serial: id.serial,
            callback: Arc::new(Mutex::new(callback)),
        });
        id
    }

    pub fn add_create<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T, usize) -> SubscriberResult + Send + 'static,
    {
        let id = self.next_id(EventKind::Create);
        self.create.push(Entry {
            serial: id.serial,
            callback: Arc::new(Mutex::new(callback)),
        });
        id
    }

    pub fn add_update<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T, &T, usize) -> SubscriberResult + Send + 'static,
    {
        let id = self.next_id(EventKind::Update);
        self.update.push(Entry {
            serial: id.serial,
            callback: Arc::new(Mutex::new(callback)),
        });
        id
    }

    pub fn add_delete<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T, usize) -> SubscriberResult + Send + 'static,
    {
        let id = self.next_id(EventKind::Delete);
        self.delete.push(Entry {
            serial: id.serial,
            callback: Arc::new(Mutex::new(callback)),
        });
        id
    }

    /// Remove one subscription. Returns `false` for ids that are unknown or
    /// already removed.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        fn retain_serial<F: ?Sized>(entries: &mut Vec<Entry<F>>, serial: u64) -> bool {
            let before = entries.len();
            entries.retain(|e| e.serial != serial);
            entries.len() != before
        }

        match id.kind {
            EventKind::Generic => retain_serial(&mut self.generic, id.serial),
            EventKind::Create => retain_serial(&mut self.create, id.serial),
            EventKind::Update => retain_serial(&mut self.update, id.serial),
            EventKind::Delete => retain_serial(&mut self.delete, id.serial),
        }
    }

    /// Drop every subscription of one kind.
    pub fn clear_kind(&mut self, kind: EventKind) {
        match kind {
            EventKind::Generic => self.generic.clear(),
            EventKind::Create => self.create.clear(),
            EventKind::Update => self.update.clear(),
            EventKind::Delete => self.delete.clear(),
        }
    }

    /// Drop every subscription of every kind.
    pub fn clear(&mut self) {
        self.generic.clear();
        self.create.clear();
        self.update.clear();
        self.delete.clear();
    }

    pub fn total(&self) -> usize {
        self.generic.len() + self.create.len() + self.update.len() + self.delete.len()
    }

    pub fn generic_count(&self) -> usize {
        self.generic.len()
    }

    pub fn snapshot(&self) -> SubscriberSnapshot<T> {
        SubscriberSnapshot {
            generic: self.generic.iter().map(|e| e.callback.clone()).collect(),
            create: self.create.iter().map(|e| e.callback.clone()).collect(),
            update: self.update.iter().map(|e| e.callback.clone()).collect(),
            delete: self.delete.iter().map(|e| e.callback.clone()).collect(),
        }
    }
}
