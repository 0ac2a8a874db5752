//! The tracked collection: a `Vec` wrapper that owns the interception state,
//! the snapshot, and the subscriber registry for one observed collection.
//!
//! [`ObservableVec`] is a cheap-to-clone handle; clones share one underlying
//! collection and one identity. Every intercepted mutator runs the same
//! sequence: flush pending untracked divergence (a reconciliation pass),
//! apply the structural mutation, fire the operation's exact semantic events,
//! then advance the snapshot and notify generic subscribers. Mutations made
//! through [`ObservableVec::with_untracked`] bypass that sequence and are
//! picked up by the next reconciliation pass instead.

use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::change::{Change, EventKind};
use crate::detect;
use crate::error::ObserveError;
use crate::log::flow_trace;
use crate::subscriber::{SubscriberResult, SubscriberSet, SubscriberSnapshot, SubscriptionId};

static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one observed collection.
///
/// Assigned once per underlying collection (not per handle clone) from a
/// process-wide monotonic counter; ids are never reused, so a dead
/// collection's id cannot alias a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(u64);

impl CollectionId {
    fn next() -> Self {
        CollectionId(NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Type-erased view of a tracked collection, used by the runtime's table and
/// scheduler so collections of different element types share one registry.
pub(crate) trait Tracked: Send + Sync {
    fn reconcile_tracked(&self) -> Result<bool, ObserveError>;
    fn clear_all_subscribers(&self);
}

/// An ordered, index-addressable collection whose structural mutations notify
/// subscribers.
///
/// Cloning the handle is cheap and clones the *identity*: all clones mutate
/// and observe the same collection. Element equality is structural
/// (`PartialEq`); two distinct values with equal contents count as unchanged.
///
/// # Example
///
/// ```
/// use change_flow::ObservableVec;
///
/// let items = ObservableVec::from_vec(vec![10, 20]);
/// items.bind_delete(|removed, index| {
///     assert_eq!((*removed, index), (20, 1));
///     Ok(())
/// });
/// items.pop()?;
/// # Ok::<(), change_flow::ObserveError>(())
/// ```
pub struct ObservableVec<T> {
    inner: Arc<Inner<T>>,
}

impl<T: 'static> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<T> {
    id: CollectionId,
    state: Mutex<State<T>>,
}

struct State<T> {
    data: Vec<T>,
    /// Contents as of the end of the most recent notification pass. Replaced,
    /// never mutated in place.
    snapshot: Vec<T>,
    /// Set by the first bind of any kind. Until then mutators skip
    /// notification passes entirely and the snapshot stays empty, so history
    /// from before observation began is invisible.
    bound: bool,
    subscribers: SubscriberSet<T>,
}

/// Everything one notification pass needs after the state lock is released:
/// the ordered events (owned values), the generic payload, and the subscriber
/// lists as they stood when the pass was computed.
struct Batch<T> {
    changes: Vec<Change<T>>,
    generic: Option<(Vec<T>, Vec<T>)>,
    subs: SubscriberSnapshot<T>,
}

impl<T: Clone + 'static> State<T> {
    fn seal_first_bind(&mut self) {
        if !self.bound {
            self.snapshot = self.data.clone();
            self.bound = true;
        }
    }

    /// Close a notification pass: advance the snapshot and capture the
    /// subscriber lists. Returns `None` (and leaves the snapshot alone) when
    /// the pass produced no events.
    fn finish_pass(&mut self, changes: Vec<Change<T>>) -> Option<Batch<T>> {
        if changes.is_empty() {
            return None;
        }
        let previous = std::mem::replace(&mut self.snapshot, self.data.clone());
        let generic =
            (self.subscribers.generic_count() > 0).then(|| (self.snapshot.clone(), previous));
        Some(Batch {
            changes,
            generic,
            subs: self.subscribers.snapshot(),
        })
    }
}

impl<T: Clone + PartialEq + 'static> Inner<T> {
    /// Diff the snapshot against live contents and fire whatever results.
    fn reconcile(&self) -> Result<bool, ObserveError> {
        let batch = {
            let mut state = self.state.lock();
            if !state.bound {
                return Ok(false);
            }
            let changes = detect::diff(&state.snapshot, &state.data);
            state.finish_pass(changes)
        };
        if let Some(batch) = &batch {
            flow_trace!(
                "collection {:?}: reconciliation detected {} change(s)",
                self.id,
                batch.changes.len()
            );
        }
        let fired = batch.is_some();
        self.fire(batch)?;
        Ok(fired)
    }

    /// Run one intercepted mutation: flush pending divergence, apply `op`,
    /// then fire the events `op` reported.
    ///
    /// `op` receives the live data and whether the collection is bound; when
    /// unbound it must report no changes so no pass runs.
    fn mutate<R>(
        &self,
        op: impl FnOnce(&mut Vec<T>, bool) -> (R, Vec<Change<T>>),
    ) -> Result<R, ObserveError> {
        self.reconcile()?;
        let (result, batch) = {
            let mut state = self.state.lock();
            let bound = state.bound;
            let (result, changes) = op(&mut state.data, bound);
            let batch = state.finish_pass(changes);
            (result, batch)
        };
        self.fire(batch)?;
        Ok(result)
    }

    /// Deliver a batch. Runs with no locks held on the collection state, so a
    /// callback may bind, unbind, read, or mutate via `with_untracked` on the
    /// very collection being delivered. It must not call an intercepted
    /// mutator on it (that pass would re-enter the running callback's cell).
    /// The first failing callback aborts the remaining deliveries; state was
    /// finalized before delivery, so nothing is repeated on the next pass.
    fn fire(&self, batch: Option<Batch<T>>) -> Result<(), ObserveError> {
        let Some(Batch {
            changes,
            generic,
            subs,
        }) = batch
        else {
            return Ok(());
        };

        for change in &changes {
            match change {
                Change::Created { index, value } => {
                    for cb in &subs.create {
                        (&mut *cb.lock())(value, *index)
                            .map_err(|e| ObserveError::subscriber(EventKind::Create, e))?;
                    }
                }
                Change::Deleted { index, value } => {
                    for cb in &subs.delete {
                        (&mut *cb.lock())(value, *index)
                            .map_err(|e| ObserveError::subscriber(EventKind::Delete, e))?;
                    }
                }
                Change::Updated { index, new, old } => {
                    for cb in &subs.update {
                        (&mut *cb.lock())(new, old, *index)
                            .map_err(|e| ObserveError::subscriber(EventKind::Update, e))?;
                    }
                }
            }
        }

        if let Some((new_state, old_state)) = generic {
            for cb in &subs.generic {
                (&mut *cb.lock())(&new_state, &old_state)
                    .map_err(|e| ObserveError::subscriber(EventKind::Generic, e))?;
            }
        }
        Ok(())
    }
}

impl<T: Clone + PartialEq + Send + 'static> Tracked for Inner<T> {
    fn reconcile_tracked(&self) -> Result<bool, ObserveError> {
        self.reconcile()
    }

    fn clear_all_subscribers(&self) {
        self.state.lock().subscribers.clear();
    }
}

impl<T: 'static> ObservableVec<T> {
    /// Create a new empty observable collection.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Wrap an existing `Vec`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: CollectionId::next(),
                state: Mutex::new(State {
                    data,
                    snapshot: Vec::new(),
                    bound: false,
                    subscribers: SubscriberSet::new(),
                }),
            }),
        }
    }

    /// This collection's identity. Stable across handle clones.
    pub fn id(&self) -> CollectionId {
        self.inner.id
    }

    /// Number of elements currently in the collection.
    pub fn len(&self) -> usize {
        self.inner.state.lock().data.len()
    }

    /// Returns `true` if the collection holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` against the live contents.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.state.lock().data)
    }

    /// Direct mutable access to the underlying storage, firing nothing.
    ///
    /// Changes made here diverge the live contents from the snapshot; the
    /// divergence is reported by the next reconciliation pass (the runtime's
    /// scheduler, an explicit [`reconcile`](Self::reconcile), or the flush
    /// step of the next intercepted mutator), with events computed by
    /// [`diff`](crate::detect::diff) rather than per-operation semantics.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        f(&mut self.inner.state.lock().data)
    }

    /// Number of registered subscriptions across all four kinds.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.total()
    }

    /// Remove one subscription by id. Returns `false` if it was unknown or
    /// already removed. Takes effect from the next notification pass.
    pub fn unbind(&self, id: SubscriptionId) -> bool {
        self.inner.state.lock().subscribers.remove(id)
    }

    /// Remove every subscription of one kind.
    pub fn unbind_kind(&self, kind: EventKind) {
        self.inner.state.lock().subscribers.clear_kind(kind);
    }

    /// Remove every subscription of every kind.
    pub fn unbind_all(&self) {
        self.inner.state.lock().subscribers.clear();
    }
}

impl<T: Clone + 'static> ObservableVec<T> {
    /// Clone of the element at `index`, or `None` when out of bounds.
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.state.lock().data.get(index).cloned()
    }

    /// Clone of the full contents.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.state.lock().data.clone()
    }
}

impl<T: Clone + PartialEq + 'static> ObservableVec<T> {
    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    /// Register a generic subscriber.
    ///
    /// As a catch-up, `callback(live_state, snapshot)` is invoked once,
    /// synchronously, before registration; on the very first bind the
    /// snapshot side is empty. A catch-up error aborts the bind and leaves
    /// the callback unregistered.
    pub fn bind_generic<F>(&self, mut callback: F) -> Result<SubscriptionId, ObserveError>
    where
        F: FnMut(&[T], &[T]) -> SubscriberResult + Send + 'static,
    {
        let (live, old) = {
            let state = self.inner.state.lock();
            (state.data.clone(), state.snapshot.clone())
        };
        callback(&live, &old).map_err(|e| ObserveError::subscriber(EventKind::Generic, e))?;

        let mut state = self.inner.state.lock();
        let id = state.subscribers.add_generic(callback);
        state.seal_first_bind();
        Ok(id)
    }

    /// Register a create subscriber.
    ///
    /// As a catch-up, the callback is invoked once per element already in the
    /// collection, in ascending index order, so a late subscriber sees
    /// existing content as if it had just been created. A catch-up error
    /// aborts the bind and leaves the callback unregistered.
    pub fn bind_create<F>(&self, mut callback: F) -> Result<SubscriptionId, ObserveError>
    where
        F: FnMut(&T, usize) -> SubscriberResult + Send + 'static,
    {
        let live = self.inner.state.lock().data.clone();
        for (index, item) in live.iter().enumerate() {
            callback(item, index).map_err(|e| ObserveError::subscriber(EventKind::Create, e))?;
        }

        let mut state = self.inner.state.lock();
        let id = state.subscribers.add_create(callback);
        state.seal_first_bind();
        Ok(id)
    }

    /// Register an update subscriber. No catch-up call.
    pub fn bind_update<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T, &T, usize) -> SubscriberResult + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let id = state.subscribers.add_update(callback);
        state.seal_first_bind();
        id
    }

    /// Register a delete subscriber. No catch-up call.
    pub fn bind_delete<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T, usize) -> SubscriberResult + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        let id = state.subscribers.add_delete(callback);
        state.seal_first_bind();
        id
    }

    // ------------------------------------------------------------------
    // Intercepted mutators
    // ------------------------------------------------------------------

    /// Append one element. Fires `create(value, new_len - 1)`.
    pub fn push(&self, value: T) -> Result<(), ObserveError> {
        self.inner.mutate(move |data, tracked| {
            let change = tracked.then(|| Change::Created {
                index: data.len(),
                value: value.clone(),
            });
            data.push(value);
            ((), change.into_iter().collect())
        })
    }

    /// Append every element of `iter`. Fires one create per element, in
    /// ascending index order.
    pub fn extend<I>(&self, iter: I) -> Result<(), ObserveError>
    where
        I: IntoIterator<Item = T>,
    {
        self.inner.mutate(move |data, tracked| {
            let start = data.len();
            data.extend(iter);
            let changes = if tracked {
                data[start..]
                    .iter()
                    .enumerate()
                    .map(|(offset, value)| Change::Created {
                        index: start + offset,
                        value: value.clone(),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            ((), changes)
        })
    }

    /// Insert `value` at `index`, shifting later elements right. Fires
    /// `create(value, index)`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, value: T) -> Result<(), ObserveError> {
        self.inner.mutate(move |data, tracked| {
            let change = tracked.then(|| Change::Created {
                index,
                value: value.clone(),
            });
            data.insert(index, value);
            ((), change.into_iter().collect())
        })
    }

    /// Remove and return the last element. Fires `delete(value, new_len)`;
    /// fires nothing when the collection is empty.
    pub fn pop(&self) -> Result<Option<T>, ObserveError> {
        self.inner.mutate(|data, tracked| match data.pop() {
            Some(value) => {
                let changes = if tracked {
                    vec![Change::Deleted {
                        index: data.len(),
                        value: value.clone(),
                    }]
                } else {
                    Vec::new()
                };
                (Some(value), changes)
            }
            None => (None, Vec::new()),
        })
    }

    /// Remove and return the element at `index`, shifting later elements
    /// left. Fires `delete(value, index)`. `remove(0)` removes the first
    /// element.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn remove(&self, index: usize) -> Result<T, ObserveError> {
        self.inner.mutate(move |data, tracked| {
            let value = data.remove(index);
            let changes = if tracked {
                vec![Change::Deleted {
                    index,
                    value: value.clone(),
                }]
            } else {
                Vec::new()
            };
            (value, changes)
        })
    }

    /// Replace `range` with `replacement`, returning the removed elements.
    ///
    /// Fires one delete per removed element in *descending* index order, then
    /// one create per inserted element in *ascending* index order. Descending
    /// deletes let an observer remove-by-index without surviving indices
    /// shifting underneath it.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn splice<R>(&self, range: R, replacement: Vec<T>) -> Result<Vec<T>, ObserveError>
    where
        R: RangeBounds<usize>,
    {
        self.inner.mutate(move |data, tracked| {
            let (start, end) = resolve_range(&range, data.len());
            let inserted = replacement.len();
            let removed: Vec<T> = data.splice(start..end, replacement).collect();

            let mut changes = Vec::new();
            if tracked {
                for (offset, value) in removed.iter().enumerate().rev() {
                    changes.push(Change::Deleted {
                        index: start + offset,
                        value: value.clone(),
                    });
                }
                for offset in 0..inserted {
                    changes.push(Change::Created {
                        index: start + offset,
                        value: data[start + offset].clone(),
                    });
                }
            }
            (removed, changes)
        })
    }

    /// Drop every element at `len` or beyond. Fires one delete per removed
    /// element, descending. No-op when `len >= self.len()`.
    pub fn truncate(&self, len: usize) -> Result<(), ObserveError> {
        self.inner.mutate(move |data, tracked| {
            let mut changes = Vec::new();
            if tracked && len < data.len() {
                for index in (len..data.len()).rev() {
                    changes.push(Change::Deleted {
                        index,
                        value: data[index].clone(),
                    });
                }
            }
            data.truncate(len);
            ((), changes)
        })
    }

    /// Remove every element. Fires one delete per element, descending.
    pub fn clear(&self) -> Result<(), ObserveError> {
        self.truncate(0)
    }

    /// Replace the element at `index`, returning the previous value. Fires
    /// `update(new, old, index)`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&self, index: usize, value: T) -> Result<T, ObserveError> {
        self.inner.mutate(move |data, tracked| {
            assert!(
                index < data.len(),
                "set index {} out of bounds for length {}",
                index,
                data.len()
            );
            let old = std::mem::replace(&mut data[index], value);
            let changes = if tracked {
                vec![Change::Updated {
                    index,
                    new: data[index].clone(),
                    old: old.clone(),
                }]
            } else {
                Vec::new()
            };
            (old, changes)
        })
    }

    /// Reverse the element order.
    ///
    /// A full reorder: fires one delete per prior index (descending), then
    /// one create per new index (ascending), even for elements that land on
    /// their old index. Per-operation semantics preserve the caller's intent
    /// where a plain diff could not distinguish a move from a
    /// delete-plus-create of an equal value.
    pub fn reverse(&self) -> Result<(), ObserveError> {
        self.reorder(|data| data.reverse())
    }

    /// Sort into ascending order. Same event pattern as
    /// [`reverse`](Self::reverse).
    pub fn sort(&self) -> Result<(), ObserveError>
    where
        T: Ord,
    {
        self.reorder(|data| data.sort())
    }

    /// Sort with a comparator. Same event pattern as
    /// [`reverse`](Self::reverse).
    pub fn sort_by<F>(&self, compare: F) -> Result<(), ObserveError>
    where
        F: FnMut(&T, &T) -> std::cmp::Ordering,
    {
        self.reorder(|data| data.sort_by(compare))
    }

    fn reorder(&self, op: impl FnOnce(&mut Vec<T>)) -> Result<(), ObserveError> {
        self.inner.mutate(move |data, tracked| {
            let before = (tracked && !data.is_empty()).then(|| data.clone());
            op(data);
            let mut changes = Vec::new();
            if let Some(before) = before {
                for (index, value) in before.iter().enumerate().rev() {
                    changes.push(Change::Deleted {
                        index,
                        value: value.clone(),
                    });
                }
                for (index, value) in data.iter().enumerate() {
                    changes.push(Change::Created {
                        index,
                        value: value.clone(),
                    });
                }
            }
            ((), changes)
        })
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Diff the stored snapshot against live contents and fire the resulting
    /// events ([`diff`](crate::detect::diff) ordering: indices descending),
    /// then advance the snapshot. Returns whether any events fired.
    ///
    /// Before the first bind this is a no-op: there is no subscriber baseline
    /// to reconcile against.
    pub fn reconcile(&self) -> Result<bool, ObserveError> {
        self.inner.reconcile()
    }
}

impl<T: Clone + PartialEq + Send + 'static> ObservableVec<T> {
    pub(crate) fn tracked_handle(&self) -> Arc<dyn Tracked> {
        self.inner.clone()
    }
}

impl<T: 'static> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> From<Vec<T>> for ObservableVec<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

impl<T: 'static> FromIterator<T> for ObservableVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ObservableVec")
            .field("id", &self.inner.id)
            .field("data", &state.data)
            .field("subscribers", &state.subscribers.total())
            .finish()
    }
}

fn resolve_range<R: RangeBounds<usize>>(range: &R, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s + 1,
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e + 1,
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    assert!(
        start <= end && end <= len,
        "splice range {}..{} out of bounds for length {}",
        start,
        end,
        len
    );
    (start, end)
}
