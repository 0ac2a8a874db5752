//! The observation runtime: the tracked-collection table, subscription
//! addressing, and ownership of the reconciliation scheduler.
//!
//! [`ObserveRuntime`] is an explicit context object: construct one, observe
//! collections through it, drop it (or call
//! [`unobserve_all`](ObserveRuntime::unobserve_all)) to tear everything down.
//! There is no process-wide state; independent runtimes poll independently.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::change::EventKind;
use crate::error::ObserveError;
use crate::log::{flow_debug, flow_warn};
use crate::scheduler::{self, SchedulerHandle};
use crate::subscriber::{SubscriberResult, SubscriptionId};
use crate::tracked::{CollectionId, ObservableVec, Tracked};

/// Default interval of the reconciliation scheduler: a low-latency /
/// low-overhead compromise for a polling fallback.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The observation runtime.
///
/// Cheap to clone - all state is behind `Arc`, and clones share one table and
/// one scheduler. The scheduler runs only while at least one collection is
/// tracked: the first `observe_*` call starts it, emptying the table stops
/// it, and dropping the last runtime clone cancels it.
///
/// # Example
///
/// ```
/// use change_flow::{ObservableVec, ObserveRuntime};
///
/// let runtime = ObserveRuntime::new();
/// let items = ObservableVec::from_vec(vec!["a", "b"]);
///
/// runtime.observe(&items, |new_state, old_state| {
///     assert!(new_state.len() >= old_state.len());
///     Ok(())
/// })?;
///
/// items.push("c")?;
/// runtime.unobserve_all();
/// # Ok::<(), change_flow::ObserveError>(())
/// ```
#[derive(Clone)]
pub struct ObserveRuntime {
    shared: Arc<Shared>,
}

struct Shared {
    /// Tracked collections in registration order; at most one entry per
    /// collection identity. Reconciliation visits entries in this order.
    table: Mutex<Vec<Entry>>,
    scheduler: Mutex<Option<SchedulerHandle>>,
    poll_interval: Duration,
}

struct Entry {
    id: CollectionId,
    collection: Arc<dyn Tracked>,
}

impl Shared {
    /// One scheduler tick: reconcile every tracked collection in registration
    /// order. A subscriber error aborts the remainder of this tick (there is
    /// no caller to surface it to); the next tick starts over.
    fn tick(&self) {
        let collections: Vec<Arc<dyn Tracked>> =
            self.table.lock().iter().map(|e| e.collection.clone()).collect();
        for collection in collections {
            if let Err(err) = collection.reconcile_tracked() {
                flow_warn!("scheduler tick aborted by subscriber error: {}", err);
                break;
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.get_mut().take() {
            handle.cancel();
        }
    }
}

impl Default for ObserveRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserveRuntime {
    /// Create a runtime with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for customizing the runtime.
    pub fn builder() -> ObserveRuntimeBuilder {
        ObserveRuntimeBuilder::new()
    }

    // ------------------------------------------------------------------
    // Observe
    // ------------------------------------------------------------------

    /// Subscribe a generic callback (the default kind) to `subject`.
    ///
    /// Delegates to [`ObservableVec::bind_generic`] (including its catch-up
    /// call), tracks the collection for periodic reconciliation, and ensures
    /// the scheduler is running.
    pub fn observe<T, F>(
        &self,
        subject: &ObservableVec<T>,
        callback: F,
    ) -> Result<SubscriptionId, ObserveError>
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnMut(&[T], &[T]) -> SubscriberResult + Send + 'static,
    {
        let id = subject.bind_generic(callback)?;
        self.track(subject);
        Ok(id)
    }

    /// Subscribe a create callback to `subject`, with the per-element
    /// catch-up of [`ObservableVec::bind_create`].
    pub fn observe_create<T, F>(
        &self,
        subject: &ObservableVec<T>,
        callback: F,
    ) -> Result<SubscriptionId, ObserveError>
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnMut(&T, usize) -> SubscriberResult + Send + 'static,
    {
        let id = subject.bind_create(callback)?;
        self.track(subject);
        Ok(id)
    }

    /// Subscribe an update callback to `subject`. No catch-up call.
    pub fn observe_update<T, F>(&self, subject: &ObservableVec<T>, callback: F) -> SubscriptionId
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnMut(&T, &T, usize) -> SubscriberResult + Send + 'static,
    {
        let id = subject.bind_update(callback);
        self.track(subject);
        id
    }

    /// Subscribe a delete callback to `subject`. No catch-up call.
    pub fn observe_delete<T, F>(&self, subject: &ObservableVec<T>, callback: F) -> SubscriptionId
    where
        T: Clone + PartialEq + Send + 'static,
        F: FnMut(&T, usize) -> SubscriberResult + Send + 'static,
    {
        let id = subject.bind_delete(callback);
        self.track(subject);
        id
    }

    // ------------------------------------------------------------------
    // Unobserve
    // ------------------------------------------------------------------

    /// Remove every subscription on `subject` and stop tracking it. No-op
    /// (beyond the unbind) for collections this runtime never tracked.
    pub fn unobserve<T: 'static>(&self, subject: &ObservableVec<T>) {
        subject.unbind_all();
        self.untrack(subject.id());
    }

    /// Remove every subscription of one kind on `subject`; stops tracking the
    /// collection when no subscriptions remain.
    pub fn unobserve_kind<T: 'static>(&self, subject: &ObservableVec<T>, kind: EventKind) {
        subject.unbind_kind(kind);
        self.prune(subject);
    }

    /// Remove one subscription on `subject`; stops tracking the collection
    /// when no subscriptions remain. Returns `false` for unknown ids.
    pub fn unobserve_subscription<T: 'static>(
        &self,
        subject: &ObservableVec<T>,
        id: SubscriptionId,
    ) -> bool {
        let removed = subject.unbind(id);
        self.prune(subject);
        removed
    }

    /// Tear down everything: clear every tracked collection's subscribers,
    /// empty the table, and stop the scheduler.
    pub fn unobserve_all(&self) {
        let entries: Vec<Entry> = std::mem::take(&mut *self.shared.table.lock());
        flow_debug!("unobserving all ({} collection(s))", entries.len());
        for entry in &entries {
            entry.collection.clear_all_subscribers();
        }
        self.stop_scheduler();
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Force one reconciliation pass over every tracked collection, in
    /// registration order. The scheduler does exactly this on its own every
    /// poll interval; call it directly for deterministic tests or cooperative
    /// (timer-less) embedding.
    ///
    /// A subscriber error aborts the remaining collections of this pass and
    /// surfaces to the caller.
    pub fn reconcile_all(&self) -> Result<(), ObserveError> {
        let collections: Vec<Arc<dyn Tracked>> = {
            let table = self.shared.table.lock();
            table.iter().map(|e| e.collection.clone()).collect()
        };
        for collection in collections {
            collection.reconcile_tracked()?;
        }
        Ok(())
    }

    /// Number of currently tracked collections.
    pub fn tracked_count(&self) -> usize {
        self.shared.table.lock().len()
    }

    /// Whether the polling scheduler is currently running.
    pub fn is_scheduler_running(&self) -> bool {
        self.shared.scheduler.lock().is_some()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn track<T: Clone + PartialEq + Send + 'static>(&self, subject: &ObservableVec<T>) {
        {
            let mut table = self.shared.table.lock();
            if !table.iter().any(|e| e.id == subject.id()) {
                flow_debug!("tracking collection {:?}", subject.id());
                table.push(Entry {
                    id: subject.id(),
                    collection: subject.tracked_handle(),
                });
            }
        }
        self.ensure_scheduler();
    }

    fn untrack(&self, id: CollectionId) {
        let emptied = {
            let mut table = self.shared.table.lock();
            let before = table.len();
            table.retain(|e| e.id != id);
            if table.len() != before {
                flow_debug!("untracking collection {:?}", id);
            }
            table.is_empty()
        };
        if emptied {
            self.stop_scheduler();
        }
    }

    fn prune<T: 'static>(&self, subject: &ObservableVec<T>) {
        if subject.subscriber_count() == 0 {
            self.untrack(subject.id());
        }
    }

    fn ensure_scheduler(&self) {
        let mut slot = self.shared.scheduler.lock();
        if slot.is_none() {
            let weak = Arc::downgrade(&self.shared);
            *slot = Some(scheduler::spawn(self.shared.poll_interval, weak, Shared::tick));
        }
    }

    fn stop_scheduler(&self) {
        if let Some(handle) = self.shared.scheduler.lock().take() {
            handle.cancel();
        }
    }
}

/// Builder for [`ObserveRuntime`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use change_flow::ObserveRuntime;
///
/// let runtime = ObserveRuntime::builder()
///     .poll_interval(Duration::from_millis(50))
///     .build();
/// assert!(!runtime.is_scheduler_running());
/// ```
pub struct ObserveRuntimeBuilder {
    poll_interval: Duration,
}

impl Default for ObserveRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserveRuntimeBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the scheduler's polling interval. Untracked mutations are detected
    /// no later than one interval after they happen.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Build the runtime with the configured settings.
    pub fn build(self) -> ObserveRuntime {
        ObserveRuntime {
            shared: Arc::new(Shared {
                table: Mutex::new(Vec::new()),
                scheduler: Mutex::new(None),
                poll_interval: self.poll_interval,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_is_deduplicated_per_identity() {
        let runtime = ObserveRuntime::new();
        let vec = ObservableVec::from_vec(vec![1]);
        runtime.observe(&vec, |_, _| Ok(())).unwrap();
        runtime.observe_create(&vec.clone(), |_, _| Ok(())).unwrap();
        assert_eq!(runtime.tracked_count(), 1);

        let other = ObservableVec::from_vec(vec![1]);
        runtime.observe_delete(&other, |_, _| Ok(()));
        assert_eq!(runtime.tracked_count(), 2);
        runtime.unobserve_all();
    }

    #[test]
    fn scheduler_runs_only_while_collections_are_tracked() {
        let runtime = ObserveRuntime::new();
        assert!(!runtime.is_scheduler_running());

        let vec = ObservableVec::from_vec(vec![1]);
        runtime.observe(&vec, |_, _| Ok(())).unwrap();
        assert!(runtime.is_scheduler_running());

        runtime.unobserve(&vec);
        assert_eq!(runtime.tracked_count(), 0);
        assert!(!runtime.is_scheduler_running());

        // The next observe restarts it.
        runtime.observe(&vec, |_, _| Ok(())).unwrap();
        assert!(runtime.is_scheduler_running());
        runtime.unobserve_all();
        assert!(!runtime.is_scheduler_running());
    }

    #[test]
    fn prune_keeps_collections_with_remaining_subscriptions() {
        let runtime = ObserveRuntime::new();
        let vec = ObservableVec::from_vec(vec![1]);
        let generic = runtime.observe(&vec, |_, _| Ok(())).unwrap();
        runtime.observe_delete(&vec, |_, _| Ok(()));

        assert!(runtime.unobserve_subscription(&vec, generic));
        assert_eq!(runtime.tracked_count(), 1, "delete subscription remains");

        runtime.unobserve_kind(&vec, EventKind::Delete);
        assert_eq!(runtime.tracked_count(), 0);
        assert!(!runtime.is_scheduler_running());
    }

    #[test]
    fn reconcile_all_visits_collections_in_registration_order() {
        // A far-off interval keeps the background scheduler out of the way;
        // the pass under test is the manual one.
        let runtime = ObserveRuntime::builder()
            .poll_interval(Duration::from_secs(3600))
            .build();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = ObservableVec::from_vec(vec![0]);
        let second = ObservableVec::from_vec(vec![0]);
        for (tag, vec) in [(1, &first), (2, &second)] {
            let order = order.clone();
            runtime.observe_update(vec, move |_, _, _| {
                order.lock().push(tag);
                Ok(())
            });
        }

        first.with_untracked(|data| data[0] = 9);
        second.with_untracked(|data| data[0] = 9);
        runtime.reconcile_all().unwrap();
        assert_eq!(*order.lock(), vec![1, 2]);
        runtime.unobserve_all();
    }
}
