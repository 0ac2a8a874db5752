//! The repeating reconciliation timer.
//!
//! One background thread per running scheduler. Each interval it upgrades a
//! `Weak` reference to the runtime's shared state and runs one tick; it exits
//! when cancelled or when the runtime is gone. Cancellation is signal-based
//! (no join), so it is safe to stop the scheduler from inside a subscriber
//! callback that the scheduler itself is currently delivering.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::log::flow_debug;

struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }

    /// Sleep for one interval, waking early on cancellation. Returns whether
    /// the scheduler was cancelled.
    fn wait(&self, interval: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if *stopped {
            return true;
        }
        let _ = self.condvar.wait_for(&mut stopped, interval);
        *stopped
    }
}

/// Cancellable handle to a running scheduler thread. Dropping the handle
/// cancels the thread; it exits by the end of its current wait.
pub(crate) struct SchedulerHandle {
    stop: Arc<StopSignal>,
}

impl SchedulerHandle {
    pub fn cancel(&self) {
        self.stop.stop();
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// Spawn a scheduler thread calling `tick(&shared)` every `interval`.
pub(crate) fn spawn<S, F>(interval: Duration, shared: Weak<S>, tick: F) -> SchedulerHandle
where
    S: Send + Sync + 'static,
    F: Fn(&S) + Send + 'static,
{
    let stop = Arc::new(StopSignal::new());
    let thread_stop = stop.clone();
    // The thread is detached; it exits on cancellation or a dead Weak.
    let _ = thread::Builder::new()
        .name("change-flow-reconcile".into())
        .spawn(move || {
            flow_debug!("reconciliation scheduler started (interval {:?})", interval);
            loop {
                if thread_stop.wait(interval) {
                    break;
                }
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                tick(&shared);
            }
            flow_debug!("reconciliation scheduler stopped");
        })
        .expect("failed to spawn change-flow scheduler thread");
    SchedulerHandle { stop }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn ticks_repeatedly_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let handle = spawn(Duration::from_millis(5), Arc::downgrade(&ticks), |t| {
            t.fetch_add(1, Ordering::SeqCst);
        });

        let deadline = Instant::now() + Duration::from_secs(2);
        while ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(ticks.load(Ordering::SeqCst) >= 3);

        handle.cancel();
        thread::sleep(Duration::from_millis(50));
        let after_cancel = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn exits_once_the_shared_state_is_gone() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let _handle = spawn(Duration::from_millis(5), Arc::downgrade(&ticks), |t| {
            t.fetch_add(1, Ordering::SeqCst);
        });

        drop(ticks);
        // Nothing to assert beyond "does not crash"; the thread notices the
        // dead Weak on its next wake and exits.
        thread::sleep(Duration::from_millis(30));
    }
}
