#![deny(missing_docs)]

//! Change-Flow: observable ordered collections with snapshot-based change
//! detection.
//!
//! Wrap a `Vec` in an [`ObservableVec`] and subscribe to structural changes:
//! element creation, deletion, and in-place update, plus a `generic`
//! any-change event, without rewriting the mutator operations by hand. Every
//! intercepted mutator fires the exact semantic events for that operation;
//! mutations that bypass interception (through
//! [`with_untracked`](ObservableVec::with_untracked)) are detected by a
//! snapshot diff, either on demand or by the [`ObserveRuntime`]'s polling
//! scheduler.
//!
//! # Key Features
//!
//! - **Operation-exact notifications**: a range splice fires deletes
//!   (descending index order) then creates (ascending); a sort fires a
//!   delete for every prior index then a create for every new one. A plain
//!   diff cannot distinguish "this value moved" from "deleted here, created
//!   there", so per-operation semantics preserve the caller's intent.
//! - **Reconciliation fallback**: out-of-band mutations are picked up by
//!   [`diff`] against the last snapshot, no later than one poll interval
//!   after they happen, and flushed eagerly before the next intercepted
//!   mutator runs.
//! - **Catch-up on subscription**: a new `create` subscriber is called once
//!   per existing element, so late subscribers see current content as if it
//!   had just been created; a new `generic` subscriber immediately sees the
//!   current state.
//! - **Explicit runtime**: the scheduler and the tracked-collection table
//!   live on a caller-owned [`ObserveRuntime`], not in process-wide state;
//!   dropping the runtime cancels its scheduler.
//!
//! # Example
//!
//! ```
//! use change_flow::{ObservableVec, ObserveRuntime};
//!
//! let runtime = ObserveRuntime::new();
//! let items = ObservableVec::from_vec(vec![0, 1, 2]);
//!
//! // Catch-up: called once per existing element, then once per creation.
//! runtime.observe_create(&items, |item, index| {
//!     println!("created {} at {}", item, index);
//!     Ok(())
//! })?;
//!
//! items.push(3)?;
//!
//! // Out-of-band writes are found by reconciliation.
//! items.with_untracked(|data| data[0] = 9);
//! runtime.reconcile_all()?;
//!
//! runtime.unobserve_all();
//! # Ok::<(), change_flow::ObserveError>(())
//! ```
//!
//! # Concurrency
//!
//! Each notification pass is computed atomically under the collection's state
//! lock and delivered after the lock is released, carrying owned values.
//! Subscriber callbacks may therefore bind, unbind, observe, unobserve, read,
//! and write via `with_untracked`, including on the collection currently
//! being delivered. A callback must not call an intercepted mutator on its
//! own collection (the nested pass would re-enter the running callback);
//! write untracked and let reconciliation report it instead.
//!
//! # Errors
//!
//! Subscriber callbacks return `Result<(), anyhow::Error>`, so `?` works on
//! any error inside them. Delivery is not isolating: the first failing
//! subscriber aborts the rest of its pass, and the error surfaces as an
//! [`ObserveError`] from the mutator or reconcile call that triggered it.
//! Collection state is finalized before delivery, so an aborted pass is
//! never repeated.

mod change;
pub mod detect;
mod error;
mod log;
mod registry;
mod scheduler;
mod subscriber;
mod tracked;

pub use change::{Change, EventKind};
pub use detect::diff;
pub use error::ObserveError;
pub use registry::{ObserveRuntime, ObserveRuntimeBuilder, DEFAULT_POLL_INTERVAL};
pub use subscriber::{SubscriberResult, SubscriptionId};
pub use tracked::{CollectionId, ObservableVec};
