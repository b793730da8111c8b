//! Chainable one-shot promises driven by a cooperative microtask queue.
//!
//! A [`Promise`] settles exactly once, to either a value or a rejection
//! reason, and every continuation registered on it runs from a [`TaskQueue`]
//! drain rather than inline. Continuations chain: `then`, `catch` and
//! `finally` each return a fresh promise settled by their handler's
//! [`Resolution`], and [`all`] waits on a whole sequence at once.
//!
//! # Examples
//!
//! ```
//! use promise_chain::{Promise, Resolution, TaskQueue};
//! use std::sync::{Arc, Mutex};
//!
//! let queue = TaskQueue::new();
//! let seen = Arc::new(Mutex::new(None));
//! let record = Arc::clone(&seen);
//!
//! let triple: Promise<i32, String> = Promise::resolve(&queue, 3);
//! triple
//!     .then(|v| Resolution::Value(v * 4))
//!     .then(move |v| {
//!         *record.lock().unwrap() = Some(v);
//!         Resolution::Value(v)
//!     });
//!
//! // Nothing has run yet; handlers only fire when the queue drains.
//! assert_eq!(*seen.lock().unwrap(), None);
//! queue.run_until_idle();
//! assert_eq!(*seen.lock().unwrap(), Some(12));
//! ```
//!
//! Promises are also plain futures: awaiting one yields
//! `Result<T, Error<E>>` once some drain settles it.

use thiserror::Error;

pub mod join;
pub mod promise;
pub mod queue;

pub use join::all;
pub use promise::{Promise, Rejecter, Resolution, Resolver};
pub use queue::TaskQueue;

/// What awaiting a [`Promise`] can fail with.
///
/// Rejection reasons pass through opaque and unwrapped; `Dropped` means
/// both settlement capabilities died unconsumed, so the promise can never
/// settle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error<E> {
    #[error("promise was rejected")]
    Rejected(E),
    #[error("promise dropped before settlement")]
    Dropped,
}
