//! One-shot promises with deferred settlement and chainable continuations.
//!
//! A [`Promise`] is a cloneable handle to a value that is not known yet.
//! Whoever constructs it receives two single-use settlement capabilities, a
//! [`Resolver`] and a [`Rejecter`]; invoking either one commits the promise
//! to exactly one outcome. Observers register continuations with
//! [`Promise::then`], [`Promise::catch`] and [`Promise::finally`], each of
//! which returns a fresh derived promise settled by the handler's
//! [`Resolution`].
//!
//! Nothing here runs inline: every settlement side effect and every handler
//! invocation is pushed onto the promise's [`TaskQueue`] and runs only when
//! the queue is drained. Registration calls therefore always return before
//! their handlers can fire, even on a promise that has already settled.

use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use crate::queue::TaskQueue;
use crate::Error;

/// The three-state settlement lifecycle. Written at most once.
enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

/// A queued continuation, closing over the derived promise it settles.
type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>) + Send + 'static>;

struct Inner<T, E> {
    state: State<T, E>,
    /// Continuations registered while pending. Drained exactly once, at
    /// settlement, in registration order.
    reactions: Vec<Reaction<T, E>>,
    /// Wakers parked by the `Future` impl. Several clones may wait, so
    /// every registered waker is kept and woken.
    wakers: Vec<Waker>,
    /// A settlement has been committed (scheduled on the queue, or this
    /// promise is following another one). Distinguishes "will settle" from
    /// "can never settle" when the capability handles are dropped.
    settling: bool,
    /// Both capability handles died unconsumed while pending.
    abandoned: bool,
}

impl<T, E> Inner<T, E> {
    fn new() -> Self {
        Self {
            state: State::Pending,
            reactions: Vec::new(),
            wakers: Vec::new(),
            settling: false,
            abandoned: false,
        }
    }
}

type Shared<T, E> = Arc<Mutex<Inner<T, E>>>;

/// What a continuation hands back to settle its derived promise.
///
/// `Value` fulfills, `Error` rejects (the analogue of throwing from a
/// handler), and `Chain` makes the derived promise follow another promise's
/// eventual outcome instead of wrapping it. The `Chain` check is what makes
/// resolution with a promise-valued result flatten, transitively.
pub enum Resolution<T, E> {
    Value(T),
    Error(E),
    Chain(Promise<T, E>),
}

impl<T, E> From<Result<T, E>> for Resolution<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Resolution::Value(value),
            Err(reason) => Resolution::Error(reason),
        }
    }
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Chain(promise)
    }
}

/// A one-shot container for a value that becomes available later.
///
/// Clones share the same settlement state. Any number of continuations may
/// be registered on one promise; each produces its own derived promise and
/// observes the same outcome independently.
pub struct Promise<T, E> {
    inner: Shared<T, E>,
    queue: TaskQueue,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            queue: self.queue.clone(),
        }
    }
}

/// Schedules the one-time pending → settled transition onto the queue.
///
/// The transition re-checks `Pending` inside the queued task, so competing
/// settlement attempts are no-ops: whichever task runs first wins.
/// Reactions and wakers are drained under the lock but invoked after it is
/// released, since a reaction may re-enter this promise (a handler is free
/// to call `then` on a promise that just settled).
fn schedule_settle<T, E>(inner: &Shared<T, E>, queue: &TaskQueue, outcome: Result<T, E>)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    inner.lock().unwrap().settling = true;
    let inner = Arc::clone(inner);
    queue.enqueue(move || {
        let mut guard = inner.lock().unwrap();
        if !matches!(guard.state, State::Pending) {
            return;
        }
        guard.state = match &outcome {
            Ok(value) => State::Fulfilled(value.clone()),
            Err(reason) => State::Rejected(reason.clone()),
        };
        let reactions = mem::take(&mut guard.reactions);
        let wakers = mem::take(&mut guard.wakers);
        drop(guard);
        for reaction in reactions {
            reaction(outcome.clone());
        }
        for waker in wakers {
            waker.wake();
        }
    });
}

/// Applies a handler's [`Resolution`] to a promise's shared state.
///
/// `Chain` subscribes the target to the inner promise instead of settling
/// it directly; the inner promise's own settlements went through this same
/// function, which is what makes flattening hold at any depth.
fn apply<T, E>(target: &Shared<T, E>, queue: &TaskQueue, resolution: Resolution<T, E>)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    match resolution {
        Resolution::Value(value) => schedule_settle(target, queue, Ok(value)),
        Resolution::Error(reason) => schedule_settle(target, queue, Err(reason)),
        Resolution::Chain(chained) => {
            target.lock().unwrap().settling = true;
            let target = Arc::clone(target);
            let queue = queue.clone();
            chained.register(move |outcome| schedule_settle(&target, &queue, outcome));
        }
    }
}

/// Wakes waiters when the last capability handle dies without settling.
///
/// Shared by the `Resolver`/`Rejecter` pair; a consumed handle has already
/// marked the promise as settling, so only a genuinely unconsumed pair
/// flags the promise as abandoned.
struct DropGuard<T, E> {
    inner: Shared<T, E>,
}

impl<T, E> Drop for DropGuard<T, E> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, State::Pending) && !inner.settling {
            inner.abandoned = true;
            let wakers = mem::take(&mut inner.wakers);
            drop(inner);
            for waker in wakers {
                waker.wake();
            }
        }
    }
}

/// Single-use capability to fulfill a promise. Consumed by value.
pub struct Resolver<T, E> {
    inner: Shared<T, E>,
    queue: TaskQueue,
    _guard: Arc<DropGuard<T, E>>,
}

/// Single-use capability to reject a promise. Consumed by value.
pub struct Rejecter<T, E> {
    inner: Shared<T, E>,
    queue: TaskQueue,
    _guard: Arc<DropGuard<T, E>>,
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Fulfills the promise with `value`, unless a settlement already won.
    pub fn resolve(self, value: T) {
        schedule_settle(&self.inner, &self.queue, Ok(value));
    }

    /// Settles the promise with a full [`Resolution`], so resolving with
    /// another promise follows that promise's outcome.
    pub fn complete(self, resolution: Resolution<T, E>) {
        apply(&self.inner, &self.queue, resolution);
    }
}

impl<T, E> Rejecter<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Rejects the promise with `reason`, unless a settlement already won.
    pub fn reject(self, reason: E) {
        schedule_settle(&self.inner, &self.queue, Err(reason));
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn pending_on(queue: &TaskQueue) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new())),
            queue: queue.clone(),
        }
    }

    /// Creates a promise and hands its settlement capabilities to
    /// `executor`, which runs synchronously exactly once.
    ///
    /// The capabilities may be invoked right away or carried off to any
    /// other context. Returning `Err` from the executor is treated as a
    /// rejection attempt, so construction never loses a failure; it is a
    /// no-op if a capability already fired.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_chain::{Promise, TaskQueue};
    /// use futures::executor::block_on;
    ///
    /// let queue = TaskQueue::new();
    /// let promise: Promise<&str, &str> = Promise::new(&queue, |resolver, _rejecter| {
    ///     resolver.resolve("ready");
    ///     Ok(())
    /// });
    /// queue.run_until_idle();
    /// assert_eq!(block_on(promise), Ok("ready"));
    /// ```
    pub fn new<X>(queue: &TaskQueue, executor: X) -> Self
    where
        X: FnOnce(Resolver<T, E>, Rejecter<T, E>) -> Result<(), E>,
    {
        let promise = Self::pending_on(queue);
        let guard = Arc::new(DropGuard {
            inner: Arc::clone(&promise.inner),
        });
        let resolver = Resolver {
            inner: Arc::clone(&promise.inner),
            queue: queue.clone(),
            _guard: Arc::clone(&guard),
        };
        let rejecter = Rejecter {
            inner: Arc::clone(&promise.inner),
            queue: queue.clone(),
            _guard: guard,
        };
        if let Err(reason) = executor(resolver, rejecter) {
            schedule_settle(&promise.inner, &promise.queue, Err(reason));
        }
        promise
    }

    /// A promise already committed to fulfilling with `value`. Settlement
    /// is still deferred through the queue.
    pub fn resolve(queue: &TaskQueue, value: T) -> Self {
        let promise = Self::pending_on(queue);
        schedule_settle(&promise.inner, &promise.queue, Ok(value));
        promise
    }

    /// The flattening form of [`Promise::resolve`]: a `Chain` resolution
    /// follows the inner promise instead of wrapping it.
    pub fn resolve_with(queue: &TaskQueue, resolution: Resolution<T, E>) -> Self {
        let promise = Self::pending_on(queue);
        apply(&promise.inner, &promise.queue, resolution);
        promise
    }

    /// A promise already committed to rejecting with `reason`.
    pub fn reject(queue: &TaskQueue, reason: E) -> Self {
        let promise = Self::pending_on(queue);
        schedule_settle(&promise.inner, &promise.queue, Err(reason));
        promise
    }

    /// Registers a raw continuation: queued while pending, or scheduled
    /// directly when already settled (never invoked inline).
    pub(crate) fn register<F>(&self, reaction: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        match &inner.state {
            State::Pending => inner.reactions.push(Box::new(reaction)),
            State::Fulfilled(value) => {
                let outcome = Ok(value.clone());
                drop(inner);
                self.queue.enqueue(move || reaction(outcome));
            }
            State::Rejected(reason) => {
                let outcome = Err(reason.clone());
                drop(inner);
                self.queue.enqueue(move || reaction(outcome));
            }
        }
    }

    /// Settlement entry point for combinators in this crate.
    pub(crate) fn settle(&self, outcome: Result<T, E>) {
        schedule_settle(&self.inner, &self.queue, outcome);
    }

    /// Whether the promise has left the pending state.
    pub fn is_settled(&self) -> bool {
        !matches!(self.inner.lock().unwrap().state, State::Pending)
    }

    /// Registers `on_fulfilled` and returns the derived promise it settles.
    ///
    /// On fulfillment the handler's [`Resolution`] decides the derived
    /// promise's outcome. On rejection the reason propagates to the derived
    /// promise unchanged; pass-through preserves rejection.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Resolution<U, E> + Send + 'static,
    {
        let derived = Promise::pending_on(&self.queue);
        let target = Arc::clone(&derived.inner);
        let queue = self.queue.clone();
        self.register(move |outcome| {
            let resolution = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => Resolution::Error(reason),
            };
            apply(&target, &queue, resolution);
        });
        derived
    }

    /// [`Promise::then`] with both continuation arms: whichever side the
    /// promise settles on, that handler's [`Resolution`] settles the
    /// derived promise.
    pub fn then_or_else<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Resolution<U, E> + Send + 'static,
        R: FnOnce(E) -> Resolution<U, E> + Send + 'static,
    {
        let derived = Promise::pending_on(&self.queue);
        let target = Arc::clone(&derived.inner);
        let queue = self.queue.clone();
        self.register(move |outcome| {
            let resolution = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            };
            apply(&target, &queue, resolution);
        });
        derived
    }

    /// Registers `on_rejected` only; fulfillment passes through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Resolution<T, E> + Send + 'static,
    {
        let derived = Promise::pending_on(&self.queue);
        let target = Arc::clone(&derived.inner);
        let queue = self.queue.clone();
        self.register(move |outcome| {
            let resolution = match outcome {
                Ok(value) => Resolution::Value(value),
                Err(reason) => on_rejected(reason),
            };
            apply(&target, &queue, resolution);
        });
        derived
    }

    /// Runs `on_finally` on either outcome, without observing it, then
    /// re-propagates the original outcome once the handler's own
    /// [`Resolution`] fulfills. If that resolution rejects, the new
    /// rejection overrides the original outcome.
    pub fn finally<F>(&self, on_finally: F) -> Promise<T, E>
    where
        F: FnOnce() -> Resolution<(), E> + Send + 'static,
    {
        let derived = Promise::pending_on(&self.queue);
        let target = Arc::clone(&derived.inner);
        let queue = self.queue.clone();
        self.register(move |outcome| {
            let after = Promise::resolve_with(&queue, on_finally());
            let resolution = match outcome {
                Ok(value) => Resolution::Chain(after.then(move |()| Resolution::Value(value))),
                Err(reason) => Resolution::Chain(after.then(move |()| Resolution::Error(reason))),
            };
            apply(&target, &queue, resolution);
        });
        derived
    }
}

impl<T, E> Future for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = Result<T, Error<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.lock().unwrap();
        match &inner.state {
            State::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(reason) => Poll::Ready(Err(Error::Rejected(reason.clone()))),
            State::Pending if inner.abandoned => Poll::Ready(Err(Error::Dropped)),
            State::Pending => {
                inner.wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        let state = match inner.state {
            State::Pending if inner.abandoned => "abandoned",
            State::Pending => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Rejected(_) => "rejected",
        };
        f.debug_struct("Promise")
            .field("state", &state)
            .field("reactions", &inner.reactions.len())
            .finish()
    }
}
