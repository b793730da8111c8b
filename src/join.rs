//! Aggregate combinator: wait for every promise in a sequence.
//!
//! [`all`] fulfills with the values in **input order**, no matter which
//! input settles first, and rejects with the reason of the **first input to
//! settle rejected**, no matter its position. Settlements arriving after
//! the aggregate has settled are observed but change nothing.

use std::sync::{Arc, Mutex};

use crate::promise::Promise;
use crate::queue::TaskQueue;

/// One slot per input, filled as fulfillments arrive.
struct Gather<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
}

impl<T> Gather<T> {
    /// Records a fulfillment; true once every slot is filled.
    fn record(&mut self, index: usize, value: T) -> bool {
        self.slots[index] = Some(value);
        self.remaining -= 1;
        self.remaining == 0
    }

    fn take(&mut self) -> Vec<T> {
        self.slots.drain(..).flatten().collect()
    }
}

/// Returns a promise over the ordered results of every input promise.
///
/// An empty input fulfills with an empty vec. Plain values join the wait by
/// wrapping them with [`Promise::resolve`] first.
///
/// # Examples
///
/// ```
/// use promise_chain::{all, Promise, TaskQueue};
/// use futures::executor::block_on;
///
/// let queue = TaskQueue::new();
/// let parts: Vec<Promise<i32, &str>> = vec![
///     Promise::resolve(&queue, 2),
///     Promise::resolve(&queue, 3),
/// ];
/// let combined = all(&queue, parts);
/// queue.run_until_idle();
/// assert_eq!(block_on(combined), Ok(vec![2, 3]));
/// ```
pub fn all<T, E, I>(queue: &TaskQueue, promises: I) -> Promise<Vec<T>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let promises: Vec<Promise<T, E>> = promises.into_iter().collect();
    if promises.is_empty() {
        return Promise::resolve(queue, Vec::new());
    }

    let aggregate = Promise::pending_on(queue);
    let gather = Arc::new(Mutex::new(Gather {
        slots: vec![None; promises.len()],
        remaining: promises.len(),
    }));

    for (index, promise) in promises.iter().enumerate() {
        let gather = Arc::clone(&gather);
        let aggregate = aggregate.clone();
        promise.register(move |outcome| match outcome {
            Ok(value) => {
                let mut gather = gather.lock().unwrap();
                if gather.record(index, value) {
                    let values = gather.take();
                    drop(gather);
                    aggregate.settle(Ok(values));
                }
            }
            // First rejection to be scheduled wins; the aggregate's own
            // settled re-check turns every later attempt into a no-op.
            Err(reason) => aggregate.settle(Err(reason)),
        });
    }

    aggregate
}

#[cfg(test)]
mod tests {
    use super::all;
    use crate::promise::{Promise, Rejecter, Resolver};
    use crate::queue::TaskQueue;
    use crate::Error;
    use futures::executor::block_on;

    fn deferred<T, E>(queue: &TaskQueue) -> (Promise<T, E>, Resolver<T, E>, Rejecter<T, E>)
    where
        T: Clone + Send + 'static,
        E: Clone + Send + 'static,
    {
        let mut handles = None;
        let promise = Promise::new(queue, |resolver, rejecter| {
            handles = Some((resolver, rejecter));
            Ok(())
        });
        let (resolver, rejecter) = handles.expect("executor ran synchronously");
        (promise, resolver, rejecter)
    }

    #[test]
    fn empty_input_fulfills_with_empty_vec() {
        let queue = TaskQueue::new();
        let combined = all(&queue, Vec::<Promise<i32, &str>>::new());
        queue.run_until_idle();
        assert_eq!(block_on(combined), Ok(Vec::new()));
    }

    #[test]
    fn preserves_input_order_regardless_of_completion_order() {
        let queue = TaskQueue::new();
        let (first, resolve_first, _reject_first) = deferred::<i32, &str>(&queue);
        let (second, resolve_second, _reject_second) = deferred::<i32, &str>(&queue);

        let combined = all(&queue, [first, second]);
        resolve_second.resolve(3);
        resolve_first.resolve(2);
        queue.run_until_idle();
        assert_eq!(block_on(combined), Ok(vec![2, 3]));
    }

    #[test]
    fn first_settled_rejection_wins() {
        let queue = TaskQueue::new();
        let (first, _resolve_first, reject_first) = deferred::<i32, i32>(&queue);
        let (second, _resolve_second, reject_second) = deferred::<i32, i32>(&queue);

        let combined = all(&queue, [first, second]);
        reject_second.reject(3);
        reject_first.reject(2);
        queue.run_until_idle();
        assert_eq!(block_on(combined), Err(Error::Rejected(3)));
    }

    #[test]
    fn rejection_at_index_zero_wins_when_settled_first() {
        let queue = TaskQueue::new();
        let (first, _resolve_first, reject_first) = deferred::<i32, i32>(&queue);
        let (second, _resolve_second, reject_second) = deferred::<i32, i32>(&queue);

        let combined = all(&queue, [first, second]);
        reject_first.reject(2);
        reject_second.reject(3);
        queue.run_until_idle();
        assert_eq!(block_on(combined), Err(Error::Rejected(2)));
    }

    #[test]
    fn rejection_short_circuits_pending_inputs() {
        let queue = TaskQueue::new();
        let (stalled, _resolve_stalled, _reject_stalled) = deferred::<i32, &str>(&queue);
        let failed: Promise<i32, &str> = Promise::reject(&queue, "late");

        let combined = all(&queue, [stalled, failed]);
        queue.run_until_idle();
        assert_eq!(block_on(combined), Err(Error::Rejected("late")));
    }

    #[test]
    fn late_fulfillments_after_rejection_are_noops() {
        let queue = TaskQueue::new();
        let (slow, resolve_slow, _reject_slow) = deferred::<i32, &str>(&queue);
        let failed: Promise<i32, &str> = Promise::reject(&queue, "fatal");

        let combined = all(&queue, [slow, failed]);
        queue.run_until_idle();
        resolve_slow.resolve(1);
        queue.run_until_idle();
        assert_eq!(block_on(combined), Err(Error::Rejected("fatal")));
    }

    #[test]
    fn single_input_aggregates() {
        let queue = TaskQueue::new();
        let combined = all(&queue, [Promise::<i32, &str>::resolve(&queue, 42)]);
        queue.run_until_idle();
        assert_eq!(block_on(combined), Ok(vec![42]));
    }
}
