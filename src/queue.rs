//! The deferred-execution collaborator: a FIFO queue of zero-argument
//! callbacks drained by an explicit run loop.
//!
//! The queue knows nothing about promises. Its whole contract is "enqueue
//! this callback to run later, preserving FIFO order relative to other
//! enqueued callbacks". Settlement and handler dispatch in
//! [`crate::promise`] are always routed through a queue so that they never
//! run inline inside the call that triggered them; the caller decides when
//! the queued work actually runs by driving [`TaskQueue::run_until_idle`]
//! (or [`TaskQueue::run_one`] for single steps).

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A cloneable handle to a FIFO queue of deferred callbacks.
///
/// Clones share the same queue. Tasks may enqueue further tasks while the
/// queue is draining; they run in the same drain, after everything that was
/// already queued.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a callback to the back of the queue.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        self.tasks.lock().unwrap().push_back(Box::new(task));
    }

    /// Runs the callback at the front of the queue, if any.
    ///
    /// The task runs outside the queue lock, so it may enqueue more work.
    /// Returns `false` when the queue was idle.
    pub fn run_one(&self) -> bool {
        let task = self.tasks.lock().unwrap().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Drains the queue until it is empty, including tasks enqueued while
    /// draining. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Number of tasks currently waiting to run.
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::TaskQueue;
    use std::sync::{Arc, Mutex};

    #[test]
    fn runs_tasks_in_fifo_order() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            queue.enqueue(move || order.lock().unwrap().push(label));
        }
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
    }

    #[test]
    fn tasks_scheduled_while_draining_run_in_the_same_drain() {
        let queue = TaskQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let outer_order = Arc::clone(&order);
        let requeue = queue.clone();
        queue.enqueue(move || {
            outer_order.lock().unwrap().push("outer");
            let inner_order = Arc::clone(&outer_order);
            requeue.enqueue(move || inner_order.lock().unwrap().push("inner"));
        });
        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(*order.lock().unwrap(), ["outer", "inner"]);
    }

    #[test]
    fn run_one_reports_idle() {
        let queue = TaskQueue::new();
        assert!(!queue.run_one());
        queue.enqueue(|| ());
        assert!(!queue.is_idle());
        assert!(queue.run_one());
        assert!(queue.is_idle());
    }
}
