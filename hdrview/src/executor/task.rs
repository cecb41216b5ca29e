//! Task handles and failure reporting.
//!
//! Every unit submitted to the pool gets a [`Completion`] slot that the
//! executing thread fills in. A [`TaskHandle`] is the caller's view of that
//! slot: it can be polled with [`TaskHandle::is_finished`] or awaited with
//! [`TaskHandle::join`]. Awaiting never parks the thread while there is queued
//! work; the waiter executes queued units itself until its own unit is done.
//!
//! A handle that is dropped without being joined detaches its unit. The unit
//! still runs to completion; its result is discarded.

use super::policy::Priority;
use super::pool::Scheduler;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Failure of a unit of work, reported to whoever awaits its handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The unit panicked while running.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// The unit returned an error that was propagated through a wait.
    #[error("task failed: {message}")]
    Failed {
        /// Human-readable error message.
        message: String,
    },
}

impl TaskError {
    /// Creates a failure from an error value.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Converts a panic payload captured by `catch_unwind`.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked { message }
    }

    /// Returns true if the unit panicked.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }
}

// =============================================================================
// Completion
// =============================================================================

/// Result slot shared between a running unit and its handle.
pub(crate) struct Completion<T> {
    result: Mutex<Option<Result<T, TaskError>>>,
    done: AtomicBool,
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: AtomicBool::new(false),
        }
    }

    /// Creates a slot that is already filled.
    pub fn ready(result: Result<T, TaskError>) -> Self {
        Self {
            result: Mutex::new(Some(result)),
            done: AtomicBool::new(true),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Stores the result. Waiters are woken by the scheduler, not here.
    pub fn set(&self, result: Result<T, TaskError>) {
        *self.result.lock() = Some(result);
        self.done.store(true, Ordering::Release);
    }

    /// Takes the result out of a finished slot.
    pub fn take(&self) -> Result<T, TaskError> {
        self.result.lock().take().unwrap_or_else(|| {
            Err(TaskError::failed("task result was already taken"))
        })
    }
}

// =============================================================================
// Task Handle
// =============================================================================

/// Handle to a unit submitted with [`Scheduler::enqueue`] or
/// [`Scheduler::parallel_for`].
///
/// # Example
///
/// ```
/// use hdrview::executor::{Priority, ThreadPool};
///
/// let pool = ThreadPool::new(2);
/// let scheduler = pool.scheduler();
///
/// let handle = scheduler.enqueue(Priority::DEFAULT, || 6 * 7);
/// assert_eq!(handle.join().unwrap(), 42);
/// ```
#[must_use = "dropping a TaskHandle detaches the unit; call join() to await it"]
pub struct TaskHandle<T> {
    completion: Arc<Completion<T>>,
    scheduler: Scheduler,
    priority: Priority,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(completion: Arc<Completion<T>>, scheduler: Scheduler, priority: Priority) -> Self {
        Self {
            completion,
            scheduler,
            priority,
        }
    }

    /// Returns true once the unit has completed (successfully or not).
    pub fn is_finished(&self) -> bool {
        self.completion.is_done()
    }

    /// Blocks until the unit has completed, running queued work meanwhile.
    ///
    /// Only queued units at least as urgent as this one are run inline.
    pub fn wait(&self) {
        let completion = &self.completion;
        let priority = self.priority;
        self.scheduler.help_until(|| priority, || completion.is_done());
    }

    /// Waits for the unit and returns its result.
    ///
    /// A panic inside the unit is returned as [`TaskError::Panicked`].
    pub fn join(self) -> Result<T, TaskError> {
        self.wait();
        self.completion.take()
    }

    /// Detaches the unit explicitly. It keeps running; its result is dropped.
    pub fn detach(self) {}
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Waits for every handle and collects their results in order.
///
/// All handles are awaited even after a failure, so no unit is left running
/// unobserved; the first failure in handle order is returned.
pub fn wait_all<T, I>(handles: I) -> Result<Vec<T>, TaskError>
where
    I: IntoIterator<Item = TaskHandle<T>>,
{
    let mut values = Vec::new();
    let mut first_error = None;

    for handle in handles {
        match handle.join() {
            Ok(value) => values.push(value),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display() {
        let err = TaskError::Panicked {
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "task panicked: boom");

        let err = TaskError::failed("bad input");
        assert_eq!(err.to_string(), "task failed: bad input");
    }

    #[test]
    fn test_from_panic_payloads() {
        let err = TaskError::from_panic(Box::new("static str"));
        assert_eq!(
            err,
            TaskError::Panicked {
                message: "static str".to_string()
            }
        );

        let err = TaskError::from_panic(Box::new(String::from("owned")));
        assert!(err.is_panic());
        assert!(err.to_string().contains("owned"));

        let err = TaskError::from_panic(Box::new(17_u32));
        assert!(err.to_string().contains("unknown panic payload"));
    }

    #[test]
    fn test_completion_lifecycle() {
        let completion = Completion::new();
        assert!(!completion.is_done());

        completion.set(Ok(5));
        assert!(completion.is_done());
        assert_eq!(completion.take(), Ok(5));

        // Second take reports the slot as consumed
        assert!(completion.take().is_err());
    }

    #[test]
    fn test_ready_completion() {
        let completion: Completion<()> = Completion::ready(Ok(()));
        assert!(completion.is_done());
        assert_eq!(completion.take(), Ok(()));
    }
}
