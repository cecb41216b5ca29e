//! Scoped submission of units that borrow from the caller's stack.
//!
//! [`Scheduler::scope`](super::Scheduler::scope) creates a [`Scope`]; units
//! spawned through it may capture references that live at least as long as the
//! scope (`'scope`). The scope does not return before every one of its units
//! has completed, which is what makes handing those references to worker
//! threads sound.
//!
//! This is how channels run elementwise math in place: each chunk of the
//! target buffer is a disjoint `&mut [f32]` handed to its own unit.

use super::policy::Priority;
use super::pool::{chunk_ranges, ChunkGroup, Scheduler};
use super::queue::Job;
use super::task::{Completion, TaskError};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

/// Bookkeeping shared by a scope and its in-flight units.
struct ScopeData {
    pending: AtomicUsize,
    /// Least urgent priority any unit of the scope was submitted at.
    latest: AtomicI32,
    first_error: Mutex<Option<TaskError>>,
}

/// Decrements `pending` when dropped.
///
/// Owned by a scoped job and declared before the user closure runs, so it is
/// dropped last: after the closure and everything it captured, on return and
/// on unwind alike.
struct PendingGuard(Arc<ScopeData>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A scope for spawning units that borrow non-`'static` data.
///
/// Created by [`Scheduler::scope`](super::Scheduler::scope).
pub struct Scope<'scope, 'env: 'scope> {
    scheduler: Scheduler,
    data: Arc<ScopeData>,
    scope: PhantomData<&'scope mut &'scope ()>,
    env: PhantomData<&'env mut &'env ()>,
}

impl<'scope, 'env> Scope<'scope, 'env> {
    pub(crate) fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            data: Arc::new(ScopeData {
                pending: AtomicUsize::new(0),
                latest: AtomicI32::new(i32::MIN),
                first_error: Mutex::new(None),
            }),
            scope: PhantomData,
            env: PhantomData,
        }
    }

    /// Number of spawned units that have not completed yet.
    pub(crate) fn pending(&self) -> usize {
        self.data.pending.load(Ordering::Acquire)
    }

    /// Least urgent priority among the units spawned so far.
    pub(crate) fn latest_priority(&self) -> Priority {
        Priority::new(self.data.latest.load(Ordering::Acquire))
    }

    /// Takes the first failure recorded by any unit of this scope.
    pub(crate) fn take_error(&self) -> Option<TaskError> {
        self.data.first_error.lock().take()
    }

    /// Returns the scheduler this scope submits to.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Submits a job that may borrow `'scope` data.
    fn submit_scoped<F>(&'scope self, priority: Priority, job: F)
    where
        F: FnOnce() + Send + 'scope,
    {
        self.data.pending.fetch_add(1, Ordering::AcqRel);
        self.data.latest.fetch_max(priority.value(), Ordering::AcqRel);

        let guard = PendingGuard(Arc::clone(&self.data));
        let job: Box<dyn FnOnce() + Send + 'scope> = Box::new(move || {
            let _guard = guard;
            job();
        });

        // SAFETY: `pending` is decremented only by `PendingGuard::drop`, which
        // runs after `job` and every `'scope` borrow it captured have been
        // dropped. `Scheduler::scope` does not return, not even by unwinding,
        // before `pending` is zero, so no such borrow is used past `'scope`.
        let job: Job = unsafe {
            std::mem::transmute::<Box<dyn FnOnce() + Send + 'scope>, Job>(job)
        };

        self.scheduler.submit(priority, job);
    }

    /// Spawns a unit in this scope.
    pub fn enqueue<F>(&'scope self, priority: Priority, work: F) -> ScopedHandle<'scope>
    where
        F: FnOnce() + Send + 'scope,
    {
        let completion = Arc::new(Completion::new());
        let slot = Arc::clone(&completion);
        let data = Arc::clone(&self.data);

        self.submit_scoped(priority, move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work)).map_err(TaskError::from_panic);
            if let Err(err) = &result {
                data.first_error.lock().get_or_insert_with(|| err.clone());
            }
            slot.set(result);
        });

        ScopedHandle::new(completion, self, priority)
    }

    /// Scoped counterpart of [`Scheduler::parallel_for`](super::Scheduler::parallel_for).
    pub fn parallel_for<F>(
        &'scope self,
        begin: usize,
        end: usize,
        priority: Priority,
        body: F,
    ) -> ScopedHandle<'scope>
    where
        F: Fn(usize) + Send + Sync + 'scope,
    {
        let ranges = chunk_ranges(begin, end, self.scheduler.num_threads());
        if ranges.is_empty() {
            return ScopedHandle::new(Arc::new(Completion::ready(Ok(()))), self, priority);
        }

        let completion = Arc::new(Completion::new());
        let group = Arc::new(ChunkGroup::new(ranges.len(), Arc::clone(&completion)));
        let body = Arc::new(body);

        for (start, stop) in ranges {
            let group = Arc::clone(&group);
            let body = Arc::clone(&body);
            let data = Arc::clone(&self.data);
            self.submit_scoped(priority, move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    for i in start..stop {
                        body(i);
                    }
                }))
                .map_err(TaskError::from_panic);
                if let Err(err) = &result {
                    data.first_error.lock().get_or_insert_with(|| err.clone());
                }
                group.chunk_done(result);
            });
        }

        ScopedHandle::new(completion, self, priority)
    }

    /// Runs `body(offset, chunk)` over disjoint chunks of `data` in parallel.
    ///
    /// `data` is split into `min(num_threads, data.len())` contiguous chunks;
    /// `offset` is the index of the chunk's first element within `data`.
    pub fn parallel_chunks_mut<T, F>(
        &'scope self,
        data: &'scope mut [T],
        priority: Priority,
        body: F,
    ) -> ScopedHandle<'scope>
    where
        T: Send + 'scope,
        F: Fn(usize, &mut [T]) + Send + Sync + 'scope,
    {
        let ranges = chunk_ranges(0, data.len(), self.scheduler.num_threads());
        if ranges.is_empty() {
            return ScopedHandle::new(Arc::new(Completion::ready(Ok(()))), self, priority);
        }

        let completion = Arc::new(Completion::new());
        let group = Arc::new(ChunkGroup::new(ranges.len(), Arc::clone(&completion)));
        let body = Arc::new(body);

        let mut rest = data;
        let mut consumed = 0;
        for (start, stop) in ranges {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(stop - consumed);
            rest = tail;
            consumed = stop;

            let group = Arc::clone(&group);
            let body = Arc::clone(&body);
            let scope_data = Arc::clone(&self.data);
            self.submit_scoped(priority, move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| body(start, chunk)))
                    .map_err(TaskError::from_panic);
                if let Err(err) = &result {
                    scope_data.first_error.lock().get_or_insert_with(|| err.clone());
                }
                group.chunk_done(result);
            });
        }

        ScopedHandle::new(completion, self, priority)
    }
}

impl std::fmt::Debug for Scope<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Handle to a unit (or group of chunks) spawned in a [`Scope`].
#[must_use = "scoped units are awaited at the end of the scope; join() to observe them earlier"]
pub struct ScopedHandle<'scope> {
    completion: Arc<Completion<()>>,
    scheduler: Scheduler,
    priority: Priority,
    _scope: PhantomData<&'scope ()>,
}

impl<'scope> ScopedHandle<'scope> {
    fn new(
        completion: Arc<Completion<()>>,
        scope: &'scope Scope<'scope, '_>,
        priority: Priority,
    ) -> Self {
        Self {
            completion,
            scheduler: scope.scheduler.clone(),
            priority,
            _scope: PhantomData,
        }
    }

    /// Returns true once the unit has completed.
    pub fn is_finished(&self) -> bool {
        self.completion.is_done()
    }

    /// Waits for the unit, running queued work meanwhile.
    pub fn join(self) -> Result<(), TaskError> {
        let completion = &self.completion;
        let priority = self.priority;
        self.scheduler.help_until(|| priority, || completion.is_done());
        completion.take()
    }
}

/// Waits for every scoped handle; reports the first failure.
pub fn join_all<'scope, I>(handles: I) -> Result<(), TaskError>
where
    I: IntoIterator<Item = ScopedHandle<'scope>>,
{
    let mut first_error = None;
    for handle in handles {
        if let Err(err) = handle.join() {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use crate::executor::{Priority, ThreadPool};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_scoped_units_borrow_stack_data() {
        let pool = ThreadPool::new(3);
        let inputs = vec![1, 2, 3, 4];
        let total = AtomicUsize::new(0);

        pool.scheduler()
            .scope(|s| {
                for value in &inputs {
                    let total = &total;
                    let _ = s.enqueue(Priority::DEFAULT, move || {
                        total.fetch_add(*value, Ordering::Relaxed);
                    });
                }
            })
            .unwrap();

        assert_eq!(total.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_captures_are_dropped_before_unit_counts_as_done() {
        struct RecordOnDrop<'a> {
            pending: &'a AtomicUsize,
            seen: &'a AtomicUsize,
        }

        impl Drop for RecordOnDrop<'_> {
            fn drop(&mut self) {
                self.seen.store(self.pending.load(Ordering::SeqCst), Ordering::SeqCst);
            }
        }

        let pool = ThreadPool::new(2);
        let seen = AtomicUsize::new(usize::MAX);

        pool.scheduler()
            .scope(|s| {
                let record = RecordOnDrop {
                    pending: &s.data.pending,
                    seen: &seen,
                };
                s.enqueue(Priority::DEFAULT, move || {
                    let _record = record;
                });
            })
            .unwrap();

        // The unit was still counted as pending while its capture dropped
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_chunks_mut_offsets() {
        let pool = ThreadPool::new(4);
        let mut data = vec![0usize; 103];

        pool.scheduler()
            .scope(|s| {
                s.parallel_chunks_mut(&mut data, Priority::DEFAULT, |offset, chunk| {
                    for (i, v) in chunk.iter_mut().enumerate() {
                        *v = offset + i;
                    }
                })
                .join()
            })
            .unwrap()
            .unwrap();

        assert!(data.iter().enumerate().all(|(i, &v)| i == v));
    }

    #[test]
    fn test_parallel_chunks_mut_empty_slice() {
        let pool = ThreadPool::new(2);
        let mut data: Vec<f32> = Vec::new();

        let finished = pool
            .scheduler()
            .scope(|s| {
                let handle = s.parallel_chunks_mut(&mut data, Priority::DEFAULT, |_, _| {});
                handle.is_finished()
            })
            .unwrap();

        assert!(finished);
    }

    #[test]
    fn test_scoped_parallel_for() {
        let pool = ThreadPool::new(2);
        let count = AtomicUsize::new(0);

        pool.scheduler()
            .scope(|s| {
                s.parallel_for(0, 50, Priority::DEFAULT, |_| {
                    count.fetch_add(1, Ordering::Relaxed);
                })
                .join()
            })
            .unwrap()
            .unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn test_unjoined_failure_surfaces_from_scope() {
        let pool = ThreadPool::new(2);

        let result = pool.scheduler().scope(|s| {
            let _ = s.enqueue(Priority::DEFAULT, || panic!("scoped failure"));
        });

        let err = result.unwrap_err();
        assert!(err.is_panic());
        assert!(err.to_string().contains("scoped failure"));
    }

    #[test]
    fn test_join_all_reports_first_failure() {
        let pool = ThreadPool::new(1);
        let ran = AtomicUsize::new(0);

        let result = pool.scheduler().scope(|s| {
            let handles = vec![
                s.enqueue(Priority::DEFAULT, || {
                    ran.fetch_add(1, Ordering::Relaxed);
                }),
                s.enqueue(Priority::DEFAULT, || panic!("second")),
                s.enqueue(Priority::DEFAULT, || {
                    ran.fetch_add(1, Ordering::Relaxed);
                }),
            ];
            super::join_all(handles)
        });

        // The failure was observed by join_all; the scope reports it as well.
        assert!(result.is_err());
        assert_eq!(ran.load(Ordering::Relaxed), 2);
    }
}
