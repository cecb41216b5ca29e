//! Fixed-size worker pool with priority-ordered dispatch.
//!
//! The [`ThreadPool`] owns the worker threads. Everything else talks to the
//! pool through a [`Scheduler`], a cheap clonable handle that is passed to
//! every component needing parallelism. There is no global pool.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          ThreadPool                           │
//! │                                                               │
//! │  Scheduler ──enqueue──► ┌──────────────────────┐              │
//! │  Scheduler ──enqueue──► │ Mutex<PriorityQueue> │ ◄──pop── worker 0
//! │                         │      + Condvar       │ ◄──pop── worker 1
//! │  waiter ◄──────pop───── └──────────────────────┘ ◄──pop── worker N
//! │   (helps while blocked)                                       │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! A single condition variable is used both to wake idle workers when work
//! arrives and to wake waiters when a unit completes. A thread that waits on a
//! handle keeps popping and running queued units until its handle is done, so
//! nested waits never starve the pool, even with a single worker. A waiter
//! only runs units that are at least as urgent as the ones it waits for; an
//! unrelated, later load is left to the workers.

use super::policy::Priority;
use super::queue::{Job, PriorityQueue};
use super::scope::Scope;
use super::task::{Completion, TaskError, TaskHandle};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Default prefix for worker thread names.
pub const DEFAULT_THREAD_NAME: &str = "hdrview-worker";

/// Configuration for the worker pool.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of worker threads. Zero selects the available parallelism.
    pub num_threads: usize,

    /// Prefix for worker thread names (suffixed with the worker index).
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with a fixed worker count.
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            ..Default::default()
        }
    }

    /// Set the number of worker threads.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Returns the worker count this configuration resolves to.
    pub fn resolved_threads(&self) -> usize {
        if self.num_threads > 0 {
            self.num_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

struct State {
    queue: PriorityQueue,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    signal: Condvar,
    /// Units queued or running.
    in_system: AtomicUsize,
    num_threads: usize,
}

impl Shared {
    /// Wakes every thread blocked on the pool's condition variable.
    ///
    /// The state lock is taken so that a waiter cannot miss the wake-up
    /// between checking its condition and going to sleep.
    fn notify_progress(&self) {
        let _state = self.state.lock();
        self.signal.notify_all();
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Clonable handle used to submit work to a [`ThreadPool`].
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Returns the number of worker threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.shared.num_threads
    }

    /// Returns the number of units that are queued or running.
    pub fn tasks_in_system(&self) -> usize {
        self.shared.in_system.load(Ordering::Acquire)
    }

    /// Returns the number of units waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Pushes a raw job onto the queue.
    pub(crate) fn submit(&self, priority: Priority, job: Job) {
        self.shared.in_system.fetch_add(1, Ordering::AcqRel);

        let shared = Arc::clone(&self.shared);
        let tracked: Job = Box::new(move || {
            job();
            shared.in_system.fetch_sub(1, Ordering::AcqRel);
            shared.notify_progress();
        });

        let mut state = self.shared.state.lock();
        state.queue.push(priority, tracked);
        // notify_all: an idle worker and a helping waiter may both be parked
        self.shared.signal.notify_all();
    }

    /// Schedules `work` on the pool and returns a handle to its result.
    ///
    /// Returns immediately. A panic inside `work` is captured and reported by
    /// [`TaskHandle::join`]; it never takes down a worker.
    pub fn enqueue<T, F>(&self, priority: Priority, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let completion = Arc::new(Completion::new());
        let slot = Arc::clone(&completion);

        self.submit(
            priority,
            Box::new(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(work)).map_err(|payload| {
                    let err = TaskError::from_panic(payload);
                    warn!(%priority, error = %err, "Unit of work panicked");
                    err
                });
                slot.set(result);
            }),
        );

        TaskHandle::new(completion, self.clone(), priority)
    }

    /// Runs `body(i)` for every `i` in `begin..end`, split across the workers.
    ///
    /// The range is cut into `min(num_threads, end - begin)` contiguous chunks,
    /// each submitted as its own unit at `priority`. The returned handle
    /// completes once every chunk has completed. An empty range yields an
    /// already-completed handle without queueing anything.
    ///
    /// If chunks panic, the remaining chunks still run and the handle reports
    /// the first failure.
    pub fn parallel_for<F>(&self, begin: usize, end: usize, priority: Priority, body: F) -> TaskHandle<()>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let ranges = chunk_ranges(begin, end, self.num_threads());
        if ranges.is_empty() {
            return TaskHandle::new(Arc::new(Completion::ready(Ok(()))), self.clone(), priority);
        }

        let completion = Arc::new(Completion::new());
        let group = Arc::new(ChunkGroup::new(ranges.len(), Arc::clone(&completion)));
        let body = Arc::new(body);

        for (start, stop) in ranges {
            let group = Arc::clone(&group);
            let body = Arc::clone(&body);
            self.submit(
                priority,
                Box::new(move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        for i in start..stop {
                            body(i);
                        }
                    }));
                    group.chunk_done(result.map_err(TaskError::from_panic));
                }),
            );
        }

        TaskHandle::new(completion, self.clone(), priority)
    }

    /// Runs `f` with a [`Scope`] whose units may borrow from the caller.
    ///
    /// Every unit spawned in the scope has completed when this returns. The
    /// first failure of any unit is returned as an error, whether or not its
    /// handle was joined. A panic in `f` itself is resumed after all units
    /// have finished.
    ///
    /// # Example
    ///
    /// ```
    /// use hdrview::executor::{Priority, ThreadPool};
    ///
    /// let pool = ThreadPool::new(2);
    /// let mut values = vec![1.0_f32; 1000];
    ///
    /// pool.scheduler()
    ///     .scope(|s| {
    ///         let _ = s.parallel_chunks_mut(&mut values, Priority::DEFAULT, |_, chunk| {
    ///             chunk.iter_mut().for_each(|v| *v *= 2.0);
    ///         });
    ///     })
    ///     .unwrap();
    ///
    /// assert!(values.iter().all(|&v| v == 2.0));
    /// ```
    pub fn scope<'env, F, R>(&self, f: F) -> Result<R, TaskError>
    where
        F: for<'scope> FnOnce(&'scope Scope<'scope, 'env>) -> R,
    {
        let scope = Scope::new(self.clone());
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(&scope)));

        // Borrowed data must outlive every unit, so wait even on panic.
        self.help_until(|| scope.latest_priority(), || scope.pending() == 0);

        match result {
            Err(payload) => panic::resume_unwind(payload),
            Ok(value) => match scope.take_error() {
                Some(err) => Err(err),
                None => Ok(value),
            },
        }
    }

    /// Blocks until `done()` holds, executing queued units in the meantime.
    ///
    /// Only units whose priority is no later than `bound()` are run inline.
    /// The awaited units themselves always qualify, so a nested wait still
    /// makes progress on a single worker.
    ///
    /// `done` is re-evaluated under the queue lock, after every unit this
    /// thread runs, and whenever any unit completes.
    pub(crate) fn help_until(&self, bound: impl Fn() -> Priority, done: impl Fn() -> bool) {
        loop {
            let task = {
                let mut state = self.shared.state.lock();
                loop {
                    if done() {
                        return;
                    }
                    if let Some(task) = state.queue.pop_at_most(bound()) {
                        break task;
                    }
                    self.shared.signal.wait(&mut state);
                }
            };
            task.run();
        }
    }

    /// Blocks until no unit is queued or running.
    ///
    /// Must not be called from inside a unit: the caller would wait for itself.
    pub fn wait_until_finished(&self) {
        let shared = &self.shared;
        self.help_until(
            || Priority::BACKGROUND,
            || shared.in_system.load(Ordering::Acquire) == 0,
        );
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("num_threads", &self.num_threads())
            .field("tasks_in_system", &self.tasks_in_system())
            .finish()
    }
}

/// Splits `begin..end` into at most `max_chunks` contiguous non-empty ranges.
pub(crate) fn chunk_ranges(begin: usize, end: usize, max_chunks: usize) -> Vec<(usize, usize)> {
    let range = end.saturating_sub(begin);
    let n = max_chunks.max(1).min(range);
    (0..n)
        .map(|i| (begin + range * i / n, begin + range * (i + 1) / n))
        .collect()
}

// =============================================================================
// Chunk Group
// =============================================================================

/// Countdown shared by the chunks of one parallel operation.
pub(crate) struct ChunkGroup {
    remaining: AtomicUsize,
    first_error: Mutex<Option<TaskError>>,
    completion: Arc<Completion<()>>,
}

impl ChunkGroup {
    pub fn new(chunks: usize, completion: Arc<Completion<()>>) -> Self {
        Self {
            remaining: AtomicUsize::new(chunks),
            first_error: Mutex::new(None),
            completion,
        }
    }

    /// Records one finished chunk; the last one completes the group.
    pub fn chunk_done(&self, result: Result<(), TaskError>) {
        if let Err(err) = result {
            warn!(error = %err, "Parallel chunk failed");
            self.first_error.lock().get_or_insert(err);
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let result = match self.first_error.lock().take() {
                Some(err) => Err(err),
                None => Ok(()),
            };
            self.completion.set(result);
        }
    }
}

// =============================================================================
// Thread Pool
// =============================================================================

/// Owner of the worker threads.
///
/// Dropping the pool (or calling [`ThreadPool::shutdown`]) lets the workers
/// drain whatever is still queued and then joins them. There is no
/// cancellation; queued units always run.
pub struct ThreadPool {
    scheduler: Scheduler,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Creates a pool with `num_threads` workers (zero = available parallelism).
    pub fn new(num_threads: usize) -> Self {
        Self::with_config(PoolConfig::new(num_threads))
    }

    /// Creates a pool from a configuration.
    pub fn with_config(config: PoolConfig) -> Self {
        let num_threads = config.resolved_threads();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: PriorityQueue::new(),
                shutdown: false,
            }),
            signal: Condvar::new(),
            in_system: AtomicUsize::new(0),
            num_threads,
        });

        let mut workers = Vec::with_capacity(num_threads);
        for index in 0..num_threads {
            let shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || worker_loop(shared, index));
            match spawned {
                Ok(handle) => workers.push(handle),
                // Waiters help execute queued units, so fewer workers only costs speed.
                Err(e) => warn!(index, error = %e, "Failed to spawn worker thread"),
            }
        }

        debug!(num_threads = workers.len(), "Thread pool started");

        Self {
            scheduler: Scheduler { shared },
            workers,
        }
    }

    /// Returns a handle for submitting work.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Returns the number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.scheduler.num_threads()
    }

    /// Blocks until no unit is queued or running.
    pub fn wait_until_finished(&self) {
        self.scheduler.wait_until_finished();
    }

    /// Drains the queue and joins every worker.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        {
            let mut state = self.scheduler.shared.state.lock();
            state.shutdown = true;
            self.scheduler.shared.signal.notify_all();
        }

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Worker thread terminated abnormally");
            }
        }

        debug!("Thread pool stopped");
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.workers.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    debug!(index, "Worker started");
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(task) = state.queue.pop() {
                    break Some(task);
                }
                if state.shutdown {
                    break None;
                }
                shared.signal.wait(&mut state);
            }
        };

        match task {
            Some(task) => task.run(),
            None => break,
        }
    }
    debug!(index, "Worker stopped");
}

// =============================================================================
// Tests
// =============================================================================
