//! Priority task executor.
//!
//! A fixed pool of worker threads pulls units of work from a single priority
//! queue. Lower priority values are dequeued first; equal priorities run in
//! submission order. Components receive a [`Scheduler`] handle rather than
//! reaching for a process-wide pool.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   enqueue / parallel_for / scope   ┌──────────────────┐
//! │  Components  │ ─────────────────────────────────► │    Scheduler     │
//! │ (loaders,    │                                    │  PriorityQueue   │
//! │  images,     │ ◄──────── TaskHandle / ScopedHandle│  workers 0..N    │
//! │  channels)   │        (join helps run the queue)  └──────────────────┘
//! └──────────────┘
//! ```
//!
//! Waiting on a handle never parks a thread while the queue has work: the
//! waiter runs queued units until its own unit completes. Nested parallelism
//! therefore cannot deadlock, even on a single-worker pool.
//!
//! # Example
//!
//! ```
//! use hdrview::executor::{wait_all, Priority, ThreadPool};
//!
//! let pool = ThreadPool::new(4);
//! let scheduler = pool.scheduler();
//!
//! let handles: Vec<_> = (0..8)
//!     .map(|i| scheduler.enqueue(Priority::for_load(i, false), move || i * i))
//!     .collect();
//!
//! let squares = wait_all(handles).unwrap();
//! assert_eq!(squares.iter().sum::<i32>(), 140);
//! ```

mod policy;
mod pool;
mod queue;
mod scope;
mod task;

pub use policy::{Priority, PRIORITY_BACKGROUND, PRIORITY_DEFAULT, PRIORITY_FOREGROUND};
pub use pool::{PoolConfig, Scheduler, ThreadPool, DEFAULT_THREAD_NAME};
pub use scope::{join_all, Scope, ScopedHandle};
pub use task::{wait_all, TaskError, TaskHandle};
