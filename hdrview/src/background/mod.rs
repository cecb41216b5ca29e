//! Ordered asynchronous image loading.
//!
//! [`BackgroundLoader`] accepts load requests, decodes them concurrently on
//! the worker pool, and republishes the results strictly in request order,
//! however the decodes happen to finish.
//!
//! # Architecture
//!
//! ```text
//!  enqueue(path) ──► load id N ──► detached unit ──► try_load_path
//!                                                         │
//!                    ┌────────────────────────────────────┘
//!                    ▼
//!  ┌─────────────────────────────┐    ┌──────────────────────────┐
//!  │ completed (min-heap by id)  │──► │ published (FIFO)         │──► try_pop / pop_timeout
//!  │ 3, 5, 4 ...                 │    │ only while min == next id │
//!  └─────────────────────────────┘    └──────────────────────────┘
//! ```
//!
//! Failed loads occupy their slot in the sequence but are never published,
//! so a later request cannot overtake an earlier one that is still running.
//!
//! # Example
//!
//! ```no_run
//! use hdrview::background::BackgroundLoader;
//! use hdrview::executor::ThreadPool;
//! use hdrview::loader::ImageLoaders;
//! use std::time::Duration;
//!
//! let pool = ThreadPool::new(4);
//! let loader = BackgroundLoader::new(pool.scheduler(), ImageLoaders::new());
//!
//! loader.enqueue("a.pfm", "", false);
//! loader.enqueue("b.png", "R,G,B", true);
//!
//! while !loader.is_idle() {
//!     if let Some(load) = loader.pop_timeout(Duration::from_millis(100)) {
//!         println!("load {} produced {} image(s)", load.load_id, load.images.len());
//!     }
//! }
//! ```

use crate::executor::{Priority, Scheduler, TaskError};
use crate::image::Image;
use crate::loader::ImageLoaders;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Callback invoked after new loads have been published.
pub type WakeupFn = Arc<dyn Fn() + Send + Sync>;

/// The outcome of one load request.
#[derive(Debug)]
pub struct PendingLoad {
    /// Position of the request in submission order, starting at 0.
    pub load_id: u64,
    /// Whether the consumer should make these images the active selection.
    pub should_select: bool,
    /// Loaded images. Empty if the load failed.
    pub images: Vec<Image>,
}

/// Heap entry ordered so that the smallest load id is on top.
struct Completed(PendingLoad);

impl PartialEq for Completed {
    fn eq(&self, other: &Self) -> bool {
        self.0.load_id == other.0.load_id
    }
}

impl Eq for Completed {}

impl PartialOrd for Completed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Completed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.0.load_id.cmp(&self.0.load_id)
    }
}

#[derive(Default)]
struct LoadQueues {
    next_publish: u64,
    completed: BinaryHeap<Completed>,
    published: VecDeque<PendingLoad>,
}

struct Shared {
    queues: Mutex<LoadQueues>,
    available: Condvar,
    requested: AtomicU64,
    wakeup: Option<WakeupFn>,
}

impl Shared {
    fn complete(&self, load: PendingLoad) {
        self.queues.lock().completed.push(Completed(load));

        if self.publish_ready() {
            if let Some(wakeup) = &self.wakeup {
                wakeup();
            }
        }
    }

    fn publish_ready(&self) -> bool {
        let mut queues = self.queues.lock();
        let mut advanced = false;

        while queues
            .completed
            .peek()
            .is_some_and(|top| top.0.load_id == queues.next_publish)
        {
            let Some(Completed(load)) = queues.completed.pop() else {
                break;
            };
            queues.next_publish += 1;
            advanced = true;

            if load.images.is_empty() {
                debug!(load_id = load.load_id, "Dropping failed load");
            } else {
                queues.published.push_back(load);
            }
        }

        if advanced {
            self.available.notify_all();
        }
        advanced
    }
}

/// Loads images on the worker pool and publishes them in request order.
///
/// Cheap to clone; clones share the same queues.
#[derive(Clone)]
pub struct BackgroundLoader {
    shared: Arc<Shared>,
    scheduler: Scheduler,
    loaders: Arc<ImageLoaders>,
}

impl BackgroundLoader {
    /// Creates a loader that decodes with `loaders` on `scheduler`.
    pub fn new(scheduler: Scheduler, loaders: ImageLoaders) -> Self {
        Self::build(scheduler, loaders, None)
    }

    /// Creates a loader that calls `wakeup` whenever loads were published.
    pub fn with_wakeup(scheduler: Scheduler, loaders: ImageLoaders, wakeup: WakeupFn) -> Self {
        Self::build(scheduler, loaders, Some(wakeup))
    }

    fn build(scheduler: Scheduler, loaders: ImageLoaders, wakeup: Option<WakeupFn>) -> Self {
        Self {
            shared: Arc::new(Shared {
                queues: Mutex::new(LoadQueues::default()),
                available: Condvar::new(),
                requested: AtomicU64::new(0),
                wakeup,
            }),
            scheduler,
            loaders: Arc::new(loaders),
        }
    }

    /// Requests a load of `path` and returns its load id.
    ///
    /// Ids are assigned synchronously and without gaps. The decode runs as a
    /// detached unit whose priority is derived from a fresh image draw id.
    pub fn enqueue(&self, path: impl AsRef<Path>, channel_selector: &str, should_select: bool) -> u64 {
        let load_id = self.shared.requested.fetch_add(1, Ordering::SeqCst);
        let path: PathBuf = path.as_ref().to_path_buf();
        let channel_selector = channel_selector.to_string();
        let priority = Priority::for_load(Image::draw_id(), should_select);

        info!(
            load_id,
            path = %path.display(),
            selector = %channel_selector,
            %priority,
            "Queued image load"
        );

        let shared = Arc::clone(&self.shared);
        let loaders = Arc::clone(&self.loaders);
        let scheduler = self.scheduler.clone();
        self.scheduler
            .enqueue(priority, move || {
                // The id must reach the completed set even if decoding unwinds,
                // otherwise every later load would wait on it forever.
                let images = panic::catch_unwind(AssertUnwindSafe(|| {
                    loaders.try_load_path(&scheduler, &path, &channel_selector, priority)
                }))
                .unwrap_or_else(|payload| {
                    let err = TaskError::from_panic(payload);
                    error!(load_id, path = %path.display(), error = %err, "Image load panicked");
                    Vec::new()
                });
                shared.complete(PendingLoad {
                    load_id,
                    should_select,
                    images,
                });
            })
            .detach();

        load_id
    }

    /// Moves completions whose turn has come to the published queue.
    ///
    /// Returns true if the expected id advanced at least once.
    pub fn publish_ready(&self) -> bool {
        self.shared.publish_ready()
    }

    /// Takes the next published load, if any.
    pub fn try_pop(&self) -> Option<PendingLoad> {
        self.shared.queues.lock().published.pop_front()
    }

    /// Waits up to `timeout` for the next published load.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PendingLoad> {
        let deadline = Instant::now() + timeout;
        let mut queues = self.shared.queues.lock();

        loop {
            if let Some(load) = queues.published.pop_front() {
                return Some(load);
            }
            if self.shared.available.wait_until(&mut queues, deadline).timed_out() {
                return queues.published.pop_front();
            }
        }
    }

    /// True when every requested load has completed and been sequenced.
    ///
    /// Published loads may still be waiting in the queue.
    pub fn is_idle(&self) -> bool {
        self.num_published() == self.num_requested()
    }

    /// Number of loads requested so far.
    pub fn num_requested(&self) -> u64 {
        self.shared.requested.load(Ordering::SeqCst)
    }

    /// Number of loads sequenced so far, failed ones included.
    pub fn num_published(&self) -> u64 {
        self.shared.queues.lock().next_publish
    }

    /// Number of published loads not yet popped.
    pub fn num_ready(&self) -> usize {
        self.shared.queues.lock().published.len()
    }
}

impl std::fmt::Debug for BackgroundLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundLoader")
            .field("requested", &self.num_requested())
            .field("published", &self.num_published())
            .field("ready", &self.num_ready())
            .finish()
    }
}
