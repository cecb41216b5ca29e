//! Named 2D float buffers.
//!
//! A [`Channel`] is one color or data component of an image: a name plus a
//! row-major `f32` buffer of fixed size. Elementwise math against another
//! channel (used for alpha premultiplication) is split across the worker
//! pool with [`Scope::parallel_chunks_mut`].
//!
//! # Example
//!
//! ```
//! use hdrview::channel::Channel;
//! use hdrview::executor::{Priority, ThreadPool};
//! use hdrview::image::Vector2i;
//!
//! let pool = ThreadPool::new(2);
//! let size = Vector2i::new(2, 2);
//!
//! let mut red = Channel::new("R", size);
//! red.data_mut().fill(0.5);
//! let mut alpha = Channel::new("A", size);
//! alpha.data_mut().fill(0.5);
//!
//! red.multiply_with(&alpha, &pool.scheduler(), Priority::DEFAULT).unwrap();
//! assert_eq!(red.eval(1, 1), 0.25);
//! assert_eq!(red.eval(5, 5), 0.0);
//! ```

mod naming;

pub use naming::{alpha_name, color, head, is_topmost, join, split, tail};

use crate::executor::{Priority, Scheduler, Scope, ScopedHandle, TaskError};
use crate::image::Vector2i;
use tracing::warn;

/// A named 2D float buffer addressed row-major.
#[derive(Clone, PartialEq)]
pub struct Channel {
    name: String,
    size: Vector2i,
    data: Vec<f32>,
}

impl Channel {
    /// Creates a zero-filled channel. Negative extents are clamped to zero.
    pub fn new(name: impl Into<String>, size: Vector2i) -> Self {
        let size = Vector2i::new(size.x.max(0), size.y.max(0));
        Self {
            name: name.into(),
            size,
            data: vec![0.0; size.area()],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Width and height in pixels.
    pub fn size(&self) -> Vector2i {
        self.size
    }

    /// Number of pixels.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    fn index_of(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.size.x || y >= self.size.y {
            return None;
        }
        Some(x as usize + y as usize * self.size.x as usize)
    }

    /// Value at `(x, y)`. Panics if the position is outside the channel.
    pub fn at(&self, x: i32, y: i32) -> f32 {
        self.data[x as usize + y as usize * self.size.x as usize]
    }

    /// Value at linear index `i`. Panics if `i >= count()`.
    pub fn at_index(&self, i: usize) -> f32 {
        self.data[i]
    }

    /// Mutable value at `(x, y)`. Panics if the position is outside the channel.
    pub fn at_mut(&mut self, x: i32, y: i32) -> &mut f32 {
        let width = self.size.x as usize;
        &mut self.data[x as usize + y as usize * width]
    }

    /// Mutable value at linear index `i`. Panics if `i >= count()`.
    pub fn at_index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.data[i]
    }

    /// Value at `(x, y)`, or 0 outside the channel.
    pub fn eval(&self, x: i32, y: i32) -> f32 {
        self.index_of(x, y).map_or(0.0, |i| self.data[i])
    }

    /// Value at linear index `i`, or 0 past the end.
    pub fn eval_index(&self, i: usize) -> f32 {
        self.data.get(i).copied().unwrap_or(0.0)
    }

    pub fn set_zero(&mut self) {
        self.data.fill(0.0);
    }

    // =========================================================================
    // Elementwise math
    // =========================================================================

    /// Divides every value by the matching value of `other` in parallel.
    ///
    /// Division by zero yields zero. The work is spawned into `scope`; the
    /// returned handle completes once every chunk is done.
    pub fn divide_by_async<'scope, 'env>(
        &'scope mut self,
        other: &'scope Channel,
        scope: &'scope Scope<'scope, 'env>,
        priority: Priority,
    ) -> ScopedHandle<'scope> {
        let divisor = other.data();
        scope.parallel_chunks_mut(&mut self.data, priority, move |offset, chunk| {
            for (i, value) in chunk.iter_mut().enumerate() {
                let d = divisor.get(offset + i).copied().unwrap_or(0.0);
                *value = if d != 0.0 { *value / d } else { 0.0 };
            }
        })
    }

    /// Multiplies every value by the matching value of `other` in parallel.
    pub fn multiply_with_async<'scope, 'env>(
        &'scope mut self,
        other: &'scope Channel,
        scope: &'scope Scope<'scope, 'env>,
        priority: Priority,
    ) -> ScopedHandle<'scope> {
        let factor = other.data();
        scope.parallel_chunks_mut(&mut self.data, priority, move |offset, chunk| {
            for (i, value) in chunk.iter_mut().enumerate() {
                *value *= factor.get(offset + i).copied().unwrap_or(0.0);
            }
        })
    }

    /// Blocking form of [`Channel::divide_by_async`].
    pub fn divide_by(
        &mut self,
        other: &Channel,
        scheduler: &Scheduler,
        priority: Priority,
    ) -> Result<(), TaskError> {
        scheduler
            .scope(|s| self.divide_by_async(other, s, priority).join())
            .and_then(|joined| joined)
    }

    /// Blocking form of [`Channel::multiply_with_async`].
    pub fn multiply_with(
        &mut self,
        other: &Channel,
        scheduler: &Scheduler,
        priority: Priority,
    ) -> Result<(), TaskError> {
        scheduler
            .scope(|s| self.multiply_with_async(other, s, priority).join())
            .and_then(|joined| joined)
    }

    // =========================================================================
    // Tile updates
    // =========================================================================

    /// Overwrites the `width` x `height` rectangle at `(x, y)` from a flat
    /// row-major buffer.
    ///
    /// A rectangle that does not fit into the channel, or a buffer with fewer
    /// than `width * height` values, is logged and ignored. Returns whether
    /// the tile was written.
    pub fn update_tile(&mut self, x: i32, y: i32, width: i32, height: i32, data: &[f32]) -> bool {
        let fits = x >= 0
            && y >= 0
            && width >= 0
            && height >= 0
            && x.checked_add(width).is_some_and(|r| r <= self.size.x)
            && y.checked_add(height).is_some_and(|b| b <= self.size.y);
        if !fits {
            warn!(
                channel = %self.name,
                x, y, width, height,
                size = %self.size,
                "Tile does not fit into the channel; ignoring update"
            );
            return false;
        }

        let (w, h) = (width as usize, height as usize);
        if data.len() < w * h {
            warn!(
                channel = %self.name,
                expected = w * h,
                actual = data.len(),
                "Tile buffer is too short; ignoring update"
            );
            return false;
        }

        let stride = self.size.x as usize;
        for (row, src) in data.chunks_exact(w.max(1)).take(h).enumerate() {
            let start = x as usize + (y as usize + row) * stride;
            self.data[start..start + w].copy_from_slice(&src[..w]);
        }
        true
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish()
    }
}
