//! CPU-side texture staging and deferred release.
//!
//! Images keep assembled RGBA buffers for the channel combinations that
//! have been displayed. GPU resources behind them may only be released on
//! the thread that owns the graphics context, so an image that is dropped
//! elsewhere sends its textures through a [`TextureReleaser`]. The owner
//! drains the matching [`TextureReleaseQueue`] on its own thread.
//!
//! # Example
//!
//! ```
//! use hdrview::image::{texture_release_channel, ImageTexture};
//!
//! let (releaser, mut queue) = texture_release_channel();
//! releaser.release(ImageTexture::new(vec!["R".into()], vec![[0.0, 0.0, 0.0, 1.0]]));
//!
//! assert_eq!(queue.drain().len(), 1);
//! ```

use tokio::sync::mpsc;
use tracing::debug;

/// Interleaved RGBA staging buffer for one channel combination.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTexture {
    /// Channels in RGBA order. Missing components are 0 (color) or 1 (alpha).
    pub channels: Vec<String>,
    /// One RGBA value per pixel, row-major.
    pub rgba: Vec<[f32; 4]>,
    /// Set when a tile update touched the texture after its mipmaps were built.
    pub mipmap_dirty: bool,
}

impl ImageTexture {
    pub fn new(channels: Vec<String>, rgba: Vec<[f32; 4]>) -> Self {
        Self {
            channels,
            rgba,
            mipmap_dirty: false,
        }
    }
}

/// Sending half of the texture release channel.
#[derive(Debug, Clone)]
pub struct TextureReleaser {
    tx: mpsc::UnboundedSender<ImageTexture>,
}

impl TextureReleaser {
    /// Hands a texture to the owning context.
    ///
    /// If the receiving side is gone the texture is dropped here.
    pub fn release(&self, texture: ImageTexture) {
        if self.tx.send(texture).is_err() {
            debug!("Texture release queue closed; dropping texture in place");
        }
    }
}

/// Receiving half of the texture release channel.
#[derive(Debug)]
pub struct TextureReleaseQueue {
    rx: mpsc::UnboundedReceiver<ImageTexture>,
}

impl TextureReleaseQueue {
    /// Takes the next released texture, if any.
    pub fn try_next(&mut self) -> Option<ImageTexture> {
        self.rx.try_recv().ok()
    }

    /// Takes every texture released so far.
    pub fn drain(&mut self) -> Vec<ImageTexture> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

/// Creates a connected releaser/queue pair.
pub fn texture_release_channel() -> (TextureReleaser, TextureReleaseQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TextureReleaser { tx }, TextureReleaseQueue { rx })
}
