//! Image decoders and load dispatch.
//!
//! Decoders implement [`ImageLoader`]. An [`ImageLoaders`] registry holds
//! them in a fixed order and turns a stream into normalized [`Image`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ImageLoaders                           │
//! │                                                              │
//! │  stream ──► empty? ──no──► pfm? ──no──► raster (always tried)│
//! │               │yes           │yes            │               │
//! │               ▼              ▼               ▼               │
//! │          Vec<ImageData> ──ensure_valid──► Vec<Image>         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every failure (I/O, format, validation, concurrency) stops at
//! [`ImageLoaders::try_load_image`]: it is logged with the path and selector
//! and the caller receives an empty list.
//!
//! # Example
//!
//! ```
//! use hdrview::executor::{Priority, ThreadPool};
//! use hdrview::loader::ImageLoaders;
//! use std::io::Cursor;
//! use std::path::Path;
//!
//! let pool = ThreadPool::new(2);
//! let loaders = ImageLoaders::new();
//!
//! let mut stream = Cursor::new(b"empty 2 2 1\n1 Z".to_vec());
//! let images = loaders.try_load_image(
//!     &pool.scheduler(),
//!     Path::new("synthetic"),
//!     &mut stream,
//!     "",
//!     Priority::DEFAULT,
//! );
//!
//! assert_eq!(images.len(), 1);
//! assert_eq!(images[0].data().channels[0].name(), "Z");
//! ```

mod empty;
mod error;
mod header;
mod pfm;
mod raster;

pub use empty::EmptyLoader;
pub use error::LoadError;
pub use pfm::PfmLoader;
pub use raster::RasterLoader;

use crate::executor::{Priority, Scheduler, TaskError};
use crate::image::{
    split_patterns, ChannelSelector, Image, ImageData, SelectorMode, TextureReleaser,
};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// A seekable byte stream.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

// =============================================================================
// Loader Contract
// =============================================================================

/// A decoder for one family of image formats.
///
/// Implementations must be stateless with respect to a single load so that
/// one instance can serve concurrent loads.
pub trait ImageLoader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Cheap probe of the leading bytes.
    ///
    /// Must not fail and must leave the stream where it found it.
    fn can_load(&self, stream: &mut dyn ReadSeek) -> bool;

    /// Decodes the stream into one or more images.
    ///
    /// Multi-part containers return one [`ImageData`] per part with
    /// `part_name` set. Parallel work goes to `scheduler` at `priority`.
    fn load(
        &self,
        stream: &mut dyn ReadSeek,
        path: &Path,
        channel_selector: &str,
        scheduler: &Scheduler,
        priority: Priority,
    ) -> Result<Vec<ImageData>, LoadError>;
}

// =============================================================================
// Registry
// =============================================================================

/// Ordered set of decoders plus load dispatch.
#[derive(Clone)]
pub struct ImageLoaders {
    loaders: Vec<Arc<dyn ImageLoader>>,
    selector_mode: SelectorMode,
    releaser: Option<TextureReleaser>,
}

impl Default for ImageLoaders {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoaders {
    /// The built-in decoders: `empty`, `pfm`, then `raster` as the fallback.
    pub fn new() -> Self {
        Self::with_loaders(vec![
            Arc::new(EmptyLoader),
            Arc::new(PfmLoader),
            Arc::new(RasterLoader),
        ])
    }

    /// A registry with a custom decoder list. The last one is the fallback.
    pub fn with_loaders(loaders: Vec<Arc<dyn ImageLoader>>) -> Self {
        Self {
            loaders,
            selector_mode: SelectorMode::default(),
            releaser: None,
        }
    }

    /// Set how channel selectors are interpreted.
    pub fn with_selector_mode(mut self, mode: SelectorMode) -> Self {
        self.selector_mode = mode;
        self
    }

    /// Hand every loaded image a texture releaser.
    pub fn with_releaser(mut self, releaser: TextureReleaser) -> Self {
        self.releaser = Some(releaser);
        self
    }

    pub fn selector_mode(&self) -> SelectorMode {
        self.selector_mode
    }

    /// Decoder names in probe order.
    pub fn names(&self) -> Vec<&str> {
        self.loaders.iter().map(|l| l.name()).collect()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Loads `path` from disk. See [`ImageLoaders::try_load_image`].
    pub fn try_load_path(
        &self,
        scheduler: &Scheduler,
        path: &Path,
        channel_selector: &str,
        priority: Priority,
    ) -> Vec<Image> {
        // Fall back to the path as given if it cannot be made absolute.
        let path: PathBuf = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        match File::open(&path) {
            Ok(file) => {
                let mut stream = BufReader::new(file);
                self.try_load_image(scheduler, &path, &mut stream, channel_selector, priority)
            }
            Err(e) => {
                log_failure(&path, channel_selector, &LoadError::Io(e));
                Vec::new()
            }
        }
    }

    /// Decodes and normalizes every image in `stream`.
    ///
    /// Decoders are probed in registration order; the last one is attempted
    /// even if its probe fails. Any failure, including a panicking decoder, is
    /// logged and yields an empty list.
    pub fn try_load_image(
        &self,
        scheduler: &Scheduler,
        path: &Path,
        stream: &mut dyn ReadSeek,
        channel_selector: &str,
        priority: Priority,
    ) -> Vec<Image> {
        let start = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.load_images(scheduler, path, stream, channel_selector, priority)
        }))
        .unwrap_or_else(|payload| Err(LoadError::Concurrency(TaskError::from_panic(payload))));

        match result {
            Ok((loader, images)) => {
                info!(
                    path = %path.display(),
                    loader,
                    images = images.len(),
                    elapsed_secs = %format!("{:.3}", start.elapsed().as_secs_f64()),
                    "Loaded image"
                );
                images
            }
            Err(e) => {
                log_failure(path, channel_selector, &e);
                Vec::new()
            }
        }
    }

    fn load_images(
        &self,
        scheduler: &Scheduler,
        path: &Path,
        stream: &mut dyn ReadSeek,
        channel_selector: &str,
        priority: Priority,
    ) -> Result<(&str, Vec<Image>), LoadError> {
        let selector = ChannelSelector::new(channel_selector, self.selector_mode);
        let last = self.loaders.len().saturating_sub(1);

        for (index, loader) in self.loaders.iter().enumerate() {
            stream.rewind()?;
            let use_loader = index == last || loader.can_load(stream);
            stream.rewind()?;

            if !use_loader {
                continue;
            }

            debug!(path = %path.display(), loader = loader.name(), "Decoding");
            let decoded = loader.load(stream, path, channel_selector, scheduler, priority)?;
            if decoded.is_empty() {
                return Err(LoadError::format("decoder produced no images"));
            }

            let mut images = Vec::with_capacity(decoded.len());
            for mut data in decoded {
                data.ensure_valid(scheduler, &selector, priority)?;

                let local_selector = part_selector(channel_selector, &data.part_name);
                let mut image = Image::new(path, data, local_selector);
                if let Some(releaser) = &self.releaser {
                    image = image.with_releaser(releaser.clone());
                }
                images.push(image);
            }

            return Ok((loader.name(), images));
        }

        Err(LoadError::format("no suitable image loader found"))
    }
}

impl std::fmt::Debug for ImageLoaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoaders")
            .field("loaders", &self.names())
            .field("selector_mode", &self.selector_mode)
            .finish()
    }
}

/// Folds a container part name into the selector used to name an image.
///
/// An empty selector becomes the part name; a part name that is not already
/// one of the selector's entries is prepended.
pub fn part_selector(channel_selector: &str, part_name: &str) -> String {
    if part_name.is_empty() {
        return channel_selector.to_string();
    }
    if channel_selector.is_empty() {
        return part_name.to_string();
    }
    if split_patterns(channel_selector).iter().any(|p| p == part_name) {
        channel_selector.to_string()
    } else {
        format!("{},{}", part_name, channel_selector)
    }
}

fn log_failure(path: &Path, channel_selector: &str, err: &LoadError) {
    if channel_selector.is_empty() {
        error!(path = %path.display(), error = %err, "Could not load image");
    } else {
        error!(
            path = %path.display(),
            selector = channel_selector,
            error = %err,
            "Could not load image"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ThreadPool;
    use crate::image::{texture_release_channel, Vector2i};
    use crate::channel::Channel;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Claims every stream and produces one part per entry in `parts`.
    struct PartsLoader {
        parts: Vec<&'static str>,
        probes: AtomicUsize,
    }

    impl ImageLoader for PartsLoader {
        fn name(&self) -> &str {
            "parts"
        }

        fn can_load(&self, _stream: &mut dyn ReadSeek) -> bool {
            self.probes.fetch_add(1, Ordering::Relaxed);
            false
        }

        fn load(
            &self,
            _stream: &mut dyn ReadSeek,
            _path: &Path,
            _channel_selector: &str,
            _scheduler: &Scheduler,
            _priority: Priority,
        ) -> Result<Vec<ImageData>, LoadError> {
            Ok(self
                .parts
                .iter()
                .map(|part| {
                    let mut data = ImageData::new(vec![Channel::new("Y", Vector2i::new(1, 1))]);
                    data.part_name = part.to_string();
                    data.has_premultiplied_alpha = true;
                    data
                })
                .collect())
        }
    }

    fn load(loaders: &ImageLoaders, bytes: &[u8], selector: &str) -> Vec<Image> {
        let pool = ThreadPool::new(2);
        let mut stream = Cursor::new(bytes.to_vec());
        loaders.try_load_image(
            &pool.scheduler(),
            Path::new("test-input"),
            &mut stream,
            selector,
            Priority::DEFAULT,
        )
    }

    #[test]
    fn test_registration_order() {
        assert_eq!(ImageLoaders::new().names(), vec!["empty", "pfm", "raster"]);
    }

    #[test]
    fn test_part_selector() {
        assert_eq!(part_selector("", ""), "");
        assert_eq!(part_selector("R,G", ""), "R,G");
        assert_eq!(part_selector("", "beauty"), "beauty");
        assert_eq!(part_selector("R,G", "beauty"), "beauty,R,G");
        assert_eq!(part_selector("R, beauty", "beauty"), "R, beauty");
    }

    #[test]
    fn test_last_loader_is_always_attempted() {
        let parts = Arc::new(PartsLoader {
            parts: vec![""],
            probes: AtomicUsize::new(0),
        });
        let loaders = ImageLoaders::with_loaders(vec![Arc::new(EmptyLoader), parts.clone()]);

        let images = load(&loaders, b"not an empty file", "");
        assert_eq!(images.len(), 1);
        // The fallback is not even probed
        assert_eq!(parts.probes.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_part_names_are_folded_into_image_names() {
        let loaders = ImageLoaders::with_loaders(vec![Arc::new(PartsLoader {
            parts: vec!["left", "right"],
            probes: AtomicUsize::new(0),
        })]);

        let images = load(&loaders, b"", "Y");
        let names: Vec<&str> = images.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["test-input:left,Y", "test-input:right,Y"]);
    }

    #[test]
    fn test_unrecognized_input_yields_nothing() {
        let images = load(&ImageLoaders::new(), b"definitely not an image", "");
        assert!(images.is_empty());
    }

    #[test]
    fn test_validation_failure_yields_nothing() {
        let images = load(&ImageLoaders::new(), b"empty 2 2 1\n1 Z", "no-such-channel");
        assert!(images.is_empty());
    }

    #[test]
    fn test_oversized_headers_yield_nothing() {
        let loaders = ImageLoaders::new();
        assert!(load(&loaders, b"PF\n2147483647 2147483647\n-1.0\n", "").is_empty());
        assert!(load(&loaders, b"empty 2147483647 2147483647 1\n1Z", "").is_empty());
    }

    #[test]
    fn test_no_loaders() {
        let images = load(&ImageLoaders::with_loaders(Vec::new()), b"empty 1 1 1\n1 Z", "");
        assert!(images.is_empty());
    }

    #[test]
    fn test_releaser_is_attached() {
        let pool = ThreadPool::new(1);
        let (releaser, mut queue) = texture_release_channel();
        let loaders = ImageLoaders::new().with_releaser(releaser);
        let mut stream = Cursor::new(b"empty 1 1 1\n1 Z".to_vec());

        let mut images = loaders.try_load_image(
            &pool.scheduler(),
            Path::new("x"),
            &mut stream,
            "",
            Priority::DEFAULT,
        );
        images[0].texture(&pool.scheduler(), &["Z".to_string()]).unwrap();
        drop(images);

        assert_eq!(queue.drain().len(), 1);
    }

    /// Panics whenever it is asked to decode.
    struct PanickingLoader;

    impl ImageLoader for PanickingLoader {
        fn name(&self) -> &str {
            "panicking"
        }

        fn can_load(&self, _stream: &mut dyn ReadSeek) -> bool {
            true
        }

        fn load(
            &self,
            _stream: &mut dyn ReadSeek,
            path: &Path,
            _channel_selector: &str,
            _scheduler: &Scheduler,
            _priority: Priority,
        ) -> Result<Vec<ImageData>, LoadError> {
            panic!("decoder bug while reading {}", path.display());
        }
    }

    #[test]
    fn test_panicking_decoder_yields_nothing() {
        let loaders = ImageLoaders::with_loaders(vec![Arc::new(PanickingLoader)]);
        assert!(load(&loaders, b"anything", "").is_empty());

        // The registry stays usable afterwards
        assert!(load(&loaders, b"anything else", "").is_empty());
    }

    #[test]
    fn test_missing_file_yields_nothing() {
        let pool = ThreadPool::new(1);
        let images = ImageLoaders::new().try_load_path(
            &pool.scheduler(),
            Path::new("/definitely/not/here.pfm"),
            "",
            Priority::DEFAULT,
        );
        assert!(images.is_empty());
    }
}
