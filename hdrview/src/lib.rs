//! hdrview - image ingestion for HDR image viewers
//!
//! Decodes HDR and multi-layer images into named float channels, normalizes
//! them (windows, channel selection, alpha premultiplication), infers
//! displayable channel groups, and loads files concurrently on a priority
//! scheduled worker pool while publishing results in request order.
//!
//! # Modules
//!
//! - [`executor`]: priority worker pool, parallel-for, scoped units
//! - [`channel`]: named 2D float buffers
//! - [`image`]: image data, normalization, selectors, channel groups
//! - [`loader`]: decoder contract, shipped decoders and dispatch
//! - [`background`]: ordered asynchronous loading
//! - [`config`], [`logging`]: configuration file and tracing bootstrap
//!
//! # Example
//!
//! ```no_run
//! use hdrview::executor::{Priority, ThreadPool};
//! use hdrview::loader::ImageLoaders;
//! use std::path::Path;
//!
//! let pool = ThreadPool::new(0);
//! let loaders = ImageLoaders::new();
//!
//! for image in loaders.try_load_path(&pool.scheduler(), Path::new("render.pfm"), "", Priority::DEFAULT) {
//!     println!("{}", image);
//! }
//! ```

pub mod background;
pub mod channel;
pub mod color;
pub mod config;
pub mod executor;
pub mod image;
pub mod loader;
pub mod logging;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
