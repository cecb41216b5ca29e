//! Image data model.
//!
//! # Architecture
//!
//! ```text
//! decoder ──► ImageData ──ensure_valid──► ImageData ──► Image
//!             (raw channels,              (windows set,  (id, name,
//!              optional windows)           selector       channel groups,
//!                                          applied,       texture cache)
//!                                          premultiplied)
//! ```
//!
//! - [`ImageData`]: channels, layers and windows as decoded, plus the
//!   normalization that every loader result goes through.
//! - [`ChannelSelector`]: comma-separated fuzzy or regex channel patterns.
//! - [`group_channels`]: infers displayable RGBA combinations per layer.
//! - [`Image`]: the normalized result handed to the viewer.

mod data;
mod error;
mod groups;
#[allow(clippy::module_inception)]
mod image;
mod selector;
mod texture;
mod window;

pub use data::ImageData;
pub use error::ImageError;
pub use groups::{group_channels, sorted_channels, ChannelGroup};
pub use image::Image;
pub use selector::{split_patterns, ChannelSelector, SelectorMode};
pub use texture::{texture_release_channel, ImageTexture, TextureReleaseQueue, TextureReleaser};
pub use window::{Box2i, Vector2i};
