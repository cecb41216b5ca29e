//! Validation errors for image data.

use crate::executor::TaskError;
use crate::image::Vector2i;
use thiserror::Error;

/// Errors raised while validating or normalizing image data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    /// The decoder produced no channels at all.
    #[error("images must have at least one channel")]
    NoChannels,

    /// The image has no pixels.
    #[error("image has zero pixels")]
    ZeroPixels,

    /// A channel's size differs from the data window's size.
    #[error(
        "all channels must have the same size as the data window ({channel}:{}x{} != {}x{})",
        .actual.x, .actual.y, .expected.x, .expected.y
    )]
    ChannelSizeMismatch {
        channel: String,
        actual: Vector2i,
        expected: Vector2i,
    },

    /// A window is degenerate after defaulting.
    #[error("invalid {which} window")]
    InvalidWindow { which: &'static str },

    /// The channel selector filtered out every channel.
    #[error("no channel matches the selector '{selector}'")]
    NoMatchingChannels { selector: String },

    /// A selector pattern could not be compiled.
    #[error("invalid channel selector pattern '{pattern}': {reason}")]
    InvalidSelector { pattern: String, reason: String },

    #[error("cannot multiply with alpha twice")]
    AlreadyPremultiplied,

    #[error("cannot divide by alpha twice")]
    NotPremultiplied,

    /// A named channel does not exist.
    #[error("channel '{0}' does not exist")]
    UnknownChannel(String),

    /// A parallel sub-task failed.
    #[error(transparent)]
    Task(#[from] TaskError),
}
