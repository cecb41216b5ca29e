//! Errors raised while loading an image.

use crate::executor::TaskError;
use crate::image::ImageError;
use thiserror::Error;

/// Errors that can occur while decoding a file.
///
/// These never escape [`ImageLoaders::try_load_image`](super::ImageLoaders::try_load_image);
/// they are logged there and turned into an empty result.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Reading the stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream is not valid for the decoder (bad magic, corrupt
    /// structure, unsupported pixel encoding).
    #[error("Format error: {0}")]
    Format(String),

    /// The raster decoder rejected the stream.
    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// The decoded data failed validation.
    #[error("Validation error: {0}")]
    Validation(ImageError),

    /// A parallel sub-task failed.
    #[error("Concurrency error: {0}")]
    Concurrency(#[from] TaskError),
}

impl LoadError {
    /// Creates a format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }
}

impl From<ImageError> for LoadError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::Task(task) => Self::Concurrency(task),
            other => Self::Validation(other),
        }
    }
}
