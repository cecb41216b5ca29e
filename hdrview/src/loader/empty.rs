//! Synthetic zero-filled images.
//!
//! Header layout, all ASCII:
//!
//! ```text
//! empty <width> <height> <channel count>
//! <len><name bytes> <len><name bytes> ...
//! ```
//!
//! Each channel name is length-prefixed so that it may contain whitespace.

use super::error::LoadError;
use super::header::{peek_prefix, sample_count, HeaderReader};
use super::{ImageLoader, ReadSeek};
use crate::channel::{self, Channel};
use crate::executor::{Priority, Scheduler};
use crate::image::{Box2i, ImageData, Vector2i};
use std::collections::BTreeSet;
use std::path::Path;

const MAGIC: &[u8] = b"empty";

/// Decoder for the `empty` format.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyLoader;

impl ImageLoader for EmptyLoader {
    fn name(&self) -> &str {
        "empty"
    }

    fn can_load(&self, stream: &mut dyn ReadSeek) -> bool {
        peek_prefix(stream, MAGIC.len()).is_ok_and(|prefix| prefix == MAGIC)
    }

    fn load(
        &self,
        stream: &mut dyn ReadSeek,
        _path: &Path,
        _channel_selector: &str,
        _scheduler: &Scheduler,
        _priority: Priority,
    ) -> Result<Vec<ImageData>, LoadError> {
        let mut header = HeaderReader::new(stream);

        let magic = header.token()?;
        if magic.as_bytes() != MAGIC {
            return Err(LoadError::format(format!("invalid magic empty string {}", magic)));
        }

        let size = Vector2i::new(header.parse("width")?, header.parse("height")?);
        let num_channels: usize = header.parse("channel count")?;

        sample_count(size, num_channels)?;

        let mut channels = Vec::with_capacity(num_channels.min(1024));
        let mut layers = BTreeSet::new();
        for _ in 0..num_channels {
            let (length, carried) = header.length_prefix()?;

            let mut name = Vec::new();
            match carried {
                Some(first) if length > 0 => {
                    name.push(first);
                    name.extend(header.bytes(length - 1)?);
                }
                Some(_) => return Err(LoadError::format("channel name is longer than its length prefix")),
                None => name.extend(header.bytes(length)?),
            }

            let name = String::from_utf8(name)
                .map_err(|_| LoadError::format("channel name is not valid UTF-8"))?;
            layers.insert(channel::head(&name).to_string());
            channels.push(Channel::new(name, size));
        }

        let mut data = ImageData::new(channels);
        data.layers = layers.into_iter().collect();
        data.data_window = Box2i::from_size(size);
        data.display_window = Box2i::from_size(size);
        // All zero, so trivially premultiplied.
        data.has_premultiplied_alpha = true;

        Ok(vec![data])
    }
}
