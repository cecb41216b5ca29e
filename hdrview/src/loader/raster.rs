//! Fallback decoder for common raster formats.
//!
//! Delegates to the `image` crate, which covers PNG, JPEG, BMP, TGA, TIFF,
//! Radiance HDR, OpenEXR and more. Float pixel formats are taken verbatim;
//! integer formats are normalized to `[0, 1]` by the decoder and their color
//! channels are then converted from sRGB to linear. Alpha is never
//! transformed.

use super::error::LoadError;
use super::header::peek_prefix;
use super::{ImageLoader, ReadSeek};
use crate::channel::Channel;
use crate::color::to_linear;
use crate::executor::{join_all, Priority, Scheduler, ScopedHandle};
use crate::image::{Box2i, ImageData, Vector2i};
use image::{ColorType, DynamicImage, ImageReader};
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Number of leading bytes handed to format detection.
const PROBE_LEN: usize = 32;

/// Decoder backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterLoader;

/// Channel names for an interleaved layout with `count` samples per pixel.
fn channel_names(count: usize) -> &'static [&'static str] {
    match count {
        1 => &["L"],
        2 => &["L", "A"],
        3 => &["R", "G", "B"],
        _ => &["R", "G", "B", "A"],
    }
}

/// Flattens a decoded image into interleaved `f32` samples.
///
/// Returns the samples, the sample count per pixel, and whether the values
/// are already linear.
fn interleaved_samples(image: DynamicImage) -> (Vec<f32>, usize, bool) {
    match image.color() {
        ColorType::Rgb32F => (image.into_rgb32f().into_raw(), 3, true),
        ColorType::Rgba32F => (image.into_rgba32f().into_raw(), 4, true),
        color => match color.channel_count() {
            1 => (image.to_luma32f().into_raw(), 1, false),
            2 => (image.to_luma_alpha32f().into_raw(), 2, false),
            3 => (image.to_rgb32f().into_raw(), 3, false),
            _ => (image.to_rgba32f().into_raw(), 4, false),
        },
    }
}

impl ImageLoader for RasterLoader {
    fn name(&self) -> &str {
        "raster"
    }

    fn can_load(&self, stream: &mut dyn ReadSeek) -> bool {
        peek_prefix(stream, PROBE_LEN)
            .map(|prefix| image::guess_format(&prefix).is_ok())
            .unwrap_or(false)
    }

    fn load(
        &self,
        stream: &mut dyn ReadSeek,
        _path: &Path,
        _channel_selector: &str,
        scheduler: &Scheduler,
        priority: Priority,
    ) -> Result<Vec<ImageData>, LoadError> {
        let decoded = ImageReader::new(BufReader::new(stream))
            .with_guessed_format()?
            .decode()?;

        let size = Vector2i::new(decoded.width() as i32, decoded.height() as i32);
        if size.area() == 0 {
            return Err(LoadError::format("image has zero pixels"));
        }

        let color = decoded.color();
        let (samples, count, linear) = interleaved_samples(decoded);
        let alpha_index = (count % 2 == 0).then_some(count - 1);
        debug!(?color, channels = count, linear, "Decoded raster image");

        let mut channels: Vec<Channel> = channel_names(count)
            .iter()
            .map(|&name| Channel::new(name, size))
            .collect();
        let samples = samples.as_slice();

        scheduler
            .scope(|s| {
                let handles: Vec<ScopedHandle<'_>> = channels
                    .iter_mut()
                    .enumerate()
                    .map(|(c, channel)| {
                        let convert = !linear && alpha_index != Some(c);
                        s.parallel_chunks_mut(channel.data_mut(), priority, move |offset, chunk| {
                            for (i, value) in chunk.iter_mut().enumerate() {
                                let sample = samples[(offset + i) * count + c];
                                *value = if convert { to_linear(sample) } else { sample };
                            }
                        })
                    })
                    .collect();
                join_all(handles)
            })
            .and_then(|joined| joined)?;

        let mut data = ImageData::new(channels);
        data.layers = vec![String::new()];
        data.data_window = Box2i::from_size(size);
        data.display_window = Box2i::from_size(size);
        data.has_premultiplied_alpha = false;

        Ok(vec![data])
    }
}
