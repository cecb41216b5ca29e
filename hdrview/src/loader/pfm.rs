//! Portable float map decoder.
//!
//! # Format
//!
//! ```text
//! <magic> <width> <height> <scale>\n<float32 * width * height * channels>
//! ```
//!
//! | Magic | Channels   |
//! |-------|------------|
//! | `Pf`  | L          |
//! | `PF`  | R, G, B    |
//! | `PF4` | R, G, B, A |
//!
//! A negative scale marks little-endian payload. Rows are stored bottom to
//! top and samples are interleaved. Decoded values are multiplied by
//! `|scale|`.

use super::error::LoadError;
use super::header::{peek_prefix, sample_count, HeaderReader};
use super::{ImageLoader, ReadSeek};
use crate::channel::Channel;
use crate::executor::{join_all, Priority, Scheduler, ScopedHandle};
use crate::image::{Box2i, ImageData, Vector2i};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Decoder for `.pfm` files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfmLoader;

fn channel_names(magic: &str) -> Option<&'static [&'static str]> {
    match magic {
        "Pf" => Some(&["L"]),
        "PF" => Some(&["R", "G", "B"]),
        "PF4" => Some(&["R", "G", "B", "A"]),
        _ => None,
    }
}

impl ImageLoader for PfmLoader {
    fn name(&self) -> &str {
        "pfm"
    }

    fn can_load(&self, stream: &mut dyn ReadSeek) -> bool {
        matches!(peek_prefix(stream, 2).as_deref(), Ok([b'P', b'F' | b'f']))
    }

    fn load(
        &self,
        stream: &mut dyn ReadSeek,
        _path: &Path,
        _channel_selector: &str,
        scheduler: &Scheduler,
        priority: Priority,
    ) -> Result<Vec<ImageData>, LoadError> {
        let mut header = HeaderReader::new(&mut *stream);

        let magic = header.token()?;
        let names = channel_names(&magic)
            .ok_or_else(|| LoadError::format(format!("invalid magic PFM string {}", magic)))?;
        let size = Vector2i::new(header.parse("width")?, header.parse("height")?);
        let scale: f32 = header.parse("scale")?;

        if !scale.is_finite() || scale == 0.0 {
            return Err(LoadError::format(format!("invalid PFM scale {}", scale)));
        }

        let little_endian = scale < 0.0;
        let scale = scale.abs();
        let num_channels = names.len();
        let num_bytes = sample_count(size, num_channels)?
            .checked_mul(4)
            .ok_or_else(|| LoadError::format("PFM payload size overflows"))?;

        // Grows with the bytes actually present; channels are only allocated
        // once the whole payload was read.
        let mut payload = Vec::new();
        Read::take(&mut *stream, num_bytes as u64).read_to_end(&mut payload)?;
        if payload.len() < num_bytes {
            return Err(LoadError::format(format!(
                "not sufficient bytes to read ({} vs {})",
                payload.len(),
                num_bytes
            )));
        }

        debug!(
            magic = %magic,
            width = size.x,
            height = size.y,
            little_endian,
            "Decoding PFM payload"
        );

        let mut channels: Vec<Channel> = names.iter().map(|&name| Channel::new(name, size)).collect();
        let width = size.x as usize;
        let height = size.y as usize;
        let payload = payload.as_slice();

        scheduler
            .scope(|s| {
                let handles: Vec<ScopedHandle<'_>> = channels
                    .iter_mut()
                    .enumerate()
                    .map(|(c, channel)| {
                        s.parallel_chunks_mut(channel.data_mut(), priority, move |offset, chunk| {
                            for (i, value) in chunk.iter_mut().enumerate() {
                                let index = offset + i;
                                let (y, x) = (index / width, index % width);
                                let source_row = height - 1 - y;
                                let at = ((source_row * width + x) * num_channels + c) * 4;

                                let mut raw = [0u8; 4];
                                raw.copy_from_slice(&payload[at..at + 4]);
                                let sample = if little_endian {
                                    f32::from_le_bytes(raw)
                                } else {
                                    f32::from_be_bytes(raw)
                                };
                                *value = scale * sample;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ThreadPool;
    use std::io::Cursor;

    fn encode(magic: &str, width: usize, height: usize, scale: f32, rows_top_down: &[Vec<f32>]) -> Vec<u8> {
        let mut bytes = format!("{}\n{} {}\n{}\n", magic, width, height, scale).into_bytes();
        for row in rows_top_down.iter().rev() {
            for &v in row {
                if scale < 0.0 {
                    bytes.extend_from_slice(&v.to_le_bytes());
                } else {
                    bytes.extend_from_slice(&v.to_be_bytes());
                }
            }
        }
        bytes
    }

    fn decode(bytes: Vec<u8>) -> Result<Vec<ImageData>, LoadError> {
        let pool = ThreadPool::new(3);
        PfmLoader.load(
            &mut Cursor::new(bytes),
            Path::new("t.pfm"),
            "",
            &pool.scheduler(),
            Priority::DEFAULT,
        )
    }

    #[test]
    fn test_probe() {
        assert!(PfmLoader.can_load(&mut Cursor::new(b"PF\n".to_vec())));
        assert!(PfmLoader.can_load(&mut Cursor::new(b"Pf\n".to_vec())));
        assert!(!PfmLoader.can_load(&mut Cursor::new(b"P6\n".to_vec())));
        assert!(!PfmLoader.can_load(&mut Cursor::new(b"P".to_vec())));
    }

    #[test]
    fn test_grayscale_flipped_and_scaled() {
        let bytes = encode("Pf", 2, 2, -2.0, &[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let data = &decode(bytes).unwrap()[0];

        let luma = &data.channels[0];
        assert_eq!(luma.name(), "L");
        assert_eq!(luma.data(), &[2.0, 4.0, 6.0, 8.0]);
        assert_eq!(data.layers, vec![String::new()]);
        assert!(!data.has_premultiplied_alpha);
    }

    #[test]
    fn test_big_endian_rgb() {
        // One row, two pixels, interleaved RGB
        let bytes = encode("PF", 2, 1, 1.0, &[vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]]);
        let data = &decode(bytes).unwrap()[0];

        let names: Vec<&str> = data.channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["R", "G", "B"]);
        assert_eq!(data.channels[0].data(), &[0.1, 0.4]);
        assert_eq!(data.channels[2].data(), &[0.3, 0.6]);
    }

    #[test]
    fn test_rgba_channel_names() {
        let bytes = encode("PF4", 1, 1, -1.0, &[vec![1.0, 1.0, 1.0, 0.5]]);
        let data = &decode(bytes).unwrap()[0];
        assert_eq!(data.channels[3].name(), "A");
        assert_eq!(data.channels[3].at(0, 0), 0.5);
    }

    #[test]
    fn test_invalid_scale() {
        let bytes = encode("Pf", 1, 1, 0.0, &[vec![1.0]]);
        assert!(matches!(decode(bytes), Err(LoadError::Format(_))));

        let bytes = b"Pf\n1 1\nNaN\n\0\0\0\0".to_vec();
        assert!(matches!(decode(bytes), Err(LoadError::Format(_))));
    }

    #[test]
    fn test_bad_magic() {
        let bytes = encode("PF3", 1, 1, 1.0, &[vec![1.0, 1.0, 1.0]]);
        assert!(matches!(decode(bytes), Err(LoadError::Format(_))));
    }

    #[test]
    fn test_zero_pixels() {
        let bytes = encode("PF", 0, 4, 1.0, &[]);
        assert!(matches!(decode(bytes), Err(LoadError::Format(_))));
    }

    #[test]
    fn test_short_payload() {
        let mut bytes = encode("PF", 2, 2, -1.0, &[vec![0.0; 6], vec![0.0; 6]]);
        bytes.truncate(bytes.len() - 1);
        let err = decode(bytes).unwrap_err();
        assert!(err.to_string().contains("not sufficient bytes"));
    }

    #[test]
    fn test_oversized_header_is_a_format_error() {
        let bytes = b"PF\n2147483647 2147483647\n-1.0\n".to_vec();
        assert!(matches!(decode(bytes), Err(LoadError::Format(_))));

        let bytes = b"PF4\n100000 100000\n1.0\n\0\0\0\0".to_vec();
        assert!(matches!(decode(bytes), Err(LoadError::Format(_))));
    }

    #[test]
    fn test_large_header_with_missing_payload() {
        // Within limits, but the payload is absent
        let bytes = b"PF\n8192 8192\n-1.0\n\0\0\0\0".to_vec();
        let err = decode(bytes).unwrap_err();
        assert!(err.to_string().contains("not sufficient bytes"));
    }
}
