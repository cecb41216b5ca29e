//! Decoded image payload and its normalization.
//!
//! Decoders fill an [`ImageData`] with channels and, optionally, windows,
//! layers and a part name. [`ImageData::ensure_valid`] then brings it into
//! the canonical shape every consumer relies on:
//!
//! - both windows are valid (defaulted to the first channel's extent)
//! - every channel has the data window's size
//! - channels are filtered and ordered by the channel selector
//! - the layer list is known
//! - color channels are premultiplied by their layer's alpha

use super::error::ImageError;
use super::selector::ChannelSelector;
use super::window::{Box2i, Vector2i};
use crate::channel::{self, Channel};
use crate::executor::{join_all, Priority, Scheduler, ScopedHandle};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Channels, layers and windows produced by a decoder.
#[derive(Debug, Clone, Default)]
pub struct ImageData {
    /// Channels in decode order (selector order after normalization).
    pub channels: Vec<Channel>,
    /// Layer names. Derived from the channel names if left empty.
    pub layers: Vec<String>,
    pub data_window: Box2i,
    pub display_window: Box2i,
    pub has_premultiplied_alpha: bool,
    /// Name of the container part this data came from, if any.
    pub part_name: String,
}

impl ImageData {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            channels,
            ..Default::default()
        }
    }

    /// Size of the first channel.
    pub fn size(&self) -> Vector2i {
        self.channels
            .first()
            .map_or(Vector2i::ZERO, |c| c.size())
    }

    /// Pixel count of the first channel.
    pub fn count(&self) -> usize {
        self.channels.first().map_or(0, |c| c.count())
    }

    /// Names of the channels whose head is exactly `layer`.
    pub fn channels_in_layer(&self, layer: &str) -> Vec<String> {
        self.channels
            .iter()
            .filter(|c| channel::head(c.name()) == layer)
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channel(name).is_some()
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name() == name)
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.name() == name)
    }

    // =========================================================================
    // Alpha
    // =========================================================================

    /// Premultiplies color channels by their layer's alpha.
    pub fn multiply_alpha(&mut self, scheduler: &Scheduler, priority: Priority) -> Result<(), ImageError> {
        if self.has_premultiplied_alpha {
            return Err(ImageError::AlreadyPremultiplied);
        }
        self.alpha_operation(scheduler, priority, AlphaOp::Multiply)?;
        self.has_premultiplied_alpha = true;
        Ok(())
    }

    /// Undoes [`ImageData::multiply_alpha`]. Pixels with zero alpha become zero.
    pub fn unmultiply_alpha(&mut self, scheduler: &Scheduler, priority: Priority) -> Result<(), ImageError> {
        if !self.has_premultiplied_alpha {
            return Err(ImageError::NotPremultiplied);
        }
        self.alpha_operation(scheduler, priority, AlphaOp::Divide)?;
        self.has_premultiplied_alpha = false;
        Ok(())
    }

    /// Applies `op` to every non-alpha channel of every layer that has an
    /// alpha channel, one unit per channel.
    fn alpha_operation(&mut self, scheduler: &Scheduler, priority: Priority, op: AlphaOp) -> Result<(), ImageError> {
        let alpha_names: HashMap<String, &str> = self
            .layers
            .iter()
            .map(|layer| (channel::alpha_name(layer), layer.as_str()))
            .collect();

        let (alphas, targets): (Vec<&mut Channel>, Vec<&mut Channel>) = self
            .channels
            .iter_mut()
            .partition(|c| alpha_names.contains_key(c.name()));

        let alpha_by_layer: HashMap<&str, &Channel> = alphas
            .into_iter()
            .filter_map(|c| {
                let layer = *alpha_names.get(c.name())?;
                Some((layer, &*c))
            })
            .collect();

        let targets: Vec<(&mut Channel, &Channel)> = targets
            .into_iter()
            .filter_map(|target| {
                let alpha = *alpha_by_layer.get(channel::head(target.name()))?;
                Some((target, alpha))
            })
            .collect();

        if targets.is_empty() {
            return Ok(());
        }
        debug!(channels = targets.len(), ?op, "Applying alpha operation");

        scheduler
            .scope(|s| {
                let handles: Vec<ScopedHandle<'_>> = targets
                    .into_iter()
                    .map(|(target, alpha)| match op {
                        AlphaOp::Multiply => target.multiply_with_async(alpha, s, priority),
                        AlphaOp::Divide => target.divide_by_async(alpha, s, priority),
                    })
                    .collect();
                join_all(handles)
            })
            .and_then(|joined| joined)?;
        Ok(())
    }

    // =========================================================================
    // Normalization
    // =========================================================================

    /// Validates and normalizes decoder output.
    ///
    /// Fails if there are no channels, if the image has no pixels, if a
    /// channel's size differs from the data window's, or if the selector
    /// discards every channel. On success alpha is premultiplied.
    pub fn ensure_valid(
        &mut self,
        scheduler: &Scheduler,
        selector: &ChannelSelector,
        priority: Priority,
    ) -> Result<(), ImageError> {
        let first_size = match self.channels.first() {
            Some(c) => c.size(),
            None => return Err(ImageError::NoChannels),
        };

        if !self.data_window.is_valid() {
            self.data_window = Box2i::from_size(first_size);
        }
        if !self.display_window.is_valid() {
            self.display_window = Box2i::from_size(first_size);
        }

        if !self.data_window.is_valid() {
            return Err(ImageError::ZeroPixels);
        }
        if !self.display_window.is_valid() {
            return Err(ImageError::InvalidWindow { which: "display" });
        }

        let expected = self.data_window.size();
        if let Some(c) = self.channels.iter().find(|c| c.size() != expected) {
            return Err(ImageError::ChannelSizeMismatch {
                channel: c.name().to_string(),
                actual: c.size(),
                expected,
            });
        }

        if !selector.is_empty() {
            let names: Vec<&str> = self.channels.iter().map(Channel::name).collect();
            let order = selector.select(&names)?;
            if order.is_empty() {
                return Err(ImageError::NoMatchingChannels {
                    selector: selector.as_str().to_string(),
                });
            }

            let mut slots: Vec<Option<Channel>> = self.channels.drain(..).map(Some).collect();
            self.channels = order.into_iter().filter_map(|i| slots[i].take()).collect();
        }

        if self.layers.is_empty() {
            let heads: BTreeSet<&str> = self.channels.iter().map(|c| channel::head(c.name())).collect();
            self.layers = heads.into_iter().map(str::to_string).collect();
        }

        if !self.has_premultiplied_alpha {
            self.multiply_alpha(scheduler, priority)?;
        }

        debug_assert!(self.has_premultiplied_alpha);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum AlphaOp {
    Multiply,
    Divide,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ThreadPool;

    fn channel(name: &str, w: i32, h: i32, value: f32) -> Channel {
        let mut c = Channel::new(name, Vector2i::new(w, h));
        c.data_mut().fill(value);
        c
    }

    fn names(data: &ImageData) -> Vec<&str> {
        data.channels.iter().map(|c| c.name()).collect()
    }

    #[test]
    fn test_single_channel_defaults() {
        let pool = ThreadPool::new(2);
        let mut data = ImageData::new(vec![channel("Y", 4, 4, 1.0)]);

        data.ensure_valid(&pool.scheduler(), &ChannelSelector::default(), Priority::DEFAULT)
            .unwrap();

        let expected = Box2i::from_size(Vector2i::new(4, 4));
        assert_eq!(data.data_window, expected);
        assert_eq!(data.display_window, expected);
        assert!(data.has_premultiplied_alpha);
        assert_eq!(data.layers, vec![String::new()]);
    }

    #[test]
    fn test_no_channels_fails() {
        let pool = ThreadPool::new(1);
        let mut data = ImageData::default();
        let err = data
            .ensure_valid(&pool.scheduler(), &ChannelSelector::default(), Priority::DEFAULT)
            .unwrap_err();
        assert_eq!(err, ImageError::NoChannels);
    }

    #[test]
    fn test_zero_pixels_fails() {
        let pool = ThreadPool::new(1);
        let mut data = ImageData::new(vec![channel("Y", 0, 3, 0.0)]);
        let err = data
            .ensure_valid(&pool.scheduler(), &ChannelSelector::default(), Priority::DEFAULT)
            .unwrap_err();
        assert_eq!(err, ImageError::ZeroPixels);
    }

    #[test]
    fn test_size_mismatch_names_channel() {
        let pool = ThreadPool::new(1);
        let mut data = ImageData::new(vec![channel("R", 4, 4, 0.0), channel("G", 2, 4, 0.0)]);
        let err = data
            .ensure_valid(&pool.scheduler(), &ChannelSelector::default(), Priority::DEFAULT)
            .unwrap_err();
        assert_eq!(
            err,
            ImageError::ChannelSizeMismatch {
                channel: "G".to_string(),
                actual: Vector2i::new(2, 4),
                expected: Vector2i::new(4, 4),
            }
        );
    }

    #[test]
    fn test_explicit_data_window_must_match_channels() {
        let pool = ThreadPool::new(1);
        let mut data = ImageData::new(vec![channel("R", 4, 4, 0.0)]);
        data.data_window = Box2i::new(Vector2i::new(2, 2), Vector2i::new(5, 6));
        assert!(matches!(
            data.ensure_valid(&pool.scheduler(), &ChannelSelector::default(), Priority::DEFAULT),
            Err(ImageError::ChannelSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_selector_filters_and_orders() {
        let pool = ThreadPool::new(2);
        let mut data = ImageData::new(
            ["diffuse.R", "diffuse.G", "diffuse.B", "diffuse.A", "spec.R"]
                .iter()
                .map(|n| channel(n, 2, 2, 1.0))
                .collect(),
        );

        data.ensure_valid(&pool.scheduler(), &ChannelSelector::fuzzy("R,G,B"), Priority::DEFAULT)
            .unwrap();

        assert_eq!(names(&data), vec!["diffuse.R", "diffuse.G", "diffuse.B", "spec.R"]);
        assert_eq!(data.layers, vec!["diffuse".to_string(), "spec".to_string()]);
    }

    #[test]
    fn test_selector_without_matches_fails() {
        let pool = ThreadPool::new(1);
        let mut data = ImageData::new(vec![channel("R", 2, 2, 0.0)]);
        let err = data
            .ensure_valid(&pool.scheduler(), &ChannelSelector::fuzzy("depth"), Priority::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, ImageError::NoMatchingChannels { .. }));
    }

    #[test]
    fn test_decoder_layers_are_kept() {
        let pool = ThreadPool::new(1);
        let mut data = ImageData::new(vec![channel("R", 1, 1, 0.0)]);
        data.layers = vec!["custom".to_string()];
        data.has_premultiplied_alpha = true;
        data.ensure_valid(&pool.scheduler(), &ChannelSelector::default(), Priority::DEFAULT)
            .unwrap();
        assert_eq!(data.layers, vec!["custom".to_string()]);
    }

    #[test]
    fn test_premultiplies_per_layer() {
        let pool = ThreadPool::new(3);
        let mut data = ImageData::new(vec![
            channel("R", 2, 1, 0.8),
            channel("A", 2, 1, 0.5),
            channel("spec.R", 2, 1, 1.0),
            channel("spec.A", 2, 1, 0.25),
            channel("depth.Z", 2, 1, 3.0),
        ]);

        data.ensure_valid(&pool.scheduler(), &ChannelSelector::default(), Priority::DEFAULT)
            .unwrap();

        assert_eq!(data.channel("R").unwrap().data(), &[0.4, 0.4]);
        assert_eq!(data.channel("A").unwrap().data(), &[0.5, 0.5]);
        assert_eq!(data.channel("spec.R").unwrap().data(), &[0.25, 0.25]);
        // No alpha in this layer
        assert_eq!(data.channel("depth.Z").unwrap().data(), &[3.0, 3.0]);
    }

    #[test]
    fn test_already_premultiplied_data_is_untouched() {
        let pool = ThreadPool::new(1);
        let mut data = ImageData::new(vec![channel("R", 1, 1, 0.8), channel("A", 1, 1, 0.5)]);
        data.has_premultiplied_alpha = true;
        data.ensure_valid(&pool.scheduler(), &ChannelSelector::default(), Priority::DEFAULT)
            .unwrap();
        assert_eq!(data.channel("R").unwrap().data(), &[0.8]);
    }

    #[test]
    fn test_alpha_twice_fails() {
        let pool = ThreadPool::new(1);
        let scheduler = pool.scheduler();
        let mut data = ImageData::new(vec![channel("R", 1, 1, 0.8), channel("A", 1, 1, 0.5)]);
        data.layers = vec![String::new()];

        assert_eq!(
            data.unmultiply_alpha(&scheduler, Priority::DEFAULT),
            Err(ImageError::NotPremultiplied)
        );
        data.multiply_alpha(&scheduler, Priority::DEFAULT).unwrap();
        assert_eq!(
            data.multiply_alpha(&scheduler, Priority::DEFAULT),
            Err(ImageError::AlreadyPremultiplied)
        );
        data.unmultiply_alpha(&scheduler, Priority::DEFAULT).unwrap();
        assert!((data.channel("R").unwrap().at_index(0) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_channels_in_layer_uses_exact_head() {
        let data = ImageData::new(vec![
            channel("R", 1, 1, 0.0),
            channel("diffuse.R", 1, 1, 0.0),
            channel("diffuse.indirect.R", 1, 1, 0.0),
        ]);
        assert_eq!(data.channels_in_layer(""), vec!["R"]);
        assert_eq!(data.channels_in_layer("diffuse"), vec!["diffuse.R"]);
        assert_eq!(data.channels_in_layer("diffuse.indirect"), vec!["diffuse.indirect.R"]);
    }
}
