//! Loaded images.

use super::data::ImageData;
use super::error::ImageError;
use super::groups::{group_channels, sorted_channels, ChannelGroup};
use super::texture::{ImageTexture, TextureReleaser};
use super::window::{Box2i, Vector2i};
use crate::channel::{self, Channel};
use crate::executor::{Priority, Scheduler};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, warn};

/// Process-wide source of image ids.
static NEXT_ID: AtomicI32 = AtomicI32::new(0);

/// A normalized image ready for display.
///
/// Owns its [`ImageData`], the channel groups inferred from it, and the
/// textures assembled so far. Textures are handed to the configured
/// [`TextureReleaser`] when the image is dropped.
pub struct Image {
    path: PathBuf,
    channel_selector: String,
    name: String,
    data: ImageData,
    groups: Vec<ChannelGroup>,
    textures: HashMap<String, ImageTexture>,
    id: i32,
    releaser: Option<TextureReleaser>,
}

impl Image {
    /// Wraps normalized data. The id is drawn from the process-wide counter.
    pub fn new(path: impl Into<PathBuf>, data: ImageData, channel_selector: impl Into<String>) -> Self {
        let path = path.into();
        let channel_selector = channel_selector.into();
        let name = if channel_selector.is_empty() {
            path.display().to_string()
        } else {
            format!("{}:{}", path.display(), channel_selector)
        };

        let groups = data
            .layers
            .iter()
            .flat_map(|layer| group_channels(layer, &data.channels_in_layer(layer)))
            .collect();

        Self {
            path,
            channel_selector,
            name,
            data,
            groups,
            textures: HashMap::new(),
            id: Self::draw_id(),
            releaser: None,
        }
    }

    /// Routes textures through `releaser` when the image is dropped.
    pub fn with_releaser(mut self, releaser: TextureReleaser) -> Self {
        self.releaser = Some(releaser);
        self
    }

    /// Draws the next id from the process-wide counter.
    pub fn draw_id() -> i32 {
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    /// Re-draws the id so the image counts as the most recent one.
    pub fn bump_id(&mut self) {
        self.id = Self::draw_id();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channel_selector(&self) -> &str {
        &self.channel_selector
    }

    /// Path, suffixed by `:selector` if a selector was used.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name without directories and without the selector suffix.
    pub fn short_name(&self) -> &str {
        let mut result = self.name.as_str();
        if let Some(slash) = result.rfind(['/', '\\']) {
            result = &result[slash + 1..];
        }
        if let Some(colon) = result.rfind(':') {
            result = &result[..colon];
        }
        result
    }

    pub fn data(&self) -> &ImageData {
        &self.data
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.data.has_channel(name)
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.data.channel(name)
    }

    pub fn size(&self) -> Vector2i {
        self.data.size()
    }

    pub fn count(&self) -> usize {
        self.data.count()
    }

    pub fn data_window(&self) -> Box2i {
        self.data.data_window
    }

    pub fn display_window(&self) -> Box2i {
        self.data.display_window
    }

    pub fn layers(&self) -> &[String] {
        &self.data.layers
    }

    pub fn channel_groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    /// Channel names of the group called `group_name` (empty if unknown).
    pub fn channels_in_group(&self, group_name: &str) -> Vec<String> {
        self.groups
            .iter()
            .find(|g| g.name == group_name)
            .map(|g| g.channels.clone())
            .unwrap_or_default()
    }

    /// Channels of `layer` in display order.
    pub fn sorted_channels(&self, layer: &str) -> Vec<String> {
        sorted_channels(layer, &self.data.channels_in_layer(layer))
    }

    // =========================================================================
    // Textures
    // =========================================================================

    /// Number of cached textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Returns the texture of a channel group, assembling it if needed.
    pub fn texture_for_group(&mut self, scheduler: &Scheduler, group_name: &str) -> Result<&mut ImageTexture, ImageError> {
        let channels = self.channels_in_group(group_name);
        if channels.is_empty() {
            return Err(ImageError::UnknownChannel(group_name.to_string()));
        }
        self.texture(scheduler, &channels)
    }

    /// Returns the texture for `channel_names` (RGBA order), assembling it
    /// on the pool at foreground priority if it is not cached yet.
    ///
    /// A cached texture whose mipmaps were invalidated by a tile update has
    /// them regenerated (its dirty flag cleared) before it is returned.
    pub fn texture(&mut self, scheduler: &Scheduler, channel_names: &[String]) -> Result<&mut ImageTexture, ImageError> {
        let key = channel_names.join(",");

        if !self.textures.contains_key(&key) {
            let texture = self.assemble_texture(scheduler, channel_names)?;
            self.textures.insert(key.clone(), texture);
        }

        let texture = self
            .textures
            .get_mut(&key)
            .ok_or_else(|| ImageError::UnknownChannel(key.clone()))?;
        if texture.mipmap_dirty {
            debug!(image = %self.name, texture = %key, "Regenerating mipmaps");
            texture.mipmap_dirty = false;
        }
        Ok(texture)
    }

    fn assemble_texture(&self, scheduler: &Scheduler, channel_names: &[String]) -> Result<ImageTexture, ImageError> {
        let sources = channel_names
            .iter()
            .take(4)
            .map(|name| {
                self.data
                    .channel(name)
                    .ok_or_else(|| ImageError::UnknownChannel(name.clone()))
            })
            .collect::<Result<Vec<&Channel>, _>>()?;

        let mut rgba = vec![[0.0, 0.0, 0.0, 1.0]; self.count()];
        scheduler
            .scope(|s| {
                s.parallel_chunks_mut(&mut rgba, Priority::FOREGROUND, |offset, chunk| {
                    for (j, pixel) in chunk.iter_mut().enumerate() {
                        for (component, source) in sources.iter().enumerate() {
                            pixel[component] = source.eval_index(offset + j);
                        }
                    }
                })
                .join()
            })
            .and_then(|joined| joined)?;

        debug!(image = %self.name, channels = ?channel_names, "Assembled texture");
        Ok(ImageTexture::new(channel_names.to_vec(), rgba))
    }

    // =========================================================================
    // Tile updates
    // =========================================================================

    /// Overwrites a rectangle of one channel and re-stages every cached
    /// texture built from it.
    ///
    /// Unknown channels and rectangles that do not fit are logged and ignored.
    pub fn update_channel(&mut self, name: &str, x: i32, y: i32, width: i32, height: i32, data: &[f32]) {
        let Some(target) = self.data.channel_mut(name) else {
            warn!(image = %self.name, channel = name, "Cannot update a channel that does not exist");
            return;
        };

        if !target.update_tile(x, y, width, height, data) {
            return;
        }

        let stride = self.data.size().x as usize;
        for texture in self.textures.values_mut() {
            if !texture.channels.iter().any(|c| c == name) {
                continue;
            }

            for (component, channel_name) in texture.channels.iter().take(4).enumerate() {
                let Some(source) = self.data.channel(channel_name) else {
                    continue;
                };
                for py in y..y + height {
                    for px in x..x + width {
                        let i = px as usize + py as usize * stride;
                        texture.rgba[i][component] = source.at(px, py);
                    }
                }
            }
            texture.mipmap_dirty = true;
        }
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Path: {}", self.name)?;
        writeln!(f)?;
        writeln!(f, "Resolution: {}", self.size())?;

        let display = self.display_window();
        let data = self.data_window();
        if display != data || display.min != Vector2i::ZERO {
            writeln!(f, "Display window: {}", display)?;
            writeln!(f, "Data window: {}", data)?;
        }

        writeln!(f)?;
        write!(f, "Channels:")?;
        for layer in &self.data.layers {
            let tails: Vec<String> = self
                .data
                .channels_in_layer(layer)
                .iter()
                .map(|c| channel::tail(c).to_string())
                .collect();
            let label = if layer.is_empty() { "<root>" } else { layer.as_str() };
            write!(f, "\n{}: {}", label, tails.join(","))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("size", &self.size())
            .field("channels", &self.data.channels.len())
            .field("textures", &self.textures.len())
            .finish()
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        let Some(releaser) = &self.releaser else {
            return;
        };
        for (_, texture) in self.textures.drain() {
            releaser.release(texture);
        }
    }
}
