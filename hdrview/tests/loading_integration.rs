//! Integration tests for loading images from disk.
//!
//! These tests exercise the full path from a file on disk through decoder
//! dispatch, normalization and the background loader.
//!
//! Run with: `cargo test --test loading_integration`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use hdrview::background::BackgroundLoader;
use hdrview::executor::{Priority, ThreadPool};
use hdrview::image::{Box2i, SelectorMode, Vector2i};
use hdrview::loader::ImageLoaders;

// ============================================================================
// Helper Functions
// ============================================================================

fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// A little-endian `PF4` file, rows given top to bottom.
fn pfm_rgba(width: usize, rows_top_down: &[Vec<[f32; 4]>]) -> Vec<u8> {
    let mut bytes = format!("PF4\n{} {}\n-1.0\n", width, rows_top_down.len()).into_bytes();
    for row in rows_top_down.iter().rev() {
        for pixel in row {
            for v in pixel {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    bytes
}

fn load(path: &Path, selector: &str) -> Vec<hdrview::image::Image> {
    let pool = ThreadPool::new(2);
    ImageLoaders::new().try_load_path(&pool.scheduler(), path, selector, Priority::DEFAULT)
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_empty_format_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "blank.empty", b"empty 2 2 1\n1 Z");

    let images = load(&path, "");
    assert_eq!(images.len(), 1);

    let image = &images[0];
    assert_eq!(image.count(), 1);
    assert_eq!(image.layers(), &["".to_string()]);
    assert_eq!(image.data_window(), Box2i::from_size(Vector2i::new(2, 2)));
    assert_eq!(image.display_window(), image.data_window());

    let z = image.channel("Z").unwrap();
    assert_eq!(z.data(), &[0.0; 4]);
}

#[test]
fn test_pfm_is_premultiplied_on_load() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "quad.pfm",
        &pfm_rgba(2, &[vec![[1.0, 0.5, 0.25, 0.5], [2.0, 2.0, 2.0, 0.0]]]),
    );

    let images = load(&path, "");
    let image = &images[0];
    assert!(image.data().has_premultiplied_alpha);
    assert_eq!(image.channel("R").unwrap().data(), &[0.5, 0.0]);
    assert_eq!(image.channel("A").unwrap().data(), &[0.5, 0.0]);
    assert_eq!(image.channel_groups()[0].name, "R,G,B,A");
}

#[test]
fn test_selector_reorders_and_names_image() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "layers.empty", b"empty 1 1 5\n9diffuse.R 9diffuse.G 9diffuse.B 9diffuse.A 6spec.R");

    let images = load(&path, "R,G,B");
    let image = &images[0];

    let names: Vec<&str> = image.data().channels.iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["diffuse.R", "diffuse.G", "diffuse.B", "spec.R"]);
    assert!(image.name().ends_with("layers.empty:R,G,B"));
}

#[test]
fn test_regex_selector_mode() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "layers.empty", b"empty 1 1 3\n1R 1G 1B");
    let pool = ThreadPool::new(1);

    let loaders = ImageLoaders::new().with_selector_mode(SelectorMode::Regex);
    let images = loaders.try_load_path(&pool.scheduler(), &path, "^[RB]$", Priority::DEFAULT);
    assert_eq!(images[0].count(), 2);

    // An invalid regex is a failed load, not a panic
    assert!(loaders
        .try_load_path(&pool.scheduler(), &path, "(", Priority::DEFAULT)
        .is_empty());
}

#[test]
fn test_unrecognized_file_reaches_fallback_and_fails() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "notes.txt", b"these are not pixels");
    assert!(load(&path, "").is_empty());
}

#[test]
fn test_raster_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gradient.png");
    image::RgbImage::from_fn(4, 2, |x, _| image::Rgb([x as u8 * 60, 0, 255]))
        .save(&path)
        .unwrap();

    let images = load(&path, "");
    let image = &images[0];
    assert_eq!(image.size(), Vector2i::new(4, 2));
    assert!((image.channel("B").unwrap().at(3, 1) - 1.0).abs() < 1e-6);
    assert_eq!(image.channel("G").unwrap().at(0, 0), 0.0);
}

// ============================================================================
// Background Loader
// ============================================================================

#[test]
fn test_background_loads_publish_in_request_order() {
    let dir = TempDir::new().unwrap();
    let large = write(&dir, "large.empty", b"empty 512 512 4\n1R 1G 1B 1A");
    let broken = write(&dir, "broken.pfm", b"PF\n4 4\n1.0\n");
    let small = write(&dir, "small.empty", b"empty 1 1 1\n1Y");

    let pool = ThreadPool::new(4);
    let loader = BackgroundLoader::new(pool.scheduler(), ImageLoaders::new());

    let first = loader.enqueue(&large, "", false);
    let second = loader.enqueue(&broken, "", false);
    let third = loader.enqueue(&small, "", true);
    assert_eq!((first, second, third), (0, 1, 2));

    let mut published = Vec::new();
    while published.len() < 2 {
        match loader.pop_timeout(Duration::from_secs(30)) {
            Some(load) => published.push(load),
            None => panic!("timed out waiting for loads"),
        }
    }

    let ids: Vec<u64> = published.iter().map(|l| l.load_id).collect();
    assert_eq!(ids, vec![0, 2]);
    assert!(published[1].should_select);
    assert_eq!(published[0].images[0].count(), 4);

    pool.wait_until_finished();
    assert!(loader.is_idle());
    assert_eq!(loader.num_published(), 3);
    assert!(loader.try_pop().is_none());
}
