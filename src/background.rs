//! Background images bound to every pass.
//!
//! Sources are scaled to cover the viewport (the shorter side fits, the longer
//! side overflows) and then center-cropped, so every pass samples them at the
//! same resolution as its own output. Anything that cannot be read becomes a
//! solid red placeholder instead of failing the frame.

use std::path::Path;

use glam::UVec2;
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

use crate::config::BACKGROUND_COUNT;

/// Edge length of the placeholder used for missing images.
pub const PLACEHOLDER_SIZE: u32 = 64;

const PLACEHOLDER_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// A solid red square.
pub fn placeholder() -> RgbaImage {
    RgbaImage::from_pixel(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, PLACEHOLDER_COLOR)
}

/// Size an image of `source` pixels must be scaled to so it covers `target`.
pub fn cover_extent(source: UVec2, target: UVec2) -> UVec2 {
    if source.x == 0 || source.y == 0 {
        return target;
    }
    let scale = (target.x as f64 / source.x as f64).max(target.y as f64 / source.y as f64);
    UVec2::new(
        ((source.x as f64 * scale).round() as u32).max(target.x),
        ((source.y as f64 * scale).round() as u32).max(target.y),
    )
}

/// Scales `image` to cover `target` and crops the overflow evenly on both sides.
pub fn cover(image: &RgbaImage, target: UVec2) -> RgbaImage {
    if target.x == 0 || target.y == 0 {
        return image.clone();
    }

    let scaled = cover_extent(UVec2::from(image.dimensions()), target);
    let resized = image::imageops::resize(image, scaled.x, scaled.y, FilterType::Triangle);
    let offset = (scaled - target) / 2;

    image::imageops::crop_imm(&resized, offset.x, offset.y, target.x, target.y).to_image()
}

/// Loads one background, falling back to the placeholder.
pub fn load(path: Option<&Path>, target: UVec2) -> RgbaImage {
    let source = match path {
        Some(path) => match image::open(path) {
            Ok(image) => image.to_rgba8(),
            Err(e) => {
                log::warn!(
                    "[background] failed to load {}: {}, using placeholder",
                    path.display(),
                    e
                );
                placeholder()
            }
        },
        None => placeholder(),
    };
    cover(&source, target)
}

/// Loads all background slots from `paths`; missing entries use the placeholder.
pub fn load_all<P: AsRef<Path>>(paths: &[P], target: UVec2) -> [RgbaImage; BACKGROUND_COUNT] {
    std::array::from_fn(|slot| load(paths.get(slot).map(AsRef::as_ref), target))
}
