//! Test-time augmentation: transformed copies of one frame.

use image::{codecs::jpeg::JpegEncoder, imageops, imageops::FilterType, GrayImage, ImageResult, Luma, Rgb, RgbImage};
use imageproc::contrast::{equalize_histogram, stretch_contrast};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde::Deserialize;
use tracing::debug;

/// Degrees, counter-clockwise positive. Order defines variant order.
pub const ROTATION_ANGLES: [f32; 4] = [-10.0, -5.0, 5.0, 10.0];

/// Normalized copies smaller than this on their long side are upscaled.
pub const NORMALIZED_MIN_LONG_SIDE: u32 = 512;

pub const VARIANT_JPEG_QUALITY: u8 = 75;
pub const NORMALIZED_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AugmentationPolicy {
    /// Master switch for the geometric variants (mirror / rotations).
    pub enable: bool,
    pub mirror: bool,
    pub rotations: bool,
    /// Adds a contrast-normalized copy (and its geometric variants when enabled).
    pub contrast_normalize: bool,
}

impl Default for AugmentationPolicy {
    fn default() -> Self {
        Self { enable: true, mirror: true, rotations: true, contrast_normalize: true }
    }
}

impl AugmentationPolicy {
    pub fn disabled() -> Self {
        Self { enable: false, mirror: false, rotations: false, contrast_normalize: false }
    }
}

/// Builds the variant set for one frame. `original` is passed through untouched
/// as the first entry; `image` is its decoded form. Transforms that fail to
/// encode are skipped, so the result is never empty.
pub fn generate_variants(original: &[u8], image: &RgbImage, policy: &AugmentationPolicy) -> Vec<Vec<u8>> {
    let mut variants = vec![original.to_vec()];

    if policy.enable {
        push_geometric(&mut variants, image, policy);
    }

    if policy.contrast_normalize {
        let normalized = normalize_contrast(image);
        match encode_jpeg(&normalized, NORMALIZED_JPEG_QUALITY) {
            Ok(bytes) => {
                variants.push(bytes);
                if policy.enable {
                    push_geometric(&mut variants, &normalized, policy);
                }
            }
            Err(e) => debug!("variants: normalized copy skipped: {}", e),
        }
    }

    variants
}

fn push_geometric(out: &mut Vec<Vec<u8>>, image: &RgbImage, policy: &AugmentationPolicy) {
    if policy.mirror {
        push_encoded(out, &imageops::flip_horizontal(image), "mirror");
    }
    if policy.rotations {
        for angle in ROTATION_ANGLES {
            push_encoded(out, &rotate_expand(image, angle), "rotation");
        }
    }
}

fn push_encoded(out: &mut Vec<Vec<u8>>, image: &RgbImage, what: &str) {
    match encode_jpeg(image, VARIANT_JPEG_QUALITY) {
        Ok(bytes) => out.push(bytes),
        Err(e) => debug!("variants: {} skipped: {}", what, e),
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(image)?;
    Ok(buf)
}

/// Rotates by `degrees` (counter-clockwise) on a canvas grown to hold the
/// whole rotated frame; uncovered pixels are black.
pub fn rotate_expand(image: &RgbImage, degrees: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let new_w = ((w as f32 * cos + h as f32 * sin).ceil() as u32).max(w);
    let new_h = ((w as f32 * sin + h as f32 * cos).ceil() as u32).max(h);

    let mut canvas = RgbImage::new(new_w, new_h);
    imageops::overlay(&mut canvas, image, ((new_w - w) / 2) as i64, ((new_h - h) / 2) as i64);
    // imageproc rotates clockwise for positive theta
    rotate_about_center(&canvas, -theta, Interpolation::Bicubic, Rgb([0, 0, 0]))
}

/// Per-channel autocontrast followed by per-channel histogram equalization;
/// small frames are then upscaled so the long side is `NORMALIZED_MIN_LONG_SIDE`.
pub fn normalize_contrast(image: &RgbImage) -> RgbImage {
    let stretched = map_channels(image, autocontrast);
    let equalized = map_channels(&stretched, equalize_histogram);

    let (w, h) = equalized.dimensions();
    let long_side = w.max(h);
    if long_side == 0 || long_side >= NORMALIZED_MIN_LONG_SIDE {
        return equalized;
    }
    let scale = NORMALIZED_MIN_LONG_SIDE as f32 / long_side as f32;
    let nw = ((w as f32 * scale) as u32).max(1);
    let nh = ((h as f32 * scale) as u32).max(1);
    imageops::resize(&equalized, nw, nh, FilterType::CatmullRom)
}

/// Linear stretch of the occupied intensity range to 0..=255.
fn autocontrast(plane: &GrayImage) -> GrayImage {
    let (lo, hi) = plane.pixels().fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if hi <= lo {
        return plane.clone();
    }
    stretch_contrast(plane, lo, hi, u8::MIN, u8::MAX)
}

fn map_channels(image: &RgbImage, f: impl Fn(&GrayImage) -> GrayImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let planes: Vec<GrayImage> = (0..3)
        .map(|c| f(&GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y)[c]]))))
        .collect();
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([planes[0].get_pixel(x, y)[0], planes[1].get_pixel(x, y)[0], planes[2].get_pixel(x, y)[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 100 + (x % 20) as u8]))
    }

    #[test]
    fn original_bytes_come_first_and_untouched() {
        let img = gradient(40, 30);
        let original = encode_jpeg(&img, 80).unwrap();
        let variants = generate_variants(&original, &img, &AugmentationPolicy::default());
        assert_eq!(variants[0], original);
    }

    #[test]
    fn full_policy_yields_twelve_variants() {
        let img = gradient(40, 30);
        let original = encode_jpeg(&img, 80).unwrap();
        let variants = generate_variants(&original, &img, &AugmentationPolicy::default());
        // {original, normalized} x {none, mirror, 4 rotations}
        assert_eq!(variants.len(), 12);
    }

    #[test]
    fn variants_follow_fixed_order() {
        let img = gradient(40, 30);
        let original = encode_jpeg(&img, 80).unwrap();
        let variants = generate_variants(&original, &img, &AugmentationPolicy::default());
        let dims: Vec<(u32, u32)> =
            variants.iter().map(|v| image::load_from_memory(v).unwrap().to_rgb8().dimensions()).collect();

        let normalized = normalize_contrast(&img);
        let mut expected = vec![img.dimensions(), img.dimensions()];
        expected.extend(ROTATION_ANGLES.iter().map(|a| rotate_expand(&img, *a).dimensions()));
        expected.push(normalized.dimensions());
        expected.push(normalized.dimensions());
        expected.extend(ROTATION_ANGLES.iter().map(|a| rotate_expand(&normalized, *a).dimensions()));
        assert_eq!(dims, expected);

        // mirror of the original, not the original again
        let mirrored = image::load_from_memory(&variants[1]).unwrap().to_rgb8();
        assert!(mirrored.get_pixel(0, 15)[0] > mirrored.get_pixel(39, 15)[0]);
        assert_eq!(ROTATION_ANGLES, [-10.0, -5.0, 5.0, 10.0]);
    }

    #[test]
    fn disabled_policy_keeps_only_original() {
        let img = gradient(10, 10);
        let variants = generate_variants(b"not-even-a-jpeg", &img, &AugmentationPolicy::disabled());
        assert_eq!(variants, vec![b"not-even-a-jpeg".to_vec()]);
    }

    #[test]
    fn normalize_only_adds_one_copy() {
        let img = gradient(10, 10);
        let policy = AugmentationPolicy { enable: false, ..AugmentationPolicy::default() };
        let variants = generate_variants(b"raw", &img, &policy);
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0], b"raw".to_vec());
    }

    #[test]
    fn rotation_expands_canvas() {
        let img = gradient(100, 50);
        let rotated = rotate_expand(&img, 10.0);
        assert!(rotated.width() > 100);
        assert!(rotated.height() > 50);
    }

    #[test]
    fn normalization_upscales_small_frames() {
        let img = gradient(64, 32);
        let out = normalize_contrast(&img);
        assert_eq!(out.width(), NORMALIZED_MIN_LONG_SIDE);
        assert_eq!(out.height(), NORMALIZED_MIN_LONG_SIDE / 2);
    }

    #[test]
    fn autocontrast_stretches_range() {
        let plane = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8 * 10]));
        let out = autocontrast(&plane);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn autocontrast_leaves_flat_plane() {
        let plane = GrayImage::from_pixel(3, 3, Luma([42]));
        assert_eq!(autocontrast(&plane), plane);
    }
}
