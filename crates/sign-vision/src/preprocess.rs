//! Tensor preparation and output decoding shared by the model adapters.

use image::RgbImage;
use serde::Deserialize;

use sign_fusion::hand::{HandLandmarks, LANDMARKS_PER_HAND};

/// Input scaling a classifier was trained with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocess {
    /// x / 255
    #[default]
    None,
    /// x / 127.5 - 1
    MobilenetV2,
    /// BGR, ImageNet mean subtracted
    Resnet50,
    /// raw 0..255
    Efficientnet,
}

const IMAGENET_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// HWC float tensor of `rgb` under `recipe`.
pub fn to_input(rgb: &RgbImage, recipe: Preprocess) -> Vec<f32> {
    let mut out = Vec::with_capacity(rgb.as_raw().len());
    for p in rgb.pixels() {
        let [r, g, b] = p.0.map(f32::from);
        match recipe {
            Preprocess::None => out.extend([r / 255.0, g / 255.0, b / 255.0]),
            Preprocess::MobilenetV2 => out.extend([r / 127.5 - 1.0, g / 127.5 - 1.0, b / 127.5 - 1.0]),
            Preprocess::Resnet50 => out.extend([
                b - IMAGENET_MEAN_BGR[0],
                g - IMAGENET_MEAN_BGR[1],
                r - IMAGENET_MEAN_BGR[2],
            ]),
            Preprocess::Efficientnet => out.extend([r, g, b]),
        }
    }
    out
}

/// One label per non-blank line.
pub fn parse_labels(text: &str) -> Vec<String> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect()
}

/// Index and value of the largest finite entry; first wins ties.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
            Some((_, b)) if b >= *v => best,
            _ => Some((i, *v)),
        })
}

pub fn dequantize(raw: &[u8], scale: f32, zero_point: i32) -> Vec<f32> {
    raw.iter().map(|q| (*q as i32 - zero_point) as f32 * scale).collect()
}

/// Presence scores outside 0..1 are logits.
pub fn presence_probability(score: f32) -> f32 {
    if (0.0..=1.0).contains(&score) {
        score
    } else {
        1.0 / (1.0 + (-score).exp())
    }
}

/// Decodes a single-hand landmark model output (`21 x [x, y, z]` in
/// model-input pixels) into landmarks on the original `img_w` x `img_h` frame.
/// Returns no hands when presence is below `min_presence` or the output is short.
pub fn decode_hand(
    raw: &[f32],
    presence: f32,
    input_size: u32,
    img_w: u32,
    img_h: u32,
    min_presence: f32,
) -> Vec<HandLandmarks> {
    if presence_probability(presence) < min_presence || raw.len() < LANDMARKS_PER_HAND * 3 || input_size == 0 {
        return Vec::new();
    }
    let sx = img_w as f32 / input_size as f32;
    let sy = img_h as f32 / input_size as f32;
    let points = raw.chunks_exact(3).take(LANDMARKS_PER_HAND).map(|p| [p[0] * sx, p[1] * sy]).collect();
    vec![HandLandmarks { points }]
}
