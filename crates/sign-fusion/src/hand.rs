//! Hand landmark geometry: crop rectangles and classifier feature vectors.

use image::RgbImage;
use std::sync::{Arc, Mutex};

use crate::backend::{BackendError, HandLocator, Rect};

pub const LANDMARKS_PER_HAND: usize = 21;
pub const MAX_HANDS: usize = 2;
/// Two hands x 21 landmarks x (x, y).
pub const FEATURE_LEN: usize = MAX_HANDS * LANDMARKS_PER_HAND * 2;

/// Extra margin around the landmark box, as a fraction of its long side.
pub const DEFAULT_CROP_PAD: f32 = 0.25;

/// Landmarks of one hand in pixel coordinates of the analysed image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandLandmarks {
    pub points: Vec<[f32; 2]>,
}

/// Extracts hand landmarks. Returns up to `MAX_HANDS` hands, most confident
/// first; an empty list means no hand was found.
pub trait HandLandmarker: Send {
    fn is_available(&self) -> bool {
        true
    }

    fn landmarks(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarks>, BackendError>;
}

impl<L: HandLandmarker> HandLandmarker for Box<L> {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn landmarks(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarks>, BackendError> {
        (**self).landmarks(image)
    }
}

// Lets the hand locator and the landmark classifier share one model instance.
impl<L: HandLandmarker> HandLandmarker for Arc<Mutex<L>> {
    fn is_available(&self) -> bool {
        self.lock().map(|l| l.is_available()).unwrap_or(false)
    }

    fn landmarks(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarks>, BackendError> {
        let mut inner = self.lock().map_err(|_| BackendError::runtime("landmarker mutex poisoned"))?;
        inner.landmarks(image)
    }
}

/// Square, padded crop around the most confident hand.
pub struct LandmarkHandLocator<L> {
    landmarker: L,
    pad: f32,
}

impl<L: HandLandmarker> LandmarkHandLocator<L> {
    pub fn new(landmarker: L) -> Self {
        Self { landmarker, pad: DEFAULT_CROP_PAD }
    }
}

impl<L: HandLandmarker> HandLocator for LandmarkHandLocator<L> {
    fn is_available(&self) -> bool {
        self.landmarker.is_available()
    }

    fn locate(&mut self, image: &RgbImage) -> Result<Option<Rect>, BackendError> {
        let hands = self.landmarker.landmarks(image)?;
        Ok(hands.first().and_then(|h| hand_rect(&h.points, image.width(), image.height(), self.pad)))
    }
}

/// Square around `points`, grown by `pad` x side on every edge and clamped to
/// the image. `None` when the clamped square is empty.
pub fn hand_rect(points: &[[f32; 2]], width: u32, height: u32, pad: f32) -> Option<Rect> {
    if points.is_empty() {
        return None;
    }
    let (w, h) = (width as i64, height as i64);
    let xs = points.iter().map(|p| p[0] as i64);
    let ys = points.iter().map(|p| p[1] as i64);
    let x1 = xs.clone().min()?.max(0);
    let x2 = xs.max()?.min(w);
    let y1 = ys.clone().min()?.max(0);
    let y2 = ys.max()?.min(h);

    let side = (x2 - x1).max(y2 - y1);
    let margin = (pad * side as f32) as i64;
    let (cx, cy) = ((x1 + x2).div_euclid(2), (y1 + y2).div_euclid(2));
    let half = side.div_euclid(2) + margin;

    let (x1, y1) = ((cx - half).max(0), (cy - half).max(0));
    let (x2, y2) = ((cx + half).min(w), (cy + half).min(h));
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect { x1: x1 as u32, y1: y1 as u32, x2: x2 as u32, y2: y2 as u32 })
}

/// Fixed-length feature vector: each hand normalized to its own bounding box,
/// absent landmarks and hands zero-filled. `None` when no hand is present.
pub fn landmark_features(hands: &[HandLandmarks], width: u32, height: u32) -> Option<Vec<f32>> {
    if hands.is_empty() {
        return None;
    }
    let per_hand = LANDMARKS_PER_HAND * 2;
    let mut feat = Vec::with_capacity(FEATURE_LEN);

    for i in 0..MAX_HANDS {
        let mut values = match hands.get(i) {
            Some(hand) if !hand.points.is_empty() => normalize_hand(&hand.points, width as f32, height as f32),
            _ => Vec::new(),
        };
        values.resize(per_hand, 0.0);
        feat.extend_from_slice(&values[..per_hand]);
    }
    Some(feat)
}

fn normalize_hand(points: &[[f32; 2]], w: f32, h: f32) -> Vec<f32> {
    let (mut min_x, mut max_x) = (f32::INFINITY, f32::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f32::INFINITY, f32::NEG_INFINITY);
    for [x, y] in points {
        min_x = min_x.min(*x);
        max_x = max_x.max(*x);
        min_y = min_y.min(*y);
        max_y = max_y.max(*y);
    }
    let (min_x, max_x) = (min_x.max(0.0), max_x.min(w));
    let (min_y, max_y) = (min_y.max(0.0), max_y.min(h));
    let bw = (max_x - min_x).max(1.0);
    let bh = (max_y - min_y).max(1.0);

    points.iter().flat_map(|[x, y]| [(x - min_x) / bw, (y - min_y) / bh]).collect()
}
