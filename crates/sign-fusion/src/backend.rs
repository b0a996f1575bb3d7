use image::RgbImage;
use std::fmt;
use thiserror::Error;

use crate::types::Prediction;

/// The three recognizer roles the cascade knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    ImageClassifier,
    Detector,
    LandmarkClassifier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ImageClassifier => "image-classifier",
            Role::Detector => "detector",
            Role::LandmarkClassifier => "landmark-classifier",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("{0}")]
    Runtime(String),
}

impl BackendError {
    pub fn runtime(msg: impl fmt::Display) -> Self {
        BackendError::Runtime(msg.to_string())
    }
}

/// An opaque recognizer. An empty list means "nothing recognized", not a fault.
pub trait Backend: Send {
    fn name(&self) -> &str;

    /// Readiness; the router skips a backend that reports false.
    fn is_available(&self) -> bool {
        true
    }

    fn predict(&mut self, image: &[u8]) -> Result<Vec<Prediction>, BackendError>;
}

/// Pixel rectangle, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rect {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Intersection with a `width` x `height` frame; `None` when nothing of
    /// the rectangle lies inside it.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let r = Rect { x1: self.x1.min(width), y1: self.y1.min(height), x2: self.x2.min(width), y2: self.y2.min(height) };
        (r.width() > 0 && r.height() > 0).then_some(r)
    }
}

/// Finds the hand region of a frame. `Ok(None)` is a normal outcome.
pub trait HandLocator: Send {
    fn is_available(&self) -> bool {
        true
    }

    fn locate(&mut self, image: &RgbImage) -> Result<Option<Rect>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_inside_rect() {
        let r = Rect { x1: 2, y1: 3, x2: 10, y2: 12 };
        assert_eq!(r.clamp_to(48, 32), Some(r));
    }

    #[test]
    fn clamp_clips_overhang() {
        let r = Rect { x1: 30, y1: 20, x2: 90, y2: 90 };
        assert_eq!(r.clamp_to(48, 32), Some(Rect { x1: 30, y1: 20, x2: 48, y2: 32 }));
    }

    #[test]
    fn clamp_rejects_off_frame_and_empty() {
        assert_eq!(Rect { x1: 100, y1: 100, x2: 200, y2: 200 }.clamp_to(48, 32), None);
        assert_eq!(Rect { x1: 5, y1: 5, x2: 5, y2: 9 }.clamp_to(48, 32), None);
    }
}
