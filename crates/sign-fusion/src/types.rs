use serde::{Deserialize, Serialize};
use std::fmt;

/// Corner-form box `[x1, y1, x2, y2]` in pixels of the image the backend saw.
pub type BBox = [f32; 4];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Backend-reported, 0..1. The fusion core never rescales it.
    pub confidence: f32,
    pub bounding_box: Option<BBox>,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self { label: label.into(), confidence, bounding_box: None }
    }

    pub fn with_box(mut self, bbox: BBox) -> Self {
        self.bounding_box = Some(bbox);
        self
    }
}

/// Which cascade stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    ImageClassifier,
    Detector,
    LandmarkClassifier,
    None,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::ImageClassifier => "image-classifier",
            Source::Detector => "detector",
            Source::LandmarkClassifier => "landmark-classifier",
            Source::None => "none",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterDecision {
    pub label: Option<String>,
    pub confidence: f32,
    pub source: Source,
    pub bounding_box: Option<BBox>,
    /// Accepted predictions of the deciding stage, best first.
    pub predictions: Vec<Prediction>,
}

impl RouterDecision {
    pub fn none() -> Self {
        Self { label: None, confidence: 0.0, source: Source::None, bounding_box: None, predictions: Vec::new() }
    }

    /// `accepted` must be sorted best first; an empty list yields `none()`.
    pub fn from_accepted(source: Source, accepted: Vec<Prediction>) -> Self {
        let Some(best) = accepted.first() else { return Self::none(); };
        Self {
            label: Some(best.label.clone()),
            confidence: best.confidence,
            source,
            bounding_box: best.bounding_box,
            predictions: accepted,
        }
    }
}
