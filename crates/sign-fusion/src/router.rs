//! The classifier -> detector -> landmark cascade.

use image::{imageops, imageops::FilterType, RgbImage};
use serde::Deserialize;
use std::borrow::Cow;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, HandLocator};
use crate::dedup::dedup_variants;
use crate::filter::accept;
use crate::merge::{merge_predictions, MergedResult};
use crate::types::{Prediction, RouterDecision, Source};
use crate::variants::{encode_jpeg, generate_variants, normalize_contrast, AugmentationPolicy, NORMALIZED_JPEG_QUALITY, VARIANT_JPEG_QUALITY};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionPolicy {
    /// Try the image classifier before the detector.
    pub image_classifier_enable: bool,
    /// Acceptance threshold for detector candidates.
    pub detector_accept_conf: f32,
    /// Acceptance threshold for image-classifier candidates; its scores run lower.
    pub classifier_accept_conf: f32,
    pub top_k: usize,
    /// Run the detector on the located hand region when a locator is present.
    pub hand_crop: bool,
    /// Side of the square the hand crop is resized to.
    pub crop_size: u32,
    pub augmentation: AugmentationPolicy,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            image_classifier_enable: false,
            detector_accept_conf: 0.35,
            classifier_accept_conf: 0.05,
            top_k: 3,
            hand_crop: true,
            crop_size: 640,
            augmentation: AugmentationPolicy::default(),
        }
    }
}

/// Result of one cascade stage.
#[derive(Debug)]
pub enum StageOutcome {
    /// Accepted predictions, best first, never empty.
    Accepted(Vec<Prediction>),
    /// The backend ran and had nothing acceptable.
    Empty,
    /// The capability is absent, disabled or not ready.
    Skipped,
    Fault(BackendError),
}

impl StageOutcome {
    fn from_accepted(accepted: Vec<Prediction>) -> Self {
        if accepted.is_empty() {
            StageOutcome::Empty
        } else {
            StageOutcome::Accepted(accepted)
        }
    }
}

/// A decoded frame together with its original encoding.
pub struct Frame<'a> {
    pub bytes: &'a [u8],
    pub rgb: RgbImage,
}

/// Borrowed view of the capabilities one cascade run may use.
pub struct Stages<'a> {
    pub image_classifier: Option<&'a mut Box<dyn Backend>>,
    pub detector: Option<&'a mut Box<dyn Backend>>,
    pub landmark_classifier: Option<&'a mut Box<dyn Backend>>,
    pub hand_locator: Option<&'a mut Box<dyn HandLocator>>,
}

/// Runs the stages in order and stops at the first accepted result.
pub fn route(stages: Stages<'_>, frame: &Frame<'_>, policy: &FusionPolicy) -> RouterDecision {
    let outcome = classifier_stage(stages.image_classifier, frame, policy);
    if let Some(decision) = settle(Source::ImageClassifier, outcome) {
        return decision;
    }

    let outcome = detector_stage(stages.detector, stages.hand_locator, frame, policy);
    if let Some(decision) = settle(Source::Detector, outcome) {
        return decision;
    }

    let outcome = landmark_stage(stages.landmark_classifier, frame, policy);
    if let Some(decision) = settle(Source::LandmarkClassifier, outcome) {
        return decision;
    }

    debug!("router: no stage produced an accepted prediction");
    RouterDecision::none()
}

fn settle(source: Source, outcome: StageOutcome) -> Option<RouterDecision> {
    match outcome {
        StageOutcome::Accepted(accepted) => {
            info!("router: {} accepted {} (best {:?} {:.3})", source, accepted.len(), accepted[0].label, accepted[0].confidence);
            Some(RouterDecision::from_accepted(source, accepted))
        }
        StageOutcome::Empty => {
            debug!("router: {} produced nothing", source);
            None
        }
        StageOutcome::Skipped => {
            debug!("router: {} skipped", source);
            None
        }
        StageOutcome::Fault(e) => {
            warn!("router: {} failed: {}", source, e);
            None
        }
    }
}

pub fn classifier_stage(backend: Option<&mut Box<dyn Backend>>, frame: &Frame<'_>, policy: &FusionPolicy) -> StageOutcome {
    if !policy.image_classifier_enable {
        return StageOutcome::Skipped;
    }
    let Some(backend) = backend.filter(|b| b.is_available()) else { return StageOutcome::Skipped; };

    let predictions = match backend.predict(frame.bytes) {
        Ok(p) => p,
        Err(e) => return StageOutcome::Fault(e),
    };
    let Some(best) = best_positive(predictions) else { return StageOutcome::Empty; };

    let merged: MergedResult = std::iter::once(best).collect();
    StageOutcome::from_accepted(accept(merged, policy.classifier_accept_conf, policy.top_k))
}

pub fn detector_stage(
    backend: Option<&mut Box<dyn Backend>>,
    locator: Option<&mut Box<dyn HandLocator>>,
    frame: &Frame<'_>,
    policy: &FusionPolicy,
) -> StageOutcome {
    let Some(backend) = backend.filter(|b| b.is_available()) else { return StageOutcome::Skipped; };

    let crop = if policy.hand_crop { crop_to_hand(locator, &frame.rgb, policy.crop_size) } else { None };
    let (bytes, rgb): (Cow<'_, [u8]>, Cow<'_, RgbImage>) = match crop {
        Some((bytes, rgb)) => (Cow::Owned(bytes), Cow::Owned(rgb)),
        None => (Cow::Borrowed(frame.bytes), Cow::Borrowed(&frame.rgb)),
    };

    let variants = dedup_variants(generate_variants(&bytes, &rgb, &policy.augmentation));
    debug!("router: detector on {} variants", variants.len());

    let mut responses = Vec::with_capacity(variants.len());
    let mut last_fault = None;
    for (i, variant) in variants.iter().enumerate() {
        match backend.predict(variant) {
            Ok(p) => responses.push(p),
            Err(e) => {
                debug!("router: detector variant {} failed: {}", i, e);
                last_fault = Some(e);
            }
        }
    }
    if responses.is_empty() {
        if let Some(e) = last_fault {
            return StageOutcome::Fault(e);
        }
    }

    StageOutcome::from_accepted(accept(merge_predictions(responses), policy.detector_accept_conf, policy.top_k))
}

/// Crops to the located hand and resizes to `size` x `size`. Any failure is
/// "no crop".
fn crop_to_hand(locator: Option<&mut Box<dyn HandLocator>>, rgb: &RgbImage, size: u32) -> Option<(Vec<u8>, RgbImage)> {
    let locator = locator.filter(|l| l.is_available())?;
    let rect = match locator.locate(rgb) {
        Ok(Some(r)) => r,
        Ok(None) => {
            debug!("router: no hand located, using full frame");
            return None;
        }
        Err(e) => {
            debug!("router: hand locator failed: {}", e);
            return None;
        }
    };
    let (w, h) = rgb.dimensions();
    let Some(rect) = rect.clamp_to(w, h).filter(|_| size > 0) else {
        debug!("router: hand region {:?} outside {}x{} frame, using full frame", rect, w, h);
        return None;
    };

    let cropped = imageops::crop_imm(rgb, rect.x1, rect.y1, rect.width(), rect.height()).to_image();
    let resized = imageops::resize(&cropped, size, size, FilterType::CatmullRom);
    match encode_jpeg(&resized, VARIANT_JPEG_QUALITY) {
        Ok(bytes) => {
            debug!("router: hand crop {:?} -> {}x{}", rect, size, size);
            Some((bytes, resized))
        }
        Err(e) => {
            debug!("router: hand crop encode failed: {}", e);
            None
        }
    }
}

pub fn landmark_stage(backend: Option<&mut Box<dyn Backend>>, frame: &Frame<'_>, policy: &FusionPolicy) -> StageOutcome {
    let Some(backend) = backend.filter(|b| b.is_available()) else { return StageOutcome::Skipped; };

    let mut normalized = None;
    if policy.augmentation.contrast_normalize {
        match encode_jpeg(&normalize_contrast(&frame.rgb), NORMALIZED_JPEG_QUALITY) {
            Ok(bytes) => normalized = Some(bytes),
            Err(e) => debug!("router: landmark normalization skipped: {}", e),
        }
    }
    let input = normalized.as_deref().unwrap_or(frame.bytes);

    match backend.predict(input) {
        Ok(predictions) => match best_positive(predictions) {
            Some(best) => StageOutcome::Accepted(vec![best]),
            None => StageOutcome::Empty,
        },
        Err(e) => StageOutcome::Fault(e),
    }
}

fn best_positive(predictions: Vec<Prediction>) -> Option<Prediction> {
    predictions
        .into_iter()
        .filter(|p| !p.label.is_empty() && p.confidence > 0.0 && p.confidence.is_finite())
        .fold(None, |best: Option<Prediction>, p| match best {
            Some(b) if b.confidence >= p.confidence => Some(b),
            _ => Some(p),
        })
}
