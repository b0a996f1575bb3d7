use tracing::{info, warn};

use crate::backend::{Backend, HandLocator, Role};
use crate::consensus::{BatchConsensus, ConsensusAggregator};
use crate::error::FusionError;
use crate::router::{route, Frame, FusionPolicy, Stages};
use crate::types::RouterDecision;

/// Loaded recognizers for the lifetime of the process. Built once, shared by
/// every request; dropping it releases the backends.
pub struct FusionContext {
    image_classifier: Option<Box<dyn Backend>>,
    detector: Option<Box<dyn Backend>>,
    landmark_classifier: Option<Box<dyn Backend>>,
    hand_locator: Option<Box<dyn HandLocator>>,
}

#[derive(Default)]
pub struct FusionContextBuilder {
    image_classifier: Option<Box<dyn Backend>>,
    detector: Option<Box<dyn Backend>>,
    landmark_classifier: Option<Box<dyn Backend>>,
    hand_locator: Option<Box<dyn HandLocator>>,
}

impl FusionContextBuilder {
    pub fn backend(mut self, role: Role, backend: Box<dyn Backend>) -> Self {
        match role {
            Role::ImageClassifier => self.image_classifier = Some(backend),
            Role::Detector => self.detector = Some(backend),
            Role::LandmarkClassifier => self.landmark_classifier = Some(backend),
        }
        self
    }

    pub fn hand_locator(mut self, locator: Box<dyn HandLocator>) -> Self {
        self.hand_locator = Some(locator);
        self
    }

    pub fn build(self) -> FusionContext {
        let ctx = FusionContext {
            image_classifier: self.image_classifier,
            detector: self.detector,
            landmark_classifier: self.landmark_classifier,
            hand_locator: self.hand_locator,
        };
        for (role, name, ready) in ctx.readiness() {
            info!("fusion: {} = {} (ready={})", role, name, ready);
        }
        ctx
    }
}

impl FusionContext {
    pub fn builder() -> FusionContextBuilder {
        FusionContextBuilder::default()
    }

    /// Configured backends as (role, name, ready).
    pub fn readiness(&self) -> Vec<(Role, String, bool)> {
        [
            (Role::ImageClassifier, &self.image_classifier),
            (Role::Detector, &self.detector),
            (Role::LandmarkClassifier, &self.landmark_classifier),
        ]
        .into_iter()
        .filter_map(|(role, slot)| slot.as_ref().map(|b| (role, b.name().to_string(), b.is_available())))
        .collect()
    }

    pub fn has_hand_locator(&self) -> bool {
        self.hand_locator.as_ref().map(|l| l.is_available()).unwrap_or(false)
    }

    fn any_available(&self, policy: &FusionPolicy) -> bool {
        let ready = |slot: &Option<Box<dyn Backend>>| slot.as_ref().map(|b| b.is_available()).unwrap_or(false);
        (policy.image_classifier_enable && ready(&self.image_classifier))
            || ready(&self.detector)
            || ready(&self.landmark_classifier)
    }

    /// Decision for a single encoded frame.
    pub fn score(&mut self, image: &[u8], policy: &FusionPolicy) -> Result<RouterDecision, FusionError> {
        if !self.any_available(policy) {
            return Err(FusionError::NoBackends);
        }
        let rgb = image::load_from_memory(image).map_err(FusionError::UndecodableImage)?.to_rgb8();
        let frame = Frame { bytes: image, rgb };
        let stages = Stages {
            image_classifier: self.image_classifier.as_mut(),
            detector: self.detector.as_mut(),
            landmark_classifier: self.landmark_classifier.as_mut(),
            hand_locator: self.hand_locator.as_mut(),
        };
        Ok(route(stages, &frame, policy))
    }

    /// Scores every frame and reduces the decisions to one consensus. A frame
    /// that does not decode is counted but votes for nothing.
    pub fn score_batch<B: AsRef<[u8]>>(&mut self, images: &[B], policy: &FusionPolicy) -> Result<BatchConsensus, FusionError> {
        if !self.any_available(policy) {
            return Err(FusionError::NoBackends);
        }
        let mut agg = ConsensusAggregator::new();
        for (i, image) in images.iter().enumerate() {
            match self.score(image.as_ref(), policy) {
                Ok(decision) => agg.push_decision(&decision),
                Err(FusionError::UndecodableImage(e)) => {
                    warn!("fusion: batch frame {} not decodable: {}", i, e);
                    agg.push(None, 0.0);
                }
                Err(e) => return Err(e),
            }
        }
        let consensus = agg.finish();
        info!("fusion: batch of {} -> {:?} ({:.3})", consensus.frames, consensus.label, consensus.confidence);
        Ok(consensus)
    }
}
