use anyhow::Result;
use tracing::{debug, info};

use sign_fusion::hand::{landmark_features, FEATURE_LEN};
use sign_fusion::{Backend, BackendError, HandLandmarker, Prediction};

use crate::dataset::Dataset;
use crate::model::KnnModel;
use crate::KnnConfig;

/// Landmark extraction followed by k-NN over the 84-value feature vector.
pub struct KnnLandmarkClassifier<L> {
    landmarker: L,
    model: KnnModel,
}

impl<L: HandLandmarker> KnnLandmarkClassifier<L> {
    pub fn new(landmarker: L, model: KnnModel) -> Result<Self> {
        anyhow::ensure!(
            model.dims() == FEATURE_LEN,
            "knn model expects {} features, landmarks give {}",
            model.dims(),
            FEATURE_LEN
        );
        Ok(Self { landmarker, model })
    }

    pub fn from_config(cfg: &KnnConfig, landmarker: L) -> Result<Self> {
        let dataset = Dataset::load(&cfg.dataset_path)?.filter_min_class_count(cfg.min_class_count);
        let model = KnnModel::fit(dataset, cfg)?;
        info!("knn: landmark classifier ready ({} classes)", model.n_classes());
        Self::new(landmarker, model)
    }
}

impl<L: HandLandmarker> Backend for KnnLandmarkClassifier<L> {
    fn name(&self) -> &str {
        "knn-landmarks"
    }

    fn is_available(&self) -> bool {
        self.landmarker.is_available()
    }

    fn predict(&mut self, image: &[u8]) -> Result<Vec<Prediction>, BackendError> {
        let rgb = image::load_from_memory(image)?.to_rgb8();
        let hands = self.landmarker.landmarks(&rgb)?;
        let Some(features) = landmark_features(&hands, rgb.width(), rgb.height()) else {
            debug!("knn: no hand landmarks");
            return Ok(Vec::new());
        };

        let proba = self.model.predict_proba(&features).map_err(BackendError::runtime)?;
        let mut preds: Vec<Prediction> = proba
            .iter()
            .enumerate()
            .filter(|(_, p)| **p > 0.0)
            .map(|(i, p)| Prediction::new(self.model.class_name(i), *p))
            .collect();
        preds.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Ok(preds)
    }
}
