use anyhow::{Context, Result};
use image::imageops::FilterType;
use tracing::info;

use sign_fusion::{Backend, BackendError, Prediction};

use super::Interpreter;
use crate::preprocess::{argmax, parse_labels};
use crate::ClassifierConfig;

/// Whole-frame classifier; reports only its arg-max class.
pub struct TfliteClassifier {
    cfg: ClassifierConfig,
    interp: Interpreter,
    labels: Vec<String>,
}

impl TfliteClassifier {
    pub fn new(cfg: ClassifierConfig) -> Result<Self> {
        let interp = Interpreter::load(&cfg.model_path, false)?;
        let labels = match &cfg.labels_path {
            Some(p) => parse_labels(&std::fs::read_to_string(p).with_context(|| format!("read labels {}", p))?),
            None => Vec::new(),
        };
        info!("vision: classifier labels={} preprocess={:?}", labels.len(), cfg.preprocess);
        Ok(Self { cfg, interp, labels })
    }

    pub fn inspect(&mut self) -> Result<String> {
        self.interp.inspect()
    }

    fn probabilities(&mut self, image: &image::RgbImage) -> Result<Vec<f32>> {
        let size = self.cfg.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        self.interp.set_input_image(&resized, self.cfg.preprocess)?;
        self.interp.invoke()?;
        self.interp.output_f32(0)
    }
}

impl Backend for TfliteClassifier {
    fn name(&self) -> &str {
        "tflite-classifier"
    }

    fn predict(&mut self, image: &[u8]) -> Result<Vec<Prediction>, BackendError> {
        let rgb = image::load_from_memory(image)?.to_rgb8();
        let probs = self.probabilities(&rgb).map_err(BackendError::runtime)?;
        let Some((idx, p)) = argmax(&probs) else { return Ok(Vec::new()); };
        let label = self.labels.get(idx).cloned().unwrap_or_else(|| idx.to_string());
        Ok(vec![Prediction::new(label, p)])
    }
}
