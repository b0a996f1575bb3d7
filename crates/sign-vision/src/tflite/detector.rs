use anyhow::Result;
use image::{imageops::FilterType, RgbImage};
use tracing::debug;

use sign_fusion::{Backend, BackendError, Prediction};

use super::Interpreter;
use crate::{nms_filter, postprocess_ultralytics, to_predictions, Detection, DetectorConfig, Preprocess};

pub struct TfliteDetector {
    cfg: DetectorConfig,
    interp: Interpreter,
}

impl TfliteDetector {
    pub fn new(cfg: DetectorConfig) -> Result<Self> {
        let model_path = match (&cfg.model_path_edgetpu, cfg.use_coral) {
            (Some(p), true) => p.clone(),
            _ => cfg.model_path.clone(),
        };
        let interp = Interpreter::load(&model_path, cfg.use_coral)?;
        Ok(Self { cfg, interp })
    }

    pub fn inspect(&mut self) -> Result<String> {
        self.interp.inspect()
    }

    pub fn detect_image(&mut self, rgb: &RgbImage) -> Result<Vec<Detection>> {
        let resized = image::imageops::resize(rgb, self.cfg.img_w, self.cfg.img_h, FilterType::Triangle);
        self.interp.set_input_image(&resized, Preprocess::None)?;
        self.interp.invoke()?;

        let out_dims = self.interp.output_dims(0)?;
        let (num_preds, stride) = match out_dims.as_slice() {
            [1, n, s] => (*n as usize, *s as usize),
            [n, s] => (*n as usize, *s as usize),
            other => anyhow::bail!(
                "unexpected output dims {:?}. Run `signfuse vision inspect` and set detector.output_layout accordingly.",
                other
            ),
        };

        let expected_stride = 5 + self.cfg.num_classes;
        anyhow::ensure!(
            stride == expected_stride,
            "stride mismatch: got {}, expected {}. output dims {:?}. You may need a different output_layout.",
            stride,
            expected_stride,
            out_dims
        );

        let raw = self.interp.output_f32(0)?;
        let dets = match self.cfg.output_layout.as_str() {
            "ultralytics" => postprocess_ultralytics(&raw, num_preds, self.cfg.num_classes, self.cfg.conf_threshold),
            other => anyhow::bail!("unsupported output_layout: {} (dims={:?})", other, out_dims),
        };

        Ok(nms_filter(dets, self.cfg.nms_iou_threshold, self.cfg.max_detections))
    }
}

impl Backend for TfliteDetector {
    fn name(&self) -> &str {
        "tflite-detector"
    }

    fn predict(&mut self, image: &[u8]) -> Result<Vec<Prediction>, BackendError> {
        let rgb = image::load_from_memory(image)?.to_rgb8();
        let dets = self.detect_image(&rgb).map_err(BackendError::runtime)?;
        let preds = to_predictions(&dets, &self.cfg, rgb.width(), rgb.height());
        debug!("vision: detector {} raw -> {} plausible", dets.len(), preds.len());
        Ok(preds)
    }
}
