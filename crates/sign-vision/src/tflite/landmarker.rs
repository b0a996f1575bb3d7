use anyhow::Result;
use image::{imageops::FilterType, RgbImage};

use sign_fusion::{BackendError, HandLandmarker, HandLandmarks};

use super::Interpreter;
use crate::preprocess::decode_hand;
use crate::{LandmarkerConfig, Preprocess};

/// Single-hand landmark model: output 0 holds 21 x [x, y, z] in input
/// pixels, output 1 the hand presence score.
pub struct TfliteLandmarker {
    cfg: LandmarkerConfig,
    interp: Interpreter,
}

impl TfliteLandmarker {
    pub fn new(cfg: LandmarkerConfig) -> Result<Self> {
        let interp = Interpreter::load(&cfg.model_path, false)?;
        anyhow::ensure!(interp.output_count() >= 2, "landmark model needs landmark and presence outputs");
        Ok(Self { cfg, interp })
    }

    pub fn inspect(&mut self) -> Result<String> {
        self.interp.inspect()
    }

    fn run(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarks>> {
        let size = self.cfg.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        self.interp.set_input_image(&resized, Preprocess::None)?;
        self.interp.invoke()?;

        let raw = self.interp.output_f32(0)?;
        let presence = self.interp.output_f32(1)?.first().copied().unwrap_or(0.0);
        Ok(decode_hand(&raw, presence, size, image.width(), image.height(), self.cfg.min_presence))
    }
}

impl HandLandmarker for TfliteLandmarker {
    fn landmarks(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarks>, BackendError> {
        self.run(image).map_err(BackendError::runtime)
    }
}
