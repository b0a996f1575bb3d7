use anyhow::Result;
use std::path::Path;

use crate::camera::CameraConfig;
use crate::{ClassifierConfig, DetectorConfig, LandmarkerConfig};

pub fn check_detector(cfg: &DetectorConfig) -> Result<()> {
    anyhow::ensure!(cfg.img_w > 0 && cfg.img_h > 0, "detector.img_w/img_h must be > 0");
    anyhow::ensure!(cfg.num_classes >= 1, "detector.num_classes must be >= 1");
    anyhow::ensure!(
        cfg.class_names.is_empty() || cfg.class_names.len() == cfg.num_classes,
        "detector.class_names has {} entries, num_classes is {}",
        cfg.class_names.len(),
        cfg.num_classes
    );
    anyhow::ensure!((0.0..=1.0).contains(&cfg.conf_threshold), "detector.conf_threshold must be within 0..1");
    anyhow::ensure!((0.0..=1.0).contains(&cfg.nms_iou_threshold), "detector.nms_iou_threshold must be within 0..1");
    anyhow::ensure!(cfg.max_detections >= 1, "detector.max_detections must be >= 1");
    anyhow::ensure!(cfg.output_layout == "ultralytics", "unsupported detector.output_layout: {}", cfg.output_layout);
    anyhow::ensure!(
        cfg.max_box_fraction > 0.0 && cfg.max_box_fraction <= 1.0,
        "detector.max_box_fraction must be within (0, 1]"
    );
    let model = match (&cfg.model_path_edgetpu, cfg.use_coral) {
        (Some(p), true) => p,
        (None, true) => anyhow::bail!("detector.use_coral=true needs detector.model_path_edgetpu"),
        _ => &cfg.model_path,
    };
    check_model_file("detector", model)
}

pub fn check_classifier(cfg: &ClassifierConfig) -> Result<()> {
    anyhow::ensure!(cfg.input_size >= 32, "classifier.input_size too small");
    if let Some(labels) = &cfg.labels_path {
        anyhow::ensure!(Path::new(labels).is_file(), "classifier.labels_path not found: {}", labels);
    }
    check_model_file("classifier", &cfg.model_path)
}

pub fn check_landmarker(cfg: &LandmarkerConfig) -> Result<()> {
    anyhow::ensure!(cfg.input_size >= 32, "landmarks.input_size too small");
    anyhow::ensure!((0.0..=1.0).contains(&cfg.min_presence), "landmarks.min_presence must be within 0..1");
    check_model_file("landmarks", &cfg.model_path)
}

pub fn check_camera(cfg: &CameraConfig) -> Result<()> {
    anyhow::ensure!(
        matches!(cfg.mode.as_str(), "libcamera-jpeg" | "v4l2-mjpeg"),
        "camera.mode must be libcamera-jpeg or v4l2-mjpeg"
    );
    anyhow::ensure!(cfg.width >= 64 && cfg.height >= 64, "camera resolution too small");
    anyhow::ensure!(cfg.fps >= 1, "camera.fps must be >= 1");
    anyhow::ensure!(cfg.burst_frames >= 1, "camera.burst_frames must be >= 1");
    Ok(())
}

fn check_model_file(section: &str, path: &str) -> Result<()> {
    anyhow::ensure!(Path::new(path).is_file(), "{}.model_path not found: {}", section, path);
    Ok(())
}
