mod nms;
pub mod camera;
pub mod doctor;
pub mod preprocess;
#[cfg(feature = "vision-tflite")]
pub mod tflite;

use serde::{Deserialize, Serialize};

use sign_fusion::Prediction;

pub use preprocess::Preprocess;

/// Raw detector output row after decode. Box is centre form in model output
/// units (normalized or model-input pixels, see `DetectorConfig::normalized_coords`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub conf: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl Detection {
    pub fn corners(&self) -> [f32; 4] {
        [self.cx - self.w / 2.0, self.cy - self.h / 2.0, self.cx + self.w / 2.0, self.cy + self.h / 2.0]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    pub model_path: String,
    #[serde(default)]
    pub use_coral: bool,
    #[serde(default)]
    pub model_path_edgetpu: Option<String>,

    pub img_w: u32,
    pub img_h: u32,
    pub num_classes: usize,
    #[serde(default)]
    pub class_names: Vec<String>,

    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    #[serde(default = "default_output_layout")]
    pub output_layout: String, // "ultralytics"
    /// Box coordinates come out in 0..1 rather than model-input pixels.
    #[serde(default = "default_true")]
    pub normalized_coords: bool,

    /// Boxes smaller than this (px², input image) are dropped.
    #[serde(default = "default_min_box_area")]
    pub min_box_area: f32,
    /// Boxes covering more than this share of the image are dropped.
    #[serde(default = "default_max_box_fraction")]
    pub max_box_fraction: f32,
}

fn default_conf_threshold() -> f32 {
    0.05
}
fn default_nms_iou() -> f32 {
    0.5
}
fn default_max_detections() -> usize {
    10
}
fn default_output_layout() -> String {
    "ultralytics".to_string()
}
fn default_true() -> bool {
    true
}
fn default_min_box_area() -> f32 {
    100.0
}
fn default_max_box_fraction() -> f32 {
    0.8
}

impl DetectorConfig {
    pub fn class_name(&self, id: usize) -> String {
        self.class_names.get(id).cloned().unwrap_or_else(|| id.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enable: bool,
    pub model_path: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Newline-separated class names.
    #[serde(default)]
    pub labels_path: Option<String>,
    #[serde(default)]
    pub preprocess: Preprocess,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkerConfig {
    pub model_path: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Hands scoring below this are ignored.
    #[serde(default = "default_min_presence")]
    pub min_presence: f32,
}

fn default_input_size() -> u32 {
    224
}
fn default_min_presence() -> f32 {
    0.2
}

pub fn postprocess_ultralytics(raw: &[f32], num_preds: usize, num_classes: usize, conf_th: f32) -> Vec<Detection> {
    // [cx, cy, w, h, obj, cls0..]
    let stride = 5 + num_classes;
    let mut out = Vec::new();

    for row in raw.chunks_exact(stride).take(num_preds) {
        let (cx, cy, w, h, obj) = (row[0], row[1], row[2], row[3], row[4]);

        let mut best_c = 0usize;
        let mut best_p = 0.0f32;
        for (c, p) in row[5..].iter().enumerate() {
            if *p > best_p {
                best_p = *p;
                best_c = c;
            }
        }
        let conf = obj * best_p;
        if conf >= conf_th {
            out.push(Detection { class_id: best_c, conf, cx, cy, w, h });
        }
    }
    out
}

/// Greedy class-agnostic NMS, highest confidence first.
pub fn nms_filter(mut dets: Vec<Detection>, iou_th: f32, max_det: usize) -> Vec<Detection> {
    dets.sort_by(|a, b| b.conf.total_cmp(&a.conf));
    let mut kept: Vec<Detection> = Vec::new();

    'outer: for d in dets {
        if kept.len() >= max_det {
            break;
        }
        for k in &kept {
            if nms::iou(d.corners(), k.corners()) >= iou_th {
                continue 'outer;
            }
        }
        kept.push(d);
    }
    kept
}

/// Maps detections onto the analysed image (`img_w` x `img_h` px), drops
/// implausible boxes and names the classes.
pub fn to_predictions(dets: &[Detection], cfg: &DetectorConfig, img_w: u32, img_h: u32) -> Vec<Prediction> {
    let (fw, fh) = (img_w as f32, img_h as f32);
    let (sx, sy) = if cfg.normalized_coords {
        (fw, fh)
    } else {
        (fw / cfg.img_w.max(1) as f32, fh / cfg.img_h.max(1) as f32)
    };
    let image_area = fw * fh;

    dets.iter()
        .filter_map(|d| {
            let [x1, y1, x2, y2] = d.corners();
            let bbox = [(x1 * sx).clamp(0.0, fw), (y1 * sy).clamp(0.0, fh), (x2 * sx).clamp(0.0, fw), (y2 * sy).clamp(0.0, fh)];
            let area = (bbox[2] - bbox[0]) * (bbox[3] - bbox[1]);
            if area < cfg.min_box_area || area > cfg.max_box_fraction * image_area {
                return None;
            }
            Some(Prediction::new(cfg.class_name(d.class_id), d.conf).with_box(bbox))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DetectorConfig {
        DetectorConfig {
            model_path: "det.tflite".into(),
            use_coral: false,
            model_path_edgetpu: None,
            img_w: 320,
            img_h: 320,
            num_classes: 2,
            class_names: vec!["hello".into(), "thanks".into()],
            conf_threshold: 0.05,
            nms_iou_threshold: 0.5,
            max_detections: 10,
            output_layout: "ultralytics".into(),
            normalized_coords: true,
            min_box_area: 100.0,
            max_box_fraction: 0.8,
        }
    }

    fn det(class_id: usize, conf: f32, cx: f32, cy: f32, w: f32, h: f32) -> Detection {
        Detection { class_id, conf, cx, cy, w, h }
    }

    #[test]
    fn decode_scores_objectness_times_class() {
        #[rustfmt::skip]
        let raw = [
            0.5, 0.5, 0.2, 0.2, 0.9, 0.1, 0.8,
            0.1, 0.1, 0.1, 0.1, 0.1, 0.2, 0.1,
        ];
        let dets = postprocess_ultralytics(&raw, 2, 2, 0.05);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].conf - 0.72).abs() < 1e-6);
    }

    #[test]
    fn decode_ignores_truncated_rows() {
        let raw = [0.5, 0.5, 0.2, 0.2, 0.9, 0.9, 0.1, 0.5];
        assert_eq!(postprocess_ultralytics(&raw, 5, 2, 0.0).len(), 1);
    }

    #[test]
    fn nms_suppresses_overlaps_and_caps() {
        let dets = vec![
            det(0, 0.6, 0.50, 0.50, 0.2, 0.2),
            det(0, 0.9, 0.51, 0.50, 0.2, 0.2),
            det(1, 0.7, 0.10, 0.10, 0.1, 0.1),
            det(1, 0.3, 0.90, 0.90, 0.1, 0.1),
        ];
        let kept = nms_filter(dets.clone(), 0.5, 10);
        let confs: Vec<f32> = kept.iter().map(|d| d.conf).collect();
        assert_eq!(confs, vec![0.9, 0.7, 0.3]);

        assert_eq!(nms_filter(dets, 0.5, 2).len(), 2);
    }

    #[test]
    fn predictions_are_pixel_corners() {
        let preds = to_predictions(&[det(1, 0.8, 0.5, 0.5, 0.25, 0.5)], &cfg(), 640, 480);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].label, "thanks");
        assert_eq!(preds[0].bounding_box, Some([240.0, 120.0, 400.0, 360.0]));
    }

    #[test]
    fn model_pixel_coords_are_rescaled() {
        let c = DetectorConfig { normalized_coords: false, ..cfg() };
        let preds = to_predictions(&[det(0, 0.8, 160.0, 160.0, 80.0, 80.0)], &c, 640, 640);
        assert_eq!(preds[0].bounding_box, Some([240.0, 240.0, 400.0, 400.0]));
    }

    #[test]
    fn implausible_boxes_are_dropped() {
        let dets = [
            // 6x6 px
            det(0, 0.9, 0.5, 0.5, 0.01, 0.01),
            // whole frame
            det(0, 0.9, 0.5, 0.5, 1.0, 1.0),
            det(0, 0.9, 0.5, 0.5, 0.5, 0.5),
        ];
        let preds = to_predictions(&dets, &cfg(), 600, 600);
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].bounding_box, Some([150.0, 150.0, 450.0, 450.0]));
    }

    #[test]
    fn unknown_class_is_named_by_id() {
        let preds = to_predictions(&[det(7, 0.8, 0.5, 0.5, 0.3, 0.3)], &cfg(), 100, 100);
        assert_eq!(preds[0].label, "7");
    }
}
