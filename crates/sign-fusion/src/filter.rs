use crate::merge::MergedResult;
use crate::types::Prediction;

/// Drops entries under `threshold` (and unlabeled ones), sorts best first and
/// keeps at most `top_k`. Equal confidences keep label order.
pub fn accept(merged: MergedResult, threshold: f32, top_k: usize) -> Vec<Prediction> {
    let mut kept: Vec<Prediction> = merged
        .into_predictions()
        .into_iter()
        .filter(|p| !p.label.is_empty() && p.confidence >= threshold)
        .collect();
    kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    kept.truncate(top_k);
    kept
}
