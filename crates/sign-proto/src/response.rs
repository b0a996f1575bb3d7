use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sign_fusion::{BBox, BatchConsensus, Prediction, Role, RouterDecision, Source};

use crate::now_unix_ms;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub ts_unix_ms: i64,
    pub success: bool,
    /// Same as `confidence`; kept for clients that read `score`.
    pub score: f32,
    pub label: Option<String>,
    pub confidence: f32,
    pub bounding_box: Option<BBox>,
    pub all_predictions: Vec<Prediction>,
    pub source: Source,
}

impl From<RouterDecision> for ScoreResponse {
    fn from(d: RouterDecision) -> Self {
        Self {
            ts_unix_ms: now_unix_ms(),
            success: true,
            score: d.confidence,
            label: d.label,
            confidence: d.confidence,
            bounding_box: d.bounding_box,
            all_predictions: d.predictions,
            source: d.source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEntry {
    pub sum_conf: f64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchScoreResponse {
    pub ts_unix_ms: i64,
    pub success: bool,
    pub label: Option<String>,
    pub confidence: f32,
    pub frames: usize,
    pub consensus: BTreeMap<String, ConsensusEntry>,
}

impl From<BatchConsensus> for BatchScoreResponse {
    fn from(c: BatchConsensus) -> Self {
        let consensus = c
            .tallies
            .into_iter()
            .map(|(label, t)| (label, ConsensusEntry { sum_conf: t.sum_confidence, count: t.frame_count }))
            .collect();
        Self {
            ts_unix_ms: now_unix_ms(),
            success: true,
            label: c.label,
            confidence: c.confidence,
            frames: c.frames,
            consensus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ts_unix_ms: i64,
    /// "ok" when every configured backend is ready, "degraded" when some
    /// are, "unavailable" otherwise.
    pub status: String,
    pub model_ready: bool,
    /// Keyed `role/name`.
    pub backends: BTreeMap<String, bool>,
    pub hand_locator: bool,
}

impl HealthResponse {
    pub fn from_readiness(readiness: &[(Role, String, bool)], hand_locator: bool) -> Self {
        let backends: BTreeMap<String, bool> =
            readiness.iter().map(|(role, name, ready)| (format!("{}/{}", role, name), *ready)).collect();
        let ready = backends.values().filter(|r| **r).count();
        let status = match ready {
            0 => "unavailable",
            n if n == backends.len() => "ok",
            _ => "degraded",
        };
        Self {
            ts_unix_ms: now_unix_ms(),
            status: status.to_string(),
            model_ready: ready > 0,
            backends,
            hand_locator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sign_fusion::ConsensusAggregator;

    #[test]
    fn score_from_detector_decision() {
        let d = RouterDecision::from_accepted(
            Source::Detector,
            vec![Prediction::new("hello", 0.9).with_box([1.0, 2.0, 3.0, 4.0]), Prediction::new("yes", 0.4)],
        );
        let r = ScoreResponse::from(d);
        assert!(r.success);
        assert_eq!(r.score, 0.9);
        assert_eq!(r.label.as_deref(), Some("hello"));
        assert_eq!(r.all_predictions.len(), 2);

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["source"], "detector");
        assert_eq!(v["bounding_box"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert!(v["ts_unix_ms"].as_i64().unwrap() > 0);
    }

    #[test]
    fn none_decision_serializes_nulls() {
        let v = serde_json::to_value(ScoreResponse::from(RouterDecision::none())).unwrap();
        assert_eq!(v["source"], "none");
        assert!(v["label"].is_null());
        assert_eq!(v["confidence"], 0.0);
        assert_eq!(v["all_predictions"], serde_json::json!([]));
    }

    #[test]
    fn batch_consensus_map() {
        let mut agg = ConsensusAggregator::new();
        agg.push(Some("hello"), 0.5);
        agg.push(None, 0.0);
        agg.push(Some("hello"), 0.25);
        let r = BatchScoreResponse::from(agg.finish());
        assert_eq!(r.frames, 3);
        assert_eq!(r.consensus["hello"], ConsensusEntry { sum_conf: 0.75, count: 2 });

        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["consensus"]["hello"]["count"], 2);
    }

    #[test]
    fn empty_batch_response() {
        let r = BatchScoreResponse::from(ConsensusAggregator::new().finish());
        assert_eq!(r.frames, 0);
        assert_eq!(r.label, None);
        assert!(r.consensus.is_empty());
    }

    #[test]
    fn health_status_levels() {
        let all = [(Role::Detector, "det".to_string(), true), (Role::LandmarkClassifier, "knn".to_string(), true)];
        let h = HealthResponse::from_readiness(&all, true);
        assert_eq!(h.status, "ok");
        assert!(h.backends["detector/det"]);

        let some = [(Role::Detector, "det".to_string(), false), (Role::LandmarkClassifier, "knn".to_string(), true)];
        assert_eq!(HealthResponse::from_readiness(&some, false).status, "degraded");

        let h = HealthResponse::from_readiness(&[], false);
        assert_eq!(h.status, "unavailable");
        assert!(!h.model_ready);
    }
}
