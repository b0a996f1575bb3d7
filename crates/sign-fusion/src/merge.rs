use std::cmp::Ordering;
use std::collections::btree_map::{BTreeMap, Entry};
use tracing::debug;

use crate::types::{BBox, Prediction};

/// Best prediction seen per label across all variant responses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedResult {
    best: BTreeMap<String, Prediction>,
}

impl MergedResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `p` if it beats the current entry for its label. Non-finite
    /// confidences are ignored.
    pub fn insert(&mut self, p: Prediction) {
        if !p.confidence.is_finite() {
            debug!("merge: dropping non-finite confidence for {:?}", p.label);
            return;
        }
        match self.best.entry(p.label.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(p);
            }
            Entry::Occupied(mut slot) => {
                if outranks(&p, slot.get()) {
                    slot.insert(p);
                }
            }
        }
    }

    pub fn get(&self, label: &str) -> Option<&Prediction> {
        self.best.get(label)
    }

    pub fn len(&self) -> usize {
        self.best.len()
    }

    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }

    pub fn into_predictions(self) -> Vec<Prediction> {
        self.best.into_values().collect()
    }
}

impl FromIterator<Prediction> for MergedResult {
    fn from_iter<I: IntoIterator<Item = Prediction>>(iter: I) -> Self {
        let mut merged = MergedResult::new();
        for p in iter {
            merged.insert(p);
        }
        merged
    }
}

/// Max-confidence merge of per-variant responses. The result does not depend
/// on response order.
pub fn merge_predictions<I>(responses: I) -> MergedResult
where
    I: IntoIterator<Item = Vec<Prediction>>,
{
    responses.into_iter().flatten().collect()
}

// Equal confidences fall back to a fixed box order so the merge stays commutative.
fn outranks(candidate: &Prediction, current: &Prediction) -> bool {
    match candidate.confidence.total_cmp(&current.confidence) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => box_order(&candidate.bounding_box, &current.bounding_box) == Ordering::Less,
    }
}

fn box_order(a: &Option<BBox>, b: &Option<BBox>) -> Ordering {
    match (a, b) {
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
        (Some(a), Some(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(label: &str, conf: f32) -> Prediction {
        Prediction::new(label, conf)
    }

    #[test]
    fn keeps_max_confidence_per_label() {
        let merged = merge_predictions(vec![
            vec![p("A", 0.4), p("B", 0.9)],
            vec![p("A", 0.7)],
            vec![p("B", 0.2), p("C", 0.1)],
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("A").unwrap().confidence, 0.7);
        assert_eq!(merged.get("B").unwrap().confidence, 0.9);
        assert_eq!(merged.get("C").unwrap().confidence, 0.1);
    }

    #[test]
    fn box_travels_with_the_winner() {
        let merged = merge_predictions(vec![
            vec![p("A", 0.3).with_box([0.0, 0.0, 1.0, 1.0])],
            vec![p("A", 0.8).with_box([5.0, 5.0, 9.0, 9.0])],
        ]);
        assert_eq!(merged.get("A").unwrap().bounding_box, Some([5.0, 5.0, 9.0, 9.0]));
    }

    #[test]
    fn order_of_responses_does_not_matter() {
        let responses = vec![
            vec![p("A", 0.5).with_box([1.0, 1.0, 2.0, 2.0]), p("B", 0.3)],
            vec![p("A", 0.5).with_box([0.0, 0.0, 2.0, 2.0])],
            vec![p("B", 0.6), p("A", 0.1)],
        ];
        let forward = merge_predictions(responses.clone());
        let mut reversed = responses.clone();
        reversed.reverse();
        let rotated = vec![responses[1].clone(), responses[2].clone(), responses[0].clone()];
        assert_eq!(forward, merge_predictions(reversed));
        assert_eq!(forward, merge_predictions(rotated));
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let responses = vec![vec![p("A", 0.5)], vec![p("A", 0.6), p("B", 0.2)]];
        let once = merge_predictions(responses.clone());
        let twice = merge_predictions(vec![once.clone().into_predictions(), once.clone().into_predictions()]);
        assert_eq!(once, twice);
    }

    #[test]
    fn single_variant_round_trips() {
        let preds = vec![p("B", 0.2).with_box([1.0, 2.0, 3.0, 4.0]), p("A", 0.9)];
        let mut out = merge_predictions(vec![preds.clone()]).into_predictions();
        let mut expected = preds;
        out.sort_by(|a, b| a.label.cmp(&b.label));
        expected.sort_by(|a, b| a.label.cmp(&b.label));
        assert_eq!(out, expected);
    }

    #[test]
    fn nothing_is_synthesized() {
        let merged = merge_predictions(vec![Vec::new(), vec![p("A", 0.2)], Vec::new()]);
        assert!(merged.get("B").is_none());
        assert_eq!(merged.len(), 1);
        assert!(merge_predictions(Vec::<Vec<Prediction>>::new()).is_empty());
    }

    #[test]
    fn nan_confidence_is_ignored() {
        let merged = merge_predictions(vec![vec![p("A", f32::NAN), p("A", 0.3)]]);
        assert_eq!(merged.get("A").unwrap().confidence, 0.3);
    }
}
