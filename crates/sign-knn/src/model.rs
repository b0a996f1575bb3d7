use anyhow::Result;
use tracing::info;

use crate::dataset::Dataset;
use crate::{KnnConfig, Metric, Weighting};

/// Per-feature standardization, population std; constant features scale by 1.
#[derive(Debug, Clone)]
struct Scaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl Scaler {
    fn fit(samples: &[Vec<f32>]) -> Self {
        let dims = samples.first().map(Vec::len).unwrap_or(0);
        let n = samples.len().max(1) as f64;
        let mut mean = vec![0f64; dims];
        for s in samples {
            for (m, v) in mean.iter_mut().zip(s) {
                *m += *v as f64;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0f64; dims];
        for s in samples {
            for ((acc, v), m) in var.iter_mut().zip(s).zip(&mean) {
                *acc += (*v as f64 - m).powi(2);
            }
        }
        let scale = var
            .iter()
            .map(|v| {
                let sd = (v / n).sqrt();
                if sd > f64::EPSILON { sd as f32 } else { 1.0 }
            })
            .collect();

        Self { mean: mean.into_iter().map(|m| m as f32).collect(), scale }
    }

    fn transform(&self, x: &[f32]) -> Vec<f32> {
        x.iter().zip(&self.mean).zip(&self.scale).map(|((v, m), s)| (v - m) / s).collect()
    }
}

#[derive(Debug, Clone)]
pub struct KnnModel {
    samples: Vec<Vec<f32>>,
    y: Vec<usize>,
    labels: Vec<String>,
    n_classes: usize,
    k: usize,
    weights: Weighting,
    metric: Metric,
    scaler: Option<Scaler>,
}

impl KnnModel {
    pub fn fit(dataset: Dataset, cfg: &KnnConfig) -> Result<Self> {
        dataset.validate()?;
        anyhow::ensure!(cfg.k >= 1, "knn.k must be >= 1");

        let n_classes = dataset.y.iter().max().map(|m| m + 1).unwrap_or(0);
        let scaler = cfg.standardize.then(|| Scaler::fit(&dataset.samples));
        let samples = match &scaler {
            Some(sc) => dataset.samples.iter().map(|s| sc.transform(s)).collect(),
            None => dataset.samples,
        };
        info!(
            "knn: fitted k={} weights={:?} metric={:?} on {} samples / {} classes",
            cfg.k,
            cfg.weights,
            cfg.metric,
            samples.len(),
            n_classes
        );
        Ok(Self {
            samples,
            y: dataset.y,
            labels: dataset.labels,
            n_classes,
            k: cfg.k,
            weights: cfg.weights,
            metric: cfg.metric,
            scaler,
        })
    }

    pub fn dims(&self) -> usize {
        self.samples.first().map(Vec::len).unwrap_or(0)
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn class_name(&self, class: usize) -> String {
        self.labels.get(class).cloned().unwrap_or_else(|| class.to_string())
    }

    /// Class probabilities for one feature vector, indexed by class.
    pub fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        anyhow::ensure!(
            features.len() == self.dims(),
            "feature length {} does not match model ({})",
            features.len(),
            self.dims()
        );
        let query = match &self.scaler {
            Some(sc) => sc.transform(features),
            None => features.to_vec(),
        };

        let mut dist: Vec<(f32, usize)> =
            self.samples.iter().enumerate().map(|(i, s)| (self.distance(&query, s), i)).collect();
        // stable: equal distances keep dataset order
        dist.sort_by(|a, b| a.0.total_cmp(&b.0));
        let neighbours = &dist[..self.k.min(dist.len())];

        let mut votes = vec![0f32; self.n_classes];
        let exact = neighbours.iter().any(|(d, _)| *d == 0.0);
        for (d, i) in neighbours {
            let w = match self.weights {
                Weighting::Uniform => 1.0,
                // an exact match takes all the weight
                Weighting::Distance if exact => {
                    if *d == 0.0 { 1.0 } else { 0.0 }
                }
                Weighting::Distance => 1.0 / d,
            };
            votes[self.y[*i]] += w;
        }

        let total: f32 = votes.iter().sum();
        if total > 0.0 {
            votes.iter_mut().for_each(|v| *v /= total);
        }
        Ok(votes)
    }

    /// Best class and its probability; the lowest index wins ties.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        let pairs = a.iter().zip(b);
        match self.metric {
            Metric::Euclidean => pairs.map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt(),
            Metric::Manhattan => pairs.map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_clusters() -> Dataset {
        Dataset {
            labels: vec!["hello".into(), "bye".into()],
            samples: vec![
                vec![0.0, 0.0],
                vec![0.1, 0.0],
                vec![0.0, 0.1],
                vec![5.0, 5.0],
                vec![5.1, 5.0],
            ],
            y: vec![0, 0, 0, 1, 1],
        }
    }

    fn cfg(k: usize, weights: Weighting, standardize: bool) -> KnnConfig {
        KnnConfig { k, weights, standardize, ..KnnConfig::new("unused.json") }
    }

    #[test]
    fn uniform_vote_fractions() {
        let m = KnnModel::fit(two_clusters(), &cfg(5, Weighting::Uniform, false)).unwrap();
        let p = m.predict_proba(&[0.05, 0.05]).unwrap();
        assert!((p[0] - 0.6).abs() < 1e-6);
        assert!((p[1] - 0.4).abs() < 1e-6);
        assert_eq!(m.class_name(0), "hello");
    }

    #[test]
    fn nearest_cluster_wins_with_small_k() {
        let m = KnnModel::fit(two_clusters(), &cfg(2, Weighting::Uniform, true)).unwrap();
        assert_eq!(m.predict_proba(&[5.05, 4.9]).unwrap(), vec![0.0, 1.0]);
        assert_eq!(m.class_name(1), "bye");
    }

    #[test]
    fn distance_weighting_favours_close_samples() {
        let m = KnnModel::fit(two_clusters(), &cfg(5, Weighting::Distance, false)).unwrap();
        let p = m.predict_proba(&[4.0, 4.0]).unwrap();
        assert!(p[1] > 0.6);
    }

    #[test]
    fn exact_match_takes_all_weight() {
        let m = KnnModel::fit(two_clusters(), &cfg(5, Weighting::Distance, false)).unwrap();
        let p = m.predict_proba(&[5.0, 5.0]).unwrap();
        assert_eq!(p, vec![0.0, 1.0]);
    }

    #[test]
    fn manhattan_metric() {
        let c = KnnConfig { metric: Metric::Manhattan, ..cfg(1, Weighting::Uniform, false) };
        let m = KnnModel::fit(two_clusters(), &c).unwrap();
        assert_eq!(m.distance(&[0.0, 0.0], &[3.0, -4.0]), 7.0);
    }

    #[test]
    fn wrong_feature_length_is_error() {
        let m = KnnModel::fit(two_clusters(), &cfg(3, Weighting::Uniform, true)).unwrap();
        assert!(m.predict_proba(&[1.0]).is_err());
    }

    #[test]
    fn constant_feature_does_not_divide_by_zero() {
        let ds = Dataset { labels: Vec::new(), samples: vec![vec![1.0, 0.0], vec![1.0, 2.0]], y: vec![0, 1] };
        let m = KnnModel::fit(ds, &cfg(1, Weighting::Uniform, true)).unwrap();
        let p = m.predict_proba(&[1.0, 1.9]).unwrap();
        assert_eq!(p, vec![0.0, 1.0]);
        assert_eq!(m.class_name(1), "1");
    }

    #[test]
    fn k_larger_than_dataset_uses_all() {
        let m = KnnModel::fit(two_clusters(), &cfg(50, Weighting::Uniform, false)).unwrap();
        let p = m.predict_proba(&[9.0, 9.0]).unwrap();
        assert!((p[0] - 0.6).abs() < 1e-6);
    }
}
