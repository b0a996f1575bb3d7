//! k-nearest-neighbour sign classifier over hand landmark feature vectors.

pub mod classifier;
pub mod dataset;
pub mod doctor;
pub mod model;

use serde::Deserialize;

pub use classifier::KnnLandmarkClassifier;
pub use dataset::Dataset;
pub use model::KnnModel;

/// How neighbours vote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Uniform,
    /// Inverse distance.
    Distance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Euclidean,
    Manhattan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnnConfig {
    /// Landmark dataset JSON: `{labels, samples, y}`.
    pub dataset_path: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub weights: Weighting,
    #[serde(default)]
    pub metric: Metric,
    #[serde(default = "default_standardize")]
    pub standardize: bool,
    /// Classes with fewer samples are dropped at load.
    #[serde(default = "default_min_class_count")]
    pub min_class_count: usize,
}

fn default_k() -> usize {
    5
}

fn default_standardize() -> bool {
    true
}

fn default_min_class_count() -> usize {
    2
}

impl KnnConfig {
    pub fn new(dataset_path: impl Into<String>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            k: default_k(),
            weights: Weighting::default(),
            metric: Metric::default(),
            standardize: default_standardize(),
            min_class_count: default_min_class_count(),
        }
    }
}
