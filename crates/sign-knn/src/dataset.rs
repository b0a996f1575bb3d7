use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Labelled landmark samples. `y[i]` indexes `labels`; `labels` may be empty,
/// in which case classes are named by index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub labels: Vec<String>,
    pub samples: Vec<Vec<f32>>,
    pub y: Vec<usize>,
}

impl Dataset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).with_context(|| format!("read dataset {}", path.display()))?;
        let ds: Dataset = serde_json::from_str(&s).context("parse dataset json")?;
        ds.validate()?;
        info!("knn: loaded {} samples / {} labels from {}", ds.samples.len(), ds.labels.len(), path.display());
        Ok(ds)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.samples.is_empty(), "dataset has no samples");
        anyhow::ensure!(
            self.samples.len() == self.y.len(),
            "dataset samples/y length mismatch ({} vs {})",
            self.samples.len(),
            self.y.len()
        );
        let dims = self.dims();
        anyhow::ensure!(dims > 0, "dataset samples are empty vectors");
        anyhow::ensure!(self.samples.iter().all(|s| s.len() == dims), "dataset samples differ in length");
        Ok(())
    }

    pub fn dims(&self) -> usize {
        self.samples.first().map(Vec::len).unwrap_or(0)
    }

    pub fn class_name(&self, class: usize) -> String {
        self.labels.get(class).cloned().unwrap_or_else(|| class.to_string())
    }

    /// Drops classes with fewer than `min_count` samples and re-indexes the
    /// survivors in ascending class order. Unchanged when no class qualifies.
    pub fn filter_min_class_count(self, min_count: usize) -> Self {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &c in &self.y {
            *counts.entry(c).or_default() += 1;
        }
        let kept: Vec<usize> = counts.iter().filter(|(_, n)| **n >= min_count).map(|(c, _)| *c).collect();
        if kept.is_empty() {
            return self;
        }
        let remap: BTreeMap<usize, usize> = kept.iter().enumerate().map(|(new, old)| (*old, new)).collect();

        let labels = if self.labels.is_empty() {
            Vec::new()
        } else {
            kept.iter().map(|c| self.class_name(*c)).collect()
        };
        let (samples, y) = self
            .samples
            .into_iter()
            .zip(self.y)
            .filter_map(|(s, c)| remap.get(&c).map(|nc| (s, *nc)))
            .unzip();

        let dropped = counts.len() - kept.len();
        if dropped > 0 {
            info!("knn: dropped {} classes with < {} samples", dropped, min_count);
        }
        Dataset { labels, samples, y }
    }
}
