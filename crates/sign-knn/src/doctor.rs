use anyhow::Result;
use std::path::Path;

use crate::KnnConfig;

pub fn check_knn(cfg: &KnnConfig) -> Result<()> {
    anyhow::ensure!(cfg.k >= 1, "knn.k must be >= 1");
    anyhow::ensure!(cfg.min_class_count >= 1, "knn.min_class_count must be >= 1");
    anyhow::ensure!(Path::new(&cfg.dataset_path).is_file(), "knn.dataset_path not found: {}", cfg.dataset_path);
    Ok(())
}
