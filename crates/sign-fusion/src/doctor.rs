use anyhow::Result;

use crate::router::FusionPolicy;

pub fn check_policy(policy: &FusionPolicy) -> Result<()> {
    anyhow::ensure!((0.0..=1.0).contains(&policy.detector_accept_conf), "policy.detector_accept_conf must be within 0..1");
    anyhow::ensure!((0.0..=1.0).contains(&policy.classifier_accept_conf), "policy.classifier_accept_conf must be within 0..1");
    anyhow::ensure!(policy.top_k >= 1, "policy.top_k must be >= 1");
    anyhow::ensure!(policy.crop_size >= 32, "policy.crop_size too small");
    Ok(())
}
