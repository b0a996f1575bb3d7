use thiserror::Error;

/// Conditions that escape `score` / `score_batch`. Everything else degrades
/// to an empty decision.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("image payload is not decodable: {0}")]
    UndecodableImage(#[source] image::ImageError),
    #[error("no backend capability is available")]
    NoBackends,
}
