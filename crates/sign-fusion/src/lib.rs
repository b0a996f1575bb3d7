//! sign-fusion: fuses several imperfect hand-sign recognizers into one decision.
//!
//! Frame flow: variants -> dedup -> detector per variant -> merge -> accept,
//! wrapped in a classifier / detector / landmark cascade. Batches of frames are
//! reduced to a consensus label.

pub mod backend;
pub mod consensus;
pub mod context;
pub mod dedup;
pub mod doctor;
pub mod error;
pub mod filter;
pub mod hand;
pub mod merge;
pub mod router;
pub mod types;
pub mod variants;

pub use backend::{Backend, BackendError, HandLocator, Rect, Role};
pub use consensus::{aggregate, BatchConsensus, ConsensusAggregator, LabelTally};
pub use context::{FusionContext, FusionContextBuilder};
pub use dedup::dedup_variants;
pub use error::FusionError;
pub use filter::accept;
pub use hand::{HandLandmarker, HandLandmarks, LandmarkHandLocator};
pub use merge::{merge_predictions, MergedResult};
pub use router::{FusionPolicy, StageOutcome};
pub use types::{BBox, Prediction, RouterDecision, Source};
pub use variants::{generate_variants, AugmentationPolicy};
