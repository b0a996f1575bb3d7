pub mod response;

pub use response::{BatchScoreResponse, ConsensusEntry, HealthResponse, ScoreResponse};

/// Milliseconds since the Unix epoch, UTC.
pub fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
