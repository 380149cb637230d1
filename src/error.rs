// src/error.rs
use thiserror::Error;

/// Library-wide error for rsage-stats.
///
/// Degenerate bins (zero or fewer than three samples) are conventions, not errors, and
/// never surface here. Everything below is fatal for the run: a worker that bails out of
/// the reduction sequence leaves every other worker waiting on the next collective.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// Two arrays that must line up bin-for-bin (or sample-for-sample) have different lengths.
    #[error("rsage-stats: length mismatch in {context}: {left} vs {right}")]
    ShapeMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },

    #[error("rsage-stats: invalid bin specification: {reason}")]
    InvalidBinSpec { reason: String },

    #[error("rsage-stats: invalid reduction plan: {reason}")]
    InvalidPlan { reason: String },

    #[error("rsage-stats: model index {model} is not part of the plan")]
    UnknownModel { model: usize },

    #[error("rsage-stats: snapshot {snapshot} is not listed for model {model}")]
    UnknownSnapshot { model: usize, snapshot: u32 },

    #[error("rsage-stats: a worker group needs at least one rank")]
    EmptyGroup,

    /// Workers issued collectives in a different order or with different payloads.
    #[error("rsage-stats: collective divergence on rank {rank}: {reason}")]
    CollectiveDivergence { rank: usize, reason: String },

    /// A collective did not complete in time; the group is considered dead.
    #[error("rsage-stats: collective timed out on rank {rank} after {waited_ms} ms")]
    CollectiveTimeout { rank: usize, waited_ms: u128 },

    #[error("rsage-stats: codec error: {0}")]
    Codec(String),
}

pub type StatsResult<T> = Result<T, StatsError>;

/// Fail fast when two slices that must be paired element-wise differ in length.
#[inline]
pub(crate) fn ensure_same_len(context: &'static str, left: usize, right: usize) -> StatsResult<()> {
    if left != right {
        return Err(StatsError::ShapeMismatch {
            context,
            left,
            right,
        });
    }
    Ok(())
}
