use serde::{Deserialize, Serialize};

/// Controls how two summaries' spreads are folded together.
///
/// Semantics:
/// - `Exact`: parallel (Chan et al.) combination of population moments. The within-group
///            squared deviations are summed and the between-group mean shift
///            `na·nb·(ma − mb)² / n` is added, so pooling is associative, commutative and
///            reproduces the statistics of the union of the underlying samples.
/// - `WithinGroup`: the classic pooled-variance estimator. Each side contributes
///            `(n − 1)·std²` and the sum is divided by `n − 2`. The mean shift between
///            groups is ignored, so results depend on how samples were grouped.
///
/// Note: both rules report `std = 0` for fewer than three samples and `mean = 0` for
/// empty bins, and both leave a summary untouched when pooled with an empty one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PoolingRule {
    #[default]
    Exact,
    WithinGroup,
}

impl PoolingRule {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            PoolingRule::Exact => "exact",
            PoolingRule::WithinGroup => "within-group",
        }
    }
}
