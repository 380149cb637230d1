// src/stats/summary.rs
use serde::{Deserialize, Serialize};

use crate::error::{ensure_same_len, StatsResult};
use crate::stats::moments::Moments;
use crate::stats::pooling_rule::PoolingRule;

/// Partial statistics over one binning: equal-length `mean`, `std` and `count` vectors.
///
/// - Values are in real (not log) space; callers transform before and after.
/// - `count == 0` ⇒ `mean == std == 0`; `count < 3` ⇒ `std == 0`.
/// - `m2` (sum of squared deviations per bin) rides along so that the exact pooling rule
///   does not lose the spread of bins whose reported std was suppressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Summary {
    mean: Vec<f64>,
    std: Vec<f64>,
    count: Vec<f64>,
    m2: Vec<f64>,
}

impl Summary {
    /// `n` empty bins.
    pub fn empty(n: usize) -> Self {
        Self {
            mean: vec![0.0; n],
            std: vec![0.0; n],
            count: vec![0.0; n],
            m2: vec![0.0; n],
        }
    }

    /// Build from an externally computed `(mean, std, count)` triple of vectors.
    pub fn from_parts(mean: Vec<f64>, std: Vec<f64>, count: Vec<f64>) -> StatsResult<Self> {
        ensure_same_len("Summary::from_parts(mean, std)", mean.len(), std.len())?;
        ensure_same_len("Summary::from_parts(mean, count)", mean.len(), count.len())?;
        Ok(Self::from_moments(
            mean.iter()
                .zip(std.iter())
                .zip(count.iter())
                .map(|((&m, &s), &c)| Moments::from_triple(m, s, c))
                .collect(),
        ))
    }

    /// A one-bin summary, the vector form of a scalar statistic.
    pub fn from_scalar(m: Moments) -> Self {
        Self::from_moments(vec![m])
    }

    pub(crate) fn from_moments(moments: Vec<Moments>) -> Self {
        let mut out = Self::empty(moments.len());
        for (i, m) in moments.into_iter().enumerate() {
            out.set(i, m);
        }
        out
    }

    #[inline]
    pub(crate) fn set(&mut self, i: usize, m: Moments) {
        self.mean[i] = m.mean();
        self.std[i] = m.std();
        self.count[i] = m.count();
        self.m2[i] = m.m2();
    }

    /// Per-bin state at `i`.
    #[inline]
    pub fn moments_at(&self, i: usize) -> Moments {
        Moments::from_stored(self.count[i], self.mean[i], self.std[i], self.m2[i])
    }

    pub fn iter_moments(&self) -> impl Iterator<Item = Moments> + '_ {
        (0..self.len()).map(move |i| self.moments_at(i))
    }

    /// Number of bins.
    #[inline]
    pub fn len(&self) -> usize {
        self.count.len()
    }
    /// `true` when the summary has no bins at all (not when its bins are empty).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count.is_empty()
    }
    #[inline]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }
    #[inline]
    pub fn std(&self) -> &[f64] {
        &self.std
    }
    #[inline]
    pub fn count(&self) -> &[f64] {
        &self.count
    }
    #[inline]
    pub(crate) fn m2(&self) -> &[f64] {
        &self.m2
    }

    /// ∑y per bin.
    pub fn sum(&self) -> Vec<f64> {
        self.mean
            .iter()
            .zip(self.count.iter())
            .map(|(m, c)| m * c)
            .collect()
    }

    /// Samples across all bins.
    pub fn total_count(&self) -> f64 {
        self.count.iter().sum()
    }

    /// Means with empty bins replaced by NaN, for consumers that mask "no data".
    pub fn masked_mean(&self) -> Vec<f64> {
        self.masked(&self.mean)
    }

    /// Stds with empty bins replaced by NaN.
    pub fn masked_std(&self) -> Vec<f64> {
        self.masked(&self.std)
    }

    fn masked(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .zip(self.count.iter())
            .map(|(&v, &c)| if c > 0.0 { v } else { f64::NAN })
            .collect()
    }

    /// Pool `other` into `self` bin by bin.
    ///
    /// Shapes are checked before any bin is touched, so a mismatch leaves `self` intact.
    pub fn absorb(&mut self, other: &Summary, rule: PoolingRule) -> StatsResult<()> {
        ensure_same_len("Summary::absorb(pool, new)", self.len(), other.len())?;
        for i in 0..self.len() {
            let merged = self.moments_at(i).combine(other.moments_at(i), rule);
            self.set(i, merged);
        }
        Ok(())
    }
}

/// Vector entry point of the combiner: a new summary pooling `pool` and `new`.
pub fn combine_vector(pool: &Summary, new: &Summary, rule: PoolingRule) -> StatsResult<Summary> {
    let mut out = pool.clone();
    out.absorb(new, rule)?;
    Ok(out)
}

/// Running-list variant: append `summary` as a new entry instead of merging it.
///
/// Every entry of one list shares the same binning; returns the new list length.
pub fn pool_append(list: &mut Vec<Summary>, summary: Summary) -> StatsResult<usize> {
    if let Some(first) = list.first() {
        ensure_same_len("pool_append(list, new)", first.len(), summary.len())?;
    }
    list.push(summary);
    Ok(list.len())
}
