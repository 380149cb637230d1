use serde::{Deserialize, Serialize};

use crate::stats::pooling_rule::PoolingRule;

/// Below this many samples a spread estimate is reported as zero.
pub const MIN_COUNT_FOR_STD: f64 = 3.0;

/// Per-bin pooled statistics.
///
/// `count` is kept in `f64` so that every collective exchanges doubles only. `m2` is the
/// sum of squared deviations from `mean`; it is what the exact rule pools, while `std` is
/// the reported value after the low-count convention has been applied.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Moments {
    count: f64,
    mean: f64,
    std: f64,
    m2: f64,
}

impl Moments {
    /// The empty bin: no samples, mean 0, std 0.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a reported `(mean, std, count)` triple.
    ///
    /// The triple is taken as given (a caller may hand in a spread for two samples); the
    /// conventions apply to everything pooled from it. The spread is estimated as
    /// `count·std²`, which is exact for population stds.
    pub fn from_triple(mean: f64, std: f64, count: f64) -> Self {
        debug_assert!(count >= 0.0, "negative sample count");
        if count <= 0.0 {
            return Self::empty();
        }
        Moments {
            count,
            mean,
            std,
            m2: count * std * std,
        }
    }

    /// Build from exact accumulators: sample count, mean, and sum of squared deviations.
    #[inline]
    pub(crate) fn from_m2(count: f64, mean: f64, m2: f64) -> Self {
        let std = if count > 0.0 { (m2 / count).sqrt() } else { 0.0 };
        Self::settle(count, mean, m2, std)
    }

    /// Reassemble a state previously split into columns by a `Summary`.
    #[inline]
    pub(crate) fn from_stored(count: f64, mean: f64, std: f64, m2: f64) -> Self {
        Moments {
            count,
            mean,
            std,
            m2,
        }
    }

    /// Apply the empty/low-count conventions to a raw state.
    fn settle(count: f64, mean: f64, m2: f64, std: f64) -> Self {
        if count <= 0.0 {
            return Self::empty();
        }
        let std = if count < MIN_COUNT_FOR_STD { 0.0 } else { std };
        Moments {
            count,
            mean,
            std,
            m2: m2.max(0.0),
        }
    }

    #[inline]
    pub fn count(&self) -> f64 {
        self.count
    }
    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean
    }
    #[inline]
    pub fn std(&self) -> f64 {
        self.std
    }
    /// Sum of squared deviations from the mean carried alongside the reported std.
    #[inline]
    pub fn m2(&self) -> f64 {
        self.m2
    }
    /// ∑y of the represented samples.
    #[inline]
    pub fn sum(&self) -> f64 {
        self.count * self.mean
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count <= 0.0
    }

    /// Pool `other` into `self` under `rule`.
    pub fn combine(self, other: Moments, rule: PoolingRule) -> Moments {
        if other.is_empty() {
            return self;
        }
        if self.is_empty() {
            return other;
        }
        let n = self.count + other.count;
        let mean = (self.count * self.mean + other.count * other.mean) / n;
        match rule {
            PoolingRule::Exact => {
                let delta = other.mean - self.mean;
                let m2 = self.m2 + other.m2 + delta * delta * self.count * other.count / n;
                Moments::from_m2(n, mean, m2)
            }
            PoolingRule::WithinGroup => {
                let var_n = bessel_term(self) + bessel_term(other);
                let std = if n >= MIN_COUNT_FOR_STD {
                    (var_n / (n - 2.0)).sqrt()
                } else {
                    0.0
                };
                Moments::settle(n, mean, n * std * std, std)
            }
        }
    }
}

/// `(n − 1)·std²`, with no contribution from fewer than two samples.
#[inline]
fn bessel_term(m: Moments) -> f64 {
    if m.count < 2.0 {
        0.0
    } else {
        (m.count - 1.0) * m.std * m.std
    }
}

/// Scalar entry point of the combiner.
#[inline]
pub fn combine_scalar(pool: Moments, new: Moments, rule: PoolingRule) -> Moments {
    pool.combine(new, rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::binning::moments_of;
    use crate::stats::test_helpers::{assert_exact, assert_rel_close, direct_stats, split_even};

    #[test]
    fn within_group_divides_by_n_minus_two() {
        let a = Moments::from_triple(3.0, 1.0, 2.0);
        let b = Moments::from_triple(7.0, 1.0, 2.0);
        let c = combine_scalar(a, b, PoolingRule::WithinGroup);
        assert_exact("count", 4.0, c.count());
        assert_exact("mean", 5.0, c.mean());
        assert_exact("std", 1.0, c.std());
    }

    #[test]
    fn exact_adds_between_group_shift() {
        let a = Moments::from_triple(3.0, 1.0, 2.0);
        let b = Moments::from_triple(7.0, 1.0, 2.0);
        let c = combine_scalar(a, b, PoolingRule::Exact);
        assert_exact("mean", 5.0, c.mean());
        // population variance of [2, 4, 6, 8] is 5
        assert_rel_close("std", 5.0_f64.sqrt(), c.std(), 1e-12);
    }

    #[test]
    fn exact_fold_over_groups_equals_direct_stats() {
        let values: Vec<f64> = (0..23).map(|i| ((i * 37) % 19) as f64 * 0.5 - 3.0).collect();
        let (mean, std, count) = direct_stats(&values);
        let pooled = split_even(&values, 4)
            .iter()
            .map(|g| moments_of(g))
            .fold(Moments::empty(), |acc, m| acc.combine(m, PoolingRule::Exact));
        assert_exact("count", count, pooled.count());
        assert_rel_close("mean", mean, pooled.mean(), 1e-12);
        assert_rel_close("std", std, pooled.std(), 1e-12);
    }

    #[test]
    fn empty_side_is_a_no_op_for_both_rules() {
        let a = Moments::from_triple(2.5, 0.75, 10.0);
        for rule in [PoolingRule::Exact, PoolingRule::WithinGroup] {
            assert_eq!(a.combine(Moments::empty(), rule), a);
            assert_eq!(Moments::empty().combine(a, rule), a);
            assert_eq!(
                Moments::empty().combine(Moments::empty(), rule),
                Moments::empty()
            );
        }
    }

    #[test]
    fn pooled_pairs_still_report_zero_std() {
        let a = Moments::from_triple(1.0, 0.5, 1.0);
        let b = Moments::from_triple(2.0, 0.5, 1.0);
        for rule in [PoolingRule::Exact, PoolingRule::WithinGroup] {
            assert_exact("std", 0.0, a.combine(b, rule).std());
        }
    }

    #[test]
    fn fewer_than_three_samples_report_zero_std() {
        let one = Moments::from_triple(1.0, 0.0, 1.0);
        let other = Moments::from_triple(100.0, 0.0, 1.0);
        let two = one.combine(other, PoolingRule::Exact);
        assert_exact("count", 2.0, two.count());
        assert_exact("std", 0.0, two.std());
        // the spread is still tracked for later pooling
        assert!(two.m2() > 0.0);
    }
}
