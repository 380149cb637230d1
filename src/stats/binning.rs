// src/stats/binning.rs
//
// Fixed-width histogram binning of a dependent quantity against an independent one.
//
// Bins are half-open `[low + i·width, low + (i+1)·width)`; the last bin stops at `high`.
// Samples outside `[low, high)` (or with a non-finite independent value) are dropped and
// counted, never reported as errors.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_same_len, StatsError, StatsResult};
use crate::stats::moments::Moments;
use crate::stats::summary::Summary;

/* ============================
 * Bin specification
 * ============================ */

/// Largest bin count a specification may ask for.
pub const MAX_BINS: usize = u32::MAX as usize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawBinSpec {
    low: f64,
    high: f64,
    width: f64,
}

/// `(lower_bound, upper_bound, bin_width)` over the independent variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBinSpec", into = "RawBinSpec")]
pub struct BinSpec {
    low: f64,
    high: f64,
    width: f64,
    n_bins: usize,
}

impl TryFrom<RawBinSpec> for BinSpec {
    type Error = StatsError;
    fn try_from(raw: RawBinSpec) -> StatsResult<Self> {
        BinSpec::new(raw.low, raw.high, raw.width)
    }
}

impl From<BinSpec> for RawBinSpec {
    fn from(b: BinSpec) -> Self {
        RawBinSpec {
            low: b.low,
            high: b.high,
            width: b.width,
        }
    }
}

impl BinSpec {
    pub fn new(low: f64, high: f64, width: f64) -> StatsResult<Self> {
        if !(low.is_finite() && high.is_finite() && width.is_finite()) {
            return Err(StatsError::InvalidBinSpec {
                reason: format!("bounds and width must be finite (low={low}, high={high}, width={width})"),
            });
        }
        if width <= 0.0 {
            return Err(StatsError::InvalidBinSpec {
                reason: format!("width must be > 0 (got {width})"),
            });
        }
        if high <= low {
            return Err(StatsError::InvalidBinSpec {
                reason: format!("upper bound {high} must exceed lower bound {low}"),
            });
        }
        let quotient = (high - low) / width;
        if !quotient.is_finite() || quotient > MAX_BINS as f64 {
            return Err(StatsError::InvalidBinSpec {
                reason: format!(
                    "(high - low) / width = {quotient} exceeds the limit of {MAX_BINS} bins"
                ),
            });
        }
        Ok(Self {
            low,
            high,
            width,
            n_bins: bin_count(quotient),
        })
    }

    #[inline]
    pub fn low(&self) -> f64 {
        self.low
    }
    #[inline]
    pub fn high(&self) -> f64 {
        self.high
    }
    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }
    /// `N = ceil((high − low) / width)`.
    #[inline]
    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// Bin holding `x`, or `None` when the sample falls outside the range.
    #[inline]
    pub fn index_of(&self, x: f64) -> Option<usize> {
        if !x.is_finite() || x < self.low || x >= self.high {
            return None;
        }
        let i = ((x - self.low) / self.width).floor() as usize;
        (i < self.n_bins).then_some(i)
    }

    /// `low + (i + 0.5)·width` for every bin.
    pub fn centers(&self) -> Vec<f64> {
        (0..self.n_bins)
            .map(|i| self.low + (i as f64 + 0.5) * self.width)
            .collect()
    }
}

/// `ceil(span / width)`, snapping quotients that are integral up to rounding noise
/// (e.g. `(15 − 7) / 0.2`) so they do not gain a phantom bin.
///
/// `raw` is finite and at most [`MAX_BINS`], so the casts cannot saturate.
fn bin_count(raw: f64) -> usize {
    let nearest = raw.round();
    if (raw - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest as usize
    } else {
        raw.ceil() as usize
    }
}

/* ============================
 * Binned statistics
 * ============================ */

/// Output of [`bin_stats`]: per-bin statistics plus the number of dropped samples.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    pub count: Vec<f64>,
    pub sum: Vec<f64>,
    pub centers: Vec<f64>,
    /// Samples outside the bin range.
    pub dropped: u64,
    moments: Vec<Moments>,
}

impl BinnedStats {
    /// Hand the per-bin state to the combiner, keeping the exact spread of every bin.
    pub fn into_summary(self) -> Summary {
        Summary::from_moments(self.moments)
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.count.len()
    }
}

/// Bin `dependent` by `independent` and compute count, mean, population std and sum per bin.
///
/// Bins with fewer than three samples report `std = 0`; empty bins report zeros throughout.
pub fn bin_stats(independent: &[f64], dependent: &[f64], spec: &BinSpec) -> StatsResult<BinnedStats> {
    ensure_same_len("bin_stats(independent, dependent)", independent.len(), dependent.len())?;

    let n = spec.n_bins();
    let mut acc = vec![Welford::default(); n];
    let mut sum = vec![0.0_f64; n];
    let mut dropped = 0u64;

    for (&x, &y) in independent.iter().zip(dependent.iter()) {
        let Some(i) = spec.index_of(x) else {
            dropped += 1;
            continue;
        };
        acc[i].push(y);
        sum[i] += y;
    }

    let moments: Vec<Moments> = acc.into_iter().map(Welford::finish).collect();

    Ok(BinnedStats {
        mean: moments.iter().map(Moments::mean).collect(),
        std: moments.iter().map(Moments::std).collect(),
        count: moments.iter().map(Moments::count).collect(),
        sum,
        centers: spec.centers(),
        dropped,
        moments,
    })
}

/// Plain counts per bin (e.g. a stellar mass function before normalisation).
pub fn histogram(independent: &[f64], spec: &BinSpec) -> (Vec<f64>, u64) {
    let mut counts = vec![0.0_f64; spec.n_bins()];
    let mut dropped = 0u64;
    for &x in independent {
        match spec.index_of(x) {
            Some(i) => counts[i] += 1.0,
            None => dropped += 1,
        }
    }
    (counts, dropped)
}

/// Unbinned statistics of a whole sample set (one value per snapshot, say).
pub fn moments_of(values: &[f64]) -> Moments {
    let mut acc = Welford::default();
    for &v in values {
        acc.push(v);
    }
    acc.finish()
}

/// Welford accumulator on samples shifted by the first one seen, so a large common
/// offset does not eat into the precision of the spread.
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    shift: f64,
    count: f64,
    mean: f64,
    m2: f64,
}

impl Welford {
    #[inline]
    fn push(&mut self, y: f64) {
        if self.count == 0.0 {
            self.shift = y;
        }
        let v = y - self.shift;
        self.count += 1.0;
        let delta = v - self.mean;
        self.mean += delta / self.count;
        self.m2 += delta * (v - self.mean);
    }

    fn finish(self) -> Moments {
        Moments::from_m2(self.count, self.shift + self.mean, self.m2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::test_helpers::{assert_all_close, assert_exact, assert_rel_close};

    fn spec(low: f64, high: f64, width: f64) -> BinSpec {
        BinSpec::new(low, high, width).expect("valid spec")
    }

    #[test]
    fn empty_input_yields_zeroed_bins() {
        let out = bin_stats(&[], &[], &spec(0.0, 10.0, 2.0)).expect("bin");
        assert_eq!(out.n_bins(), 5);
        assert_eq!(out.count, vec![0.0; 5]);
        assert_eq!(out.mean, vec![0.0; 5]);
        assert_eq!(out.std, vec![0.0; 5]);
        assert_eq!(out.sum, vec![0.0; 5]);
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn out_of_range_samples_are_dropped_and_counted() {
        let out = bin_stats(&[-5.0, 15.0], &[1.0, 2.0], &spec(0.0, 10.0, 2.0)).expect("bin");
        assert!(out.count.iter().all(|&c| c == 0.0));
        assert!(out.mean.iter().all(|&m| m == 0.0));
        assert_eq!(out.dropped, 2);
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let out = bin_stats(&[0.0, 10.0], &[1.0, 1.0], &spec(0.0, 10.0, 2.0)).expect("bin");
        assert_exact("first bin", 1.0, out.count[0]);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn two_samples_in_a_bin_suppress_std() {
        let out = bin_stats(&[1.0, 1.5], &[1.0, 1.0], &spec(0.0, 10.0, 2.0)).expect("bin");
        assert_exact("count", 2.0, out.count[0]);
        assert_exact("mean", 1.0, out.mean[0]);
        assert_exact("std", 0.0, out.std[0]);
    }

    #[test]
    fn population_std_for_three_or_more() {
        let x = [0.5, 0.6, 0.7, 0.8];
        let y = [2.0, 4.0, 6.0, 8.0];
        let out = bin_stats(&x, &y, &spec(0.0, 1.0, 1.0)).expect("bin");
        assert_exact("mean", 5.0, out.mean[0]);
        assert_rel_close("std", 5.0_f64.sqrt(), out.std[0], 1e-12);
        assert_exact("sum", 20.0, out.sum[0]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = bin_stats(&[1.0, 2.0], &[1.0], &spec(0.0, 10.0, 2.0)).unwrap_err();
        assert_eq!(
            err,
            StatsError::ShapeMismatch {
                context: "bin_stats(independent, dependent)",
                left: 2,
                right: 1
            }
        );
    }

    #[test]
    fn bin_count_ignores_rounding_noise_and_rounds_partial_bins_up() {
        assert_eq!(spec(7.0, 15.0, 0.2).n_bins(), 40);
        assert_eq!(spec(0.0, 10.0, 3.0).n_bins(), 4);
        assert_all_close("centers", &[1.0, 3.0, 5.0], &spec(0.0, 6.0, 2.0).centers(), 1e-15);
    }

    #[test]
    fn invalid_specs_are_rejected() {
        assert!(BinSpec::new(0.0, 1.0, 0.0).is_err());
        assert!(BinSpec::new(1.0, 1.0, 0.1).is_err());
        assert!(BinSpec::new(f64::NAN, 1.0, 0.1).is_err());
    }

    #[test]
    fn unallocatable_bin_counts_are_rejected() {
        // span overflows to infinity
        let err = BinSpec::new(-1e308, 1e308, 1.0).unwrap_err();
        assert!(matches!(err, StatsError::InvalidBinSpec { .. }), "{err}");
        // finite but far beyond any allocation
        assert!(BinSpec::new(0.0, 1.0, 1e-300).is_err());
        assert!(BinSpec::new(0.0, MAX_BINS as f64 * 2.0, 1.0).is_err());
        assert_eq!(BinSpec::new(0.0, 1e6, 1.0).unwrap().n_bins(), 1_000_000);
    }

    #[test]
    fn histogram_matches_binned_counts() {
        let x = [0.1, 0.2, 3.0, 9.9, 12.0];
        let (counts, dropped) = histogram(&x, &spec(0.0, 10.0, 2.0));
        assert_eq!(counts, vec![2.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn moments_of_whole_sample() {
        let m = moments_of(&[2.0, 4.0, 6.0, 8.0]);
        assert_exact("count", 4.0, m.count());
        assert_exact("mean", 5.0, m.mean());
        assert_rel_close("std", 5.0_f64.sqrt(), m.std(), 1e-12);
    }

    #[test]
    fn spread_survives_a_large_common_offset() {
        let values: Vec<f64> = (0..1000).map(|i| 1e9 + (i % 7) as f64).collect();
        let (mean, std, _) = crate::stats::test_helpers::direct_stats(&values);
        let m = moments_of(&values);
        assert_rel_close("mean", mean, m.mean(), 1e-15);
        assert_rel_close("std", std, m.std(), 1e-12);
    }
}
