// src/stats/accumulate.rs
use rayon::prelude::*;
use tracing::{trace, warn};

use crate::error::{ensure_same_len, StatsError, StatsResult};
use crate::stats::binning::{bin_stats, moments_of, BinnedStats};
use crate::stats::moments::Moments;
use crate::stats::plan::ReductionPlan;
use crate::stats::summary::Summary;

/// What one worker hands to the collector once all its files have been read.
///
/// `binned[model][snapshot]` holds the model's binned summary for that snapshot;
/// `per_snapshot[model]` is a summary whose "bins" are the model's snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerPartials {
    pub binned: Vec<Vec<Summary>>,
    pub per_snapshot: Vec<Summary>,
    pub dropped: u64,
}

/// Per-worker running state shaped by a [`ReductionPlan`].
///
/// Every (model, snapshot) slot exists from the start, zero-filled, so a worker that
/// reads no data for a snapshot still contributes to its reduction.
#[derive(Debug, Clone)]
pub struct Accumulator<'p> {
    plan: &'p ReductionPlan,
    binned: Vec<Vec<Summary>>,
    per_snapshot: Vec<Vec<Moments>>,
    dropped: u64,
}

impl<'p> Accumulator<'p> {
    pub fn new(plan: &'p ReductionPlan) -> Self {
        let binned = plan
            .models()
            .iter()
            .map(|m| vec![Summary::empty(m.bins.n_bins()); m.snapshots.len()])
            .collect();
        let per_snapshot = plan
            .models()
            .iter()
            .map(|m| vec![Moments::empty(); m.snapshots.len()])
            .collect();
        Self {
            plan,
            binned,
            per_snapshot,
            dropped: 0,
        }
    }

    #[inline]
    pub fn plan(&self) -> &ReductionPlan {
        self.plan
    }

    /// Samples dropped so far because their independent value fell outside the bins.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Position of snapshot number `snapshot` within `model`'s list.
    pub fn snapshot_position(&self, model: usize, snapshot: u32) -> StatsResult<usize> {
        self.plan
            .model(model)?
            .snapshot_position(snapshot)
            .ok_or(StatsError::UnknownSnapshot { model, snapshot })
    }

    fn check_slot(&self, model: usize, pos: usize) -> StatsResult<()> {
        let m = self.plan.model(model)?;
        if pos >= m.snapshots.len() {
            return Err(StatsError::UnknownSnapshot {
                model,
                snapshot: pos as u32,
            });
        }
        Ok(())
    }

    /// Bin one chunk of samples into the (model, snapshot) slot. Returns the number of
    /// samples dropped from this chunk.
    pub fn ingest(&mut self, model: usize, pos: usize, x: &[f64], y: &[f64]) -> StatsResult<u64> {
        self.check_slot(model, pos)?;
        let binned = bin_stats(x, y, &self.plan.models()[model].bins)?;
        self.absorb_chunk(model, pos, binned, moments_of(y))
    }

    /// Bin many chunks on the rayon pool, then pool them into the slot in input order.
    pub fn ingest_chunks(
        &mut self,
        model: usize,
        pos: usize,
        chunks: &[(&[f64], &[f64])],
    ) -> StatsResult<u64> {
        self.check_slot(model, pos)?;
        let spec = &self.plan.models()[model].bins;
        let partials: Vec<(BinnedStats, Moments)> = chunks
            .par_iter()
            .map(|(x, y)| Ok((bin_stats(x, y, spec)?, moments_of(y))))
            .collect::<StatsResult<_>>()?;

        let mut dropped = 0;
        for (binned, moments) in partials {
            dropped += self.absorb_chunk(model, pos, binned, moments)?;
        }
        Ok(dropped)
    }

    fn absorb_chunk(
        &mut self,
        model: usize,
        pos: usize,
        binned: BinnedStats,
        all: Moments,
    ) -> StatsResult<u64> {
        let rule = self.plan.rule();
        let dropped = binned.dropped;
        self.binned[model][pos].absorb(&binned.into_summary(), rule)?;

        let snap = &mut self.per_snapshot[model][pos];
        *snap = snap.combine(all, rule);

        if dropped > 0 {
            let m = &self.plan.models()[model];
            warn!(
                model = %m.name,
                snapshot = m.snapshots[pos],
                dropped,
                low = m.bins.low(),
                high = m.bins.high(),
                "samples outside the bin range were dropped"
            );
        }
        trace!(model, pos, samples = all.count(), "ingested chunk");
        self.dropped += dropped;
        Ok(dropped)
    }

    pub fn finish(self) -> WorkerPartials {
        WorkerPartials {
            binned: self.binned,
            per_snapshot: self
                .per_snapshot
                .into_iter()
                .map(Summary::from_moments)
                .collect(),
            dropped: self.dropped,
        }
    }
}

impl WorkerPartials {
    /// Check that these partials were produced against `plan`.
    pub(crate) fn ensure_matches(&self, plan: &ReductionPlan) -> StatsResult<()> {
        let models = plan.models();
        ensure_same_len("WorkerPartials(binned, plan)", self.binned.len(), models.len())?;
        ensure_same_len(
            "WorkerPartials(per_snapshot, plan)",
            self.per_snapshot.len(),
            models.len(),
        )?;
        for (m, model) in models.iter().enumerate() {
            ensure_same_len(
                "WorkerPartials(snapshots, plan)",
                self.binned[m].len(),
                model.snapshots.len(),
            )?;
            ensure_same_len(
                "WorkerPartials(per_snapshot, plan)",
                self.per_snapshot[m].len(),
                model.snapshots.len(),
            )?;
        }
        Ok(())
    }
}
