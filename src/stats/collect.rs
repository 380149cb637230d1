// src/stats/collect.rs
//
// Assembling global results for every model and snapshot of a plan.
//
// Both entry points walk the shared plan and nothing else, so every worker issues the
// same collectives in the same order. Results exist on the coordinator only.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::StatsResult;
use crate::stats::accumulate::WorkerPartials;
use crate::stats::collective::Collective;
use crate::stats::context::ExecutionContext;
use crate::stats::plan::ReductionPlan;
use crate::stats::reduce::reduce_across_workers;

/// Binned results, nested model → reported snapshot → bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BinnedCollection {
    pub models: Vec<String>,
    /// Snapshot numbers actually reported for each model.
    pub snapshots: Vec<Vec<u32>>,
    pub means: Vec<Vec<Vec<f64>>>,
    pub stds: Vec<Vec<Vec<f64>>>,
    pub counts: Vec<Vec<Vec<f64>>>,
    pub bin_centers: Vec<Vec<Vec<f64>>>,
}

/// One pooled value per snapshot, nested model → snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SnapshotCollection {
    pub models: Vec<String>,
    pub snapshots: Vec<Vec<u32>>,
    pub means: Vec<Vec<f64>>,
    pub stds: Vec<Vec<f64>>,
    pub counts: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CollectMode {
    #[default]
    Binned,
    PerSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Collected {
    Binned(BinnedCollection),
    PerSnapshot(SnapshotCollection),
}

/// Reduce the binned summaries of every reported snapshot.
///
/// For each model the snapshot list is walked in lock-step with the reported subset
/// (`plot_snapshots`, or every snapshot); unmatched snapshots are skipped and the walk
/// stops once the subset is exhausted.
pub fn collect_binned<C: Collective>(
    ctx: &ExecutionContext<C>,
    partials: &WorkerPartials,
    plan: &ReductionPlan,
) -> StatsResult<Option<BinnedCollection>> {
    partials.ensure_matches(plan)?;
    let rule = plan.rule();
    let mut out = BinnedCollection::default();

    for (m, model) in plan.models().iter().enumerate() {
        let subset = model.plotted();
        let centers = model.bins.centers();
        let mut next = 0;
        let (mut snaps, mut means, mut stds, mut counts, mut bin_centers) =
            (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());

        for (pos, &snap) in model.snapshots.iter().enumerate() {
            if next == subset.len() {
                break;
            }
            if snap != subset[next] {
                continue;
            }
            next += 1;
            debug!(model = %model.name, snapshot = snap, bins = centers.len(), "reducing binned snapshot");
            if let Some(global) = reduce_across_workers(ctx, &partials.binned[m][pos], rule)? {
                snaps.push(snap);
                means.push(global.mean().to_vec());
                stds.push(global.std().to_vec());
                counts.push(global.count().to_vec());
                bin_centers.push(centers.clone());
            }
        }

        if ctx.is_coordinator() {
            info!(model = %model.name, snapshots = snaps.len(), "collected binned statistics");
            out.models.push(model.name.clone());
            out.snapshots.push(snaps);
            out.means.push(means);
            out.stds.push(stds);
            out.counts.push(counts);
            out.bin_centers.push(bin_centers);
        }
    }
    Ok(ctx.is_coordinator().then_some(out))
}

/// Reduce the unbinned per-snapshot statistics, one collective per model.
pub fn collect_per_snapshot<C: Collective>(
    ctx: &ExecutionContext<C>,
    partials: &WorkerPartials,
    plan: &ReductionPlan,
) -> StatsResult<Option<SnapshotCollection>> {
    partials.ensure_matches(plan)?;
    let mut out = SnapshotCollection::default();

    for (m, model) in plan.models().iter().enumerate() {
        debug!(model = %model.name, snapshots = model.snapshots.len(), "reducing per-snapshot statistics");
        if let Some(global) = reduce_across_workers(ctx, &partials.per_snapshot[m], plan.rule())? {
            info!(model = %model.name, samples = global.total_count(), "collected per-snapshot statistics");
            out.models.push(model.name.clone());
            out.snapshots.push(model.snapshots.clone());
            out.means.push(global.mean().to_vec());
            out.stds.push(global.std().to_vec());
            out.counts.push(global.count().to_vec());
        }
    }
    Ok(ctx.is_coordinator().then_some(out))
}

pub fn collect<C: Collective>(
    ctx: &ExecutionContext<C>,
    partials: &WorkerPartials,
    plan: &ReductionPlan,
    mode: CollectMode,
) -> StatsResult<Option<Collected>> {
    Ok(match mode {
        CollectMode::Binned => collect_binned(ctx, partials, plan)?.map(Collected::Binned),
        CollectMode::PerSnapshot => {
            collect_per_snapshot(ctx, partials, plan)?.map(Collected::PerSnapshot)
        }
    })
}
