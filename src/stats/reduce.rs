// src/stats/reduce.rs
//
// Cross-worker reductions of partial summaries.
//
// Merge style (`reduce_across_workers`), within-group rule: one sum-reduction of
//
//     [ count·mean (N) | count (N) | count·std² (N) ]
//
// Exact rule: an all-reduce of `[ count·mean | count ]` gives every rank the global mean
// `M` per bin, then a sum-reduction of `m2 + count·(mean − M)²` delivers the pooled spread.
// Shifting by `M` before squaring keeps large means from cancelling the spread away.
//
// List style (`gather_across_workers`): each rank writes its columns into its own slot
// of a zero buffer and the same sum-reduction delivers every slot to the coordinator.

use tracing::debug;

use crate::error::StatsResult;
use crate::stats::collective::{Collective, ReduceOp};
use crate::stats::context::ExecutionContext;
use crate::stats::moments::Moments;
use crate::stats::pooling_rule::PoolingRule;
use crate::stats::summary::{pool_append, Summary};

/// Pool every worker's `local` summary into the global one.
///
/// Returns `Some` on the coordinator and `None` on every other rank. Must be called by
/// all ranks, in the same order, with the same rule and summaries of the same length.
pub fn reduce_across_workers<C: Collective>(
    ctx: &ExecutionContext<C>,
    local: &Summary,
    rule: PoolingRule,
) -> StatsResult<Option<Summary>> {
    let n = local.len();
    let global = match rule {
        PoolingRule::WithinGroup => reduce_within_group(ctx, local)?,
        PoolingRule::Exact => reduce_exact(ctx, local)?,
    };
    let Some(global) = global else {
        return Ok(None);
    };
    debug!(
        bins = n,
        workers = ctx.size(),
        samples = global.total_count(),
        rule = rule.as_str(),
        "reduced summary across workers"
    );
    Ok(Some(global))
}

fn reduce_within_group<C: Collective>(
    ctx: &ExecutionContext<C>,
    local: &Summary,
) -> StatsResult<Option<Summary>> {
    let n = local.len();
    let mut packed = Vec::with_capacity(3 * n);
    packed.extend(local.sum());
    packed.extend_from_slice(local.count());
    packed.extend(
        local
            .count()
            .iter()
            .zip(local.std().iter())
            .map(|(c, s)| c * s * s),
    );

    let Some(totals) = ctx.comm().reduce_sum(&packed)? else {
        return Ok(None);
    };
    let (weighted_mean, rest) = totals.split_at(n);
    let (count, spread) = rest.split_at(n);
    let moments = (0..n)
        .map(|i| {
            let c = count[i];
            if c <= 0.0 {
                return Moments::empty();
            }
            Moments::from_m2(c, weighted_mean[i] / c, spread[i])
        })
        .collect();
    Ok(Some(Summary::from_moments(moments)))
}

fn reduce_exact<C: Collective>(
    ctx: &ExecutionContext<C>,
    local: &Summary,
) -> StatsResult<Option<Summary>> {
    let n = local.len();
    let mut first = Vec::with_capacity(2 * n);
    first.extend(local.sum());
    first.extend_from_slice(local.count());
    let totals = ctx.comm().all_reduce(&first, ReduceOp::Sum)?;
    let (weighted_mean, count) = totals.split_at(n);
    let global_mean: Vec<f64> = weighted_mean
        .iter()
        .zip(count.iter())
        .map(|(&s, &c)| if c > 0.0 { s / c } else { 0.0 })
        .collect();

    let shifted: Vec<f64> = local
        .iter_moments()
        .zip(global_mean.iter())
        .map(|(m, &pooled_mean)| {
            if m.is_empty() {
                return 0.0;
            }
            let d = m.mean() - pooled_mean;
            m.m2() + m.count() * d * d
        })
        .collect();
    let Some(spread) = ctx.comm().reduce_sum(&shifted)? else {
        return Ok(None);
    };

    let moments = (0..n)
        .map(|i| {
            if count[i] <= 0.0 {
                Moments::empty()
            } else {
                Moments::from_m2(count[i], global_mean[i], spread[i])
            }
        })
        .collect();
    Ok(Some(Summary::from_moments(moments)))
}

/// Collect every worker's summary, unmerged, on the coordinator (one entry per rank).
pub fn gather_across_workers<C: Collective>(
    ctx: &ExecutionContext<C>,
    local: &Summary,
) -> StatsResult<Option<Vec<Summary>>> {
    const COLUMNS: usize = 4;
    let n = local.len();
    let stride = COLUMNS * n;
    let mut slots = vec![0.0_f64; ctx.size() * stride];
    let mine = &mut slots[ctx.rank() * stride..(ctx.rank() + 1) * stride];
    for (dst, src) in mine
        .chunks_mut(n.max(1))
        .zip([local.mean(), local.std(), local.count(), local.m2()])
    {
        dst.copy_from_slice(src);
    }

    let Some(all) = ctx.comm().reduce_sum(&slots)? else {
        return Ok(None);
    };

    let mut list = Vec::with_capacity(ctx.size());
    for slot in all.chunks(stride.max(1)).take(ctx.size()) {
        let moments = (0..n)
            .map(|i| Moments::from_stored(slot[2 * n + i], slot[i], slot[n + i], slot[3 * n + i]))
            .collect();
        pool_append(&mut list, Summary::from_moments(moments))?;
    }
    // zero-width summaries have no slots to walk
    while list.len() < ctx.size() {
        pool_append(&mut list, Summary::empty(0))?;
    }
    Ok(Some(list))
}

/// Sum plain per-bin counts (e.g. histograms) onto the coordinator.
pub fn reduce_counts<C: Collective>(
    ctx: &ExecutionContext<C>,
    local: &[f64],
) -> StatsResult<Option<Vec<f64>>> {
    ctx.comm().reduce_sum(local)
}

/// Sum one scalar onto the coordinator.
pub fn reduce_total<C: Collective>(ctx: &ExecutionContext<C>, local: f64) -> StatsResult<Option<f64>> {
    Ok(ctx.comm().reduce_sum(&[local])?.map(|v| v[0]))
}

/// Widen `[low, high]` to the union of every worker's range, on every worker.
pub fn agree_range<C: Collective>(ctx: &ExecutionContext<C>, low: f64, high: f64) -> StatsResult<(f64, f64)> {
    let out = ctx.comm().all_reduce(&[low, -high], ReduceOp::Min)?;
    Ok((out[0], -out[1]))
}
