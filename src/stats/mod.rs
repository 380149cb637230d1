pub mod accumulate;
pub mod binning;
pub mod codecs;
pub mod collect;
pub mod collective;
pub mod context;
pub mod plan;
pub mod reduce;
pub mod summary;
pub mod test_helpers;

// Internal building blocks
mod moments;
mod pooling_rule;

// Public surface
pub use accumulate::{Accumulator, WorkerPartials};
pub use binning::{bin_stats, histogram, moments_of, BinSpec, BinnedStats, MAX_BINS};
pub use codecs::{decode_collection, encode_collection};
pub use collect::{
    collect, collect_binned, collect_per_snapshot, BinnedCollection, CollectMode, Collected,
    SnapshotCollection,
};
pub use collective::{
    Collective, LocalCommunicator, LocalGroup, ReduceOp, SingleProcess, COORDINATOR, DEFAULT_TIMEOUT,
};
pub use context::ExecutionContext;
pub use moments::{combine_scalar, Moments, MIN_COUNT_FOR_STD};
pub use plan::{ModelPlan, ReductionPlan};
pub use pooling_rule::PoolingRule;
pub use reduce::{agree_range, gather_across_workers, reduce_across_workers, reduce_counts, reduce_total};
pub use summary::{combine_vector, pool_append, Summary};

#[cfg(feature = "mpi")]
pub use collective::MpiCollective;
