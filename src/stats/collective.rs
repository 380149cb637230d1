// src/stats/collective.rs
//
// Collective communication over a fixed worker group.
//
// Every backend offers the same two primitives on f64 vectors:
//   - `reduce_sum`: element-wise sum delivered to the coordinator (rank 0) only;
//   - `all_reduce`: element-wise Sum/Min/Max delivered to every rank.
//
// A collective must be entered by every rank, the same number of times, in the same
// order. The `LocalGroup` backend checks sequence numbers and payload lengths and bounds
// every wait with a timeout; any violation is fatal for the whole group.

use std::cell::{Cell, RefCell};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::error::{StatsError, StatsResult};
use crate::stats::context::ExecutionContext;

/// Rank that receives reductions and performs the final assembly.
pub const COORDINATOR: usize = 0;

/// Element-wise operation of an all-reduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    #[inline]
    fn apply(self, acc: &mut [f64], x: &[f64]) {
        for (a, &b) in acc.iter_mut().zip(x.iter()) {
            *a = match self {
                ReduceOp::Sum => *a + b,
                ReduceOp::Min => a.min(b),
                ReduceOp::Max => a.max(b),
            };
        }
    }
}

/// Barrier-reduce primitives over a statically sized process group.
pub trait Collective {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Element-wise sum of `local` over all ranks; `Some` on the coordinator, `None` elsewhere.
    fn reduce_sum(&self, local: &[f64]) -> StatsResult<Option<Vec<f64>>>;

    /// Element-wise `op` of `local` over all ranks, delivered everywhere.
    fn all_reduce(&self, local: &[f64], op: ReduceOp) -> StatsResult<Vec<f64>>;

    fn barrier(&self) -> StatsResult<()> {
        self.all_reduce(&[], ReduceOp::Sum).map(|_| ())
    }

    #[inline]
    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }
}

/* ============================
 * Single process
 * ============================ */

/// A group of one: every reduction is the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn rank(&self) -> usize {
        COORDINATOR
    }
    fn size(&self) -> usize {
        1
    }
    fn reduce_sum(&self, local: &[f64]) -> StatsResult<Option<Vec<f64>>> {
        Ok(Some(local.to_vec()))
    }
    fn all_reduce(&self, local: &[f64], _op: ReduceOp) -> StatsResult<Vec<f64>> {
        Ok(local.to_vec())
    }
}

/* ============================
 * In-process worker group
 * ============================ */

/// Collectives wait this long before declaring the group dead.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Reduce,
    AllReduce(ReduceOp),
}

#[derive(Debug)]
struct Envelope {
    seq: u64,
    rank: usize,
    kind: OpKind,
    payload: Vec<f64>,
}

/// Factory for a group of in-process workers connected by channels.
pub struct LocalGroup;

impl LocalGroup {
    /// One communicator per rank, in rank order, using [`DEFAULT_TIMEOUT`].
    pub fn new(size: usize) -> StatsResult<Vec<LocalCommunicator>> {
        Self::with_timeout(size, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(size: usize, timeout: Duration) -> StatsResult<Vec<LocalCommunicator>> {
        if size == 0 {
            return Err(StatsError::EmptyGroup);
        }
        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| mpsc::channel()).unzip();

        Ok(receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                let is_root = rank == COORDINATOR;
                LocalCommunicator {
                    rank,
                    size,
                    timeout,
                    seq: Cell::new(0),
                    to_root: (!is_root).then(|| senders[COORDINATOR].clone()),
                    fanout: if is_root {
                        senders
                            .iter()
                            .enumerate()
                            .map(|(r, tx)| (r != COORDINATOR).then(|| tx.clone()))
                            .collect()
                    } else {
                        Vec::new()
                    },
                    inbox,
                    pending: RefCell::new(Vec::new()),
                }
            })
            .collect())
    }

    /// Run `worker` once per rank on scoped threads and return the results in rank order.
    ///
    /// When several ranks fail, the error reported is the first one that is not a
    /// consequence of another rank leaving the group.
    pub fn run<T, F>(size: usize, timeout: Duration, worker: F) -> StatsResult<Vec<T>>
    where
        T: Send,
        F: Fn(&ExecutionContext<LocalCommunicator>) -> StatsResult<T> + Sync,
    {
        let comms = Self::with_timeout(size, timeout)?;
        let outcomes: Vec<StatsResult<T>> = std::thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let worker = &worker;
                    scope.spawn(move || {
                        let rank = comm.rank();
                        let ctx = ExecutionContext::new(comm);
                        let out = worker(&ctx);
                        if let Err(e) = &out {
                            error!(rank, error = %e, "worker failed");
                        }
                        out
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, h)| {
                    h.join().unwrap_or_else(|_| {
                        Err(StatsError::CollectiveDivergence {
                            rank,
                            reason: "worker panicked".to_string(),
                        })
                    })
                })
                .collect()
        });

        let mut values = Vec::with_capacity(size);
        let mut errors = Vec::new();
        for out in outcomes {
            match out {
                Ok(v) => values.push(v),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            return Ok(values);
        }
        let root_cause = errors
            .iter()
            .position(|e| !is_group_failure(e))
            .unwrap_or(0);
        Err(errors.swap_remove(root_cause))
    }
}

/// Failures that follow from another rank leaving or stalling the group.
#[inline]
fn is_group_failure(e: &StatsError) -> bool {
    matches!(
        e,
        StatsError::CollectiveTimeout { .. } | StatsError::CollectiveDivergence { .. }
    )
}

/// One rank's endpoint of a [`LocalGroup`]. Owned by exactly one worker thread.
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    timeout: Duration,
    seq: Cell<u64>,
    to_root: Option<Sender<Envelope>>,
    /// Coordinator only: broadcast channel per rank (none for itself).
    fanout: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    /// Coordinator only: contributions that arrived ahead of the collective being served.
    pending: RefCell<Vec<Envelope>>,
}

impl LocalCommunicator {
    fn next_seq(&self) -> u64 {
        let s = self.seq.get();
        self.seq.set(s + 1);
        s
    }

    fn divergence(&self, reason: String) -> StatsError {
        StatsError::CollectiveDivergence {
            rank: self.rank,
            reason,
        }
    }

    fn send_to_root(&self, env: Envelope) -> StatsResult<()> {
        let tx = self
            .to_root
            .as_ref()
            .ok_or_else(|| self.divergence("coordinator cannot send to itself".to_string()))?;
        tx.send(env)
            .map_err(|_| self.divergence("coordinator left the group".to_string()))
    }

    fn recv_before(&self, deadline: Instant) -> StatsResult<Envelope> {
        let now = Instant::now();
        let wait = deadline.saturating_duration_since(now);
        match self.inbox.recv_timeout(wait) {
            Ok(env) => Ok(env),
            Err(RecvTimeoutError::Timeout) => Err(StatsError::CollectiveTimeout {
                rank: self.rank,
                waited_ms: self.timeout.as_millis(),
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(self.divergence("a peer left the group".to_string()))
            }
        }
    }

    /// Coordinator side: fold every other rank's contribution for `seq` into `acc`.
    fn gather_into(&self, seq: u64, kind: OpKind, acc: &mut [f64], op: ReduceOp) -> StatsResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut seen = vec![false; self.size];
        seen[COORDINATOR] = true;
        let mut remaining = self.size - 1;

        while remaining > 0 {
            let ready = {
                let mut pending = self.pending.borrow_mut();
                pending
                    .iter()
                    .position(|e| e.seq == seq)
                    .map(|i| pending.swap_remove(i))
            };
            let env = match ready {
                Some(env) => env,
                None => {
                    let env = self.recv_before(deadline)?;
                    if env.seq > seq {
                        self.pending.borrow_mut().push(env);
                        continue;
                    }
                    env
                }
            };
            if env.seq != seq || env.kind != kind {
                return Err(self.divergence(format!(
                    "rank {} sent {:?} #{} while the coordinator serves {:?} #{}",
                    env.rank, env.kind, env.seq, kind, seq
                )));
            }
            if env.payload.len() != acc.len() {
                return Err(self.divergence(format!(
                    "rank {} contributed {} values, coordinator holds {}",
                    env.rank,
                    env.payload.len(),
                    acc.len()
                )));
            }
            if seen[env.rank] {
                return Err(self.divergence(format!("rank {} contributed twice to #{}", env.rank, seq)));
            }
            seen[env.rank] = true;
            op.apply(acc, &env.payload);
            remaining -= 1;
        }
        Ok(())
    }
}

impl Collective for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }

    fn reduce_sum(&self, local: &[f64]) -> StatsResult<Option<Vec<f64>>> {
        let seq = self.next_seq();
        if self.is_coordinator() {
            let mut acc = local.to_vec();
            self.gather_into(seq, OpKind::Reduce, &mut acc, ReduceOp::Sum)?;
            debug!(seq, len = acc.len(), "reduce complete");
            Ok(Some(acc))
        } else {
            self.send_to_root(Envelope {
                seq,
                rank: self.rank,
                kind: OpKind::Reduce,
                payload: local.to_vec(),
            })?;
            Ok(None)
        }
    }

    fn all_reduce(&self, local: &[f64], op: ReduceOp) -> StatsResult<Vec<f64>> {
        let seq = self.next_seq();
        let kind = OpKind::AllReduce(op);
        if self.is_coordinator() {
            let mut acc = local.to_vec();
            self.gather_into(seq, kind, &mut acc, op)?;
            for (rank, tx) in self.fanout.iter().enumerate() {
                let Some(tx) = tx else { continue };
                tx.send(Envelope {
                    seq,
                    rank: COORDINATOR,
                    kind,
                    payload: acc.clone(),
                })
                .map_err(|_| self.divergence(format!("rank {rank} left the group")))?;
            }
            Ok(acc)
        } else {
            self.send_to_root(Envelope {
                seq,
                rank: self.rank,
                kind,
                payload: local.to_vec(),
            })?;
            let env = self.recv_before(Instant::now() + self.timeout)?;
            if env.seq != seq || env.kind != kind {
                return Err(self.divergence(format!(
                    "expected broadcast {:?} #{}, got {:?} #{}",
                    kind, seq, env.kind, env.seq
                )));
            }
            Ok(env.payload)
        }
    }
}

/* ============================
 * MPI
 * ============================ */

#[cfg(feature = "mpi")]
pub use mpi_backend::MpiCollective;

#[cfg(feature = "mpi")]
mod mpi_backend {
    use mpi::collective::SystemOperation;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    use super::{Collective, ReduceOp, COORDINATOR};
    use crate::error::StatsResult;

    /// Collectives over an MPI communicator (usually `universe.world()`).
    ///
    /// MPI offers no timeout on a stalled collective; a divergent rank hangs the job.
    pub struct MpiCollective {
        world: SimpleCommunicator,
    }

    impl MpiCollective {
        pub fn new(world: SimpleCommunicator) -> Self {
            Self { world }
        }
    }

    impl Collective for MpiCollective {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }
        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn reduce_sum(&self, local: &[f64]) -> StatsResult<Option<Vec<f64>>> {
            let root = self.world.process_at_rank(COORDINATOR as i32);
            if self.is_coordinator() {
                let mut out = vec![0.0_f64; local.len()];
                root.reduce_into_root(local, &mut out[..], SystemOperation::sum());
                Ok(Some(out))
            } else {
                root.reduce_into(local, SystemOperation::sum());
                Ok(None)
            }
        }

        fn all_reduce(&self, local: &[f64], op: ReduceOp) -> StatsResult<Vec<f64>> {
            let mut out = vec![0.0_f64; local.len()];
            let op = match op {
                ReduceOp::Sum => SystemOperation::sum(),
                ReduceOp::Min => SystemOperation::min(),
                ReduceOp::Max => SystemOperation::max(),
            };
            self.world.all_reduce_into(local, &mut out[..], op);
            Ok(out)
        }

        fn barrier(&self) -> StatsResult<()> {
            self.world.barrier();
            Ok(())
        }
    }
}
