use crate::stats::collective::Collective;

/// Who this worker is and how it talks to the rest of the group.
///
/// Passed explicitly into every reduction; nothing in the crate reads rank or group size
/// from ambient state.
#[derive(Debug, Clone)]
pub struct ExecutionContext<C: Collective> {
    comm: C,
}

impl<C: Collective> ExecutionContext<C> {
    pub fn new(comm: C) -> Self {
        Self { comm }
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }
    #[inline]
    pub fn size(&self) -> usize {
        self.comm.size()
    }
    #[inline]
    pub fn is_coordinator(&self) -> bool {
        self.comm.is_coordinator()
    }
    #[inline]
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Input files handled by this worker: `first + rank, first + rank + size, …` up to
    /// and including `last`.
    pub fn assigned_files(&self, first: usize, last: usize) -> impl Iterator<Item = usize> {
        (first + self.rank()..=last).step_by(self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::collective::{LocalGroup, SingleProcess};

    #[test]
    fn files_are_dealt_round_robin() {
        let groups: Vec<Vec<usize>> = LocalGroup::new(3)
            .unwrap()
            .into_iter()
            .map(|c| ExecutionContext::new(c).assigned_files(2, 9).collect())
            .collect();
        assert_eq!(groups[0], vec![2, 5, 8]);
        assert_eq!(groups[1], vec![3, 6, 9]);
        assert_eq!(groups[2], vec![4, 7]);
    }

    #[test]
    fn more_workers_than_files_leaves_some_idle() {
        let comms = LocalGroup::new(4).unwrap();
        let last = ExecutionContext::new(comms.into_iter().nth(3).unwrap());
        assert_eq!(last.assigned_files(0, 1).count(), 0);
    }

    #[test]
    fn single_process_takes_everything() {
        let ctx = ExecutionContext::new(SingleProcess);
        assert_eq!(ctx.assigned_files(0, 3).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }
}
