//! Worker-group collectives
//!
//! The reduction runs as a fixed-size group of cooperating workers, one per
//! domain partition. All cross-worker interaction goes through this trait:
//! a barrier for phase boundaries and an element-wise all-reduce used once,
//! at shutdown, for the metrics vector.
//!
//! `SoloGroup` is the single-process group. `LocalGroup::split` builds an
//! in-process group for worker threads, the process-level analogue of
//! launching the reduction under a multi-process runner.

use crate::error::{Error, Result};
use std::sync::{Arc, Barrier, Condvar, Mutex};

/// Reduction operation applied element-wise across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    /// Element-wise sum
    Sum,
    /// Element-wise minimum
    Min,
    /// Element-wise maximum
    Max,
}

impl ReduceOp {
    fn combine(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Sum => a + b,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
        }
    }
}

/// A fixed-size group of cooperating workers
///
/// Every worker in the group must call the collective operations
/// (`barrier`, `all_reduce`) the same number of times in the same order.
pub trait WorkerGroup: Send + Sync {
    /// This worker's rank within the group, in `[0, size)`
    fn rank(&self) -> usize;

    /// Number of workers in the group
    fn size(&self) -> usize;

    /// Block until every worker in the group has reached the barrier
    fn barrier(&self);

    /// Element-wise reduction across all workers' `values`
    ///
    /// Returns the reduced vector to every worker. All workers must pass
    /// slices of the same length.
    fn all_reduce(&self, values: &[f64], op: ReduceOp) -> Result<Vec<f64>>;
}

impl<G: WorkerGroup + ?Sized> WorkerGroup for &G {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn barrier(&self) {
        (**self).barrier()
    }

    fn all_reduce(&self, values: &[f64], op: ReduceOp) -> Result<Vec<f64>> {
        (**self).all_reduce(values, op)
    }
}

/// The trivial group: one worker, rank 0
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloGroup;

impl WorkerGroup for SoloGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn all_reduce(&self, values: &[f64], _op: ReduceOp) -> Result<Vec<f64>> {
        Ok(values.to_vec())
    }
}

struct ReduceCell {
    acc: Vec<f64>,
    result: Vec<f64>,
    arrived: usize,
    generation: u64,
}

struct GroupShared {
    size: usize,
    barrier: Barrier,
    reduce: Mutex<ReduceCell>,
    ready: Condvar,
}

/// In-process worker group backed by shared memory
///
/// Obtained from [`LocalGroup::split`]; each handle is owned by exactly one
/// worker thread.
pub struct LocalGroup {
    rank: usize,
    shared: Arc<GroupShared>,
}

impl LocalGroup {
    /// Create a group of `size` workers and return one handle per rank
    pub fn split(size: usize) -> Vec<LocalGroup> {
        assert!(size > 0, "worker group size must be positive");
        let shared = Arc::new(GroupShared {
            size,
            barrier: Barrier::new(size),
            reduce: Mutex::new(ReduceCell {
                acc: Vec::new(),
                result: Vec::new(),
                arrived: 0,
                generation: 0,
            }),
            ready: Condvar::new(),
        });
        (0..size)
            .map(|rank| LocalGroup {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl WorkerGroup for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn all_reduce(&self, values: &[f64], op: ReduceOp) -> Result<Vec<f64>> {
        let mut cell = self
            .shared
            .reduce
            .lock()
            .map_err(|_| Error::Stream("worker group poisoned by a panicked worker".to_string()))?;

        let generation = cell.generation;
        if cell.arrived == 0 {
            cell.acc.clear();
            cell.acc.extend_from_slice(values);
        } else {
            if cell.acc.len() != values.len() {
                return Err(Error::size_mismatch(
                    cell.acc.len(),
                    values.len(),
                    "all_reduce contribution",
                ));
            }
            for (slot, value) in cell.acc.iter_mut().zip(values) {
                *slot = op.combine(*slot, *value);
            }
        }
        cell.arrived += 1;

        if cell.arrived == self.shared.size {
            cell.result = std::mem::take(&mut cell.acc);
            cell.arrived = 0;
            cell.generation += 1;
            self.shared.ready.notify_all();
        } else {
            while cell.generation == generation {
                cell = self
                    .shared
                    .ready
                    .wait(cell)
                    .map_err(|_| Error::Stream("worker group poisoned by a panicked worker".to_string()))?;
            }
        }

        Ok(cell.result.clone())
    }
}
