//! Domain partitioning across the worker group
//!
//! The global field is split along its leading dimension into one contiguous
//! row span per worker. Every rank gets `floor(total / size)` rows and the
//! last rank absorbs the remainder, so the spans tile `[0, total)` with no
//! gaps or overlaps.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A worker's contiguous sub-range along the leading dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSpan {
    /// First global row owned by this worker
    pub start: usize,
    /// Number of rows owned by this worker
    pub count: usize,
}

impl RowSpan {
    /// Create a new row span
    pub fn new(start: usize, count: usize) -> Self {
        Self { start, count }
    }

    /// One-past-the-end global row index
    pub fn end(&self) -> usize {
        self.start + self.count
    }

    /// Check if this worker owns no rows
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Convert to a standard Range over global row indices
    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end()
    }
}

/// Split `total` rows across `size` workers and return rank `rank`'s span.
///
/// All ranks except the last receive `floor(total / size)` rows; the last
/// rank's count absorbs the remainder. When `size > total` the trailing
/// ranks receive empty spans; an idle worker still participates in step
/// synchronization and emits an empty selection.
pub fn split_rows(total: usize, size: usize, rank: usize) -> Result<RowSpan> {
    if size == 0 {
        return Err(Error::InvalidParameter(
            "worker group size must be positive".to_string(),
        ));
    }
    if rank >= size {
        return Err(Error::InvalidParameter(format!(
            "rank {rank} out of range for group of {size}"
        )));
    }

    let base = total / size;
    let start = base * rank;
    let count = if rank == size - 1 {
        // last rank reads all remaining rows
        total - base * (size - 1)
    } else {
        base
    };

    Ok(RowSpan::new(start, count))
}
