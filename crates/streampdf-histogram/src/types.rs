//! Core types for the per-slice PDF representation

use num_traits::Float;
use std::fmt;

/// Per-row bin counts over a worker's slab of a 3-D field
///
/// Holds `rows * nbins` counts in row-major order plus the `nbins` bin edge
/// values shared by every row (and, by construction, by every worker).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPdf<T: Float = f64> {
    /// Row-major counts, `rows * nbins` entries
    values: Vec<T>,
    /// Left edge of each bin
    bins: Vec<T>,
    /// Number of rows in this worker's slab
    rows: usize,
    /// Number of bins per row
    nbins: usize,
}

impl<T: Float> FieldPdf<T> {
    /// Create a PDF from raw parts
    pub fn new(values: Vec<T>, bins: Vec<T>, rows: usize, nbins: usize) -> Self {
        debug_assert_eq!(values.len(), rows * nbins);
        debug_assert_eq!(bins.len(), nbins);
        Self {
            values,
            bins,
            rows,
            nbins,
        }
    }

    /// Number of rows in this worker's slab
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of bins per row
    pub fn nbins(&self) -> usize {
        self.nbins
    }

    /// Check if this PDF covers no rows (legal for idle workers)
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// The bin edges shared by all rows
    pub fn bins(&self) -> &[T] {
        &self.bins
    }

    /// All counts, row-major
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// The counts of one row
    pub fn row(&self, row: usize) -> &[T] {
        &self.values[row * self.nbins..(row + 1) * self.nbins]
    }

    /// Sum of counts per row
    ///
    /// For any valid input this equals the row element count
    /// (`shape[1] * shape[2]`) for every row, whichever policy produced it.
    pub fn row_sums(&self) -> Vec<T> {
        (0..self.rows)
            .map(|r| self.row(r).iter().fold(T::zero(), |acc, &v| acc + v))
            .collect()
    }

    /// Deconstruct into `(values, bins)` for the writer
    pub fn into_parts(self) -> (Vec<T>, Vec<T>) {
        (self.values, self.bins)
    }
}

impl<T: Float + fmt::Display> fmt::Display for FieldPdf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bins.is_empty() {
            write!(f, "FieldPdf({} rows, 0 bins)", self.rows)
        } else {
            write!(
                f,
                "FieldPdf({} rows, {} bins, edges start at {:.3})",
                self.rows, self.nbins, self.bins[0]
            )
        }
    }
}
