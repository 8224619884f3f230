//! Per-slice PDF (histogram) computation for 3-D field slabs
//!
//! Given a worker's contiguous slab of a step-streamed 3-D scalar field,
//! this crate computes one fixed-range, equal-width histogram per row of the
//! slab, with the edge-case policies the streaming reduction relies on:
//!
//! - **Single bin** (`nbins == 1`): each row's bin holds the row element
//!   count without scanning the data.
//! - **Degenerate range** (range or bin width below `1e-20`): each row's
//!   weight concentrates in the middle bin.
//! - **General case**: equal-width binning with the `max` boundary value
//!   clamped into the last bin and out-of-range values clamped and warned.
//!
//! The invariant that makes the output checkable: every row's counts sum to
//! the row element count (`shape[1] * shape[2]`), whichever branch fired.
//!
//! # Example
//!
//! ```rust
//! use streampdf_histogram::compute_pdf;
//!
//! // one row of a field shaped [4, 2, 3], values spread over [0, 1)
//! let data = vec![0.1, 0.2, 0.3, 0.6, 0.7, 0.8];
//! let pdf = compute_pdf(&data, &[4, 2, 3], 0, 1, 2, 0.0, 1.0).unwrap();
//!
//! assert_eq!(pdf.row(0), &[3.0, 3.0]);
//! assert_eq!(pdf.row_sums(), vec![6.0]);
//! ```

pub mod compute;
pub mod types;

// Re-export main types
pub use compute::compute_pdf;
pub use types::FieldPdf;

pub use streampdf_core::Result;
