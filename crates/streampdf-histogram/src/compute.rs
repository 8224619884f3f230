//! Per-slice PDF computation
//!
//! Computes, for each row of a worker's 3-D slab, the distribution of values
//! over `nbins` equal-width bins spanning `[min, max]`. Pure and read-only:
//! no I/O, safely reentrant once handed a buffer.

use crate::types::FieldPdf;
use num_traits::{Float, NumCast};
use streampdf_core::{Error, Result};
use tracing::warn;

/// Ranges and bin widths below this are treated as degenerate
const DEGENERATE_RANGE: f64 = 1.0e-20;

/// Signed comparison: inverted ranges also count as degenerate, so they take
/// the constant-array branch instead of producing negative bin indices.
fn degenerate<T: Float>(d: T) -> bool {
    d < NumCast::from(DEGENERATE_RANGE).unwrap()
}

/// Compute the per-row PDF of a worker's slab.
///
/// `data` holds `count` consecutive rows of the global field, each row a
/// `shape[1] * shape[2]` slice; `start` is the slab's first global row, used
/// only to report global indices in out-of-range warnings. `min`/`max` are
/// assumed to be the true value range; values outside it are clamped into
/// the edge bins and reported as a non-fatal warning.
///
/// Policies, evaluated in order:
///
/// 1. `nbins == 1`: each row's single bin is the row element count, no scan.
/// 2. degenerate range or bin width: each row's weight lands in bin
///    `nbins / 2`, no scan.
/// 3. otherwise: `bin = floor((value - min) / bin_width)`, with the boundary
///    value `max` clamped into the last bin.
pub fn compute_pdf<T>(
    data: &[T],
    shape: &[usize],
    start: usize,
    count: usize,
    nbins: usize,
    min: T,
    max: T,
) -> Result<FieldPdf<T>>
where
    T: Float + std::fmt::Display,
{
    if shape.len() != 3 {
        return Err(Error::bad_rank(shape.len()));
    }
    if nbins == 0 {
        return Err(Error::InvalidParameter(
            "nbins must be positive".to_string(),
        ));
    }

    let slice_size = shape[1] * shape[2];
    if data.len() != count * slice_size {
        return Err(Error::size_mismatch(
            count * slice_size,
            data.len(),
            "field slab",
        ));
    }

    let nbins_t: T = NumCast::from(nbins).unwrap();
    let bin_width = (max - min) / nbins_t;

    let mut bins = Vec::with_capacity(nbins);
    for i in 0..nbins {
        let i_t: T = NumCast::from(i).unwrap();
        bins.push(min + i_t * bin_width);
    }

    let weight: T = NumCast::from(slice_size).unwrap();
    let mut values = vec![T::zero(); count * nbins];

    if nbins == 1 {
        // special case: only one bin
        for slot in values.iter_mut() {
            *slot = weight;
        }
        return Ok(FieldPdf::new(values, bins, count, nbins));
    }

    if degenerate(max - min) || degenerate(bin_width) {
        // special case: constant array
        let middle = nbins / 2;
        for row in 0..count {
            values[row * nbins + middle] = weight;
        }
        return Ok(FieldPdf::new(values, bins, count, nbins));
    }

    let one = T::one();
    for row in 0..count {
        let row_data = &data[row * slice_size..(row + 1) * slice_size];
        let row_pdf = &mut values[row * nbins..(row + 1) * nbins];
        for (j, &value) in row_data.iter().enumerate() {
            if value > max || value < min {
                warn!(
                    "data[{}] = {value} is out of [min,max] = [{min},{max}]",
                    (start + row) * slice_size + j
                );
            }
            // Negative offsets cast to None and clamp to the first bin.
            let offset = ((value - min) / bin_width).floor();
            let mut bin = <usize as NumCast>::from(offset).unwrap_or(0);
            if bin >= nbins {
                bin = nbins - 1;
            }
            row_pdf[bin] = row_pdf[bin] + one;
        }
    }

    Ok(FieldPdf::new(values, bins, count, nbins))
}
