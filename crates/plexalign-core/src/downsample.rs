//! Resolution-adaptive decimation for the spectral estimator.
//!
//! Phase correlation on whole-slide rasters is bounded by decimating both
//! frames of a pair by the same integer factor. The factor grows by one for
//! every `threshold` pixels on the long axis, and the shift measured on the
//! decimated pair is scaled back up by the same factor.

use ndarray::{s, Array2};

use crate::frame::Shift;

/// Decimation factor for a pair whose longest axis is `max_dimension` pixels.
pub fn decimation_factor(max_dimension: usize, threshold: usize) -> usize {
    max_dimension / threshold.max(1) + 1
}

/// Nearest-neighbour strided subsampling starting at index 0.
///
/// Keeps every `factor`-th row and column; no averaging, so sharp nuclear
/// edges survive into the correlation.
pub fn decimate(data: &Array2<f32>, factor: usize) -> Array2<f32> {
    if factor <= 1 {
        return data.clone();
    }
    let step = factor as isize;
    data.slice(s![..;step, ..;step]).to_owned()
}

/// Scale a shift measured at decimated resolution back to full resolution.
pub fn rescale(shift: Shift, factor: usize) -> Shift {
    let f = factor as f64;
    Shift::new(shift.dy * f, shift.dx * f)
}
