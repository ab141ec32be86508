//! Up-front memory planning.
//!
//! Frames are fully materialized before decimation, so a run that does not
//! fit is refused before the first raster is read.

use num_complex::Complex;
use tracing::{info, warn};

use crate::canvas::Canvas;
use crate::error::{RegistrationError, Result};

/// Complex buffers alive at once inside the estimator on the decimated pair:
/// two spectra, the raw cross spectrum, its normalized copy and the inverse
/// transform.
const SPECTRAL_BUFFERS: u64 = 5;

/// Estimated peak bytes for registering `workers` rounds at once.
///
/// Each worker passes through three phases on canvas-sized data and holds
/// the largest of them: decoding a raster (`decode_bytes_per_pixel`, see
/// [`RasterInfo::decode_bytes_per_pixel`](crate::io::RasterInfo::decode_bytes_per_pixel)),
/// shifting a frame (source and shifted copy), and estimating (the padded
/// reference, its decimated copy and the spectral buffers). The decimated
/// anchor reference is shared by all workers.
pub fn estimate_peak_bytes(
    canvas: Canvas,
    factor: usize,
    workers: usize,
    decode_bytes_per_pixel: u64,
) -> u64 {
    let pixel = std::mem::size_of::<f32>() as u64;
    let complex = std::mem::size_of::<Complex<f64>>() as u64;

    let pixels = canvas.pixel_count() as u64;
    let frame_bytes = pixels * pixel;
    let factor = factor.max(1);
    let small_pixels =
        (canvas.height.div_ceil(factor) * canvas.width.div_ceil(factor)) as u64;
    let small_bytes = small_pixels * pixel;
    let spectral_bytes = small_pixels * complex * SPECTRAL_BUFFERS;

    let decoding = pixels * decode_bytes_per_pixel;
    let shifting = 2 * frame_bytes;
    let estimating = frame_bytes + small_bytes + spectral_bytes;
    let per_worker = decoding.max(shifting).max(estimating);
    small_bytes + per_worker * workers.max(1) as u64
}

/// Memory ceiling for one run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryBudget {
    pub available_bytes: u64,
    pub fraction: f64,
}

impl MemoryBudget {
    pub fn new(available_bytes: u64, fraction: f64) -> Self {
        Self {
            available_bytes,
            fraction: fraction.clamp(0.0, 1.0),
        }
    }

    pub fn limit(&self) -> u64 {
        (self.available_bytes as f64 * self.fraction) as u64
    }

    /// Fail with `OutOfMemoryBudget` if `required` does not fit.
    pub fn check(&self, required: u64) -> Result<()> {
        let budget = self.limit();
        if required > budget {
            return Err(RegistrationError::OutOfMemoryBudget { required, budget });
        }
        Ok(())
    }
}

/// Decide how many rounds may be registered concurrently.
///
/// Returns the largest count up to `workers` whose plan fits, and
/// `OutOfMemoryBudget` if not even one round at a time fits. Without a
/// budget every plan fits.
pub fn plan_workers(
    canvas: Canvas,
    factor: usize,
    workers: usize,
    decode_bytes_per_pixel: u64,
    budget: Option<MemoryBudget>,
) -> Result<usize> {
    let workers = workers.max(1);
    let Some(budget) = budget else {
        return Ok(workers);
    };

    let required = |n| estimate_peak_bytes(canvas, factor, n, decode_bytes_per_pixel);
    let parallel = required(workers);
    if budget.check(parallel).is_ok() {
        info!(
            required_mb = parallel / (1024 * 1024),
            budget_mb = budget.limit() / (1024 * 1024),
            workers,
            "Memory budget check passed"
        );
        return Ok(workers);
    }

    budget.check(required(1))?;
    let fitting = (1..workers)
        .rev()
        .find(|&n| budget.check(required(n)).is_ok())
        .unwrap_or(1);
    warn!(
        required_mb = parallel / (1024 * 1024),
        budget_mb = budget.limit() / (1024 * 1024),
        workers = fitting,
        "Parallel registration exceeds memory budget, registering fewer rounds at once"
    );
    Ok(fitting)
}
