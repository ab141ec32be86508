use ndarray::{Array2, Zip};
use num_complex::Complex;
use tracing::debug;

use crate::consts::{CROSS_POWER_EPSILON, LOW_SIGNAL_RELATIVE_ENERGY, UPSAMPLED_REGION_PIXELS};
use crate::error::{RegistrationError, Result};
use crate::fft::{fft2d_forward, ifft2d_complex};
use crate::frame::{Estimate, Frame, Shift};

use super::upsample::{correlation_at, upsampled_correlation};

/// Estimate the translation between two equal-shaped arrays by phase correlation.
///
/// The returned shift is the translation that, applied to `moving` with
/// wraparound, brings it onto `fixed`. With `upsample_factor > 1` the integer
/// peak is refined to `1/upsample_factor` pixel on a local DFT grid.
pub fn estimate_translation(
    fixed: &Array2<f32>,
    moving: &Array2<f32>,
    upsample_factor: usize,
) -> Result<Estimate> {
    let (h, w) = fixed.dim();
    let (mh, mw) = moving.dim();
    if h != mh || w != mw {
        return Err(RegistrationError::ShapeMismatch {
            height: mh,
            width: mw,
            canvas_height: h,
            canvas_width: w,
        });
    }
    if h == 0 || w == 0 {
        return Err(RegistrationError::InvalidDimensions {
            width: w as u32,
            height: h as u32,
        });
    }

    let (fixed_fft, moving_fft) = rayon::join(|| fft2d_forward(fixed), || fft2d_forward(moving));

    let fixed_energy = spectral_energy(&fixed_fft);
    let moving_energy = spectral_energy(&moving_fft);
    if fixed_energy.is_uniform() {
        return Err(RegistrationError::LowSignal { which: "fixed" });
    }
    if moving_energy.is_uniform() {
        return Err(RegistrationError::LowSignal { which: "moving" });
    }

    let product = cross_spectrum(&fixed_fft, &moving_fft);
    drop(fixed_fft);
    drop(moving_fft);
    let cross_power = normalized_cross_power(&product);

    // Coarse integer peak on the full-resolution correlation surface
    let correlation = ifft2d_complex(&cross_power);
    let (peak_row, peak_col) = find_peak(&correlation);
    let coarse = Shift::new(fold(peak_row, h), fold(peak_col, w));

    let shift = if upsample_factor > 1 {
        refine(&cross_power, coarse, upsample_factor)
    } else {
        coarse
    };

    let peak = correlation_at(&product, shift.dy, shift.dx);
    let error = translation_error(peak, fixed_energy.total, moving_energy.total);
    let phase = peak.im.atan2(peak.re);

    debug!(
        dy = shift.dy,
        dx = shift.dx,
        coarse_dy = coarse.dy,
        coarse_dx = coarse.dx,
        error,
        phase,
        "Phase correlation estimate"
    );

    Ok(Estimate {
        shift,
        error,
        phase,
    })
}

/// Estimate the translation between two frames.
pub fn estimate_frames(fixed: &Frame, moving: &Frame, upsample_factor: usize) -> Result<Estimate> {
    estimate_translation(&fixed.data, &moving.data, upsample_factor)
}

#[derive(Clone, Copy, Debug)]
struct SpectralEnergy {
    total: f64,
    dc: f64,
}

impl SpectralEnergy {
    /// All energy sits in the DC bin: the frame is constant (or empty).
    fn is_uniform(&self) -> bool {
        self.total - self.dc <= LOW_SIGNAL_RELATIVE_ENERGY * self.total
    }
}

fn spectral_energy(spectrum: &Array2<Complex<f64>>) -> SpectralEnergy {
    SpectralEnergy {
        total: spectrum.iter().map(|v| v.norm_sqr()).sum(),
        dc: spectrum[[0, 0]].norm_sqr(),
    }
}

/// `F * conj(M)` per frequency bin.
fn cross_spectrum(
    fixed_fft: &Array2<Complex<f64>>,
    moving_fft: &Array2<Complex<f64>>,
) -> Array2<Complex<f64>> {
    let mut product = Array2::<Complex<f64>>::zeros(fixed_fft.dim());
    Zip::from(&mut product)
        .and(fixed_fft)
        .and(moving_fft)
        .for_each(|p, &f, &m| *p = f * m.conj());
    product
}

/// Normalize each bin of the cross spectrum to unit magnitude.
///
/// Bins whose magnitude is numerically zero are left as they are instead of
/// being divided, so no NaN reaches the inverse transform.
pub(crate) fn normalized_cross_power(product: &Array2<Complex<f64>>) -> Array2<Complex<f64>> {
    product.mapv(|cross| {
        let mag = cross.norm();
        if mag > CROSS_POWER_EPSILON {
            cross / mag
        } else {
            cross
        }
    })
}

/// Position of the maximum-magnitude sample; the first one wins on ties.
pub(crate) fn find_peak(data: &Array2<Complex<f64>>) -> (usize, usize) {
    let mut best = (0, 0);
    let mut best_val = f64::NEG_INFINITY;

    for ((row, col), v) in data.indexed_iter() {
        let mag = v.norm_sqr();
        if mag > best_val {
            best_val = mag;
            best = (row, col);
        }
    }

    best
}

/// Circular correlation peaks past the midpoint are negative offsets.
fn fold(peak: usize, n: usize) -> f64 {
    if peak > n / 2 {
        peak as f64 - n as f64
    } else {
        peak as f64
    }
}

/// Relocate the peak on a `1/factor` grid spanning 1.5 px around `coarse`.
fn refine(cross_power: &Array2<Complex<f64>>, coarse: Shift, factor: usize) -> Shift {
    let upsample = factor as f64;
    let region = (UPSAMPLED_REGION_PIXELS * upsample).ceil() as usize;
    let center = (region / 2) as f64;
    let origin = (
        coarse.dy - center / upsample,
        coarse.dx - center / upsample,
    );

    let grid = upsampled_correlation(cross_power, region, upsample, origin);
    let (row, col) = find_peak(&grid);

    Shift::new(
        origin.0 + row as f64 / upsample,
        origin.1 + col as f64 / upsample,
    )
}

/// Translation-invariant normalized RMS error between the aligned frames.
fn translation_error(peak: Complex<f64>, fixed_energy: f64, moving_energy: f64) -> f64 {
    let ratio = peak.norm_sqr() / (fixed_energy * moving_energy);
    (1.0 - ratio).abs().sqrt()
}
