//! Matrix-multiply DFT evaluation of a cross-correlation surface
//! (Guizar-Sicairos et al., 2008).
//!
//! Instead of zero-padding the cross-power spectrum and running a full
//! inverse FFT at `factor`x resolution, the correlation is evaluated only on
//! a small grid of `region x region` samples with spacing `1/factor` pixels:
//!
//!   C(y, x) = sum_{ky,kx} S[ky, kx] * exp(+i 2pi (fy(ky) y + fx(kx) x))
//!
//! as the product `K_row * S * K_col^T` of two thin kernel matrices. The
//! result is unnormalized (no `1/(h*w)` factor).
//!
//! Reference: "Efficient subpixel image registration algorithms",
//!            M. Guizar-Sicairos, S. T. Thurman, J. R. Fienup, Optics Letters 33(2), 2008.

use ndarray::Array2;
use num_complex::Complex;
use std::f64::consts::TAU;

/// Evaluate the inverse DFT of `spectrum` on a `region x region` grid.
///
/// Sample `(j, i)` sits at `(origin.0 + j / factor, origin.1 + i / factor)`
/// in pixel coordinates of the spatial domain.
pub fn upsampled_correlation(
    spectrum: &Array2<Complex<f64>>,
    region: usize,
    factor: f64,
    origin: (f64, f64),
) -> Array2<Complex<f64>> {
    let (h, w) = spectrum.dim();
    let row_kernel = build_kernel(h, region, origin.0, factor);
    let col_kernel = build_kernel(w, region, origin.1, factor);

    // (h, w) x (w, region) -> (h, region), then (region, h) x (h, region)
    let partial = spectrum.dot(&col_kernel.t());
    row_kernel.dot(&partial)
}

/// Unnormalized inverse DFT of `spectrum` at a single (possibly fractional) position.
pub fn correlation_at(spectrum: &Array2<Complex<f64>>, dy: f64, dx: f64) -> Complex<f64> {
    upsampled_correlation(spectrum, 1, 1.0, (dy, dx))[[0, 0]]
}

/// Kernel of shape `(region, n)` with entry `(j, k)`:
///   exp(+i 2pi freq(k) (start + j / factor) / n)
///
/// `freq(k)` follows the FFT bin layout: `[0, 1, ..., ceil(n/2)-1, -floor(n/2), ..., -1]`.
fn build_kernel(n: usize, region: usize, start: f64, factor: f64) -> Array2<Complex<f64>> {
    let mut kernel = Array2::<Complex<f64>>::zeros((region, n));
    let positive_limit = (n - 1) / 2;

    for k in 0..n {
        let freq = if k <= positive_limit {
            k as f64
        } else {
            k as f64 - n as f64
        };
        for j in 0..region {
            let pos = start + j as f64 / factor;
            let phase = TAU * freq * pos / n as f64;
            kernel[[j, k]] = Complex::new(phase.cos(), phase.sin());
        }
    }

    kernel
}
