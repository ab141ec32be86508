use std::sync::Arc;

use ndarray::{Array2, Axis};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// 2D forward FFT of a real array: row-wise FFT, then column-wise FFT.
pub fn fft2d_forward(data: &Array2<f32>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft_forward(w);
    let fft_col = planner.plan_fft_forward(h);

    let mut result = data.mapv(|v| Complex::new(v as f64, 0.0));
    transform_rows(&mut result, &fft_row);
    transform_cols(&mut result, &fft_col);
    result
}

/// 2D inverse FFT, normalized by `1/(h*w)`, keeping the complex result.
pub fn ifft2d_complex(data: &Array2<Complex<f64>>) -> Array2<Complex<f64>> {
    let (h, w) = data.dim();
    let mut planner = FftPlanner::new();
    let ifft_row = planner.plan_fft_inverse(w);
    let ifft_col = planner.plan_fft_inverse(h);

    let mut work = data.clone();
    transform_cols(&mut work, &ifft_col);
    transform_rows(&mut work, &ifft_row);

    let scale = 1.0 / (h * w) as f64;
    work.mapv_inplace(|v| v * scale);
    work
}

fn is_large(data: &Array2<Complex<f64>>) -> bool {
    data.len() >= PARALLEL_PIXEL_THRESHOLD
}

fn transform_rows(data: &mut Array2<Complex<f64>>, fft: &Arc<dyn Fft<f64>>) {
    let process = |mut row: ndarray::ArrayViewMut1<Complex<f64>>| match row.as_slice_mut() {
        Some(slice) => fft.process(slice),
        None => {
            let mut buf = row.to_vec();
            fft.process(&mut buf);
            row.assign(&ndarray::ArrayView1::from(&buf));
        }
    };

    if is_large(data) {
        data.axis_iter_mut(Axis(0)).into_par_iter().for_each(process);
    } else {
        data.axis_iter_mut(Axis(0)).for_each(process);
    }
}

fn transform_cols(data: &mut Array2<Complex<f64>>, fft: &Arc<dyn Fft<f64>>) {
    let process = |mut col: ndarray::ArrayViewMut1<Complex<f64>>| {
        let mut buf = col.to_vec();
        fft.process(&mut buf);
        col.assign(&ndarray::ArrayView1::from(&buf));
    };

    if is_large(data) {
        data.axis_iter_mut(Axis(1)).into_par_iter().for_each(process);
    } else {
        data.axis_iter_mut(Axis(1)).for_each(process);
    }
}
