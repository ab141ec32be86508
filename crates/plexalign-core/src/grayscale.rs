use ndarray::{Array2, Axis, Zip};

use crate::consts::{EIGHT_BIT_LEVELS, LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::frame::{Frame, Raster, SourceRaster};

/// Reduce a source raster to a single-channel frame.
///
/// Single-channel rasters (including a trailing channel axis of length 1)
/// pass through with their bit depth. Colour rasters are converted with
/// Rec. 709 luminance weights and quantized to the 8-bit range; channels past
/// the third (alpha) are ignored. Two-channel rasters are read as
/// intensity + alpha.
pub fn reduce_to_gray(source: SourceRaster) -> Frame {
    match source.raster {
        Raster::Mono(data) => Frame::new(data, source.bit_depth),
        Raster::Multi(data) => match data.len_of(Axis(2)) {
            0 => {
                let (h, w, _) = data.dim();
                Frame::new(Array2::zeros((h, w)), source.bit_depth)
            }
            1 | 2 => Frame::new(data.index_axis(Axis(2), 0).to_owned(), source.bit_depth),
            _ => Frame::new(luminance(&data), 8),
        },
    }
}

/// Rec. 709 luminance of the first three channels, quantized to 1/255 steps.
fn luminance(data: &ndarray::Array3<f32>) -> Array2<f32> {
    let red = data.index_axis(Axis(2), 0);
    let green = data.index_axis(Axis(2), 1);
    let blue = data.index_axis(Axis(2), 2);

    let mut gray = Array2::<f32>::zeros(red.dim());
    Zip::from(&mut gray)
        .and(&red)
        .and(&green)
        .and(&blue)
        .for_each(|g, &r, &gr, &b| {
            let lum = LUMINANCE_R * r + LUMINANCE_G * gr + LUMINANCE_B * b;
            *g = (lum.clamp(0.0, 1.0) * EIGHT_BIT_LEVELS).round() / EIGHT_BIT_LEVELS;
        });
    gray
}
