use std::fmt;
use std::ops::Range;

use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

use crate::frame::{Frame, Shift};

/// What happens to content translated past the canvas edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// Circular translation: content leaving one edge re-enters at the opposite edge.
    #[default]
    Wrap,
    /// Content leaving the canvas is dropped; the vacated band is zero-filled.
    Fill,
}

impl fmt::Display for BoundaryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wrap => write!(f, "Wrap"),
            Self::Fill => write!(f, "Zero fill"),
        }
    }
}

/// Translate `data` by `shift` rounded to whole pixels.
///
/// Output pixel `(r, c)` takes input pixel `(r - dy, c - dx)`. The output
/// always has the input's shape.
pub fn shift_array(data: &Array2<f32>, shift: Shift, policy: BoundaryPolicy) -> Array2<f32> {
    let (h, w) = data.dim();
    let (dy, dx) = shift.rounded();
    if dy == 0 && dx == 0 {
        return data.clone();
    }

    let rows = axis_segments(h, dy, policy);
    let cols = axis_segments(w, dx, policy);

    let mut result = Array2::<f32>::zeros((h, w));
    for (dst_r, src_r) in &rows {
        for (dst_c, src_c) in &cols {
            result
                .slice_mut(s![dst_r.clone(), dst_c.clone()])
                .assign(&data.slice(s![src_r.clone(), src_c.clone()]));
        }
    }
    result
}

/// Translate a frame, keeping its bit depth.
pub fn shift_frame(frame: &Frame, shift: Shift, policy: BoundaryPolicy) -> Frame {
    Frame::new(
        shift_array(&frame.data, shift, policy),
        frame.original_bit_depth,
    )
}

/// (destination, source) index ranges along one axis of length `n`.
fn axis_segments(n: usize, offset: i64, policy: BoundaryPolicy) -> Vec<(Range<usize>, Range<usize>)> {
    if n == 0 {
        return Vec::new();
    }
    match policy {
        BoundaryPolicy::Wrap => {
            let k = offset.rem_euclid(n as i64) as usize;
            if k == 0 {
                return vec![(0..n, 0..n)];
            }
            vec![(k..n, 0..n - k), (0..k, n - k..n)]
        }
        BoundaryPolicy::Fill => {
            let magnitude = offset.unsigned_abs() as usize;
            if magnitude >= n {
                Vec::new()
            } else if offset >= 0 {
                vec![(magnitude..n, 0..n - magnitude)]
            } else {
                vec![(0..n - magnitude, magnitude..n)]
            }
        }
    }
}
