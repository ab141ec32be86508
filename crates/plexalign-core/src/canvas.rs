//! Canonical canvas computation and trailing-edge zero padding.
//!
//! Every output frame of a run has the same shape: the maximum height and
//! the maximum width found over the entire input set. Smaller frames are
//! padded with zeros on the bottom and right edges only, so pixel (0, 0)
//! keeps its meaning across rounds.

use ndarray::{s, Array2};
use num_traits::Zero;
use tracing::info;

use crate::error::{RegistrationError, Result};

/// Shape (height, width) every output frame is padded to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Canvas {
    pub height: usize,
    pub width: usize,
}

impl Canvas {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn max_dimension(&self) -> usize {
        self.height.max(self.width)
    }

    pub fn pixel_count(&self) -> usize {
        self.height * self.width
    }

    /// Whether a frame of the given shape fits without cropping.
    pub fn contains(&self, height: usize, width: usize) -> bool {
        height <= self.height && width <= self.width
    }
}

/// Size statistics gathered during the shape-only scan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasSurvey {
    pub canvas: Canvas,
    pub min_height: usize,
    pub min_width: usize,
    pub frame_count: usize,
}

impl CanvasSurvey {
    /// Relative spread `(max - min) / max` per axis, as (height, width).
    pub fn spread(&self) -> (f64, f64) {
        let rel = |max: usize, min: usize| {
            if max == 0 {
                0.0
            } else {
                (max - min) as f64 / max as f64
            }
        };
        (
            rel(self.canvas.height, self.min_height),
            rel(self.canvas.width, self.min_width),
        )
    }
}

/// Survey the declared shapes of every frame in the set.
pub fn survey_shapes<I>(shapes: I) -> Result<CanvasSurvey>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut survey: Option<CanvasSurvey> = None;
    for (h, w) in shapes {
        survey = Some(match survey {
            None => CanvasSurvey {
                canvas: Canvas::new(h, w),
                min_height: h,
                min_width: w,
                frame_count: 1,
            },
            Some(s) => CanvasSurvey {
                canvas: Canvas::new(s.canvas.height.max(h), s.canvas.width.max(w)),
                min_height: s.min_height.min(h),
                min_width: s.min_width.min(w),
                frame_count: s.frame_count + 1,
            },
        });
    }

    let survey =
        survey.ok_or_else(|| RegistrationError::EmptyInput("no frame shapes to survey".into()))?;
    let (spread_h, spread_w) = survey.spread();
    info!(
        frames = survey.frame_count,
        height = survey.canvas.height,
        width = survey.canvas.width,
        min_height = survey.min_height,
        min_width = survey.min_width,
        spread_h,
        spread_w,
        "Canonical canvas"
    );
    Ok(survey)
}

/// Canonical (max height, max width) over all shapes.
pub fn canonical_canvas<I>(shapes: I) -> Result<Canvas>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    survey_shapes(shapes).map(|s| s.canvas)
}

/// Zero-pad `data` on its trailing edges up to `canvas`.
///
/// Frames already at canvas size are returned as they are, without a copy.
/// Frames larger than the canvas in either dimension are rejected.
pub fn pad_to_canvas<T>(data: Array2<T>, canvas: Canvas) -> Result<Array2<T>>
where
    T: Clone + Zero,
{
    let (h, w) = data.dim();
    if !canvas.contains(h, w) {
        return Err(RegistrationError::ShapeMismatch {
            height: h,
            width: w,
            canvas_height: canvas.height,
            canvas_width: canvas.width,
        });
    }
    if (h, w) == canvas.dim() {
        return Ok(data);
    }

    let mut padded = Array2::<T>::zeros(canvas.dim());
    padded.slice_mut(s![..h, ..w]).assign(&data);
    Ok(padded)
}
