use std::cmp::Ordering;
use std::fmt;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Identifier of one imaging round.
///
/// Ordering is "natural": ids that parse as unsigned integers compare
/// numerically and sort before any non-numeric id, which compare as strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(String);

impl RoundId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for RoundId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RoundId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoundId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Source identity of a frame: which round it belongs to and which marker it shows.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId {
    pub round: RoundId,
    pub marker: String,
}

impl FrameId {
    pub fn new(round: impl Into<RoundId>, marker: impl Into<String>) -> Self {
        Self {
            round: round.into(),
            marker: marker.into(),
        }
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.round, self.marker)
    }
}

/// A single-channel intensity frame.
/// Pixel values are f32 in [0.0, 1.0].
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Bit depth of the source raster (8 or 16), used when writing back
    pub original_bit_depth: u8,
}

impl Frame {
    pub fn new(data: Array2<f32>, bit_depth: u8) -> Self {
        Self {
            data,
            original_bit_depth: bit_depth,
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

/// Pixel payload delivered by a raster source, before grayscale reduction.
#[derive(Clone, Debug)]
pub enum Raster {
    Mono(Array2<f32>),
    /// Shape = (height, width, channels)
    Multi(Array3<f32>),
}

impl Raster {
    /// (height, width) of the raster, ignoring channels.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Mono(data) => data.dim(),
            Self::Multi(data) => {
                let (h, w, _) = data.dim();
                (h, w)
            }
        }
    }
}

/// A raster as read from a source, together with its bit depth.
#[derive(Clone, Debug)]
pub struct SourceRaster {
    pub raster: Raster,
    pub bit_depth: u8,
}

/// Translation (in pixels) that brings a moving frame onto the fixed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub dy: f64,
    pub dx: f64,
}

impl Shift {
    pub fn new(dy: f64, dx: f64) -> Self {
        Self { dy, dx }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Shift rounded to whole pixels.
    pub fn rounded(&self) -> (i64, i64) {
        (self.dy.round() as i64, self.dx.round() as i64)
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.dy, self.dx)
    }
}

/// Output of the phase-correlation estimator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    pub shift: Shift,
    /// Translation-invariant normalized RMS error in [0, 1]; 0 is a perfect match.
    pub error: f64,
    /// Global phase difference (radians) between the aligned frames.
    pub phase: f64,
}
