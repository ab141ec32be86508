pub mod tiff;

use crate::error::Result;
use crate::frame::{Frame, FrameId, SourceRaster};

/// Header-level description of a raster: what a shape-only scan can learn
/// without decoding pixel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterInfo {
    pub height: usize,
    pub width: usize,
    /// Samples per pixel as stored (1 gray, 2 gray + alpha, 3 RGB, 4 RGBA).
    pub channels: usize,
    /// Bits per sample as stored (8 or 16).
    pub bit_depth: u8,
}

impl RasterInfo {
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Peak bytes per pixel held while one raster of this layout is decoded
    /// and reduced to a single f32 channel.
    ///
    /// Counts the decoded buffer, its 16-bit conversion (skipped when the
    /// decoder already yields 16-bit samples of the kept layout), the f32
    /// raster built from it and, for colour rasters, the gray frame reduced
    /// from that.
    pub fn decode_bytes_per_pixel(&self) -> u64 {
        let sample = if self.bit_depth > 8 { 2 } else { 1 };
        let native = (self.channels as u64).max(1) * sample;
        let kept = match self.channels {
            0..=2 => 1,
            3 => 3,
            _ => 4,
        };
        let converted = if sample == 2 && native == kept * 2 {
            0
        } else {
            kept * 2
        };
        let raster = kept * 4;
        let gray = if kept > 1 { 4 } else { 0 };

        let decoding = native + converted;
        let widening = (if converted > 0 { converted } else { native }) + raster;
        let reducing = raster + gray;
        decoding.max(widening).max(reducing)
    }
}

/// Where input rasters come from.
///
/// Implementations must answer `info` without decoding pixel data; the
/// canonical canvas and the memory plan are computed from headers alone
/// before any full read.
pub trait RasterSource: Send + Sync {
    /// Dimensions and sample layout of the raster.
    fn info(&self, id: &FrameId) -> Result<RasterInfo>;

    /// (height, width) of the raster.
    fn shape(&self, id: &FrameId) -> Result<(usize, usize)> {
        self.info(id).map(|info| info.shape())
    }

    /// Decode the full raster.
    fn read(&self, id: &FrameId) -> Result<SourceRaster>;
}

/// Where output frames go, keyed by the same identity as their input.
pub trait RasterSink: Send + Sync {
    fn write(&self, id: &FrameId, frame: &Frame) -> Result<()>;
}
