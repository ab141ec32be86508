#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use ndarray::Array2;

use plexalign_core::error::{RegistrationError, Result};
use plexalign_core::frame::{Frame, FrameId, Raster, SourceRaster};
use plexalign_core::io::{RasterInfo, RasterSink, RasterSource};
use plexalign_core::set::{FrameDescriptor, RegistrationSet};

fn hash(seed: u64, index: u64) -> u64 {
    let mut z = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add(index);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn unit(seed: u64, index: u64) -> f32 {
    (hash(seed, index) >> 40) as f32 / (1u64 << 24) as f32
}

/// Deterministic white-noise frame in [0, 1]. Different seeds give
/// uncorrelated content.
pub fn noise_frame(h: usize, w: usize, seed: u64) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(y, x)| unit(seed, (y as u64) << 32 | x as u64))
}

/// Smooth, periodic content: Gaussian blobs (sigma 6 px) placed with
/// wrap-around distance. Band-limited enough that strided decimation at any
/// phase is a pure circular subpixel shift of the decimated anchor.
pub fn blob_frame(h: usize, w: usize, seed: u64) -> Array2<f32> {
    const BLOBS: u64 = 80;
    const SIGMA: f32 = 6.0;
    let blobs: Vec<(f32, f32, f32)> = (0..BLOBS)
        .map(|i| {
            (
                unit(seed, 3 * i) * h as f32,
                unit(seed, 3 * i + 1) * w as f32,
                0.5 + 0.5 * unit(seed, 3 * i + 2),
            )
        })
        .collect();
    let wrapped = |d: f32, n: usize| {
        let d = d.abs();
        d.min(n as f32 - d)
    };
    Array2::from_shape_fn((h, w), |(y, x)| {
        blobs
            .iter()
            .map(|&(cy, cx, amp)| {
                let dy = wrapped(y as f32 - cy, h);
                let dx = wrapped(x as f32 - cx, w);
                amp * (-(dy * dy + dx * dx) / (2.0 * SIGMA * SIGMA)).exp()
            })
            .sum()
    })
}

/// Circular roll: output `(r, c)` takes input `(r - dy, c - dx)` modulo the shape.
pub fn roll(data: &Array2<f32>, dy: i64, dx: i64) -> Array2<f32> {
    let (h, w) = data.dim();
    Array2::from_shape_fn((h, w), |(r, c)| {
        let sr = (r as i64 - dy).rem_euclid(h as i64) as usize;
        let sc = (c as i64 - dx).rem_euclid(w as i64) as usize;
        data[[sr, sc]]
    })
}

pub fn mono(data: Array2<f32>) -> SourceRaster {
    SourceRaster {
        raster: Raster::Mono(data),
        bit_depth: 16,
    }
}

/// In-memory raster source and sink.
///
/// Frames listed in `unreadable` fail with an I/O error on `read` (their
/// shape is still reported).
#[derive(Default)]
pub struct MemoryStore {
    pub inputs: BTreeMap<FrameId, SourceRaster>,
    pub unreadable: BTreeSet<FrameId>,
    pub outputs: Mutex<BTreeMap<FrameId, Frame>>,
}

impl MemoryStore {
    pub fn insert(&mut self, round: &str, marker: &str, data: Array2<f32>) {
        self.inputs.insert(FrameId::new(round, marker), mono(data));
    }

    pub fn output(&self, round: &str, marker: &str) -> Option<Frame> {
        self.outputs
            .lock()
            .unwrap()
            .get(&FrameId::new(round, marker))
            .cloned()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.lock().unwrap().len()
    }

    /// Registration set over every input; `reference` names the reference marker.
    pub fn set(&self, reference: &str) -> RegistrationSet {
        RegistrationSet::from_descriptors(self.inputs.keys().map(|id| {
            FrameDescriptor::new(id.round.clone(), id.marker.clone(), id.marker == reference)
        }))
        .unwrap()
    }
}

impl RasterSource for MemoryStore {
    fn info(&self, id: &FrameId) -> Result<RasterInfo> {
        let source = self.inputs.get(id).ok_or_else(|| not_found(id))?;
        let (height, width) = source.raster.shape();
        let channels = match &source.raster {
            Raster::Mono(_) => 1,
            Raster::Multi(data) => data.dim().2,
        };
        Ok(RasterInfo {
            height,
            width,
            channels,
            bit_depth: source.bit_depth,
        })
    }

    fn read(&self, id: &FrameId) -> Result<SourceRaster> {
        if self.unreadable.contains(id) {
            return Err(RegistrationError::Io(std::io::Error::other(format!(
                "{} is unreadable",
                id
            ))));
        }
        self.inputs.get(id).cloned().ok_or_else(|| not_found(id))
    }
}

impl RasterSink for MemoryStore {
    fn write(&self, id: &FrameId, frame: &Frame) -> Result<()> {
        self.outputs.lock().unwrap().insert(id.clone(), frame.clone());
        Ok(())
    }
}

fn not_found(id: &FrameId) -> RegistrationError {
    RegistrationError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        id.to_string(),
    ))
}
