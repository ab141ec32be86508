use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::{ColorType, GrayImage, ImageBuffer, ImageDecoder, ImageFormat, ImageReader, Luma};
use ndarray::{Array2, Array3};

use crate::error::{RegistrationError, Result};
use crate::frame::{Frame, FrameId, Raster, SourceRaster};

use super::{RasterInfo, RasterSink, RasterSource};

/// A set of TIFF files addressed by frame identity.
///
/// Used as a [`RasterSource`] over the input files and as a [`RasterSink`]
/// over the output files.
#[derive(Clone, Debug, Default)]
pub struct TiffStore {
    paths: BTreeMap<FrameId, PathBuf>,
}

impl TiffStore {
    pub fn new(paths: BTreeMap<FrameId, PathBuf>) -> Self {
        Self { paths }
    }

    pub fn insert(&mut self, id: FrameId, path: PathBuf) {
        self.paths.insert(id, path);
    }

    pub fn path(&self, id: &FrameId) -> Result<&Path> {
        self.paths.get(id).map(PathBuf::as_path).ok_or_else(|| {
            RegistrationError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no file registered for frame {}", id),
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl RasterSource for TiffStore {
    fn info(&self, id: &FrameId) -> Result<RasterInfo> {
        read_info(self.path(id)?)
    }

    fn read(&self, id: &FrameId) -> Result<SourceRaster> {
        load_raster(self.path(id)?)
    }
}

impl RasterSink for TiffStore {
    fn write(&self, id: &FrameId, frame: &Frame) -> Result<()> {
        let path = self.path(id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        save_tiff(frame, path)
    }
}

/// Open a reader without the decoder's default allocation cap.
///
/// Whole-slide rasters routinely exceed it; the run's memory budget is the
/// ceiling instead.
fn open_reader(path: &Path) -> Result<ImageReader<BufReader<File>>> {
    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    reader.no_limits();
    Ok(reader)
}

fn bit_depth(color: ColorType) -> u8 {
    if color.bytes_per_pixel() / color.channel_count() > 1 {
        16
    } else {
        8
    }
}

/// Read dimensions and sample layout from the file header only.
pub fn read_info(path: &Path) -> Result<RasterInfo> {
    let decoder = open_reader(path)?.into_decoder()?;
    let (w, h) = decoder.dimensions();
    let color = decoder.color_type();
    Ok(RasterInfo {
        height: h as usize,
        width: w as usize,
        channels: color.channel_count() as usize,
        bit_depth: bit_depth(color),
    })
}

fn to_unit(raw: Vec<u16>) -> Vec<f32> {
    raw.into_iter().map(|v| v as f32 / 65535.0).collect()
}

/// Load an image file as a raster with values in [0.0, 1.0].
///
/// Grayscale files become [`Raster::Mono`]; colour files keep their channels
/// (3 or 4) as [`Raster::Multi`]. The decoded image is consumed by its 16-bit
/// conversion, so at most two pixel buffers are alive at once.
pub fn load_raster(path: &Path) -> Result<SourceRaster> {
    let img = open_reader(path)?.decode()?;
    let color = img.color();
    let bit_depth = bit_depth(color);

    let raster = if color.channel_count() <= 2 {
        let gray = img.into_luma16();
        let (w, h) = gray.dimensions();
        let data = Array2::from_shape_vec((h as usize, w as usize), to_unit(gray.into_raw()))
            .map_err(|_| RegistrationError::InvalidDimensions { width: w, height: h })?;
        Raster::Mono(data)
    } else {
        let channels = if color.has_alpha() { 4 } else { 3 };
        let (w, h, raw) = if color.has_alpha() {
            let rgba = img.into_rgba16();
            let (w, h) = rgba.dimensions();
            (w, h, rgba.into_raw())
        } else {
            let rgb = img.into_rgb16();
            let (w, h) = rgb.dimensions();
            (w, h, rgb.into_raw())
        };
        let data = Array3::from_shape_vec((h as usize, w as usize, channels), to_unit(raw))
            .map_err(|_| RegistrationError::InvalidDimensions { width: w, height: h })?;
        Raster::Multi(data)
    };

    Ok(SourceRaster { raster, bit_depth })
}

/// Save a frame as grayscale TIFF at its original bit depth (8 or 16).
pub fn save_tiff(frame: &Frame, path: &Path) -> Result<()> {
    let h = frame.height() as u32;
    let w = frame.width() as u32;

    if frame.original_bit_depth <= 8 {
        let pixels: Vec<u8> = frame
            .data
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        let img = GrayImage::from_raw(w, h, pixels)
            .ok_or(RegistrationError::InvalidDimensions { width: w, height: h })?;
        img.save_with_format(path, ImageFormat::Tiff)?;
    } else {
        let pixels: Vec<u16> = frame
            .data
            .iter()
            .map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
            .collect();
        let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w, h, pixels)
            .ok_or(RegistrationError::InvalidDimensions { width: w, height: h })?;
        img.save_with_format(path, ImageFormat::Tiff)?;
    }
    Ok(())
}
