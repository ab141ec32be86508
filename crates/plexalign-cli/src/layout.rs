//! Input directory layout: `<prefix>.<ROUND>.<MARKER>.tif`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use plexalign_core::frame::FrameId;
use plexalign_core::io::tiff::TiffStore;
use plexalign_core::set::{FrameDescriptor, RegistrationSet};
use tracing::{debug, warn};

/// One recognised input file.
#[derive(Clone, Debug, PartialEq)]
pub struct InputFile {
    pub path: PathBuf,
    pub descriptor: FrameDescriptor,
}

/// Parse round and marker out of a file name.
///
/// The round is the second-to-last dot-separated component of the stem and
/// the marker the last one. Returns `None` for non-TIFF files and names with
/// fewer than two stem components.
pub fn parse_file_name(name: &str, reference_marker: &str) -> Option<FrameDescriptor> {
    let (stem, ext) = name.rsplit_once('.')?;
    if !ext.eq_ignore_ascii_case("tif") && !ext.eq_ignore_ascii_case("tiff") {
        return None;
    }
    let mut parts = stem.rsplit('.');
    let marker = parts.next().filter(|m| !m.is_empty())?;
    let round = parts.next().filter(|r| !r.is_empty())?;
    let is_reference = marker.eq_ignore_ascii_case(reference_marker);
    Some(FrameDescriptor::new(round, marker, is_reference))
}

/// All registration inputs found in one directory.
#[derive(Clone, Debug, Default)]
pub struct Layout {
    pub files: Vec<InputFile>,
}

impl Layout {
    /// Scan `dir` (non-recursively) for TIFF files.
    pub fn scan(dir: &Path, reference_marker: &str) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read input directory {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "Skipping file with non-UTF-8 name");
                continue;
            };
            match parse_file_name(name, reference_marker) {
                Some(descriptor) => {
                    debug!(file = name, frame = %descriptor.frame_id(), "Found frame");
                    files.push(InputFile { path, descriptor });
                }
                None => warn!(file = name, "Skipping file outside the round.marker.tif layout"),
            }
        }
        files.sort_by(|a, b| a.descriptor.frame_id().cmp(&b.descriptor.frame_id()));

        if files.is_empty() {
            bail!("No <prefix>.<ROUND>.<MARKER>.tif files in {}", dir.display());
        }
        Ok(Self { files })
    }

    pub fn registration_set(&self) -> Result<RegistrationSet> {
        RegistrationSet::from_descriptors(self.files.iter().map(|f| f.descriptor.clone()))
            .context("Input files do not form a valid registration set")
    }

    /// Raster source over the input files.
    pub fn source(&self) -> TiffStore {
        TiffStore::new(
            self.files
                .iter()
                .map(|f| (f.descriptor.frame_id(), f.path.clone()))
                .collect(),
        )
    }

    /// Raster sink writing each frame under `output_dir` with its input file name.
    pub fn sink(&self, output_dir: &Path) -> TiffStore {
        let paths: BTreeMap<FrameId, PathBuf> = self
            .files
            .iter()
            .filter_map(|f| {
                let name = f.path.file_name()?;
                Some((f.descriptor.frame_id(), output_dir.join(name)))
            })
            .collect();
        TiffStore::new(paths)
    }
}
