use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use plexalign_core::grayscale::reduce_to_gray;
use plexalign_core::io::tiff::{load_raster, save_tiff};
use plexalign_core::pipeline::register_pair;

use super::config::RegistrationArgs;

#[derive(Args)]
pub struct PairArgs {
    /// Fixed (target) image
    pub fixed: PathBuf,

    /// Moving image, shifted onto the fixed one
    pub moving: PathBuf,

    /// Output directory; both frames are written under their file names
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub registration: RegistrationArgs,
}

fn output_path(dir: &Path, input: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("{} has no file name", input.display()))?;
    Ok(dir.join(name))
}

pub fn run(args: &PairArgs) -> Result<()> {
    let config = args.registration.resolve()?;

    let fixed_out = output_path(&args.output, &args.fixed)?;
    let moving_out = output_path(&args.output, &args.moving)?;
    if fixed_out == moving_out {
        bail!("Fixed and moving images share a file name");
    }

    let fixed = load_raster(&args.fixed)
        .with_context(|| format!("Failed to read {}", args.fixed.display()))?;
    let moving = load_raster(&args.moving)
        .with_context(|| format!("Failed to read {}", args.moving.display()))?;

    let result = register_pair(&reduce_to_gray(fixed), &reduce_to_gray(moving), &config)?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    save_tiff(&result.fixed, &fixed_out)?;
    save_tiff(&result.moving, &moving_out)?;

    let reg = &result.registration;
    println!("Canvas:      {}x{}", result.canvas.width, result.canvas.height);
    println!("Decimation:  {}x", result.decimation_factor);
    println!("Shift:       {}", reg.shift);
    println!("Error:       {:.4}", reg.error);
    println!("Phase:       {:.4}", reg.phase);
    if reg.low_confidence {
        println!("Warning:     low signal, frames written unshifted");
    }
    println!("Output saved to {}", args.output.display());

    Ok(())
}
