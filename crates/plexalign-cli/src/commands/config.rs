use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use plexalign_core::align::BoundaryPolicy;
use plexalign_core::frame::RoundId;
use plexalign_core::pipeline::{AnchorPolicy, RegistrationConfig};

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save the default RegistrationConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let toml_str = toml::to_string_pretty(&RegistrationConfig::default())?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BoundaryArg {
    Wrap,
    Fill,
}

impl From<BoundaryArg> for BoundaryPolicy {
    fn from(arg: BoundaryArg) -> Self {
        match arg {
            BoundaryArg::Wrap => BoundaryPolicy::Wrap,
            BoundaryArg::Fill => BoundaryPolicy::Fill,
        }
    }
}

/// Registration settings shared by `run` and `pair`.
#[derive(Args)]
pub struct RegistrationArgs {
    /// Registration config file (TOML); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Content leaving the canvas wraps around or is dropped
    #[arg(long, value_enum)]
    pub boundary: Option<BoundaryArg>,

    /// Long-axis pixels per step of the decimation factor
    #[arg(long)]
    pub downsample_threshold: Option<usize>,

    /// Fraction of available memory the run may use (0.0-1.0)
    #[arg(long)]
    pub memory_fraction: Option<f64>,
}

impl RegistrationArgs {
    pub fn resolve(&self) -> Result<RegistrationConfig> {
        let mut config = match self.config {
            Some(ref path) => load(path)?,
            None => RegistrationConfig::default(),
        };
        if let Some(boundary) = self.boundary {
            config.boundary = boundary.into();
        }
        if let Some(threshold) = self.downsample_threshold {
            config.downsample_threshold = threshold;
        }
        if let Some(fraction) = self.memory_fraction {
            config.memory_fraction = fraction;
        }
        Ok(config)
    }
}

pub fn load(path: &Path) -> Result<RegistrationConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&contents).context("Invalid registration config")
}

/// `first`, `last`, or a round id.
pub fn parse_anchor(value: &str) -> AnchorPolicy {
    match value.to_ascii_lowercase().as_str() {
        "first" => AnchorPolicy::First,
        "last" => AnchorPolicy::Last,
        _ => AnchorPolicy::Round(RoundId::new(value)),
    }
}
