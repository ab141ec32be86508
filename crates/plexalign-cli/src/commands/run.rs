use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use plexalign_core::consts::DEFAULT_REFERENCE_MARKER;
use plexalign_core::pipeline::{register_set_reported, ProgressReporter, RegistrationStage};
use tracing::{info, warn};

use super::config::{parse_anchor, RegistrationArgs};
use crate::layout::Layout;
use crate::memory::available_memory_bytes;
use crate::summary::{print_outcome, print_run_summary};

#[derive(Args)]
pub struct RunArgs {
    /// Directory of <prefix>.<ROUND>.<MARKER>.tif files
    pub input: PathBuf,

    /// Directory for registered frames (same file names)
    pub output: PathBuf,

    /// Marker name of the reference channel in every round
    #[arg(long, default_value = DEFAULT_REFERENCE_MARKER)]
    pub reference_marker: String,

    /// Anchor round: "first", "last" or a round id
    #[arg(long)]
    pub anchor: Option<String>,

    /// Skip the available-memory check
    #[arg(long)]
    pub no_memory_check: bool,

    #[command(flatten)]
    pub registration: RegistrationArgs,
}

/// Drives an indicatif bar from registration progress.
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: RegistrationStage, total_items: Option<usize>) {
        self.bar.set_length(total_items.unwrap_or(0) as u64);
        self.bar.set_position(0);
        self.bar.set_message(stage.to_string());
    }

    fn advance(&self, items_done: usize) {
        self.bar.set_position(items_done as u64);
    }

    fn finish_stage(&self) {
        if let Some(len) = self.bar.length() {
            self.bar.set_position(len);
        }
    }
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config = args.registration.resolve()?;
    if let Some(ref anchor) = args.anchor {
        config.anchor = parse_anchor(anchor);
    }

    if args.input == args.output {
        bail!("Output directory must differ from the input directory");
    }
    let layout = Layout::scan(&args.input, &args.reference_marker)?;
    let set = layout.registration_set()?;
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let available = if args.no_memory_check {
        None
    } else {
        let probed = available_memory_bytes();
        if probed.is_none() {
            warn!("Available memory unknown, skipping memory check");
        }
        probed
    };

    print_run_summary(&config, &set, &args.input, &args.output, available);

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:24} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let reporter = Arc::new(BarReporter { bar: bar.clone() });

    let source = layout.source();
    let sink = layout.sink(&args.output);
    let outcome = register_set_reported(&set, &source, &sink, &config, available, reporter)
        .context("Registration failed")?;
    bar.finish_with_message("Done");

    info!(output = %args.output.display(), "Registered frames written");
    print_outcome(&outcome);
    println!("Output saved to {}", args.output.display());

    Ok(())
}
