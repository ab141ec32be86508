use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use plexalign_core::canvas::{survey_shapes, CanvasSurvey};
use plexalign_core::consts::DEFAULT_REFERENCE_MARKER;
use plexalign_core::downsample::decimation_factor;
use plexalign_core::frame::{FrameId, RoundId};
use plexalign_core::io::RasterSource;

use crate::commands::config::RegistrationArgs;
use crate::layout::Layout;

#[derive(Args)]
pub struct ScanArgs {
    /// Directory of <prefix>.<ROUND>.<MARKER>.tif files
    pub input: PathBuf,

    /// Marker name of the reference channel in every round
    #[arg(long, default_value = DEFAULT_REFERENCE_MARKER)]
    pub reference_marker: String,

    #[command(flatten)]
    pub registration: RegistrationArgs,
}

struct ScannedFrame {
    id: FrameId,
    is_reference: bool,
    height: usize,
    width: usize,
}

/// What a run over the input would see, from file headers alone.
struct ScanReport {
    rounds: Vec<(RoundId, Vec<ScannedFrame>)>,
    survey: CanvasSurvey,
    decimation_factor: usize,
}

fn inspect(args: &ScanArgs) -> Result<ScanReport> {
    let config = args.registration.resolve()?;
    let layout = Layout::scan(&args.input, &args.reference_marker)?;
    let set = layout.registration_set()?;
    let source = layout.source();

    let mut rounds = Vec::with_capacity(set.round_count());
    let mut shapes = Vec::with_capacity(set.frame_count());
    for round in set.rounds() {
        let mut frames = Vec::with_capacity(round.frame_count());
        for id in round.frame_ids() {
            let (height, width) = source.shape(&id)?;
            shapes.push((height, width));
            frames.push(ScannedFrame {
                is_reference: id.marker == round.reference,
                id,
                height,
                width,
            });
        }
        rounds.push((round.id.clone(), frames));
    }

    let survey = survey_shapes(shapes)?;
    let decimation_factor =
        decimation_factor(survey.canvas.max_dimension(), config.downsample_threshold);
    Ok(ScanReport {
        rounds,
        survey,
        decimation_factor,
    })
}

/// List rounds, markers and shapes without decoding pixel data.
pub fn run(args: &ScanArgs) -> Result<()> {
    let report = inspect(args)?;

    for (round, frames) in &report.rounds {
        println!("Round {}", round);
        for frame in frames {
            let tag = if frame.is_reference { " (reference)" } else { "" };
            println!(
                "  {:<16}{}x{}{}",
                frame.id.marker, frame.width, frame.height, tag
            );
        }
    }

    let survey = &report.survey;
    let (spread_h, spread_w) = survey.spread();
    println!();
    println!("Rounds:      {}", report.rounds.len());
    println!("Frames:      {}", survey.frame_count);
    println!("Canvas:      {}x{}", survey.canvas.width, survey.canvas.height);
    println!(
        "Size spread: {:.1}% x {:.1}%",
        spread_w * 100.0,
        spread_h * 100.0
    );
    println!("Decimation:  {}x", report.decimation_factor);

    Ok(())
}
