use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::align::{estimate_translation, shift_frame, BoundaryPolicy};
use crate::canvas::{pad_to_canvas, survey_shapes, Canvas};
use crate::consts::{LOW_CONFIDENCE_ERROR, PARALLEL_ROUND_THRESHOLD};
use crate::downsample::{decimate, decimation_factor, rescale};
use crate::error::{RegistrationError, Result};
use crate::frame::{Frame, FrameId, RoundId, Shift};
use crate::grayscale::reduce_to_gray;
use crate::io::{RasterSink, RasterSource};
use crate::report::{DisplacementCollector, DisplacementEntry, DisplacementStatus};
use crate::set::{RegistrationSet, Round};

use super::config::RegistrationConfig;
use super::memory::{plan_workers, MemoryBudget};
use super::types::{
    FrameFailure, NoOpReporter, ProgressReporter, RegistrationOutcome, RegistrationStage,
    RoundRegistration, RoundState,
};

/// Read a frame, reduce it to one channel and pad it to the canvas.
fn load_frame(source: &dyn RasterSource, id: &FrameId, canvas: Canvas) -> Result<Frame> {
    let frame = reduce_to_gray(source.read(id)?);
    let bit_depth = frame.original_bit_depth;
    Ok(Frame::new(pad_to_canvas(frame.data, canvas)?, bit_depth))
}

/// Per-round output of a worker, merged into the run outcome.
struct RoundResult {
    round: RoundId,
    state: RoundState,
    failures: Vec<FrameFailure>,
    written: usize,
}

/// Shared, read-only inputs of every round worker.
struct RoundContext<'a> {
    source: &'a dyn RasterSource,
    sink: &'a dyn RasterSink,
    anchor_small: &'a Array2<f32>,
    canvas: Canvas,
    factor: usize,
    boundary: BoundaryPolicy,
}

impl RoundContext<'_> {
    /// Load, shift and write one frame. Round-local failures are returned as
    /// `Ok(Some(failure))`; anything else aborts the run.
    fn propagate(&self, id: &FrameId, shift: Shift) -> Result<Option<FrameFailure>> {
        let written = load_frame(self.source, id, self.canvas)
            .map(|frame| shift_frame(&frame, shift, self.boundary))
            .and_then(|shifted| self.sink.write(id, &shifted));
        contain(id, written)
    }

    fn register(&self, round: &Round) -> Result<RoundResult> {
        let ref_id = round.reference_id();
        let reference = match load_frame(self.source, &ref_id, self.canvas) {
            Ok(frame) => frame,
            Err(e) if e.is_round_local() => {
                error!(round = %round.id, frame = %ref_id, error = %e, "Failed to read reference frame");
                return Ok(RoundResult {
                    round: round.id.clone(),
                    state: RoundState::Failed(e.to_string()),
                    failures: vec![FrameFailure {
                        frame: ref_id,
                        reason: e.to_string(),
                    }],
                    written: 0,
                });
            }
            Err(e) => return Err(e),
        };

        let moving_small = decimate(&reference.data, self.factor);
        let registration = match estimate_translation(self.anchor_small, &moving_small, self.factor)
        {
            Ok(estimate) => RoundRegistration {
                shift: rescale(estimate.shift, self.factor),
                error: estimate.error,
                phase: estimate.phase,
                low_confidence: false,
            },
            Err(RegistrationError::LowSignal { which }) => {
                warn!(round = %round.id, which, "Uniform reference frame, keeping zero shift");
                RoundRegistration {
                    shift: Shift::zero(),
                    error: LOW_CONFIDENCE_ERROR,
                    phase: 0.0,
                    low_confidence: true,
                }
            }
            Err(e) => return Err(e),
        };
        drop(moving_small);

        info!(
            round = %round.id,
            dy = registration.shift.dy,
            dx = registration.shift.dx,
            error = registration.error,
            phase = registration.phase,
            "Registered round"
        );

        let mut failures = Vec::new();
        let mut written = 0;

        let shifted = shift_frame(&reference, registration.shift, self.boundary);
        drop(reference);
        match contain(&ref_id, self.sink.write(&ref_id, &shifted))? {
            Some(failure) => failures.push(failure),
            None => written += 1,
        }
        drop(shifted);

        // Every marker takes the reference's shift; nothing is re-estimated.
        for id in round.marker_ids() {
            match self.propagate(&id, registration.shift)? {
                Some(failure) => failures.push(failure),
                None => written += 1,
            }
        }

        Ok(RoundResult {
            round: round.id.clone(),
            state: RoundState::Registered(registration),
            failures,
            written,
        })
    }
}

/// Turn round-local errors into a recorded failure.
fn contain(id: &FrameId, result: Result<()>) -> Result<Option<FrameFailure>> {
    match result {
        Ok(()) => Ok(None),
        Err(e) if e.is_round_local() => {
            error!(frame = %id, error = %e, "Frame failed");
            Ok(Some(FrameFailure {
                frame: id.clone(),
                reason: e.to_string(),
            }))
        }
        Err(e) => Err(e),
    }
}

fn displacement_entry(result: &RoundResult) -> Option<DisplacementEntry> {
    match &result.state {
        RoundState::Registered(r) => Some(DisplacementEntry {
            round: result.round.clone(),
            shift: r.shift,
            error: Some(r.error),
            phase: r.phase,
            status: if r.low_confidence {
                DisplacementStatus::LowSignal
            } else {
                DisplacementStatus::Estimated
            },
        }),
        RoundState::Failed(reason) => Some(DisplacementEntry {
            round: result.round.clone(),
            shift: Shift::zero(),
            error: None,
            phase: 0.0,
            status: DisplacementStatus::Failed(reason.clone()),
        }),
        RoundState::Unprocessed | RoundState::Anchored => None,
    }
}

/// Register every round of `set` against the anchor round with a progress
/// reporter and an optional memory ceiling.
///
/// Run-level failures (no anchor, shape scan failure, memory budget, anchor
/// reference unreadable, shape mismatch) abort with an error. Failures of a
/// single round or frame are recorded in the outcome and the run continues.
pub fn register_set_reported(
    set: &RegistrationSet,
    source: &dyn RasterSource,
    sink: &dyn RasterSink,
    config: &RegistrationConfig,
    available_memory: Option<u64>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RegistrationOutcome> {
    let anchor = set.anchor(&config.anchor)?;
    info!(
        rounds = set.round_count(),
        frames = set.frame_count(),
        anchor = %anchor.id,
        policy = %config.anchor,
        "Starting registration"
    );
    if set.round_count() < 2 {
        warn!("Only one round supplied, frames are padded without registration");
    }

    // Header-only scan over the whole set, before any pixel data is read
    reporter.begin_stage(RegistrationStage::Scanning, Some(set.frame_count()));
    let mut shapes = Vec::with_capacity(set.frame_count());
    let mut decode_bytes_per_pixel = 0;
    for (i, id) in set.frame_ids().enumerate() {
        let info = source.info(&id)?;
        shapes.push(info.shape());
        decode_bytes_per_pixel = decode_bytes_per_pixel.max(info.decode_bytes_per_pixel());
        reporter.advance(i + 1);
    }
    let canvas = survey_shapes(shapes)?.canvas;
    reporter.finish_stage();

    let factor = decimation_factor(canvas.max_dimension(), config.downsample_threshold);
    let moving: Vec<&Round> = set.rounds().filter(|r| r.id != anchor.id).collect();
    let budget = available_memory.map(|bytes| MemoryBudget::new(bytes, config.memory_fraction));
    let workers = plan_workers(
        canvas,
        factor,
        rayon::current_num_threads().min(moving.len().max(1)),
        decode_bytes_per_pixel,
        budget,
    )?;
    info!(factor, workers, "Decimation factor");

    // Anchor round: padded, never shifted
    reporter.begin_stage(RegistrationStage::Anchoring, Some(anchor.frame_count()));
    let anchor_ref_id = anchor.reference_id();
    let anchor_ref = load_frame(source, &anchor_ref_id, canvas)?;
    sink.write(&anchor_ref_id, &anchor_ref)?;
    let anchor_small = decimate(&anchor_ref.data, factor);
    drop(anchor_ref);
    reporter.advance(1);

    let mut frame_failures = Vec::new();
    let mut frames_written = 1;
    for (i, id) in anchor.marker_ids().enumerate() {
        let result = load_frame(source, &id, canvas).and_then(|frame| sink.write(&id, &frame));
        match contain(&id, result)? {
            Some(failure) => frame_failures.push(failure),
            None => frames_written += 1,
        }
        reporter.advance(i + 2);
    }
    reporter.finish_stage();

    // Moving rounds: independent of each other
    reporter.begin_stage(RegistrationStage::Registering, Some(moving.len()));
    let ctx = RoundContext {
        source,
        sink,
        anchor_small: &anchor_small,
        canvas,
        factor,
        boundary: config.boundary,
    };
    let collector = DisplacementCollector::new();
    let counter = AtomicUsize::new(0);
    let run_round = |round: &&Round| -> Result<RoundResult> {
        let result = ctx.register(round);
        if let Some(entry) = result.as_ref().ok().and_then(displacement_entry) {
            collector.record(entry);
        }
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.advance(done);
        result
    };
    // At most `workers` rounds are admitted at once: a worker blocked in a
    // nested FFT join may steal another round, but only from its own chunk.
    let mut results: Vec<Result<RoundResult>> = Vec::with_capacity(moving.len());
    if workers > 1 && moving.len() >= PARALLEL_ROUND_THRESHOLD {
        for chunk in moving.chunks(workers) {
            let mut done: Vec<_> = chunk.par_iter().map(run_round).collect();
            results.append(&mut done);
            if results.iter().any(Result::is_err) {
                break;
            }
        }
    } else {
        results.extend(moving.iter().map(run_round));
    }
    let results: Vec<RoundResult> = results.into_iter().collect::<Result<_>>()?;
    reporter.finish_stage();

    reporter.begin_stage(RegistrationStage::Reporting, Some(results.len()));
    let mut states = BTreeMap::new();
    states.insert(anchor.id.clone(), RoundState::Anchored);
    for result in results {
        frame_failures.extend(result.failures);
        frames_written += result.written;
        states.insert(result.round, result.state);
    }
    let report = collector.finish();
    reporter.finish_stage();

    debug_assert!(states.values().all(RoundState::is_terminal));
    info!(
        frames_written,
        failed_frames = frame_failures.len(),
        "Registration complete"
    );

    Ok(RegistrationOutcome {
        canvas,
        anchor: anchor.id.clone(),
        decimation_factor: factor,
        states,
        report,
        frame_failures,
        frames_written,
    })
}

/// Register every round of `set` against the anchor round.
pub fn register_set(
    set: &RegistrationSet,
    source: &dyn RasterSource,
    sink: &dyn RasterSink,
    config: &RegistrationConfig,
) -> Result<RegistrationOutcome> {
    let reporter = Arc::new(NoOpReporter);
    register_set_reported(set, source, sink, config, None, reporter)
}
