use std::collections::BTreeMap;

use crate::canvas::Canvas;
use crate::frame::{FrameId, RoundId, Shift};
use crate::report::DisplacementReport;

/// Registration stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationStage {
    Scanning,
    Anchoring,
    Registering,
    Reporting,
}

impl std::fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scanning => write!(f, "Scanning frame shapes"),
            Self::Anchoring => write!(f, "Writing anchor round"),
            Self::Registering => write!(f, "Registering rounds"),
            Self::Reporting => write!(f, "Ranking displacements"),
        }
    }
}

/// Shift and diagnostics recorded for a registered round.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoundRegistration {
    /// Full-resolution shift applied to every frame of the round.
    pub shift: Shift,
    pub error: f64,
    pub phase: f64,
    /// Estimation degraded to a zero shift.
    pub low_confidence: bool,
}

/// Lifecycle of a round within one run.
///
/// `Unprocessed -> Registered | Failed`; the anchor is `Anchored` from the
/// start and never transitions.
#[derive(Clone, Debug, PartialEq)]
pub enum RoundState {
    Unprocessed,
    Anchored,
    Registered(RoundRegistration),
    Failed(String),
}

impl RoundState {
    /// Shift applied to the round's frames, if any was.
    pub fn shift(&self) -> Option<Shift> {
        match self {
            Self::Anchored => Some(Shift::zero()),
            Self::Registered(r) => Some(r.shift),
            Self::Unprocessed | Self::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unprocessed)
    }
}

/// A single frame that could not be read or written.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameFailure {
    pub frame: FrameId,
    pub reason: String,
}

/// Everything a completed run produced besides the written frames.
#[derive(Clone, Debug)]
pub struct RegistrationOutcome {
    pub canvas: Canvas,
    pub anchor: RoundId,
    pub decimation_factor: usize,
    pub states: BTreeMap<RoundId, RoundState>,
    pub report: DisplacementReport,
    pub frame_failures: Vec<FrameFailure>,
    pub frames_written: usize,
}

/// Thread-safe progress reporting for a registration run.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (frames or rounds), if known.
    fn begin_stage(&self, _stage: RegistrationStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when `register_set` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
