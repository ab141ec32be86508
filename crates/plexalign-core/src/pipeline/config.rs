use std::fmt;

use serde::{Deserialize, Serialize};

use crate::align::BoundaryPolicy;
use crate::consts::{DEFAULT_DOWNSAMPLE_THRESHOLD, DEFAULT_MEMORY_FRACTION};
use crate::frame::RoundId;

/// Which round is the fixed registration target.
///
/// Rounds are ordered by [`RoundId`]'s natural ordering, so the choice never
/// depends on file enumeration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorPolicy {
    /// Lowest round id.
    #[default]
    First,
    /// Highest round id.
    Last,
    /// A specific round.
    Round(RoundId),
}

impl fmt::Display for AnchorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "First round"),
            Self::Last => write!(f, "Last round"),
            Self::Round(id) => write!(f, "Round {}", id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub anchor: AnchorPolicy,
    pub boundary: BoundaryPolicy,
    /// Long-axis pixels per step of the decimation factor.
    pub downsample_threshold: usize,
    /// Fraction of available memory the run may plan to use (0.0..=1.0).
    pub memory_fraction: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            anchor: AnchorPolicy::default(),
            boundary: BoundaryPolicy::default(),
            downsample_threshold: DEFAULT_DOWNSAMPLE_THRESHOLD,
            memory_fraction: DEFAULT_MEMORY_FRACTION,
        }
    }
}
