use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use tracing::warn;

use crate::frame::{RoundId, Shift};

/// How a round's displacement entry came about.
#[derive(Clone, Debug, PartialEq)]
pub enum DisplacementStatus {
    /// Shift estimated from the reference channels.
    Estimated,
    /// Reference content was uniform; the round kept a zero shift.
    LowSignal,
    /// The round could not be processed.
    Failed(String),
}

impl fmt::Display for DisplacementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Estimated => write!(f, "ok"),
            Self::LowSignal => write!(f, "low signal"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Displacement record for one non-anchor round.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplacementEntry {
    pub round: RoundId,
    pub shift: Shift,
    /// `None` for failed rounds.
    pub error: Option<f64>,
    pub phase: f64,
    pub status: DisplacementStatus,
}

impl DisplacementEntry {
    pub fn is_flagged(&self) -> bool {
        self.status != DisplacementStatus::Estimated
    }
}

/// Write-once, one-slot-per-round collector fed by concurrent round workers.
#[derive(Debug, Default)]
pub struct DisplacementCollector {
    slots: Mutex<BTreeMap<RoundId, DisplacementEntry>>,
}

impl DisplacementCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry. Returns `false` (and keeps the first entry) if the
    /// round already has one.
    pub fn record(&self, entry: DisplacementEntry) -> bool {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slots.contains_key(&entry.round) {
            warn!(round = %entry.round, "Displacement already recorded, ignoring duplicate");
            return false;
        }
        slots.insert(entry.round.clone(), entry);
        true
    }

    pub fn finish(self) -> DisplacementReport {
        let slots = match self.slots.into_inner() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        DisplacementReport::from_entries(slots.into_values())
    }
}

/// Per-round errors ranked from worst to best.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplacementReport {
    entries: Vec<DisplacementEntry>,
}

impl DisplacementReport {
    /// Rank entries: failed rounds first, then by error descending, ties by round id.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = DisplacementEntry>,
    {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by(|a, b| match (a.error, b.error) {
            (None, None) => a.round.cmp(&b.round),
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(ea), Some(eb)) => eb.total_cmp(&ea).then_with(|| a.round.cmp(&b.round)),
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[DisplacementEntry] {
        &self.entries
    }

    pub fn get(&self, round: &RoundId) -> Option<&DisplacementEntry> {
        self.entries.iter().find(|e| &e.round == round)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &DisplacementEntry> {
        self.entries.iter().filter(|e| e.is_flagged())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
