use std::collections::BTreeMap;

use crate::error::{RegistrationError, Result};
use crate::frame::{FrameId, RoundId};
use crate::pipeline::config::AnchorPolicy;

/// Typed identity of one input raster, as produced by a layout parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub round: RoundId,
    pub marker: String,
    pub is_reference: bool,
}

impl FrameDescriptor {
    pub fn new(round: impl Into<RoundId>, marker: impl Into<String>, is_reference: bool) -> Self {
        Self {
            round: round.into(),
            marker: marker.into(),
            is_reference,
        }
    }

    pub fn frame_id(&self) -> FrameId {
        FrameId::new(self.round.clone(), self.marker.clone())
    }
}

/// One imaging round: a reference channel plus marker channels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Round {
    pub id: RoundId,
    pub reference: String,
    /// Non-reference markers, sorted by name.
    pub markers: Vec<String>,
}

impl Round {
    pub fn reference_id(&self) -> FrameId {
        FrameId::new(self.id.clone(), self.reference.clone())
    }

    pub fn marker_ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.markers
            .iter()
            .map(move |m| FrameId::new(self.id.clone(), m.clone()))
    }

    /// Reference first, then markers.
    pub fn frame_ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        std::iter::once(self.reference_id()).chain(self.marker_ids())
    }

    pub fn frame_count(&self) -> usize {
        self.markers.len() + 1
    }
}

/// All rounds of one run, keyed and ordered by round id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationSet {
    rounds: BTreeMap<RoundId, Round>,
}

#[derive(Default)]
struct RoundBuilder {
    references: Vec<String>,
    markers: Vec<String>,
}

impl RegistrationSet {
    /// Group descriptors into rounds.
    ///
    /// Fails if there are no frames, if any round does not have exactly one
    /// reference channel, or if a (round, marker) pair appears twice.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = FrameDescriptor>,
    {
        let mut builders: BTreeMap<RoundId, RoundBuilder> = BTreeMap::new();
        for d in descriptors {
            let builder = builders.entry(d.round.clone()).or_default();
            let exists = builder.references.contains(&d.marker) || builder.markers.contains(&d.marker);
            if exists {
                return Err(RegistrationError::DuplicateFrame(d.frame_id().to_string()));
            }
            if d.is_reference {
                builder.references.push(d.marker);
            } else {
                builder.markers.push(d.marker);
            }
        }

        if builders.is_empty() {
            return Err(RegistrationError::EmptyInput("no frames supplied".into()));
        }

        let reference_count: usize = builders.values().map(|b| b.references.len()).sum();
        if builders.values().any(|b| b.references.len() != 1) {
            return Err(RegistrationError::EmptyInput(format!(
                "{} reference frames for {} rounds",
                reference_count,
                builders.len()
            )));
        }

        let rounds = builders
            .into_iter()
            .map(|(id, mut b)| {
                b.markers.sort();
                let reference = b.references.remove(0);
                let round = Round {
                    id: id.clone(),
                    reference,
                    markers: b.markers,
                };
                (id, round)
            })
            .collect();

        Ok(Self { rounds })
    }

    pub fn rounds(&self) -> impl Iterator<Item = &Round> {
        self.rounds.values()
    }

    pub fn round(&self, id: &RoundId) -> Option<&Round> {
        self.rounds.get(id)
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn frame_count(&self) -> usize {
        self.rounds.values().map(Round::frame_count).sum()
    }

    /// Every frame in round order, reference first within each round.
    pub fn frame_ids(&self) -> impl Iterator<Item = FrameId> + '_ {
        self.rounds.values().flat_map(|r| r.frame_ids())
    }

    /// Resolve the anchor round for the given policy.
    pub fn anchor(&self, policy: &AnchorPolicy) -> Result<&Round> {
        let found = match policy {
            AnchorPolicy::First => self.rounds.values().next(),
            AnchorPolicy::Last => self.rounds.values().next_back(),
            AnchorPolicy::Round(id) => self.rounds.get(id),
        };
        found.ok_or_else(|| match policy {
            AnchorPolicy::Round(id) => RegistrationError::AnchorNotFound(id.to_string()),
            _ => RegistrationError::EmptyInput("no rounds to anchor".into()),
        })
    }
}
