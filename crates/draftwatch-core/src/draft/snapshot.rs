// Immutable draft snapshot as observed at one point in time.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pick::{DraftSlot, Pick, PlayerId, RosterId};

/// Provider-reported lifecycle of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    PreDraft,
    Drafting,
    Paused,
    Complete,
}

impl DraftStatus {
    /// Parse a Sleeper-style status string. Unknown values return `None`.
    pub fn from_provider(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pre_draft" => Some(DraftStatus::PreDraft),
            "drafting" => Some(DraftStatus::Drafting),
            "paused" => Some(DraftStatus::Paused),
            "complete" => Some(DraftStatus::Complete),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == DraftStatus::Complete
    }
}

/// Structural problems found while assembling a snapshot. A snapshot that
/// fails these checks never reaches the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("team count must be greater than 0")]
    ZeroTeams,

    #[error("pick at position {index} has pick_number {found}, expected {expected}")]
    NonContiguous {
        index: usize,
        expected: u32,
        found: u32,
    },

    #[error("player {player_id} drafted more than once")]
    DuplicatePlayer { player_id: PlayerId },

    #[error("player {player_id} is both drafted and available")]
    DraftedPlayerAvailable { player_id: PlayerId },
}

/// Picks made so far plus the players still undrafted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub status: DraftStatus,
    /// Number of teams the provider reports for this draft.
    pub team_count: u32,
    /// Rounds configured for the draft, when known.
    pub rounds: Option<u32>,
    /// Draft slot -> roster mapping, when the provider exposes one.
    pub slot_to_roster: Option<BTreeMap<DraftSlot, RosterId>>,
    /// Picks in ascending pick_number order (1-based, contiguous).
    pick_sequence: Vec<Pick>,
    /// Players not present in `pick_sequence`.
    available_player_ids: BTreeSet<PlayerId>,
}

impl DraftSnapshot {
    /// Assemble a snapshot, sorting picks by pick number and checking the
    /// structural invariants.
    pub fn new(
        status: DraftStatus,
        team_count: u32,
        mut pick_sequence: Vec<Pick>,
        available_player_ids: BTreeSet<PlayerId>,
    ) -> Result<Self, SnapshotError> {
        if team_count == 0 {
            return Err(SnapshotError::ZeroTeams);
        }

        pick_sequence.sort_by_key(|p| p.pick_number);

        let mut drafted: HashSet<&PlayerId> = HashSet::with_capacity(pick_sequence.len());
        for (index, pick) in pick_sequence.iter().enumerate() {
            let expected = index as u32 + 1;
            if pick.pick_number != expected {
                return Err(SnapshotError::NonContiguous {
                    index,
                    expected,
                    found: pick.pick_number,
                });
            }
            if !drafted.insert(&pick.player_id) {
                return Err(SnapshotError::DuplicatePlayer {
                    player_id: pick.player_id.clone(),
                });
            }
        }

        if let Some(overlap) = available_player_ids.iter().find(|id| drafted.contains(id)) {
            return Err(SnapshotError::DraftedPlayerAvailable {
                player_id: overlap.clone(),
            });
        }

        Ok(DraftSnapshot {
            status,
            team_count,
            rounds: None,
            slot_to_roster: None,
            pick_sequence,
            available_player_ids,
        })
    }

    /// Empty pre-draft snapshot used as the tracker's initial baseline.
    pub fn empty(team_count: u32) -> Self {
        DraftSnapshot {
            status: DraftStatus::PreDraft,
            team_count,
            rounds: None,
            slot_to_roster: None,
            pick_sequence: Vec::new(),
            available_player_ids: BTreeSet::new(),
        }
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds);
        self
    }

    pub fn with_slot_mapping(mut self, mapping: BTreeMap<DraftSlot, RosterId>) -> Self {
        self.slot_to_roster = Some(mapping);
        self
    }

    pub fn pick_sequence(&self) -> &[Pick] {
        &self.pick_sequence
    }

    pub fn available_player_ids(&self) -> &BTreeSet<PlayerId> {
        &self.available_player_ids
    }

    pub fn picks_made(&self) -> u32 {
        self.pick_sequence.len() as u32
    }

    /// Total picks in the draft, when the round count is known.
    pub fn total_picks(&self) -> Option<u32> {
        self.rounds.map(|r| r * self.team_count)
    }

    /// Roster assigned to `slot` by the provider's mapping, if any.
    pub fn roster_for_slot(&self, slot: DraftSlot) -> Option<RosterId> {
        self.slot_to_roster.as_ref().and_then(|m| m.get(&slot).copied())
    }

    /// Draft slot held by `roster` according to the provider's mapping.
    pub fn slot_for_roster(&self, roster: RosterId) -> Option<DraftSlot> {
        self.slot_to_roster
            .as_ref()
            .and_then(|m| m.iter().find(|(_, r)| **r == roster).map(|(s, _)| *s))
    }
}
