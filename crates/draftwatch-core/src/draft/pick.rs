// Individual pick representation and the identifiers it carries.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::snake;

/// Provider identifier of a draft (Sleeper uses long numeric strings).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub String);

impl DraftId {
    pub fn new(id: impl Into<String>) -> Self {
        DraftId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque player identifier. Never reused within one draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Roster (team) identifier as reported by the provider.
///
/// This is NOT the team's position in the draft order. Keeper leagues and
/// traded draft positions routinely make the two differ, so any conversion
/// between them goes through an explicit slot mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RosterId(pub u32);

impl fmt::Display for RosterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 1-indexed position in the round-1 draft order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftSlot(pub u32);

impl fmt::Display for DraftSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// One completed draft selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    /// 1-based overall pick number, unique within a draft.
    pub pick_number: u32,
    /// 1-based round, informational.
    pub round: u32,
    /// Draft slot that was on the clock for this pick, informational.
    pub roster_slot: DraftSlot,
    /// Roster that made the pick.
    pub drafted_by: RosterId,
    /// Player selected.
    pub player_id: PlayerId,
}

impl Pick {
    /// Whether `round` and `roster_slot` agree with snake arithmetic for
    /// `team_count` teams.
    pub fn is_consistent(&self, team_count: u32) -> bool {
        team_count > 0
            && self.pick_number > 0
            && snake::round_for_pick(self.pick_number, team_count) == self.round
            && snake::slot_for_pick(self.pick_number, team_count) == self.roster_slot
    }
}

impl fmt::Display for Pick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pick {} (R{}, {}): {} by roster {}",
            self.pick_number, self.round, self.roster_slot, self.player_id, self.drafted_by
        )
    }
}
