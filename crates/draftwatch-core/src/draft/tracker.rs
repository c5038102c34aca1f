// Draft state tracker: turns successive snapshots into deltas.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::pick::{DraftSlot, Pick, RosterId};
use super::snake;
use super::snapshot::{DraftSnapshot, DraftStatus, SnapshotError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// A new snapshot contradicts what the tracker has already observed. These
/// are never retried: proceeding would compute the wrong "whose turn" answer.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum StateInconsistency {
    #[error("provider reports {found} picks, fewer than the {known} already observed")]
    PicksRemoved { known: u32, found: u32 },

    #[error("pick {pick_number} no longer matches the previously observed pick")]
    PrefixChanged { pick_number: u32 },

    #[error("provider reports {reported} teams but the draft was configured with {configured}")]
    TeamCountChanged { configured: u32, reported: u32 },

    #[error("{slot} now belongs to roster {found}, expected roster {expected}")]
    SlotReassigned {
        slot: DraftSlot,
        expected: RosterId,
        found: RosterId,
    },
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Fixed facts about the team being tracked. Set once, never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub user_roster_id: RosterId,
    pub user_draft_position: DraftSlot,
    pub team_count: u32,
}

/// What changed between the previous snapshot and the latest one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftDelta {
    /// Picks absent from the previous snapshot, ascending by pick number.
    pub new_picks: Vec<Pick>,
    /// Total picks made as of this snapshot.
    pub picks_made: u32,
    /// The next pick belongs to the user.
    pub is_users_turn: bool,
    /// The user went on the clock with this snapshot (edge-triggered).
    pub became_users_turn: bool,
    /// Picks other teams make before the user is on the clock.
    pub picks_until_user_turn: u32,
    /// Overall number of the user's next pick.
    pub next_user_pick: u32,
    pub status: DraftStatus,
}

impl DraftDelta {
    /// Whether this delta is worth delivering to the caller.
    pub fn is_notable(&self) -> bool {
        !self.new_picks.is_empty() || self.became_users_turn
    }
}

// ---------------------------------------------------------------------------
// DraftTracker
// ---------------------------------------------------------------------------

/// Owns the last observed snapshot for one draft. Only the watcher that owns
/// the tracker calls [`DraftTracker::apply`].
#[derive(Debug, Clone)]
pub struct DraftTracker {
    config: TrackerConfig,
    last_snapshot: DraftSnapshot,
    was_users_turn: bool,
}

impl DraftTracker {
    pub fn new(config: TrackerConfig) -> Self {
        DraftTracker {
            config,
            last_snapshot: DraftSnapshot::empty(config.team_count),
            was_users_turn: false,
        }
    }

    /// Seed the baseline from previously persisted picks so the first live
    /// poll only reports picks made since.
    pub fn resume(&mut self, picks: Vec<Pick>) -> Result<(), SnapshotError> {
        let snapshot = DraftSnapshot::new(
            DraftStatus::Drafting,
            self.config.team_count,
            picks,
            Default::default(),
        )?;
        debug!(picks = snapshot.picks_made(), "tracker resumed from stored picks");
        self.last_snapshot = snapshot;
        self.was_users_turn = false;
        Ok(())
    }

    /// Diff `snapshot` against the last observed one.
    ///
    /// On error the baseline is left untouched so the next poll re-diffs
    /// against the last known-good snapshot.
    pub fn apply(&mut self, snapshot: DraftSnapshot) -> Result<DraftDelta, StateInconsistency> {
        self.check_consistency(&snapshot)?;

        let known = self.last_snapshot.pick_sequence().len();
        let new_picks = snapshot.pick_sequence()[known..].to_vec();

        let picks_made = snapshot.picks_made();
        let team_count = self.config.team_count;
        let slot = self.config.user_draft_position;
        let next_user_pick = snake::next_user_pick(picks_made, team_count, slot);
        let picks_until_user_turn = snake::picks_until_user_turn(picks_made, team_count, slot);

        let has_picks_left = snapshot
            .total_picks()
            .map_or(true, |total| next_user_pick <= total);
        let is_users_turn =
            picks_until_user_turn == 0 && has_picks_left && !snapshot.status.is_terminal();
        let became_users_turn = is_users_turn && (!self.was_users_turn || !new_picks.is_empty());

        let delta = DraftDelta {
            new_picks,
            picks_made,
            is_users_turn,
            became_users_turn,
            picks_until_user_turn,
            next_user_pick,
            status: snapshot.status,
        };

        debug!(
            new = delta.new_picks.len(),
            picks_made,
            picks_until_user_turn,
            is_users_turn,
            "snapshot applied"
        );

        self.last_snapshot = snapshot;
        self.was_users_turn = is_users_turn;
        Ok(delta)
    }

    fn check_consistency(&self, snapshot: &DraftSnapshot) -> Result<(), StateInconsistency> {
        if snapshot.team_count != self.config.team_count {
            return Err(StateInconsistency::TeamCountChanged {
                configured: self.config.team_count,
                reported: snapshot.team_count,
            });
        }

        let slot = self.config.user_draft_position;
        if let Some(found) = snapshot.roster_for_slot(slot) {
            if found != self.config.user_roster_id {
                return Err(StateInconsistency::SlotReassigned {
                    slot,
                    expected: self.config.user_roster_id,
                    found,
                });
            }
        }

        let previous = self.last_snapshot.pick_sequence();
        let current = snapshot.pick_sequence();
        if current.len() < previous.len() {
            return Err(StateInconsistency::PicksRemoved {
                known: previous.len() as u32,
                found: current.len() as u32,
            });
        }

        // Linear in the draft so far, not the delta: a rewritten pick deep in
        // the prefix must still be caught.
        if let Some(changed) = previous.iter().zip(current).find(|(old, new)| old != new) {
            return Err(StateInconsistency::PrefixChanged {
                pick_number: changed.0.pick_number,
            });
        }

        Ok(())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn last_snapshot(&self) -> &DraftSnapshot {
        &self.last_snapshot
    }

    pub fn picks_made(&self) -> u32 {
        self.last_snapshot.picks_made()
    }

    /// Picks until the user's turn as of the last observed snapshot.
    pub fn picks_until_user_turn(&self) -> u32 {
        snake::picks_until_user_turn(
            self.picks_made(),
            self.config.team_count,
            self.config.user_draft_position,
        )
    }

    /// Picks made by the tracked roster, in draft order.
    pub fn user_roster(&self) -> Vec<&Pick> {
        self.last_snapshot
            .pick_sequence()
            .iter()
            .filter(|p| p.drafted_by == self.config.user_roster_id)
            .collect()
    }
}
