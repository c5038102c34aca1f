// Resolve the user's draft position and roster before polling starts.

use thiserror::Error;

use draftwatch_core::draft::pick::{DraftSlot, RosterId};
use draftwatch_football::client::DraftInfo;

use crate::config::DraftSection;

/// The user's seat in the draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub draft_position: DraftSlot,
    pub roster_id: RosterId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeatError {
    #[error("neither draft_position nor sleeper_user_id is configured")]
    Unconfigured,

    #[error("user {0} is not in the draft order yet; set draft_position explicitly")]
    UserNotInDraftOrder(String),

    #[error("draft position {position} is outside 1..={team_count}")]
    PositionOutOfRange { position: u32, team_count: u32 },

    #[error("no roster is mapped to {0}; set roster_id explicitly")]
    NoRosterForSlot(DraftSlot),
}

/// Explicit settings win. A missing position comes from the draft order for
/// `sleeper_user_id`; a missing roster comes from the slot mapping.
pub fn resolve_seat(draft: &DraftSection, info: &DraftInfo) -> Result<Seat, SeatError> {
    let (slot, order_roster) = match (draft.draft_position, draft.sleeper_user_id.as_deref()) {
        (Some(position), _) => (DraftSlot(position), None),
        (None, Some(user)) => info
            .seat_for_user(user)
            .ok_or_else(|| SeatError::UserNotInDraftOrder(user.to_string()))?,
        (None, None) => return Err(SeatError::Unconfigured),
    };

    if slot.0 == 0 || slot.0 > info.team_count {
        return Err(SeatError::PositionOutOfRange {
            position: slot.0,
            team_count: info.team_count,
        });
    }

    let roster_id = draft
        .roster_id
        .map(RosterId)
        .or(order_roster)
        .or_else(|| info.roster_for_slot(slot))
        .ok_or(SeatError::NoRosterForSlot(slot))?;

    Ok(Seat {
        draft_position: slot,
        roster_id,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use draftwatch_core::draft::pick::DraftId;
    use draftwatch_core::draft::snapshot::DraftStatus;

    use super::*;

    fn info() -> DraftInfo {
        let slot_to_roster: BTreeMap<DraftSlot, RosterId> =
            [(1, 2), (2, 4), (3, 1), (4, 3)].into_iter().map(|(s, r)| (DraftSlot(s), RosterId(r))).collect();
        let draft_order: HashMap<String, DraftSlot> =
            [("u-alice".to_string(), DraftSlot(3))].into_iter().collect();
        DraftInfo {
            draft_id: DraftId::new("D1"),
            league_id: None,
            status: DraftStatus::PreDraft,
            draft_type: Some("snake".into()),
            team_count: 4,
            rounds: Some(3),
            slot_to_roster,
            draft_order,
        }
    }

    fn section(position: Option<u32>, user: Option<&str>, roster: Option<u32>) -> DraftSection {
        DraftSection {
            draft_id: "D1".into(),
            sleeper_user_id: user.map(str::to_string),
            draft_position: position,
            roster_id: roster,
        }
    }

    #[test]
    fn position_with_mapping() {
        let seat = resolve_seat(&section(Some(2), None, None), &info()).unwrap();
        assert_eq!(seat.draft_position, DraftSlot(2));
        assert_eq!(seat.roster_id, RosterId(4));
    }

    #[test]
    fn explicit_roster_wins() {
        let seat = resolve_seat(&section(Some(2), None, Some(9)), &info()).unwrap();
        assert_eq!(seat.roster_id, RosterId(9));
    }

    #[test]
    fn user_id_resolves_through_draft_order() {
        let seat = resolve_seat(&section(None, Some("u-alice"), None), &info()).unwrap();
        assert_eq!(seat.draft_position, DraftSlot(3));
        assert_eq!(seat.roster_id, RosterId(1));
    }

    #[test]
    fn unknown_user_rejected() {
        let err = resolve_seat(&section(None, Some("u-nobody"), None), &info()).unwrap_err();
        assert_eq!(err, SeatError::UserNotInDraftOrder("u-nobody".into()));
    }

    #[test]
    fn position_out_of_range() {
        let err = resolve_seat(&section(Some(5), None, None), &info()).unwrap_err();
        assert_eq!(
            err,
            SeatError::PositionOutOfRange {
                position: 5,
                team_count: 4
            }
        );
    }

    #[test]
    fn missing_mapping_needs_explicit_roster() {
        let mut info = info();
        info.slot_to_roster.clear();
        let err = resolve_seat(&section(Some(2), None, None), &info).unwrap_err();
        assert_eq!(err, SeatError::NoRosterForSlot(DraftSlot(2)));

        let seat = resolve_seat(&section(Some(2), None, Some(4)), &info).unwrap();
        assert_eq!(seat.roster_id, RosterId(4));
    }

    #[test]
    fn nothing_configured() {
        assert_eq!(
            resolve_seat(&section(None, None, None), &info()).unwrap_err(),
            SeatError::Unconfigured
        );
    }
}
