// Snake-draft turn arithmetic.
//
// Rounds and slots are 1-indexed. Odd rounds run slot 1..=T, even rounds run
// slot T..=1. All functions assume `team_count > 0`; callers validate that at
// construction time.

use super::pick::DraftSlot;

/// Round (1-based) containing overall pick `pick_number`.
pub fn round_for_pick(pick_number: u32, team_count: u32) -> u32 {
    (pick_number.saturating_sub(1)) / team_count + 1
}

/// Draft slot that is on the clock for overall pick `pick_number`.
pub fn slot_for_pick(pick_number: u32, team_count: u32) -> DraftSlot {
    let idx = (pick_number.saturating_sub(1)) % team_count;
    if round_for_pick(pick_number, team_count) % 2 == 1 {
        DraftSlot(idx + 1)
    } else {
        DraftSlot(team_count - idx)
    }
}

/// Overall pick number owned by `slot` in `round`.
pub fn user_pick_in_round(round: u32, team_count: u32, slot: DraftSlot) -> u32 {
    let base = (round - 1) * team_count;
    if round % 2 == 1 {
        base + slot.0
    } else {
        base + (team_count - slot.0 + 1)
    }
}

/// Smallest pick number owned by `slot` that is strictly greater than
/// `picks_made`, i.e. the user's next pick once `picks_made` picks are in.
pub fn next_user_pick(picks_made: u32, team_count: u32, slot: DraftSlot) -> u32 {
    // Round that contains the next pick to be made.
    let round = picks_made / team_count + 1;
    let in_round = user_pick_in_round(round, team_count, slot);
    if in_round > picks_made {
        in_round
    } else {
        user_pick_in_round(round + 1, team_count, slot)
    }
}

/// Picks other teams will make before `slot` is on the clock. Zero means the
/// user is on the clock now.
pub fn picks_until_user_turn(picks_made: u32, team_count: u32, slot: DraftSlot) -> u32 {
    next_user_pick(picks_made, team_count, slot) - picks_made - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEAMS: u32 = 12;
    const SEVENTH: DraftSlot = DraftSlot(7);

    #[test]
    fn round_boundaries() {
        assert_eq!(round_for_pick(1, TEAMS), 1);
        assert_eq!(round_for_pick(12, TEAMS), 1);
        assert_eq!(round_for_pick(13, TEAMS), 2);
        assert_eq!(round_for_pick(24, TEAMS), 2);
        assert_eq!(round_for_pick(25, TEAMS), 3);
    }

    #[test]
    fn slots_reverse_on_even_rounds() {
        assert_eq!(slot_for_pick(1, TEAMS), DraftSlot(1));
        assert_eq!(slot_for_pick(12, TEAMS), DraftSlot(12));
        assert_eq!(slot_for_pick(13, TEAMS), DraftSlot(12));
        assert_eq!(slot_for_pick(24, TEAMS), DraftSlot(1));
        assert_eq!(slot_for_pick(25, TEAMS), DraftSlot(1));
    }

    #[test]
    fn seventh_slot_owns_7_18_31() {
        assert_eq!(user_pick_in_round(1, TEAMS, SEVENTH), 7);
        assert_eq!(user_pick_in_round(2, TEAMS, SEVENTH), 18);
        assert_eq!(user_pick_in_round(3, TEAMS, SEVENTH), 31);
        for pick in [7, 18, 31] {
            assert_eq!(slot_for_pick(pick, TEAMS), SEVENTH);
        }
    }

    #[test]
    fn next_pick_before_any_picks() {
        assert_eq!(next_user_pick(0, TEAMS, SEVENTH), 7);
        assert_eq!(picks_until_user_turn(0, TEAMS, SEVENTH), 6);
    }

    #[test]
    fn on_the_clock_after_six_picks() {
        assert_eq!(next_user_pick(6, TEAMS, SEVENTH), 7);
        assert_eq!(picks_until_user_turn(6, TEAMS, SEVENTH), 0);
    }

    #[test]
    fn after_own_pick_next_is_round_two_reverse() {
        assert_eq!(next_user_pick(7, TEAMS, SEVENTH), 18);
        assert_eq!(picks_until_user_turn(7, TEAMS, SEVENTH), 10);
    }

    #[test]
    fn after_full_round_one() {
        assert_eq!(next_user_pick(12, TEAMS, SEVENTH), 18);
        assert_eq!(picks_until_user_turn(12, TEAMS, SEVENTH), 5);
    }

    #[test]
    fn turn_slots_pick_back_to_back() {
        // Slot 12 picks 12 and 13; after pick 12 it is on the clock again.
        let last = DraftSlot(TEAMS);
        assert_eq!(next_user_pick(11, TEAMS, last), 12);
        assert_eq!(next_user_pick(12, TEAMS, last), 13);
        assert_eq!(picks_until_user_turn(12, TEAMS, last), 0);
    }

    #[test]
    fn single_team_draft_always_on_clock() {
        let only = DraftSlot(1);
        for made in 0..5 {
            assert_eq!(picks_until_user_turn(made, 1, only), 0);
        }
    }

    #[test]
    fn next_pick_always_belongs_to_slot() {
        for teams in 1..=14u32 {
            for slot in 1..=teams {
                for made in 0..(teams * 4) {
                    let next = next_user_pick(made, teams, DraftSlot(slot));
                    assert!(next > made);
                    assert_eq!(slot_for_pick(next, teams), DraftSlot(slot));
                    // No earlier pick after `made` belongs to the slot.
                    for earlier in (made + 1)..next {
                        assert_ne!(slot_for_pick(earlier, teams), DraftSlot(slot));
                    }
                }
            }
        }
    }
}
