// Recommendation context assembly from rankings, the player directory and
// the picks seen so far.

use std::collections::{BTreeSet, HashSet};

use draftwatch_core::draft::pick::{Pick, PlayerId};
use draftwatch_football::players::PlayerDirectory;
use draftwatch_football::rankings::RankedPlayer;
use draftwatch_llm::prompt::{CandidatePlayer, RosterEntry};

const NAME_SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "v"];

/// Lowercase, letters and digits only, generational suffix dropped, so
/// "Brian Thomas Jr." and "brian thomas" compare equal.
pub fn normalize_name(name: &str) -> String {
    let words: Vec<String> = name
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect();
    let end = match words.split_last() {
        Some((last, rest)) if !rest.is_empty() && NAME_SUFFIXES.contains(&last.as_str()) => {
            words.len() - 1
        }
        _ => words.len(),
    };
    words[..end].join(" ")
}

/// Best undrafted players, at most `limit`.
///
/// Rankings are preferred. Drafted players are removed by name through the
/// directory; without a directory the board is used as is. With no rankings
/// the directory's own search rank orders the candidates.
pub fn candidates(
    board: &[RankedPlayer],
    directory: Option<&PlayerDirectory>,
    drafted: &BTreeSet<PlayerId>,
    limit: usize,
) -> Vec<CandidatePlayer> {
    if !board.is_empty() {
        let drafted_names: HashSet<String> = directory
            .map(|dir| {
                drafted
                    .iter()
                    .filter_map(|id| dir.get(id))
                    .map(|p| normalize_name(&p.name))
                    .collect()
            })
            .unwrap_or_default();
        return board
            .iter()
            .filter(|p| !drafted_names.contains(&normalize_name(&p.name)))
            .take(limit)
            .map(|p| CandidatePlayer {
                name: p.name.clone(),
                positions: vec![p.position.clone()],
                team: p.team.clone(),
                rank: p.rank,
            })
            .collect();
    }

    match directory {
        Some(dir) => dir
            .available_players(drafted, None)
            .into_iter()
            .take(limit)
            .map(|p| CandidatePlayer {
                name: p.name.clone(),
                positions: p.positions.clone(),
                team: p.team.clone(),
                rank: p.search_rank,
            })
            .collect(),
        None => Vec::new(),
    }
}

/// Roster lines for the user's picks. Unknown players show their id.
pub fn roster_entries<'a>(
    picks: impl IntoIterator<Item = &'a Pick>,
    directory: Option<&PlayerDirectory>,
) -> Vec<RosterEntry> {
    picks
        .into_iter()
        .map(|pick| {
            let (name, positions) = describe(&pick.player_id, directory);
            RosterEntry {
                pick_number: pick.pick_number,
                round: pick.round,
                name,
                positions,
            }
        })
        .collect()
}

/// Display name and positions for a player id.
pub fn describe(id: &PlayerId, directory: Option<&PlayerDirectory>) -> (String, Vec<String>) {
    match directory.and_then(|dir| dir.get(id)) {
        Some(info) => (info.name.clone(), info.positions.clone()),
        None => (id.to_string(), Vec::new()),
    }
}
