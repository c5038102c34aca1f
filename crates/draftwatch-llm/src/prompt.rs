// Prompt construction for pick recommendations.
//
// The context is pre-digested (ranked candidates, roster by position, picks
// until the user's turn) so the model spends its tokens on trade-offs.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// Candidates listed in the prompt, best first.
pub const MAX_CANDIDATES: usize = 25;

// ---------------------------------------------------------------------------
// Context types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePlayer {
    pub name: String,
    pub positions: Vec<String>,
    pub team: Option<String>,
    /// Consensus or provider rank, lower is better.
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub pick_number: u32,
    pub round: u32,
    pub name: String,
    pub positions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueSettings {
    pub team_count: u32,
    pub rounds: Option<u32>,
    pub scoring: String,
    pub superflex: bool,
    /// Starting slots, e.g. `QB -> 1`, `FLEX -> 2`.
    pub starters: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationContext {
    pub available_players: Vec<CandidatePlayer>,
    pub user_roster: Vec<RosterEntry>,
    pub picks_until_turn: u32,
    pub next_user_pick: u32,
    pub league_settings: LeagueSettings,
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn system_prompt(settings: &LeagueSettings) -> String {
    let format = if settings.superflex {
        "superflex snake draft (QBs carry premium value)"
    } else {
        "snake draft"
    };
    format!(
        "You are a fantasy football draft advisor for a {}-team {} league with {} scoring.\n\
         \n\
         Recommend which player to take with the user's next pick. Answer with:\n\
         1. PICK: one player, with position and team\n\
         2. BACKUPS: two alternatives in order, in case the pick is taken\n\
         3. WHY: two or three sentences on roster fit and positional scarcity\n\
         \n\
         Consider which players are likely to be gone before the user picks again. \
         Only recommend players from the candidate list. Be concise.",
        settings.team_count, format, settings.scoring
    )
}

/// Returns `(system, user)` prompts for one recommendation request.
pub fn build(context: &RecommendationContext) -> (String, String) {
    (system_prompt(&context.league_settings), user_prompt(context))
}

pub fn user_prompt(context: &RecommendationContext) -> String {
    let mut prompt = String::with_capacity(2048);

    let _ = writeln!(prompt, "## DRAFT POSITION");
    if context.picks_until_turn == 0 {
        let _ = writeln!(prompt, "The user is ON THE CLOCK (pick {}).", context.next_user_pick);
    } else {
        let _ = writeln!(
            prompt,
            "{} picks until the user's turn (pick {}).",
            context.picks_until_turn, context.next_user_pick
        );
    }
    if let Some(rounds) = context.league_settings.rounds {
        let _ = writeln!(prompt, "Draft length: {rounds} rounds.");
    }
    prompt.push('\n');

    let _ = writeln!(prompt, "## STARTING LINEUP");
    if context.league_settings.starters.is_empty() {
        let _ = writeln!(prompt, "(not provided)");
    } else {
        let slots: Vec<String> = context
            .league_settings
            .starters
            .iter()
            .map(|(slot, n)| format!("{slot} x{n}"))
            .collect();
        let _ = writeln!(prompt, "{}", slots.join(", "));
    }
    prompt.push('\n');

    let _ = writeln!(prompt, "## MY ROSTER");
    if context.user_roster.is_empty() {
        let _ = writeln!(prompt, "(no picks yet)");
    } else {
        for entry in &context.user_roster {
            let _ = writeln!(
                prompt,
                "R{} #{} {} ({})",
                entry.round,
                entry.pick_number,
                entry.name,
                entry.positions.join("/")
            );
        }
        let counts = position_counts(&context.user_roster);
        let summary: Vec<String> = counts.iter().map(|(p, n)| format!("{p}: {n}")).collect();
        let _ = writeln!(prompt, "Counts: {}", summary.join(", "));
    }
    prompt.push('\n');

    let _ = writeln!(prompt, "## TOP AVAILABLE");
    if context.available_players.is_empty() {
        let _ = writeln!(prompt, "(no candidate data)");
    }
    for player in context.available_players.iter().take(MAX_CANDIDATES) {
        let _ = writeln!(
            prompt,
            "{}. {} ({}) {}",
            player.rank,
            player.name,
            player.positions.join("/"),
            player.team.as_deref().unwrap_or("FA")
        );
    }

    prompt
}

/// Primary position counts for a roster.
fn position_counts(roster: &[RosterEntry]) -> BTreeMap<&str, u32> {
    let mut counts = BTreeMap::new();
    for entry in roster {
        if let Some(primary) = entry.positions.first() {
            *counts.entry(primary.as_str()).or_insert(0) += 1;
        }
    }
    counts
}
