// Application state and the main event loop.
//
// Draft events from the watcher and streamed recommendation events meet
// here. The loop keeps the last known draft position and the user's roster,
// persists new picks, requests recommendations ahead of the user's turn and
// pushes plain-text updates to the output task.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use draftwatch_core::draft::pick::{DraftId, DraftSlot, Pick, PlayerId, RosterId};
use draftwatch_core::draft::snake;
use draftwatch_core::draft::snapshot::DraftStatus;
use draftwatch_core::draft::tracker::DraftDelta;
use draftwatch_core::protocol::DraftEvent;
use draftwatch_football::client::SleeperClient;
use draftwatch_football::players::PlayerDirectory;
use draftwatch_football::rankings::{
    RankedPlayer, RankingsBook, RankingsQuery, RankingsSource, RankingsTier, Sourced,
};
use draftwatch_llm::client::LlmEvent;
use draftwatch_llm::prompt::{LeagueSettings, RecommendationContext, MAX_CANDIDATES};
use draftwatch_llm::recommend::{Recommendation, Recommender};

use crate::context;
use crate::db::Database;

/// Rankings as last published by the refresh task.
pub type RankingsBoard = Sourced<Arc<Vec<RankedPlayer>>>;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Lines pushed to the output task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    /// Draft position and roster. Always available.
    Status(String),
    /// Finished (or degraded) recommendation text.
    Recommendation(String),
    /// One-off messages: picks seen, on the clock, draft over.
    Notice(String),
}

/// Why the event loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    DraftComplete,
    Faulted,
    Interrupted,
    WatcherClosed,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Fixed facts about the draft being watched.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub draft_id: DraftId,
    pub user_roster_id: RosterId,
    pub user_draft_position: DraftSlot,
    pub league: LeagueSettings,
    /// Picks-until-turn threshold for the early recommendation. 0 disables it.
    pub prefire_at: u32,
}

pub struct AppState {
    pub settings: AppSettings,
    pub db: Database,
    /// Player directory source, when one is configured.
    players: Option<SleeperClient>,
    rankings: watch::Receiver<RankingsBoard>,
    recommender: Recommender,
    pub recommendation: Recommendation,
    /// Every pick seen, in draft order.
    pub picks: Vec<Pick>,
    pub status: Option<DraftStatus>,
    pub is_users_turn: bool,
    /// Set when the watcher reports a final event.
    pub final_message: Option<String>,
    prefired_for: Option<u32>,
    on_clock_for: Option<u32>,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        db: Database,
        players: Option<SleeperClient>,
        rankings: watch::Receiver<RankingsBoard>,
        recommender: Recommender,
    ) -> Self {
        AppState {
            settings,
            db,
            players,
            rankings,
            recommender,
            recommendation: Recommendation::Idle,
            picks: Vec::new(),
            status: None,
            is_users_turn: false,
            final_message: None,
            prefired_for: None,
            on_clock_for: None,
        }
    }

    /// Adopt picks restored from the database.
    pub fn restore(&mut self, picks: Vec<Pick>) {
        info!(count = picks.len(), "restored picks from database");
        self.picks = picks;
    }

    pub fn picks_made(&self) -> u32 {
        self.picks.len() as u32
    }

    pub fn next_user_pick(&self) -> u32 {
        snake::next_user_pick(
            self.picks_made(),
            self.settings.league.team_count,
            self.settings.user_draft_position,
        )
    }

    pub fn picks_until_user_turn(&self) -> u32 {
        snake::picks_until_user_turn(
            self.picks_made(),
            self.settings.league.team_count,
            self.settings.user_draft_position,
        )
    }

    pub fn user_picks(&self) -> impl Iterator<Item = &Pick> {
        let roster = self.settings.user_roster_id;
        self.picks.iter().filter(move |p| p.drafted_by == roster)
    }

    fn directory(&self) -> Option<Arc<PlayerDirectory>> {
        self.players.as_ref().and_then(SleeperClient::player_directory)
    }

    /// Position and roster summary. Never depends on recommendations.
    pub fn status_line(&self) -> String {
        let position = if self.final_message.is_some() || self.status == Some(DraftStatus::Complete) {
            format!("{} picks made, draft over", self.picks_made())
        } else if self.is_users_turn {
            format!(
                "{} picks made | ON THE CLOCK (pick {})",
                self.picks_made(),
                self.next_user_pick()
            )
        } else {
            format!(
                "{} picks made | {} until your turn (pick {})",
                self.picks_made(),
                self.picks_until_user_turn(),
                self.next_user_pick()
            )
        };

        let directory = self.directory();
        let entries = context::roster_entries(self.user_picks(), directory.as_deref());
        let roster = if entries.is_empty() {
            "roster: (empty)".to_string()
        } else {
            let names: Vec<String> = entries
                .iter()
                .map(|e| match e.positions.first() {
                    Some(pos) => format!("{} ({pos})", e.name),
                    None => e.name.clone(),
                })
                .collect();
            format!("roster: {}", names.join(", "))
        };
        format!("{position} | {roster}")
    }

    pub fn recommendation_line(&self) -> String {
        format!("recommendation: {}", self.recommendation.text())
    }

    /// Assemble the context for a recommendation from the current state.
    pub fn recommendation_context(&self) -> RecommendationContext {
        let directory = self.directory();
        let drafted: BTreeSet<PlayerId> = self.picks.iter().map(|p| p.player_id.clone()).collect();
        let board = self.rankings.borrow().value.clone();
        RecommendationContext {
            available_players: context::candidates(
                &board,
                directory.as_deref(),
                &drafted,
                MAX_CANDIDATES,
            ),
            user_roster: context::roster_entries(self.user_picks(), directory.as_deref()),
            picks_until_turn: self.picks_until_user_turn(),
            next_user_pick: self.next_user_pick(),
            league_settings: self.settings.league.clone(),
        }
    }

    /// Ask for a recommendation for the upcoming user pick.
    pub fn request_recommendation(&mut self) -> u64 {
        let ctx = self.recommendation_context();
        self.recommendation = Recommendation::Pending;
        self.recommender.request(&ctx)
    }

    pub fn recommendation_generation(&self) -> u64 {
        self.recommender.generation()
    }

    /// Fold a delta into the state and persist its picks. Returns the
    /// updates to show.
    pub fn apply_delta(&mut self, delta: DraftDelta) -> Vec<UiUpdate> {
        let mut updates = Vec::new();

        if !delta.new_picks.is_empty() {
            match self.db.record_picks(&self.settings.draft_id, &delta.new_picks) {
                Ok(added) => debug!(added, "picks persisted"),
                Err(e) => warn!(error = %e, "failed to persist picks"),
            }
            let directory = self.directory();
            for pick in &delta.new_picks {
                let (name, _) = context::describe(&pick.player_id, directory.as_deref());
                let who = if pick.drafted_by == self.settings.user_roster_id {
                    "you".to_string()
                } else {
                    format!("roster {}", pick.drafted_by.0)
                };
                updates.push(UiUpdate::Notice(format!(
                    "pick {} (R{}): {name} to {who}",
                    pick.pick_number, pick.round
                )));
            }
        }

        // Picks are already contiguous and validated by the tracker; extend
        // from where the local copy ends so a resumed list does not repeat.
        let known = self.picks_made();
        self.picks.extend(
            delta
                .new_picks
                .iter()
                .filter(|p| p.pick_number > known)
                .cloned(),
        );
        if self.picks_made() != delta.picks_made {
            warn!(
                local = self.picks_made(),
                reported = delta.picks_made,
                "local pick list out of step with watcher"
            );
        }

        self.status = Some(delta.status);
        self.is_users_turn = delta.is_users_turn;
        if let Err(e) = self
            .db
            .save_progress(&self.settings.draft_id, delta.status, delta.picks_made)
        {
            warn!(error = %e, "failed to persist draft progress");
        }

        if delta.became_users_turn {
            updates.push(UiUpdate::Notice(format!(
                "you are on the clock (pick {})",
                delta.next_user_pick
            )));
            if self.on_clock_for != Some(delta.next_user_pick) {
                self.on_clock_for = Some(delta.next_user_pick);
                self.request_recommendation();
            }
        } else if self.should_prefire(&delta) {
            self.prefired_for = Some(delta.next_user_pick);
            self.request_recommendation();
        }

        updates.push(UiUpdate::Status(self.status_line()));
        updates
    }

    /// The early request fires once per user pick, the first time the
    /// remaining picks drop to the threshold or below.
    fn should_prefire(&self, delta: &DraftDelta) -> bool {
        let threshold = self.settings.prefire_at;
        threshold > 0
            && !delta.is_users_turn
            && delta.status == DraftStatus::Drafting
            && delta.picks_until_user_turn > 0
            && delta.picks_until_user_turn <= threshold
            && self.prefired_for != Some(delta.next_user_pick)
    }

    /// Handle one watcher event. Returns the updates and, for final events,
    /// the outcome.
    pub fn handle_draft_event(&mut self, event: DraftEvent) -> (Vec<UiUpdate>, Option<RunOutcome>) {
        match event {
            DraftEvent::Delta(delta) => (self.apply_delta(delta), None),
            DraftEvent::DraftComplete { total_picks } => {
                info!(total_picks, "draft complete");
                self.status = Some(DraftStatus::Complete);
                self.is_users_turn = false;
                self.recommender.cancel();
                self.final_message = Some(format!("draft complete after {total_picks} picks"));
                let updates = vec![
                    UiUpdate::Notice(format!("draft complete after {total_picks} picks")),
                    UiUpdate::Status(self.status_line()),
                ];
                (updates, Some(RunOutcome::DraftComplete))
            }
            DraftEvent::Faulted(fault) => {
                error!(%fault, "draft watcher faulted");
                self.recommender.cancel();
                self.final_message = Some(format!("watcher stopped: {fault}"));
                let updates = vec![
                    UiUpdate::Notice(format!("watcher stopped: {fault}")),
                    UiUpdate::Status(self.status_line()),
                ];
                (updates, Some(RunOutcome::Faulted))
            }
        }
    }

    /// Fold a recommendation event. Returns an update once the
    /// recommendation is finished or has failed.
    pub fn handle_llm_event(&mut self, event: LlmEvent) -> Option<UiUpdate> {
        let terminal = event.is_terminal();
        let current = self.recommender.generation();
        if !self.recommendation.apply(event, current) || !terminal {
            return None;
        }
        if self.recommendation.is_unavailable() {
            warn!("recommendation unavailable");
        }
        Some(UiUpdate::Recommendation(self.recommendation_line()))
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run until the draft ends, the watcher faults or goes away, or Ctrl+C.
///
/// Listens on draft events, recommendation events and the interrupt
/// signal. Output goes through `ui_tx`.
pub async fn run(
    mut draft_rx: mpsc::Receiver<DraftEvent>,
    mut llm_rx: mpsc::Receiver<LlmEvent>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<RunOutcome> {
    info!("application event loop started");
    send_all(&ui_tx, vec![UiUpdate::Status(state.status_line())]).await;

    let mut llm_open = true;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    let outcome = loop {
        tokio::select! {
            draft_event = draft_rx.recv() => {
                match draft_event {
                    Some(event) => {
                        let (updates, outcome) = state.handle_draft_event(event);
                        send_all(&ui_tx, updates).await;
                        if let Some(outcome) = outcome {
                            break outcome;
                        }
                    }
                    None => {
                        info!("draft event channel closed");
                        break RunOutcome::WatcherClosed;
                    }
                }
            }

            llm_event = llm_rx.recv(), if llm_open => {
                match llm_event {
                    Some(event) => {
                        if let Some(update) = state.handle_llm_event(event) {
                            send_all(&ui_tx, vec![update]).await;
                        }
                    }
                    None => {
                        info!("LLM channel closed");
                        llm_open = false;
                    }
                }
            }

            result = &mut interrupt => {
                if let Err(e) = result {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                info!("interrupted");
                break RunOutcome::Interrupted;
            }
        }
    };

    info!(?outcome, picks = state.picks_made(), "application event loop finished");
    Ok(outcome)
}

async fn send_all(ui_tx: &mpsc::Sender<UiUpdate>, updates: Vec<UiUpdate>) {
    for update in updates {
        if ui_tx.send(update).await.is_err() {
            debug!("output channel closed");
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Rankings refresh
// ---------------------------------------------------------------------------

/// Refresh rankings every `every` on a separate task and publish the
/// latest board. The first refresh runs immediately.
pub fn spawn_rankings_refresh<S>(
    book: Arc<RankingsBook<S>>,
    query: RankingsQuery,
    every: Duration,
) -> (watch::Receiver<RankingsBoard>, JoinHandle<()>)
where
    S: RankingsSource + 'static,
{
    let (tx, rx) = watch::channel(Sourced {
        value: Arc::new(Vec::new()),
        tier: RankingsTier::Empty,
    });
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let board = book.rankings(&query).await;
            info!(tier = ?board.tier, players = board.value.len(), "rankings published");
            if tx.send(board).is_err() {
                debug!("rankings receiver dropped; refresh task exiting");
                break;
            }
        }
    });
    (rx, handle)
}
