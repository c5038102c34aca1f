// End-to-end flow: a scripted source feeds a real watcher, whose events run
// through the application loop into an in-memory database.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use draftwatch_app::app::{self, AppSettings, AppState, RankingsBoard, RunOutcome, UiUpdate};
use draftwatch_app::db::Database;
use draftwatch_core::draft::pick::{DraftId, DraftSlot, Pick, PlayerId, RosterId};
use draftwatch_core::draft::snake;
use draftwatch_core::draft::snapshot::{DraftSnapshot, DraftStatus};
use draftwatch_core::protocol::WatchStatus;
use draftwatch_core::source::{FetchError, SnapshotSource};
use draftwatch_core::watcher::{DraftWatcher, WatchConfig};
use draftwatch_football::rankings::{RankingsTier, Sourced};
use draftwatch_llm::client::LlmClient;
use draftwatch_llm::prompt::LeagueSettings;
use draftwatch_llm::recommend::{Recommender, DEFAULT_MAX_TOKENS};

const TEAMS: u32 = 4;
const USER_SLOT: u32 = 2;
const USER_ROSTER: u32 = 9;

/// Hands out snapshots in order, repeating the last one.
struct Replay {
    script: Mutex<VecDeque<DraftSnapshot>>,
    last: Mutex<Option<DraftSnapshot>>,
}

impl Replay {
    fn new(snapshots: Vec<DraftSnapshot>) -> Self {
        Replay {
            script: Mutex::new(snapshots.into()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SnapshotSource for Replay {
    async fn fetch_snapshot(&self, _draft_id: &DraftId) -> Result<DraftSnapshot, FetchError> {
        let next = self.script.lock().unwrap().pop_front();
        let snapshot = match next {
            Some(s) => s,
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| FetchError::Network("script empty".into()))?,
        };
        *self.last.lock().unwrap() = Some(snapshot.clone());
        Ok(snapshot)
    }
}

fn picks(n: u32) -> Vec<Pick> {
    (1..=n)
        .map(|pick_number| {
            let slot = snake::slot_for_pick(pick_number, TEAMS);
            let drafted_by = if slot.0 == USER_SLOT {
                RosterId(USER_ROSTER)
            } else {
                RosterId(slot.0)
            };
            Pick {
                pick_number,
                round: snake::round_for_pick(pick_number, TEAMS),
                roster_slot: slot,
                drafted_by,
                player_id: PlayerId::new(format!("p{pick_number}")),
            }
        })
        .collect()
}

fn snapshot(status: DraftStatus, n: u32) -> DraftSnapshot {
    DraftSnapshot::new(status, TEAMS, picks(n), BTreeSet::new()).unwrap()
}

fn app_state(db: Database) -> (AppState, mpsc::Receiver<draftwatch_llm::client::LlmEvent>) {
    let (llm_tx, llm_rx) = mpsc::channel(16);
    let recommender = Recommender::new(Arc::new(LlmClient::Disabled), llm_tx, DEFAULT_MAX_TOKENS);
    let (_board_tx, board_rx) = watch::channel::<RankingsBoard>(Sourced {
        value: Arc::new(Vec::new()),
        tier: RankingsTier::Empty,
    });
    let settings = AppSettings {
        draft_id: DraftId::new("flow"),
        user_roster_id: RosterId(USER_ROSTER),
        user_draft_position: DraftSlot(USER_SLOT),
        league: LeagueSettings {
            team_count: TEAMS,
            rounds: None,
            scoring: "ppr".into(),
            superflex: false,
            starters: BTreeMap::new(),
        },
        prefire_at: 1,
    };
    (AppState::new(settings, db, None, board_rx, recommender), llm_rx)
}

fn watch_config() -> WatchConfig {
    WatchConfig::new(
        DraftId::new("flow"),
        RosterId(USER_ROSTER),
        TEAMS,
        DraftSlot(USER_SLOT),
    )
}

fn drain(rx: &mut mpsc::Receiver<UiUpdate>) -> Vec<UiUpdate> {
    let mut out = Vec::new();
    while let Ok(update) = rx.try_recv() {
        out.push(update);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn full_draft_is_persisted_and_reported() {
    let source = Replay::new(vec![
        snapshot(DraftStatus::PreDraft, 0),
        snapshot(DraftStatus::Drafting, 1),
        snapshot(DraftStatus::Drafting, 3),
        snapshot(DraftStatus::Complete, 4),
    ]);
    let mut watcher = DraftWatcher::new(watch_config(), source).unwrap();
    let mut status = watcher.subscribe();

    let (state, llm_rx) = app_state(Database::open(":memory:").unwrap());
    let (draft_tx, draft_rx) = mpsc::channel(8);
    let (ui_tx, mut ui_rx) = mpsc::channel(64);

    let handle = watcher.start(draft_tx).unwrap();
    let outcome = app::run(draft_rx, llm_rx, ui_tx, state).await.unwrap();
    assert_eq!(outcome, RunOutcome::DraftComplete);

    handle.await.unwrap();
    status.wait_for(|s| *s == WatchStatus::Stopped).await.unwrap();

    let updates = drain(&mut ui_rx);
    assert!(updates.contains(&UiUpdate::Notice("you are on the clock (pick 2)".into())));
    assert!(updates.contains(&UiUpdate::Notice("pick 2 (R1): p2 to you".into())));
    assert!(updates.contains(&UiUpdate::Notice("draft complete after 4 picks".into())));
    assert_eq!(
        updates.last(),
        Some(&UiUpdate::Status("4 picks made, draft over | roster: p2".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn restart_resumes_from_stored_picks() {
    let db = Database::open(":memory:").unwrap();
    let draft_id = DraftId::new("flow");
    db.record_picks(&draft_id, &picks(3)).unwrap();

    let stored = db.load_picks(&draft_id).unwrap();
    assert_eq!(stored.len(), 3);

    let source = Replay::new(vec![
        snapshot(DraftStatus::Drafting, 3),
        snapshot(DraftStatus::Complete, 5),
    ]);
    let mut watcher = DraftWatcher::new(watch_config(), source).unwrap();
    watcher.resume(stored.clone()).unwrap();

    let (mut state, llm_rx) = app_state(db);
    state.restore(stored);
    let (draft_tx, draft_rx) = mpsc::channel(8);
    let (ui_tx, mut ui_rx) = mpsc::channel(64);

    watcher.start(draft_tx).unwrap();
    let outcome = app::run(draft_rx, llm_rx, ui_tx, state).await.unwrap();
    assert_eq!(outcome, RunOutcome::DraftComplete);

    let updates = drain(&mut ui_rx);
    // Picks 1-3 were known before the restart and are not announced again.
    assert!(!updates.iter().any(|u| matches!(u, UiUpdate::Notice(n) if n.starts_with("pick 1 "))));
    assert!(updates.contains(&UiUpdate::Notice("pick 4 (R1): p4 to roster 4".into())));
    assert!(updates.contains(&UiUpdate::Notice("pick 5 (R2): p5 to roster 4".into())));
    assert_eq!(
        updates.first(),
        Some(&UiUpdate::Status("3 picks made | 3 until your turn (pick 7) | roster: p2".into()))
    );
}
