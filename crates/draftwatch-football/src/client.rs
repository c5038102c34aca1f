// Sleeper API client.
//
// Implements `SnapshotSource` over the public, unauthenticated Sleeper REST
// API. A snapshot is assembled from two requests issued concurrently:
// `GET /draft/{id}` (status, settings, slot mapping) and
// `GET /draft/{id}/picks`. The available-player set comes from the cached
// player directory; a directory refresh never blocks or fails a snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use draftwatch_core::draft::pick::{DraftId, DraftSlot, Pick, PlayerId, RosterId};
use draftwatch_core::draft::snake;
use draftwatch_core::draft::snapshot::{DraftSnapshot, DraftStatus};
use draftwatch_core::source::{FetchError, SnapshotSource};

use crate::players::{PlayerCache, PlayerDirectory};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const SLEEPER_API_URL: &str = "https://api.sleeper.app/v1";

/// Transport-level timeout for a single request. The watcher applies its
/// own, shorter, per-tick timeout on top.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The player map is several megabytes.
const PLAYERS_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct RawDraftSettings {
    #[serde(default)]
    teams: Option<u32>,
    #[serde(default)]
    rounds: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDraft {
    #[serde(default)]
    draft_id: Option<String>,
    #[serde(default)]
    league_id: Option<String>,
    status: String,
    #[serde(rename = "type", default)]
    draft_type: Option<String>,
    #[serde(default)]
    settings: Option<RawDraftSettings>,
    /// Keys are slot numbers as strings; values may be null in mock drafts.
    #[serde(default)]
    slot_to_roster_id: Option<HashMap<String, Option<u32>>>,
    /// Sleeper user id -> draft slot.
    #[serde(default)]
    draft_order: Option<HashMap<String, u32>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPick {
    pick_no: u32,
    #[serde(default)]
    round: Option<u32>,
    #[serde(default)]
    roster_id: Option<u32>,
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default)]
    draft_slot: Option<u32>,
}

// ---------------------------------------------------------------------------
// DraftInfo
// ---------------------------------------------------------------------------

/// Draft metadata used to resolve the user's roster and slot before
/// polling starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftInfo {
    pub draft_id: DraftId,
    pub league_id: Option<String>,
    pub status: DraftStatus,
    pub draft_type: Option<String>,
    pub team_count: u32,
    pub rounds: Option<u32>,
    pub slot_to_roster: BTreeMap<DraftSlot, RosterId>,
    pub draft_order: HashMap<String, DraftSlot>,
}

impl DraftInfo {
    /// Slot and roster for a Sleeper user id, when the draft order is set.
    pub fn seat_for_user(&self, user_id: &str) -> Option<(DraftSlot, Option<RosterId>)> {
        let slot = *self.draft_order.get(user_id)?;
        Some((slot, self.slot_to_roster.get(&slot).copied()))
    }

    /// Roster for a configured slot.
    pub fn roster_for_slot(&self, slot: DraftSlot) -> Option<RosterId> {
        self.slot_to_roster.get(&slot).copied()
    }
}

fn parse_draft(draft_id: &DraftId, body: &str) -> Result<RawDraft, FetchError> {
    if body.trim() == "null" {
        return Err(FetchError::UnknownDraft(draft_id.to_string()));
    }
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(format!("draft: {e}")))
}

fn parse_picks(body: &str) -> Result<Vec<RawPick>, FetchError> {
    // An unknown draft answers `null` here too; the draft request reports it.
    if body.trim() == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(body).map_err(|e| FetchError::Malformed(format!("picks: {e}")))
}

fn draft_info(draft_id: &DraftId, raw: &RawDraft) -> Result<DraftInfo, FetchError> {
    let status = DraftStatus::from_provider(&raw.status)
        .ok_or_else(|| FetchError::Malformed(format!("unknown draft status {:?}", raw.status)))?;

    let settings = raw.settings.as_ref();
    let team_count = settings
        .and_then(|s| s.teams)
        .filter(|t| *t > 0)
        .ok_or_else(|| FetchError::Malformed("draft settings missing team count".into()))?;
    let rounds = settings.and_then(|s| s.rounds).filter(|r| *r > 0);

    let mut slot_to_roster = BTreeMap::new();
    for (slot, roster) in raw.slot_to_roster_id.iter().flatten() {
        let slot: u32 = slot
            .parse()
            .map_err(|_| FetchError::Malformed(format!("slot key {slot:?} is not a number")))?;
        if let Some(roster) = roster {
            slot_to_roster.insert(DraftSlot(slot), RosterId(*roster));
        }
    }

    let draft_order = raw
        .draft_order
        .iter()
        .flatten()
        .map(|(user, slot)| (user.clone(), DraftSlot(*slot)))
        .collect();

    Ok(DraftInfo {
        draft_id: raw
            .draft_id
            .clone()
            .map(DraftId::new)
            .unwrap_or_else(|| draft_id.clone()),
        league_id: raw.league_id.clone(),
        status,
        draft_type: raw.draft_type.clone(),
        team_count,
        rounds,
        slot_to_roster,
        draft_order,
    })
}

fn convert_pick(raw: RawPick, info: &DraftInfo) -> Result<Pick, FetchError> {
    let team_count = info.team_count;
    let player_id = raw
        .player_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| FetchError::Malformed(format!("pick {} has no player", raw.pick_no)))?;
    if raw.pick_no == 0 {
        return Err(FetchError::Malformed("pick_no must be 1-based".into()));
    }
    let roster_slot = raw
        .draft_slot
        .map(DraftSlot)
        .unwrap_or_else(|| snake::slot_for_pick(raw.pick_no, team_count));
    let drafted_by = raw
        .roster_id
        .map(RosterId)
        .or_else(|| info.roster_for_slot(roster_slot))
        .ok_or_else(|| FetchError::Malformed(format!("pick {} has no roster", raw.pick_no)))?;

    Ok(Pick {
        pick_number: raw.pick_no,
        round: raw
            .round
            .unwrap_or_else(|| snake::round_for_pick(raw.pick_no, team_count)),
        roster_slot,
        drafted_by,
        player_id: PlayerId::new(player_id),
    })
}

/// Combine the two draft responses and the player directory into a
/// validated snapshot. Structural violations surface as `Malformed`.
fn build_snapshot(
    info: &DraftInfo,
    raw_picks: Vec<RawPick>,
    directory: Option<&PlayerDirectory>,
) -> Result<DraftSnapshot, FetchError> {
    let picks = raw_picks
        .into_iter()
        .map(|p| convert_pick(p, info))
        .collect::<Result<Vec<_>, _>>()?;

    let available = match directory {
        Some(dir) => {
            let drafted: BTreeSet<PlayerId> = picks.iter().map(|p| p.player_id.clone()).collect();
            dir.available_ids(&drafted)
        }
        None => BTreeSet::new(),
    };

    let mut snapshot = DraftSnapshot::new(info.status, info.team_count, picks, available)
        .map_err(|e| FetchError::Malformed(e.to_string()))?;
    if let Some(rounds) = info.rounds {
        snapshot = snapshot.with_rounds(rounds);
    }
    if !info.slot_to_roster.is_empty() {
        snapshot = snapshot.with_slot_mapping(info.slot_to_roster.clone());
    }
    Ok(snapshot)
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            millis: timeout.as_millis() as u64,
        }
    } else if err.is_decode() {
        FetchError::Malformed(err.to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// SleeperClient
// ---------------------------------------------------------------------------

/// Sleeper REST client. Cheap to clone; clones share the player cache.
#[derive(Debug, Clone)]
pub struct SleeperClient {
    http: reqwest::Client,
    base_url: String,
    sport: String,
    players: Arc<PlayerCache>,
    track_players: bool,
}

impl SleeperClient {
    pub fn new() -> Self {
        Self::with_base_url(SLEEPER_API_URL)
    }

    /// Client against a different host (mock servers, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        SleeperClient {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sport: "nfl".to_string(),
            players: Arc::new(PlayerCache::default()),
            track_players: true,
        }
    }

    pub fn sport(mut self, sport: impl Into<String>) -> Self {
        self.sport = sport.into();
        self
    }

    /// Skip the player directory; snapshots then carry an empty available set.
    pub fn without_player_directory(mut self) -> Self {
        self.track_players = false;
        self
    }

    pub fn player_cache(&self) -> &Arc<PlayerCache> {
        &self.players
    }

    async fn get_text(
        &self,
        path: &str,
        draft_id: Option<&DraftId>,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(match draft_id {
                Some(id) => FetchError::UnknownDraft(id.to_string()),
                None => FetchError::Http { status: 404 },
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|e| transport_error(e, timeout))
    }

    async fn fetch_raw_draft(&self, draft_id: &DraftId) -> Result<RawDraft, FetchError> {
        let body = self
            .get_text(&format!("/draft/{draft_id}"), Some(draft_id), REQUEST_TIMEOUT)
            .await?;
        parse_draft(draft_id, &body)
    }

    async fn fetch_raw_picks(&self, draft_id: &DraftId) -> Result<Vec<RawPick>, FetchError> {
        let body = self
            .get_text(&format!("/draft/{draft_id}/picks"), Some(draft_id), REQUEST_TIMEOUT)
            .await?;
        parse_picks(&body)
    }

    /// Draft metadata only.
    pub async fn fetch_draft_info(&self, draft_id: &DraftId) -> Result<DraftInfo, FetchError> {
        let raw = self.fetch_raw_draft(draft_id).await?;
        draft_info(draft_id, &raw)
    }

    /// Download the player map and replace the cached directory. Returns the
    /// number of players loaded.
    pub async fn refresh_players(&self) -> Result<usize, FetchError> {
        let body = self
            .get_text(&format!("/players/{}", self.sport), None, PLAYERS_REQUEST_TIMEOUT)
            .await?;
        let directory = PlayerDirectory::from_sleeper_json(&body)
            .map_err(|e| FetchError::Malformed(format!("players: {e}")))?;
        let count = directory.len();
        self.players.store(&self.sport, directory);
        info!(sport = %self.sport, players = count, "player directory refreshed");
        Ok(count)
    }

    /// Current directory, possibly stale. Kicks off a background refresh
    /// when the cached copy is missing or expired.
    pub fn player_directory(&self) -> Option<Arc<PlayerDirectory>> {
        let cached = self.players.lookup(&self.sport);
        if cached.needs_refresh && self.players.begin_refresh() {
            let client = self.clone();
            tokio::spawn(async move {
                if let Err(e) = client.refresh_players().await {
                    warn!(error = %e, "player directory refresh failed; keeping previous copy");
                }
                client.players.end_refresh();
            });
        }
        cached.directory
    }
}

impl Default for SleeperClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for SleeperClient {
    async fn fetch_snapshot(&self, draft_id: &DraftId) -> Result<DraftSnapshot, FetchError> {
        let (raw_draft, raw_picks) =
            tokio::try_join!(self.fetch_raw_draft(draft_id), self.fetch_raw_picks(draft_id))?;
        let info = draft_info(draft_id, &raw_draft)?;

        let directory = if self.track_players {
            self.player_directory()
        } else {
            None
        };
        build_snapshot(&info, raw_picks, directory.as_deref())
    }
}
