// Sleeper player directory and its refresh cache.
//
// The full player map is large (~5MB) and changes rarely, so it is cached
// for a day and refreshed off the poll path.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use draftwatch_core::cache::{Freshness, TtlCache};
use draftwatch_core::draft::pick::PlayerId;

/// Rank assigned to players the provider does not rank.
pub const UNRANKED: u32 = 999;

pub const PLAYER_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ---------------------------------------------------------------------------
// Player records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub name: String,
    pub team: Option<String>,
    pub positions: Vec<String>,
    pub search_rank: u32,
    pub active: bool,
    pub years_exp: Option<u32>,
    pub injury_status: Option<String>,
}

impl PlayerInfo {
    pub fn plays(&self, position: &str) -> bool {
        self.positions.iter().any(|p| p.eq_ignore_ascii_case(position))
    }
}

/// Player object as served by `GET /players/{sport}`. Everything is
/// optional; team defenses and retired players omit most fields.
#[derive(Debug, Deserialize)]
struct RawPlayer {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    fantasy_positions: Option<Vec<String>>,
    #[serde(default)]
    search_rank: Option<u64>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    years_exp: Option<u32>,
    #[serde(default)]
    injury_status: Option<String>,
}

impl RawPlayer {
    fn into_info(self, player_id: String) -> PlayerInfo {
        let name = format!(
            "{} {}",
            self.first_name.unwrap_or_default(),
            self.last_name.unwrap_or_default()
        )
        .trim()
        .to_string();
        let search_rank = self
            .search_rank
            .and_then(|r| u32::try_from(r).ok())
            .map_or(UNRANKED, |r| r.min(UNRANKED));
        PlayerInfo {
            player_id: PlayerId::new(player_id),
            name,
            team: self.team,
            positions: self.fantasy_positions.unwrap_or_default(),
            search_rank,
            active: self.active.unwrap_or(true),
            years_exp: self.years_exp,
            injury_status: self.injury_status,
        }
    }
}

// ---------------------------------------------------------------------------
// PlayerDirectory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    players: HashMap<PlayerId, PlayerInfo>,
}

impl PlayerDirectory {
    pub fn from_players(players: impl IntoIterator<Item = PlayerInfo>) -> Self {
        PlayerDirectory {
            players: players
                .into_iter()
                .map(|p| (p.player_id.clone(), p))
                .collect(),
        }
    }

    /// Parse the body of `GET /players/{sport}`: an object keyed by player id.
    pub fn from_sleeper_json(body: &str) -> Result<Self, serde_json::Error> {
        let raw: HashMap<String, RawPlayer> = serde_json::from_str(body)?;
        Ok(Self::from_players(
            raw.into_iter().map(|(id, player)| player.into_info(id)),
        ))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerInfo> {
        self.players.get(id)
    }

    /// Ids of active players not in `drafted`.
    pub fn available_ids(&self, drafted: &BTreeSet<PlayerId>) -> BTreeSet<PlayerId> {
        self.players
            .values()
            .filter(|p| p.active && !drafted.contains(&p.player_id))
            .map(|p| p.player_id.clone())
            .collect()
    }

    /// Undrafted active players, best rank first, optionally limited to one
    /// fantasy position. Ties break on name for a stable order.
    pub fn available_players(
        &self,
        drafted: &BTreeSet<PlayerId>,
        position: Option<&str>,
    ) -> Vec<&PlayerInfo> {
        let mut available: Vec<&PlayerInfo> = self
            .players
            .values()
            .filter(|p| p.active && !drafted.contains(&p.player_id))
            .filter(|p| position.map_or(true, |pos| p.plays(pos)))
            .collect();
        available.sort_by(|a, b| {
            a.search_rank
                .cmp(&b.search_rank)
                .then_with(|| a.name.cmp(&b.name))
        });
        available
    }
}

// ---------------------------------------------------------------------------
// PlayerCache
// ---------------------------------------------------------------------------

/// Directory per sport, plus a flag so only one refresh runs at a time.
#[derive(Debug)]
pub struct PlayerCache {
    entries: Mutex<TtlCache<String, Arc<PlayerDirectory>>>,
    refreshing: AtomicBool,
}

/// Result of a cache lookup: whatever directory is held (possibly stale)
/// and whether a refresh is due.
#[derive(Debug, Clone)]
pub struct CachedDirectory {
    pub directory: Option<Arc<PlayerDirectory>>,
    pub needs_refresh: bool,
}

impl PlayerCache {
    pub fn new(ttl: Duration) -> Self {
        PlayerCache {
            entries: Mutex::new(TtlCache::new(ttl, 4)),
            refreshing: AtomicBool::new(false),
        }
    }

    pub fn lookup(&self, sport: &str) -> CachedDirectory {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_or_stale(&sport.to_string()) {
            Some(Freshness::Fresh(dir)) => CachedDirectory {
                directory: Some(Arc::clone(dir)),
                needs_refresh: false,
            },
            Some(Freshness::Stale { value, age }) => {
                debug!(sport, ?age, "player directory is stale");
                CachedDirectory {
                    directory: Some(Arc::clone(value)),
                    needs_refresh: true,
                }
            }
            None => CachedDirectory {
                directory: None,
                needs_refresh: true,
            },
        }
    }

    pub fn store(&self, sport: &str, directory: PlayerDirectory) -> Arc<PlayerDirectory> {
        let directory = Arc::new(directory);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(sport.to_string(), Arc::clone(&directory));
        directory
    }

    /// Claim the refresh slot. Returns false if a refresh is already running.
    pub fn begin_refresh(&self) -> bool {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_refresh(&self) {
        self.refreshing.store(false, Ordering::Release);
    }
}

impl Default for PlayerCache {
    fn default() -> Self {
        PlayerCache::new(PLAYER_CACHE_TTL)
    }
}
