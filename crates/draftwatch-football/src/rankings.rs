// Consensus rankings with tiered fallback.
//
// Lookups try, in order: a fresh cached copy, a live FantasyPros request,
// the stale cached copy, a local CSV seed file, and finally an empty list.
// Every answer carries the tier it came from.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use draftwatch_core::cache::{Freshness, TtlCache};

pub const FANTASYPROS_API_URL: &str = "https://api.fantasypros.com/public/v2/json";

pub const RANKINGS_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RankingsError {
    #[error("rankings API key not configured")]
    MissingApiKey,

    #[error("rankings request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("rankings provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("unexpected rankings payload: {0}")]
    Decode(String),

    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringFormat {
    Standard,
    #[default]
    HalfPpr,
    Ppr,
}

impl ScoringFormat {
    pub fn api_param(self) -> &'static str {
        match self {
            ScoringFormat::Standard => "STD",
            ScoringFormat::HalfPpr => "HALF",
            ScoringFormat::Ppr => "PPR",
        }
    }
}

/// What to rank. `position: None` asks for the overall offensive-player
/// board (superflex-style, QBs included).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RankingsQuery {
    pub season: i32,
    pub scoring: ScoringFormat,
    pub position: Option<String>,
}

impl RankingsQuery {
    /// Overall board for the current calendar year.
    pub fn overall(scoring: ScoringFormat) -> Self {
        RankingsQuery {
            season: chrono::Utc::now().year(),
            scoring,
            position: None,
        }
    }

    pub fn position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into().to_ascii_uppercase());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPlayer {
    pub rank: u32,
    pub name: String,
    pub position: String,
    pub team: Option<String>,
}

/// Where a rankings answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingsTier {
    Fresh,
    Live,
    Stale,
    Seed,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub tier: RankingsTier,
}

// ---------------------------------------------------------------------------
// Source trait + FantasyPros client
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RankingsSource: Send + Sync {
    async fn fetch_rankings(&self, query: &RankingsQuery) -> Result<Vec<RankedPlayer>, RankingsError>;
}

#[derive(Debug, Deserialize)]
struct RawRankings {
    players: Vec<RawRankedPlayer>,
}

#[derive(Debug, Deserialize)]
struct RawRankedPlayer {
    player_name: String,
    #[serde(default)]
    player_position_id: Option<String>,
    #[serde(default)]
    player_team_id: Option<String>,
    rank_ecr: u32,
}

/// Parse a `consensus-rankings` response body.
pub fn parse_rankings(body: &str) -> Result<Vec<RankedPlayer>, RankingsError> {
    let raw: RawRankings =
        serde_json::from_str(body).map_err(|e| RankingsError::Decode(e.to_string()))?;
    let mut players: Vec<RankedPlayer> = raw
        .players
        .into_iter()
        .map(|p| RankedPlayer {
            rank: p.rank_ecr,
            name: p.player_name.trim().to_string(),
            position: p.player_position_id.unwrap_or_default(),
            team: p.player_team_id.filter(|t| !t.is_empty()),
        })
        .collect();
    players.sort_by_key(|p| p.rank);
    Ok(players)
}

pub struct FantasyProsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FantasyProsClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, FANTASYPROS_API_URL)
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        FantasyProsClient {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl RankingsSource for FantasyProsClient {
    async fn fetch_rankings(&self, query: &RankingsQuery) -> Result<Vec<RankedPlayer>, RankingsError> {
        if self.api_key.is_empty() {
            return Err(RankingsError::MissingApiKey);
        }
        let url = format!("{}/nfl/{}/consensus-rankings", self.base_url, query.season);
        let position = query.position.as_deref().unwrap_or("OP");
        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .query(&[
                ("position", position),
                ("scoring", query.scoring.api_param()),
                ("type", "DRAFT"),
                ("week", "0"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RankingsError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        parse_rankings(&body)
    }
}

// ---------------------------------------------------------------------------
// CSV seed
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawSeedRow {
    rank: u32,
    name: String,
    position: String,
    #[serde(default)]
    team: Option<String>,
}

fn load_seed_from_reader<R: Read>(rdr: R) -> Result<Vec<RankedPlayer>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<RawSeedRow>() {
        match result {
            Ok(row) => players.push(RankedPlayer {
                rank: row.rank,
                name: row.name,
                position: row.position.to_ascii_uppercase(),
                team: row.team.filter(|t| !t.is_empty()),
            }),
            Err(e) => warn!("skipping malformed rankings seed row: {}", e),
        }
    }
    players.sort_by_key(|p| p.rank);
    Ok(players)
}

/// Load a rankings seed file with columns `rank,name,position,team`.
pub fn load_seed(path: &Path) -> Result<Vec<RankedPlayer>, RankingsError> {
    let file = std::fs::File::open(path).map_err(|e| RankingsError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_seed_from_reader(file).map_err(|e| RankingsError::Csv {
        path: path.display().to_string(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// RankingsBook
// ---------------------------------------------------------------------------

type Board = Arc<Vec<RankedPlayer>>;

pub struct RankingsBook<S> {
    source: S,
    cache: Mutex<TtlCache<RankingsQuery, Board>>,
    seed_path: Option<PathBuf>,
}

impl<S: RankingsSource> RankingsBook<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        RankingsBook {
            source,
            cache: Mutex::new(TtlCache::new(ttl, 32)),
            seed_path: None,
        }
    }

    pub fn with_seed(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_path = Some(path.into());
        self
    }

    fn cached(&self, query: &RankingsQuery) -> Option<(Board, bool)> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get_or_stale(query).map(|f| match f {
            Freshness::Fresh(board) => (Arc::clone(board), true),
            Freshness::Stale { value, .. } => (Arc::clone(value), false),
        })
    }

    /// Rankings for `query`, never failing. The lock is not held while the
    /// live request is in flight.
    pub async fn rankings(&self, query: &RankingsQuery) -> Sourced<Board> {
        let cached = self.cached(query);
        if let Some((board, true)) = &cached {
            return Sourced {
                value: Arc::clone(board),
                tier: RankingsTier::Fresh,
            };
        }

        match self.source.fetch_rankings(query).await {
            Ok(players) => {
                info!(count = players.len(), position = ?query.position, "rankings refreshed");
                let board = Arc::new(players);
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(query.clone(), Arc::clone(&board));
                return Sourced {
                    value: board,
                    tier: RankingsTier::Live,
                };
            }
            Err(e) => warn!(error = %e, "live rankings unavailable, falling back"),
        }

        if let Some((board, _)) = cached {
            return Sourced {
                value: board,
                tier: RankingsTier::Stale,
            };
        }

        if let Some(path) = &self.seed_path {
            match load_seed(path) {
                Ok(mut players) => {
                    if let Some(pos) = &query.position {
                        players.retain(|p| p.position.eq_ignore_ascii_case(pos));
                    }
                    debug!(count = players.len(), path = %path.display(), "rankings from seed file");
                    return Sourced {
                        value: Arc::new(players),
                        tier: RankingsTier::Seed,
                    };
                }
                Err(e) => warn!(error = %e, "rankings seed unavailable"),
            }
        }

        Sourced {
            value: Arc::new(Vec::new()),
            tier: RankingsTier::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct ScriptedRankings {
        responses: Mutex<VecDeque<Result<Vec<RankedPlayer>, RankingsError>>>,
    }

    impl ScriptedRankings {
        fn new(responses: Vec<Result<Vec<RankedPlayer>, RankingsError>>) -> Self {
            ScriptedRankings {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl RankingsSource for ScriptedRankings {
        async fn fetch_rankings(&self, _query: &RankingsQuery) -> Result<Vec<RankedPlayer>, RankingsError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RankingsError::Status { status: 503 }))
        }
    }

    fn board() -> Vec<RankedPlayer> {
        vec![RankedPlayer {
            rank: 1,
            name: "Josh Allen".into(),
            position: "QB".into(),
            team: Some("BUF".into()),
        }]
    }

    fn query() -> RankingsQuery {
        RankingsQuery {
            season: 2025,
            scoring: ScoringFormat::HalfPpr,
            position: None,
        }
    }

    fn write_seed(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("draftwatch_rankings_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_consensus_payload() {
        let body = r#"{
            "sport": "NFL",
            "players": [
                { "player_id": 19, "player_name": "Bijan Robinson", "player_position_id": "RB",
                  "player_team_id": "ATL", "rank_ecr": 2 },
                { "player_id": 7, "player_name": "Josh Allen ", "player_position_id": "QB",
                  "player_team_id": "BUF", "rank_ecr": 1 }
            ]
        }"#;
        let players = parse_rankings(body).unwrap();
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "Josh Allen");
        assert_eq!(players[1].team.as_deref(), Some("ATL"));
    }

    #[test]
    fn payload_without_players_is_decode_error() {
        assert!(matches!(
            parse_rankings(r#"{"error": "bad key"}"#),
            Err(RankingsError::Decode(_))
        ));
    }

    #[test]
    fn scoring_params() {
        assert_eq!(ScoringFormat::Standard.api_param(), "STD");
        assert_eq!(ScoringFormat::default().api_param(), "HALF");
        assert_eq!(
            RankingsQuery::overall(ScoringFormat::Ppr).position("wr").position.as_deref(),
            Some("WR")
        );
    }

    #[test]
    fn seed_reader_skips_bad_rows() {
        let csv = "rank,name,position,team\n2,Bijan Robinson,rb,ATL\nx,Broken,QB,\n1,Josh Allen,QB,BUF\n3,Free Agent,WR,\n";
        let players = load_seed_from_reader(csv.as_bytes()).unwrap();
        let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Josh Allen", "Bijan Robinson", "Free Agent"]);
        assert_eq!(players[1].position, "RB");
        assert_eq!(players[2].team, None);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_cache_then_stale_after_ttl() {
        let book = RankingsBook::new(
            ScriptedRankings::new(vec![Ok(board())]),
            Duration::from_secs(60),
        );

        let live = book.rankings(&query()).await;
        assert_eq!(live.tier, RankingsTier::Live);
        assert_eq!(live.value.len(), 1);

        assert_eq!(book.rankings(&query()).await.tier, RankingsTier::Fresh);

        tokio::time::advance(Duration::from_secs(61)).await;
        let stale = book.rankings(&query()).await;
        assert_eq!(stale.tier, RankingsTier::Stale);
        assert_eq!(stale.value[0].name, "Josh Allen");
    }

    #[tokio::test]
    async fn seed_used_when_nothing_cached() {
        let path = write_seed(
            "seed_fallback.csv",
            "rank,name,position,team\n1,Josh Allen,QB,BUF\n2,Bijan Robinson,RB,ATL\n",
        );
        let book = RankingsBook::new(ScriptedRankings::new(vec![]), RANKINGS_TTL).with_seed(&path);

        let all = book.rankings(&query()).await;
        assert_eq!(all.tier, RankingsTier::Seed);
        assert_eq!(all.value.len(), 2);

        let rbs = book.rankings(&query().position("RB")).await;
        assert_eq!(rbs.tier, RankingsTier::Seed);
        assert_eq!(rbs.value.len(), 1);
        assert_eq!(rbs.value[0].name, "Bijan Robinson");
    }

    #[tokio::test]
    async fn empty_when_every_tier_fails() {
        let book = RankingsBook::new(
            ScriptedRankings::new(vec![Err(RankingsError::MissingApiKey)]),
            RANKINGS_TTL,
        )
        .with_seed("/nonexistent/draftwatch/seed.csv");
        let result = book.rankings(&query()).await;
        assert_eq!(result.tier, RankingsTier::Empty);
        assert!(result.value.is_empty());
    }
}
