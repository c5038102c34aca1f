// SleeperClient against a mocked Sleeper API.

use mockito::{Mock, Server, ServerGuard};

use draftwatch_core::draft::pick::{DraftId, DraftSlot, PlayerId, RosterId};
use draftwatch_core::draft::snapshot::DraftStatus;
use draftwatch_core::source::{FetchError, SnapshotSource};
use draftwatch_football::client::SleeperClient;

/// `(path, status, body)` answered for GET requests.
type Route = (&'static str, usize, &'static str);

const DRAFT: &str = r#"{
    "draft_id": "D1",
    "league_id": "L9",
    "status": "drafting",
    "type": "snake",
    "settings": { "teams": 4, "rounds": 2 },
    "slot_to_roster_id": { "1": 2, "2": 4, "3": 1, "4": 3 },
    "draft_order": { "u-alice": 3 }
}"#;

const PICKS: &str = r#"[
    { "pick_no": 2, "round": 1, "roster_id": 4, "player_id": "6794", "draft_slot": 2 },
    { "pick_no": 1, "round": 1, "roster_id": 2, "player_id": "4034", "draft_slot": 1 }
]"#;

const PLAYERS: &str = r#"{
    "4034": { "first_name": "Christian", "last_name": "McCaffrey", "fantasy_positions": ["RB"], "search_rank": 1, "active": true },
    "6794": { "first_name": "Justin", "last_name": "Jefferson", "fantasy_positions": ["WR"], "search_rank": 2, "active": true },
    "4881": { "first_name": "Lamar", "last_name": "Jackson", "fantasy_positions": ["QB"], "search_rank": 4, "active": true },
    "1111": { "first_name": "Old", "last_name": "Timer", "fantasy_positions": ["TE"], "active": false }
}"#;

const DRAFT_ROUTES: &[Route] = &[
    ("/draft/D1", 200, DRAFT),
    ("/draft/D1/picks", 200, PICKS),
    ("/players/nfl", 200, PLAYERS),
];

/// Mock server plus the mocks registered on it; both must outlive the test.
struct Sleeper {
    server: ServerGuard,
    _mocks: Vec<Mock>,
}

impl Sleeper {
    async fn start(routes: &[Route]) -> Self {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::with_capacity(routes.len());
        for &(path, status, body) in routes {
            let mock = server
                .mock("GET", path)
                .with_status(status)
                .with_header("content-type", "application/json")
                .with_body(body)
                .create_async()
                .await;
            mocks.push(mock);
        }
        Sleeper {
            server,
            _mocks: mocks,
        }
    }

    fn client(&self) -> SleeperClient {
        SleeperClient::with_base_url(self.server.url())
    }
}

#[tokio::test]
async fn snapshot_combines_draft_picks_and_players() {
    let sleeper = Sleeper::start(DRAFT_ROUTES).await;
    let client = sleeper.client();
    assert_eq!(client.refresh_players().await.unwrap(), 4);

    let snapshot = client.fetch_snapshot(&DraftId::new("D1")).await.unwrap();
    assert_eq!(snapshot.status, DraftStatus::Drafting);
    assert_eq!(snapshot.team_count, 4);
    assert_eq!(snapshot.total_picks(), Some(8));
    assert_eq!(snapshot.picks_made(), 2);
    assert_eq!(snapshot.pick_sequence()[0].player_id, PlayerId::new("4034"));
    assert_eq!(snapshot.roster_for_slot(DraftSlot(2)), Some(RosterId(4)));

    // Drafted and inactive players are excluded.
    let available: Vec<&str> = snapshot.available_player_ids().iter().map(PlayerId::as_str).collect();
    assert_eq!(available, vec!["4881"]);
}

#[tokio::test]
async fn draft_info_exposes_seat_lookup() {
    let sleeper = Sleeper::start(DRAFT_ROUTES).await;
    let info = sleeper.client().fetch_draft_info(&DraftId::new("D1")).await.unwrap();
    assert_eq!(info.seat_for_user("u-alice"), Some((DraftSlot(3), Some(RosterId(1)))));
    assert_eq!(info.league_id.as_deref(), Some("L9"));
}

#[tokio::test]
async fn snapshot_without_directory_has_empty_available_set() {
    let sleeper = Sleeper::start(DRAFT_ROUTES).await;
    let client = sleeper.client().without_player_directory();
    let snapshot = client.fetch_snapshot(&DraftId::new("D1")).await.unwrap();
    assert_eq!(snapshot.picks_made(), 2);
    assert!(snapshot.available_player_ids().is_empty());
}

#[tokio::test]
async fn missing_draft_is_unknown() {
    let sleeper = Sleeper::start(&[
        ("/draft/nope", 404, "null"),
        ("/draft/nope/picks", 404, "null"),
    ])
    .await;
    let client = sleeper.client().without_player_directory();
    let err = client.fetch_snapshot(&DraftId::new("nope")).await.unwrap_err();
    assert_eq!(err, FetchError::UnknownDraft("nope".into()));
}

#[tokio::test]
async fn null_draft_body_is_unknown() {
    let sleeper = Sleeper::start(&[("/draft/D2", 200, "null"), ("/draft/D2/picks", 200, "null")]).await;
    let client = sleeper.client().without_player_directory();
    let err = client.fetch_draft_info(&DraftId::new("D2")).await.unwrap_err();
    assert_eq!(err, FetchError::UnknownDraft("D2".into()));
}

#[tokio::test]
async fn rate_limit_and_server_errors_are_distinct() {
    let sleeper = Sleeper::start(&[("/draft/R", 429, "{}"), ("/draft/S", 503, "{}")]).await;
    let client = sleeper.client().without_player_directory();

    let err = client.fetch_draft_info(&DraftId::new("R")).await.unwrap_err();
    assert_eq!(err, FetchError::RateLimited);
    assert!(err.is_transient());

    let err = client.fetch_draft_info(&DraftId::new("S")).await.unwrap_err();
    assert_eq!(err, FetchError::Http { status: 503 });
}

#[tokio::test]
async fn malformed_body_is_reported() {
    let sleeper = Sleeper::start(&[("/draft/M", 200, "{\"status\": 12")]).await;
    let client = sleeper.client().without_player_directory();
    let err = client.fetch_draft_info(&DraftId::new("M")).await.unwrap_err();
    assert!(matches!(err, FetchError::Malformed(_)), "got {err:?}");
    assert!(!err.is_transient());
}
