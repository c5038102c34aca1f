// Draft watcher entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Open database
// 4. Fetch draft metadata, resolve the user's seat
// 5. Load the player directory
// 6. Build the watcher, resume from stored picks
// 7. Start rankings refresh and the recommender
// 8. Spawn app logic task, start polling
// 9. Print updates until the app loop ends
// 10. Cleanup on exit

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use draftwatch_app::app::{self, AppSettings, AppState, UiUpdate};
use draftwatch_app::config;
use draftwatch_app::db::Database;
use draftwatch_app::seat;
use draftwatch_core::draft::pick::DraftId;
use draftwatch_core::draft::snapshot::DraftSnapshot;
use draftwatch_core::watcher::{DraftWatcher, WatchConfig};
use draftwatch_football::client::SleeperClient;
use draftwatch_football::rankings::{FantasyProsClient, RankingsBook, RankingsQuery, ScoringFormat};
use draftwatch_llm::client::LlmClient;
use draftwatch_llm::prompt::LeagueSettings;
use draftwatch_llm::recommend::Recommender;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("draftwatch starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    let draft_id = DraftId::new(config.draft.draft_id.trim());
    info!(%draft_id, "config loaded");

    // 3. Open database
    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db_path = config.db_path.to_string_lossy().into_owned();
    let db = Database::open(&db_path).context("failed to open database")?;
    info!(path = %db_path, "database opened");

    // 4. Fetch draft metadata, resolve the user's seat
    let sleeper = SleeperClient::new();
    let info = sleeper
        .fetch_draft_info(&draft_id)
        .await
        .with_context(|| format!("failed to fetch draft {draft_id}"))?;
    info!(
        teams = info.team_count,
        rounds = ?info.rounds,
        status = ?info.status,
        "draft metadata loaded"
    );

    let seat = seat::resolve_seat(&config.draft, &info).context("failed to resolve draft seat")?;
    let mut watch_config = WatchConfig::new(
        draft_id.clone(),
        seat.roster_id,
        info.team_count,
        seat.draft_position,
    );
    watch_config.poll_interval = config.polling.poll_interval();
    watch_config.fetch_timeout = config.polling.fetch_timeout();
    watch_config.retry = config.polling.retry();
    if !info.slot_to_roster.is_empty() {
        let mapping = DraftSnapshot::empty(info.team_count).with_slot_mapping(info.slot_to_roster.clone());
        watch_config
            .verify_roster(&mapping)
            .context("configured roster does not match the draft's slot mapping")?;
    }
    info!(roster = %seat.roster_id, slot = %seat.draft_position, "seat resolved");

    // 5. Load the player directory. Without it snapshots carry no available
    //    set and candidates come from rankings alone.
    match sleeper.refresh_players().await {
        Ok(count) => info!(count, "player directory loaded"),
        Err(e) => warn!(error = %e, "player directory unavailable"),
    }

    // 6. Build the watcher, resume from stored picks
    let mut watcher =
        DraftWatcher::new(watch_config, sleeper.clone()).context("invalid watcher configuration")?;
    let mut stored = db.load_picks(&draft_id).context("failed to load stored picks")?;
    if !stored.is_empty() {
        if let Err(e) = watcher.resume(stored.clone()) {
            warn!(error = %e, "stored picks rejected; starting fresh");
            db.clear_draft(&draft_id).context("failed to clear stored picks")?;
            stored.clear();
        }
    }

    // 7. Start rankings refresh and the recommender
    let ranking_ttl = Duration::from_secs(config.rankings.ttl_hours * 3600);
    let mut book = RankingsBook::new(
        FantasyProsClient::new(config.credentials.fantasypros_api_key.clone().unwrap_or_default()),
        ranking_ttl,
    );
    if let Some(path) = &config.rankings.seed_path {
        book = book.with_seed(path);
    }
    let (rankings_rx, rankings_handle) = app::spawn_rankings_refresh(
        Arc::new(book),
        RankingsQuery::overall(config.league.scoring),
        ranking_ttl,
    );

    let llm_client = LlmClient::from_key(
        config.credentials.anthropic_api_key.as_deref(),
        &config.llm.model,
    );
    if llm_client.is_active() {
        info!(model = %config.llm.model, "LLM client initialized");
    } else {
        info!("LLM client disabled (no API key)");
    }
    let (llm_tx, llm_rx) = mpsc::channel(256);
    let recommender = Recommender::new(Arc::new(llm_client), llm_tx, config.llm.max_tokens);

    // 8. Spawn app logic task, start polling
    let settings = AppSettings {
        draft_id: draft_id.clone(),
        user_roster_id: seat.roster_id,
        user_draft_position: seat.draft_position,
        league: LeagueSettings {
            team_count: info.team_count,
            rounds: info.rounds,
            scoring: scoring_label(config.league.scoring).to_string(),
            superflex: config.league.superflex,
            starters: config.league.starters.clone(),
        },
        prefire_at: config.llm.prefire_at,
    };
    let mut state = AppState::new(settings, db, Some(sleeper), rankings_rx, recommender);
    state.restore(stored);

    let (draft_tx, draft_rx) = mpsc::channel(64);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);
    let app_handle = tokio::spawn(async move {
        match app::run(draft_rx, llm_rx, ui_tx, state).await {
            Ok(outcome) => info!(?outcome, "application loop finished"),
            Err(e) => error!("application loop error: {e:#}"),
        }
    });
    let watcher_handle = watcher.start(draft_tx).context("failed to start watcher")?;

    // 9. Print updates until the app loop ends
    while let Some(update) = ui_rx.recv().await {
        match update {
            UiUpdate::Status(line) | UiUpdate::Recommendation(line) => println!("{line}"),
            UiUpdate::Notice(line) => println!("> {line}"),
        }
    }

    // 10. Cleanup
    watcher.stop();
    let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = app_handle.await;
        let _ = watcher_handle.await;
    })
    .await;
    rankings_handle.abort();

    info!("draftwatch shut down cleanly");
    Ok(())
}

fn scoring_label(scoring: ScoringFormat) -> &'static str {
    match scoring {
        ScoringFormat::Standard => "standard",
        ScoringFormat::HalfPpr => "half ppr",
        ScoringFormat::Ppr => "ppr",
    }
}

/// Initialize tracing to write to a log file instead of the terminal.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("draftwatch.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("draftwatch=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
