// Polling driver: owns the timing loop for one draft.
//
// Each tick fetches a snapshot (bounded by a per-attempt timeout), feeds it
// to the tracker and forwards notable deltas over an mpsc channel. Exactly
// one tick runs at a time; a slow fetch defers the next tick instead of
// overlapping it. Failed fetches back off exponentially, capped at the poll
// interval, until the consecutive-failure threshold faults the watcher.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::draft::pick::{DraftId, DraftSlot, Pick, RosterId};
use crate::draft::snapshot::{DraftSnapshot, SnapshotError};
use crate::draft::tracker::{DraftDelta, DraftTracker, TrackerConfig};
use crate::protocol::{DraftEvent, WatchFault, WatchStatus};
use crate::source::{FetchError, SnapshotSource};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-attempt fetch timeout. Shorter than the poll interval so one stalled
/// request cannot starve the loop.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(4);

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Invalid watcher configuration, reported before the watcher starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchConfigError {
    #[error("draft_id must not be empty")]
    EmptyDraftId,

    #[error("poll_interval must be greater than 0")]
    ZeroPollInterval,

    #[error("fetch_timeout must be greater than 0")]
    ZeroFetchTimeout,

    #[error("max_consecutive_failures must be greater than 0")]
    ZeroFailureThreshold,

    #[error("team_count must be greater than 0")]
    ZeroTeams,

    #[error("user_draft_position {position} is outside 1..={team_count}")]
    PositionOutOfRange { position: u32, team_count: u32 },

    #[error("roster {0} is not part of this draft")]
    UnknownRoster(RosterId),

    #[error("roster {roster} holds {mapped} in the draft, configured as {configured}")]
    PositionMismatch {
        roster: RosterId,
        configured: DraftSlot,
        mapped: DraftSlot,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("watcher can only be started from Idle, current status is {0:?}")]
    NotIdle(WatchStatus),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Backoff applied between failed fetch attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_consecutive_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` consecutive failures:
    /// `base * 2^(failures - 1)`, never more than `cap`.
    pub fn backoff(&self, failures: u32, cap: Duration) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(cap)
            .min(cap)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub draft_id: DraftId,
    pub user_roster_id: RosterId,
    pub team_count: u32,
    pub user_draft_position: DraftSlot,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
}

impl WatchConfig {
    /// Config with the default interval, timeout and retry policy.
    pub fn new(
        draft_id: DraftId,
        user_roster_id: RosterId,
        team_count: u32,
        user_draft_position: DraftSlot,
    ) -> Self {
        WatchConfig {
            draft_id,
            user_roster_id,
            team_count,
            user_draft_position,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), WatchConfigError> {
        if self.draft_id.is_empty() {
            return Err(WatchConfigError::EmptyDraftId);
        }
        if self.poll_interval.is_zero() {
            return Err(WatchConfigError::ZeroPollInterval);
        }
        if self.fetch_timeout.is_zero() {
            return Err(WatchConfigError::ZeroFetchTimeout);
        }
        if self.retry.max_consecutive_failures == 0 {
            return Err(WatchConfigError::ZeroFailureThreshold);
        }
        if self.team_count == 0 {
            return Err(WatchConfigError::ZeroTeams);
        }
        let position = self.user_draft_position.0;
        if position == 0 || position > self.team_count {
            return Err(WatchConfigError::PositionOutOfRange {
                position,
                team_count: self.team_count,
            });
        }
        if self.user_roster_id.0 == 0 {
            return Err(WatchConfigError::UnknownRoster(self.user_roster_id));
        }
        if self.fetch_timeout >= self.poll_interval {
            warn!(
                fetch_timeout = ?self.fetch_timeout,
                poll_interval = ?self.poll_interval,
                "fetch_timeout is not shorter than poll_interval; slow fetches will defer ticks"
            );
        }
        Ok(())
    }

    /// Check the configured roster against a snapshot's slot mapping, when
    /// the provider exposes one.
    pub fn verify_roster(&self, snapshot: &DraftSnapshot) -> Result<(), WatchConfigError> {
        if snapshot.slot_to_roster.is_none() {
            return Ok(());
        }
        match snapshot.slot_for_roster(self.user_roster_id) {
            None => Err(WatchConfigError::UnknownRoster(self.user_roster_id)),
            Some(mapped) if mapped != self.user_draft_position => {
                Err(WatchConfigError::PositionMismatch {
                    roster: self.user_roster_id,
                    configured: self.user_draft_position,
                    mapped,
                })
            }
            Some(_) => Ok(()),
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            user_roster_id: self.user_roster_id,
            user_draft_position: self.user_draft_position,
            team_count: self.team_count,
        }
    }
}

// ---------------------------------------------------------------------------
// DraftWatcher
// ---------------------------------------------------------------------------

/// Polls one draft and reports changes. One watcher per draft id; nothing is
/// shared between watchers.
///
/// Dropping the watcher after `start` stops the polling task at its next
/// scheduling point.
pub struct DraftWatcher<S> {
    config: WatchConfig,
    source: Option<S>,
    tracker: Option<DraftTracker>,
    status: Arc<watch::Sender<WatchStatus>>,
    progress: Arc<watch::Sender<Option<DraftDelta>>>,
    stop: watch::Sender<bool>,
}

impl<S: SnapshotSource + 'static> DraftWatcher<S> {
    /// Validate `config` and build an idle watcher.
    pub fn new(config: WatchConfig, source: S) -> Result<Self, WatchConfigError> {
        config.validate()?;
        let tracker = DraftTracker::new(config.tracker_config());
        let (status, _) = watch::channel(WatchStatus::Idle);
        let (progress, _) = watch::channel(None);
        let (stop, _) = watch::channel(false);
        Ok(DraftWatcher {
            config,
            source: Some(source),
            tracker: Some(tracker),
            status: Arc::new(status),
            progress: Arc::new(progress),
            stop,
        })
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn status(&self) -> WatchStatus {
        *self.status.borrow()
    }

    /// Receiver that observes every status transition.
    pub fn subscribe(&self) -> watch::Receiver<WatchStatus> {
        self.status.subscribe()
    }

    /// Receiver holding the delta computed by the most recent successful
    /// tick, notable or not. `None` until the first tick succeeds.
    pub fn progress(&self) -> watch::Receiver<Option<DraftDelta>> {
        self.progress.subscribe()
    }

    /// Seed the tracker with previously persisted picks. Ignored once the
    /// watcher has started.
    pub fn resume(&mut self, picks: Vec<Pick>) -> Result<(), SnapshotError> {
        match self.tracker.as_mut() {
            Some(tracker) => tracker.resume(picks),
            None => {
                warn!("resume ignored: watcher already started");
                Ok(())
            }
        }
    }

    /// Begin polling. Events are delivered on `events`; each send completes
    /// before the next tick is scheduled.
    pub fn start(&mut self, events: mpsc::Sender<DraftEvent>) -> Result<JoinHandle<()>, WatchError> {
        let current = self.status();
        if current != WatchStatus::Idle {
            return Err(WatchError::NotIdle(current));
        }
        let (Some(source), Some(tracker)) = (self.source.take(), self.tracker.take()) else {
            return Err(WatchError::NotIdle(current));
        };

        self.status.send_replace(WatchStatus::Polling);
        info!(
            draft_id = %self.config.draft_id,
            roster = %self.config.user_roster_id,
            slot = %self.config.user_draft_position,
            teams = self.config.team_count,
            "draft watcher started"
        );

        let poll = PollLoop {
            config: self.config.clone(),
            source,
            tracker,
            events,
            status: Arc::clone(&self.status),
            progress: Arc::clone(&self.progress),
            stop_rx: self.stop.subscribe(),
        };
        Ok(tokio::spawn(poll.run()))
    }

    /// Stop polling from any state. The next tick is cancelled; a fetch
    /// already in flight completes but its result is discarded, and so is an
    /// event still waiting for room on the channel.
    pub fn stop(&self) {
        self.stop.send_replace(true);
        let previous = self.status.send_replace(WatchStatus::Stopped);
        if previous != WatchStatus::Stopped {
            info!(draft_id = %self.config.draft_id, ?previous, "draft watcher stopped");
        }
    }
}

// ---------------------------------------------------------------------------
// Poll loop (runs on its own task)
// ---------------------------------------------------------------------------

enum TickOutcome {
    Continue,
    Finished(WatchStatus),
}

struct PollLoop<S> {
    config: WatchConfig,
    source: S,
    tracker: DraftTracker,
    events: mpsc::Sender<DraftEvent>,
    status: Arc<watch::Sender<WatchStatus>>,
    progress: Arc<watch::Sender<Option<DraftDelta>>>,
    stop_rx: watch::Receiver<bool>,
}

impl<S: SnapshotSource> PollLoop<S> {
    async fn run(mut self) {
        let final_status = self.poll().await;
        // A concurrent stop() wins over whatever the loop concluded.
        self.status.send_if_modified(|s| {
            if *s == WatchStatus::Stopped || *s == final_status {
                false
            } else {
                *s = final_status;
                true
            }
        });
        info!(draft_id = %self.config.draft_id, ?final_status, "draft watcher exited");
    }

    async fn poll(&mut self) -> WatchStatus {
        let mut failures: u32 = 0;

        loop {
            if self.stop_requested() {
                return WatchStatus::Stopped;
            }

            let tick_started = Instant::now();
            let result = self.fetch().await;

            if self.stop_requested() {
                debug!("stop requested during fetch; discarding tick result");
                return WatchStatus::Stopped;
            }

            let next_tick = match result {
                Ok(snapshot) => {
                    if failures > 0 {
                        info!(failures, "fetch recovered");
                    }
                    failures = 0;
                    match self.on_snapshot(snapshot).await {
                        TickOutcome::Continue => tick_started + self.config.poll_interval,
                        TickOutcome::Finished(status) => return status,
                    }
                }
                Err(err) => {
                    failures += 1;
                    let threshold = self.config.retry.max_consecutive_failures;
                    if failures >= threshold {
                        error!(failures, error = %err, "fetch failure threshold reached");
                        let fault = WatchFault::FetchFailures {
                            attempts: failures,
                            last_error: err,
                        };
                        self.deliver(DraftEvent::Faulted(fault)).await;
                        return WatchStatus::Faulted;
                    }
                    let backoff = self
                        .config
                        .retry
                        .backoff(failures, self.config.poll_interval);
                    if err.is_transient() {
                        warn!(
                            failures,
                            threshold,
                            ?backoff,
                            error = %err,
                            "snapshot fetch failed, retrying"
                        );
                    } else {
                        error!(
                            failures,
                            threshold,
                            ?backoff,
                            error = %err,
                            "snapshot fetch failed with a non-transient error, retrying"
                        );
                    }
                    Instant::now() + backoff
                }
            };

            // A tick that overran the interval schedules the next one
            // immediately; ticks never overlap.
            tokio::select! {
                _ = tokio::time::sleep_until(next_tick) => {}
                _ = self.stop_rx.wait_for(|stopped| *stopped) => {
                    return WatchStatus::Stopped;
                }
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    async fn fetch(&self) -> Result<DraftSnapshot, FetchError> {
        let timeout = self.config.fetch_timeout;
        match tokio::time::timeout(timeout, self.source.fetch_snapshot(&self.config.draft_id)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                millis: timeout.as_millis() as u64,
            }),
        }
    }

    async fn on_snapshot(&mut self, snapshot: DraftSnapshot) -> TickOutcome {
        let status = snapshot.status;
        let picks_made = snapshot.picks_made();

        let delta = match self.tracker.apply(snapshot) {
            Ok(delta) => delta,
            Err(inconsistency) => {
                error!(error = %inconsistency, "draft state inconsistency");
                self.deliver(DraftEvent::Faulted(WatchFault::Inconsistent(inconsistency)))
                    .await;
                return TickOutcome::Finished(WatchStatus::Faulted);
            }
        };

        self.progress.send_replace(Some(delta.clone()));

        if delta.is_notable() {
            if delta.became_users_turn {
                info!(pick = delta.next_user_pick, "user is on the clock");
            }
            debug!(new_picks = delta.new_picks.len(), picks_made, "delivering delta");
            if !self.deliver(DraftEvent::Delta(delta)).await {
                return TickOutcome::Finished(WatchStatus::Stopped);
            }
        }

        if status.is_terminal() {
            info!(picks_made, "draft complete");
            self.deliver(DraftEvent::DraftComplete {
                total_picks: picks_made,
            })
            .await;
            return TickOutcome::Finished(WatchStatus::Stopped);
        }

        TickOutcome::Continue
    }

    /// Send an event once the channel has room. Returns false when the
    /// receiver is gone or stop was requested before the event went out.
    async fn deliver(&mut self, event: DraftEvent) -> bool {
        let permit = tokio::select! {
            permit = self.events.reserve() => permit,
            _ = self.stop_rx.wait_for(|stopped| *stopped) => {
                debug!("stop requested while waiting on the event channel; discarding event");
                return false;
            }
        };
        let Ok(permit) = permit else {
            info!("event receiver dropped, stopping watcher");
            return false;
        };
        if self.stop_requested() {
            debug!("stop requested before send; discarding event");
            return false;
        }
        permit.send(event);
        true
    }
}
