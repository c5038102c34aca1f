// Events delivered from a watcher to its caller, and the watcher lifecycle.

use serde::{Deserialize, Serialize};

use crate::draft::tracker::{DraftDelta, StateInconsistency};
use crate::source::FetchError;

/// Lifecycle of a [`crate::watcher::DraftWatcher`].
///
/// `Idle -> Polling -> (Stopped | Faulted)`; `stop()` moves any state to
/// `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchStatus {
    Idle,
    Polling,
    Stopped,
    Faulted,
}

impl WatchStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, WatchStatus::Stopped | WatchStatus::Faulted)
    }
}

/// Why a watcher gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchFault {
    /// The fetch failed `attempts` times in a row.
    FetchFailures { attempts: u32, last_error: FetchError },
    /// The provider contradicted previously observed state.
    Inconsistent(StateInconsistency),
}

impl std::fmt::Display for WatchFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchFault::FetchFailures {
                attempts,
                last_error,
            } => write!(f, "{attempts} consecutive fetch failures, last: {last_error}"),
            WatchFault::Inconsistent(e) => write!(f, "draft state inconsistency: {e}"),
        }
    }
}

/// Events emitted by a watcher to the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftEvent {
    /// New picks were observed, or the user just went on the clock.
    Delta(DraftDelta),
    /// The provider reports the draft as complete. Final event.
    DraftComplete { total_picks: u32 },
    /// The watcher stopped because of an unrecoverable problem. Final event.
    Faulted(WatchFault),
}

impl DraftEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, DraftEvent::DraftComplete { .. } | DraftEvent::Faulted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_states() {
        assert!(!WatchStatus::Idle.is_finished());
        assert!(!WatchStatus::Polling.is_finished());
        assert!(WatchStatus::Stopped.is_finished());
        assert!(WatchStatus::Faulted.is_finished());
    }

    #[test]
    fn fault_display() {
        let fault = WatchFault::FetchFailures {
            attempts: 5,
            last_error: FetchError::RateLimited,
        };
        assert_eq!(
            fault.to_string(),
            "5 consecutive fetch failures, last: provider rate limit exceeded"
        );
        assert!(DraftEvent::Faulted(fault).is_final());
        assert!(DraftEvent::DraftComplete { total_picks: 180 }.is_final());
    }
}
