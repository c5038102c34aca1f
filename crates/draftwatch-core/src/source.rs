// Snapshot source abstraction and the failure kinds a fetch can report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::draft::pick::DraftId;
use crate::draft::snapshot::DraftSnapshot;

/// Why a single snapshot fetch failed. Provider-specific codes (HTTP 429,
/// 5xx, ...) are mapped onto these kinds at the source boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("provider returned HTTP {status}")]
    Http { status: u16 },

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unknown draft id {0}")]
    UnknownDraft(String),
}

impl FetchError {
    /// Whether a later attempt could plausibly succeed. The watcher retries
    /// every kind up to the failure threshold; non-transient ones are
    /// logged at error level.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_)
                | FetchError::Timeout { .. }
                | FetchError::RateLimited
                | FetchError::Http { .. }
        )
    }
}

/// Abstraction over draft providers (Sleeper, a mock backend, test fakes).
///
/// Implementations perform network I/O only: no retries and no shared state
/// mutation. They must never turn a failure into an empty snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current snapshot of `draft_id`.
    async fn fetch_snapshot(&self, draft_id: &DraftId) -> Result<DraftSnapshot, FetchError>;
}

#[async_trait]
impl<T: SnapshotSource + ?Sized> SnapshotSource for std::sync::Arc<T> {
    async fn fetch_snapshot(&self, draft_id: &DraftId) -> Result<DraftSnapshot, FetchError> {
        (**self).fetch_snapshot(draft_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(FetchError::Network("reset".into()).is_transient());
        assert!(FetchError::Timeout { millis: 4000 }.is_transient());
        assert!(FetchError::RateLimited.is_transient());
        assert!(FetchError::Http { status: 503 }.is_transient());
        assert!(!FetchError::Malformed("eof".into()).is_transient());
        assert!(!FetchError::UnknownDraft("D1".into()).is_transient());
    }

    #[test]
    fn display_names_status() {
        assert_eq!(
            FetchError::Http { status: 502 }.to_string(),
            "provider returned HTTP 502"
        );
    }
}
