// Recommendation requests run on their own task.
//
// Each request bumps a generation counter and aborts the previous task, so
// at most one stream is live and late output from an old request is easy
// to recognise and drop. A failed request degrades to a fixed
// "recommendation unavailable" message; it never reaches the watcher.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::{LlmClient, LlmEvent};
use crate::prompt::{self, RecommendationContext};

pub const UNAVAILABLE: &str = "recommendation unavailable";

pub const DEFAULT_MAX_TOKENS: u32 = 600;

// ---------------------------------------------------------------------------
// Recommender
// ---------------------------------------------------------------------------

pub struct Recommender {
    client: Arc<LlmClient>,
    tx: mpsc::Sender<LlmEvent>,
    max_tokens: u32,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Recommender {
    pub fn new(client: Arc<LlmClient>, tx: mpsc::Sender<LlmEvent>, max_tokens: u32) -> Self {
        Recommender {
            client,
            tx,
            max_tokens,
            generation: 0,
            task: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, event: &LlmEvent) -> bool {
        event.generation() == self.generation
    }

    /// Start a new request, superseding any in flight. Returns its
    /// generation.
    pub fn request(&mut self, context: &RecommendationContext) -> u64 {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;

        let (system, user) = prompt::build(context);
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let max_tokens = self.max_tokens;
        info!(
            generation,
            picks_until_turn = context.picks_until_turn,
            "requesting recommendation"
        );

        self.task = Some(tokio::spawn(async move {
            let result = client
                .stream_message(&system, &user, max_tokens, tx.clone(), generation)
                .await;
            if let Err(e) = result {
                warn!(generation, error = %e, "recommendation request failed");
                let _ = tx
                    .send(LlmEvent::Error {
                        message: e.to_string(),
                        generation,
                    })
                    .await;
            }
        }));
        generation
    }

    /// Abort the in-flight request, if any.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!(generation = self.generation, "cancelling recommendation");
                task.abort();
            }
        }
    }
}

impl Drop for Recommender {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ---------------------------------------------------------------------------
// Recommendation state
// ---------------------------------------------------------------------------

/// What the app shows for the current recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Recommendation {
    #[default]
    Idle,
    Pending,
    Streaming(String),
    Ready(String),
    Unavailable(String),
}

impl Recommendation {
    /// Fold an event from generation `current`. Events from any other
    /// generation are ignored; returns whether the state changed.
    pub fn apply(&mut self, event: LlmEvent, current: u64) -> bool {
        if event.generation() != current {
            debug!(
                event_generation = event.generation(),
                current, "dropping stale recommendation event"
            );
            return false;
        }
        match event {
            LlmEvent::Token { text, .. } => match self {
                Recommendation::Streaming(buf) => buf.push_str(&text),
                _ => *self = Recommendation::Streaming(text),
            },
            LlmEvent::Complete { full_text, .. } => {
                *self = if full_text.trim().is_empty() {
                    Recommendation::Unavailable("empty response".to_string())
                } else {
                    Recommendation::Ready(full_text)
                };
            }
            LlmEvent::Error { message, .. } => {
                *self = Recommendation::Unavailable(message);
            }
        }
        true
    }

    /// Display text. Unavailable always renders the fixed degraded message.
    pub fn text(&self) -> &str {
        match self {
            Recommendation::Idle => "",
            Recommendation::Pending => "thinking...",
            Recommendation::Streaming(text) | Recommendation::Ready(text) => text,
            Recommendation::Unavailable(_) => UNAVAILABLE,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Recommendation::Unavailable(_))
    }
}
