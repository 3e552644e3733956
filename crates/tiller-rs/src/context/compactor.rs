//! The compaction state machine.
//!
//! When the outgoing window reaches the usage threshold, the compactor asks
//! the model to summarize the conversation and replaces the entire history
//! with one summary message. A session can compact at most
//! [`CompactionConfig::max_compactions`] times before the compactor is
//! exhausted and the user has to `/clear` the session.
//!
//! ```text
//!            toggle                     usage >= threshold
//!  Disabled <──────> Enabled ──────────────────────────────> Compacting
//!                      ^  ^                                     │
//!                      │  └──── failure (history untouched) ────┤
//!                      └─────── success, count < max ───────────┤
//!                    Exhausted <──── success, count == max ─────┘
//! ```
//!
//! The state is derived from the enable flag, the compaction count, and
//! whether a request is in flight, so toggling never loses the count.

use crate::context::budget::ContextUsage;
use crate::context::summarizer::{Summarizer, SummarizerConfig};
use crate::{AgentError, ChatModel, Message, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Configuration for automatic compaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionConfig {
    /// Usage fraction at which compaction fires.
    pub threshold: f64,
    /// Maximum compactions per session.
    pub max_compactions: u32,
    /// Settings for the summarization request.
    pub summarizer: SummarizerConfig,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.80,
            max_compactions: 3,
            summarizer: SummarizerConfig::default(),
        }
    }
}

/// Observable state of the compactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionState {
    Disabled,
    Enabled,
    Compacting,
    Exhausted,
}

impl std::fmt::Display for CompactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompactionState::Disabled => "disabled",
            CompactionState::Enabled => "enabled",
            CompactionState::Compacting => "compacting",
            CompactionState::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// Result of a compaction attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// History was replaced by a summary.
    Compacted {
        /// Messages the summary replaced.
        replaced: usize,
        /// Compactions performed so far in this session.
        count: u32,
    },
    /// The user cancelled while the summary was being generated.
    Cancelled,
}

/// Drives summarization-based compaction for one session.
#[derive(Debug, Clone)]
pub struct Compactor {
    config: CompactionConfig,
    summarizer: Summarizer,
    enabled: bool,
    count: u32,
    in_flight: bool,
    /// Set after a failed attempt; cleared at the start of the next turn.
    suppressed: bool,
    /// Whether the exhausted notice has been issued this turn.
    exhausted_noticed: bool,
}

impl Compactor {
    pub fn new(config: CompactionConfig, enabled: bool) -> Self {
        let summarizer = Summarizer::new(config.summarizer.clone());
        Self {
            config,
            summarizer,
            enabled,
            count: 0,
            in_flight: false,
            suppressed: false,
            exhausted_noticed: false,
        }
    }

    pub fn state(&self) -> CompactionState {
        if self.in_flight {
            CompactionState::Compacting
        } else if !self.enabled {
            CompactionState::Disabled
        } else if self.count >= self.config.max_compactions {
            CompactionState::Exhausted
        } else {
            CompactionState::Enabled
        }
    }

    /// Compactions performed so far in this session.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Whether auto-compaction is switched on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Flip `Disabled <-> Enabled`. The compaction count is preserved.
    /// Returns the new enable flag.
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Forget all compactions, as after `/clear`. The enable flag is kept.
    pub fn reset(&mut self) {
        self.count = 0;
        self.suppressed = false;
        self.exhausted_noticed = false;
    }

    /// Clear per-turn bookkeeping. Called at the start of every turn.
    pub fn begin_turn(&mut self) {
        self.suppressed = false;
        self.exhausted_noticed = false;
    }

    /// Whether the compactor should fire for this usage snapshot.
    pub fn should_compact(&self, usage: &ContextUsage) -> bool {
        self.state() == CompactionState::Enabled
            && !self.suppressed
            && usage.usage_pct >= self.config.threshold
    }

    /// Returns `true` exactly once per turn when the budget is breached but
    /// the compactor is exhausted.
    pub fn take_exhausted_notice(&mut self, usage: &ContextUsage) -> bool {
        if self.state() == CompactionState::Exhausted
            && usage.usage_pct >= self.config.threshold
            && !self.exhausted_noticed
        {
            self.exhausted_noticed = true;
            return true;
        }
        false
    }

    /// Summarize `history` with one model request and replace it with the
    /// summary message.
    ///
    /// The replacement is all-or-nothing: on any error or on cancellation
    /// `history` is left exactly as it was. A failed attempt suppresses
    /// further attempts until [`begin_turn`](Self::begin_turn).
    pub async fn compact(
        &mut self,
        model: &dyn ChatModel,
        main_model: &str,
        history: &mut Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<CompactionOutcome> {
        if self.state() != CompactionState::Enabled {
            return Err(AgentError::State(format!(
                "cannot compact while compactor is {}",
                self.state()
            )));
        }

        let request = self.summarizer.build_request(main_model, history);
        info!(
            "Compacting {} messages (compaction {} of {})",
            history.len(),
            self.count + 1,
            self.config.max_compactions
        );

        self.in_flight = true;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = model.chat(&request) => Some(r),
        };
        self.in_flight = false;

        let summary = match response {
            None => return Ok(CompactionOutcome::Cancelled),
            Some(Ok(completion)) => completion.content.unwrap_or_default(),
            Some(Err(e)) => {
                warn!("Compaction request failed: {e}");
                self.suppressed = true;
                return Err(e);
            }
        };

        if summary.trim().is_empty() {
            warn!("Compaction returned an empty summary");
            self.suppressed = true;
            return Err(AgentError::Protocol("summarization returned no text".into()));
        }

        let replaced = history.len();
        *history = vec![Summarizer::summary_message(&summary)];
        self.count += 1;
        info!(
            "Compaction {} replaced {replaced} messages with a summary",
            self.count
        );

        Ok(CompactionOutcome::Compacted {
            replaced,
            count: self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatCompletion, ChatFuture, ChatRequest};
    use std::sync::Mutex;

    /// Answers each request with the next scripted reply.
    struct Scripted(Mutex<Vec<Result<ChatCompletion>>>);

    impl Scripted {
        fn new(mut replies: Vec<Result<ChatCompletion>>) -> Self {
            replies.reverse();
            Self(Mutex::new(replies))
        }
    }

    impl ChatModel for Scripted {
        fn chat<'a>(&'a self, _request: &'a ChatRequest) -> ChatFuture<'a> {
            let next = self
                .0
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(AgentError::Network("script exhausted".into())));
            Box::pin(async move { next })
        }
    }

    fn usage(pct: f64) -> ContextUsage {
        ContextUsage {
            estimated_tokens: 0,
            max_tokens: 100,
            usage_pct: pct,
        }
    }

    fn history() -> Vec<Message> {
        vec![
            Message::user("build a cli"),
            Message::assistant_text("done"),
            Message::user("add tests"),
        ]
    }

    #[test]
    fn triggers_only_at_threshold_when_enabled() {
        let mut c = Compactor::new(CompactionConfig::default(), true);
        assert!(!c.should_compact(&usage(0.79)));
        assert!(c.should_compact(&usage(0.80)));
        assert!(c.should_compact(&usage(0.81)));
        c.toggle();
        assert_eq!(c.state(), CompactionState::Disabled);
        assert!(!c.should_compact(&usage(0.95)));
    }

    #[tokio::test]
    async fn success_replaces_history_with_one_summary() {
        let model = Scripted::new(vec![Ok(ChatCompletion::text("Project: CLI. Last: add tests"))]);
        let mut c = Compactor::new(CompactionConfig::default(), true);
        let mut h = history();

        let outcome = c
            .compact(&model, "m", &mut h, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, CompactionOutcome::Compacted { replaced: 3, count: 1 });
        assert_eq!(h.len(), 1);
        assert!(h[0].text().starts_with("[Conversation summary]"));
        assert_eq!(c.count(), 1);
        assert_eq!(c.state(), CompactionState::Enabled);
    }

    #[tokio::test]
    async fn failure_leaves_history_byte_identical() {
        let model = Scripted::new(vec![Err(AgentError::Network("down".into()))]);
        let mut c = Compactor::new(CompactionConfig::default(), true);
        let mut h = history();
        let before = serde_json::to_string(&h).unwrap();

        let err = c
            .compact(&model, "m", &mut h, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, AgentError::Network("down".into()));
        assert_eq!(serde_json::to_string(&h).unwrap(), before);
        assert_eq!(c.count(), 0);
        assert_eq!(c.state(), CompactionState::Enabled);
        assert!(!c.should_compact(&usage(0.9)), "no retry within the turn");
        c.begin_turn();
        assert!(c.should_compact(&usage(0.9)));
    }

    #[tokio::test]
    async fn empty_summary_is_a_protocol_error() {
        let model = Scripted::new(vec![Ok(ChatCompletion::text("   "))]);
        let mut c = Compactor::new(CompactionConfig::default(), true);
        let mut h = history();
        let err = c
            .compact(&model, "m", &mut h, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Protocol(_)));
        assert_eq!(h, history());
    }

    #[tokio::test]
    async fn cancellation_leaves_history_untouched() {
        let model = Scripted::new(vec![Ok(ChatCompletion::text("summary"))]);
        let mut c = Compactor::new(CompactionConfig::default(), true);
        let mut h = history();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = c.compact(&model, "m", &mut h, &cancel).await.unwrap();
        assert_eq!(outcome, CompactionOutcome::Cancelled);
        assert_eq!(h, history());
        assert_eq!(c.state(), CompactionState::Enabled);
    }

    #[tokio::test]
    async fn count_never_exceeds_max() {
        let replies = (0..6).map(|i| Ok(ChatCompletion::text(format!("s{i}")))).collect();
        let model = Scripted::new(replies);
        let mut c = Compactor::new(CompactionConfig::default(), true);
        let mut h = history();

        for _ in 0..6 {
            c.begin_turn();
            if c.should_compact(&usage(0.99)) {
                c.compact(&model, "m", &mut h, &CancellationToken::new())
                    .await
                    .unwrap();
            }
            assert!(c.count() <= 3);
        }
        assert_eq!(c.count(), 3);
        assert_eq!(c.state(), CompactionState::Exhausted);

        let err = c
            .compact(&model, "m", &mut h, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::State(_)));
    }

    #[test]
    fn toggle_preserves_count() {
        let mut c = Compactor::new(CompactionConfig::default(), true);
        c.count = 2;
        assert!(!c.toggle());
        assert!(c.toggle());
        assert_eq!(c.count(), 2);
        assert_eq!(c.state(), CompactionState::Enabled);
    }

    #[test]
    fn exhausted_notice_fires_once_per_turn() {
        let mut c = Compactor::new(CompactionConfig::default(), true);
        c.count = 3;
        assert!(c.take_exhausted_notice(&usage(0.85)));
        assert!(!c.take_exhausted_notice(&usage(0.90)));
        c.begin_turn();
        assert!(c.take_exhausted_notice(&usage(0.85)));
        c.reset();
        assert_eq!(c.state(), CompactionState::Enabled);
    }
}
