//! Context window management: accounting, trimming, and compaction.
//!
//! Three layers keep the conversation under the model's context budget:
//!
//! 1. **[`budget`]**: [`ContextBudget`] estimates usage of the outgoing
//!    window as a fraction of the configured budget.
//!
//! 2. **[`trimming`]**: [`TrimPolicy`] derives the outgoing window from
//!    canonical history (retention, tool-result compression, old-reply
//!    truncation, thinking exclusion). Pure and idempotent.
//!
//! 3. **[`compactor`]**: [`Compactor`] replaces the whole history with a
//!    model-written summary once usage crosses the threshold. The request
//!    itself is assembled by [`summarizer`].
//!
//! All three run automatically inside the
//! [`Harness`](crate::agent::harness::Harness) before every model request.

pub mod budget;
pub mod compactor;
pub mod summarizer;
pub mod trimming;

pub use budget::{ContextBudget, ContextUsage, DEFAULT_CHARS_PER_TOKEN, DEFAULT_CONTEXT_WINDOW};
pub use compactor::{CompactionConfig, CompactionOutcome, CompactionState, Compactor};
pub use summarizer::{SUMMARY_PREFIX, Summarizer, SummarizerConfig};
pub use trimming::{TrimPolicy, TrimReport};
