//! Agent runtime: the [`Harness`] turn loop and its supporting modules.
//!
//! - [`harness::Harness`]: one user turn of the tool-use loop. Start here.
//! - [`config::AgentConfig`]: model, step limit, context budget, trimming,
//!   and compaction settings.
//! - [`session::Session`]: history, compaction count, auto-compact flag, and
//!   display mode for one interactive session.
//! - [`events`]: [`EventHandler`] trait and [`AgentEvent`] enum for
//!   observing the loop. Includes [`LoggingHandler`] and
//!   [`CompositeEventHandler`].
//! - [`commands`]: slash commands handled before input reaches the model.

pub mod commands;
pub mod config;
pub mod events;
mod execution;
pub mod harness;
pub mod session;

pub use commands::{CommandOutcome, SlashCommand};
pub use config::{AgentCompactionConfig, AgentConfig, Toggle};
pub use events::{
    AgentEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
    TurnOutcome, TurnResult,
};
pub use harness::Harness;
pub use session::{DisplayMode, Session};
