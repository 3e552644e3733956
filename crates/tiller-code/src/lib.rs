//! Terminal coding agent powered by tiller-rs.
//!
//! `tiller-code` is an interactive REPL: each line is either a slash command
//! or a prompt that runs one agent turn against the working directory.
//!
//! # Library usage
//!
//! ```ignore
//! use tiller_code::CodeConfig;
//!
//! let config = CodeConfig::default();
//! let tools = config.build_dispatcher();
//! let agent_config = config.build_agent_config();
//! ```
//!
//! # Binary
//!
//! ```sh
//! # Interactive mode (default)
//! tiller-code --workdir /path/to/project
//!
//! # One-shot mode
//! tiller-code --prompt "Add error handling to src/main.rs"
//! ```

pub mod config;
pub mod prompt;
pub mod render;

pub use config::{API_KEY_ENV, CodeConfig, ConnectionConfig};
pub use prompt::coding_system_prompt;
