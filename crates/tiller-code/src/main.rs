//! Terminal coding agent powered by tiller-rs.
//!
//! Reads connection settings from `~/.tiller/config.json` (or `--config`),
//! with `TILLER_API_KEY` overriding the stored key.
//!
//! ```sh
//! tiller-code --workdir /path/to/project
//! tiller-code --model gpt-4o-mini --endpoint http://localhost:8080/v1 --save-config
//! tiller-code --prompt "create hello.py printing Hello"
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use crossterm::style::Stylize;
use tiller_code::render::{ConsoleHandler, Ticker, clear_line, context_meter, turn_summary};
use tiller_code::{API_KEY_ENV, CodeConfig, ConnectionConfig};
use tiller_rs::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Terminal coding agent powered by tiller-rs.
#[derive(Parser)]
#[command(name = "tiller-code", version)]
struct Cli {
    /// Run one prompt and exit instead of starting the REPL.
    #[arg(long)]
    prompt: Option<String>,

    /// Config file path. Default: ~/.tiller/config.json.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model identifier (overrides the config file).
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible base URL (overrides the config file).
    #[arg(long)]
    endpoint: Option<String>,

    /// Context budget in tokens (overrides the config file).
    #[arg(long)]
    context_limit: Option<usize>,

    /// Working directory for file and command tools.
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Maximum model requests per turn.
    #[arg(long, default_value_t = 50)]
    max_steps: u32,

    /// Timeout for a single tool call, in seconds.
    #[arg(long, default_value_t = 30)]
    command_timeout: u64,

    /// Start with automatic compaction switched off.
    #[arg(long)]
    no_auto_compact: bool,

    /// Allow file tools to reach outside the working directory.
    #[arg(long)]
    no_confine: bool,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Skip the startup connection check.
    #[arg(long)]
    skip_check: bool,

    /// Write the resolved endpoint, key, model and context limit back to the config file.
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Error: failed to open log file: {e}");
        std::process::exit(1);
    }

    let config = match resolve_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if config.connection.api_key.is_empty() {
        eprintln!(
            "Error: no API key. Set {API_KEY_ENV} or add \"api_key\" to {}",
            config_path(&cli).display()
        );
        std::process::exit(1);
    }

    let client = match ChatClient::new(&config.connection.endpoint, &config.connection.api_key) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            std::process::exit(1);
        }
    };

    if !cli.skip_check {
        eprint!("{}", format!("connecting to {}...", config.connection.endpoint).dim());
        let _ = std::io::stderr().flush();
        let checked = client.check_connection(&config.connection.model).await;
        clear_line();
        if let Err(e) = checked {
            eprintln!("Error: connection check failed: {e}");
            std::process::exit(1);
        }
    }

    let tools = config.build_dispatcher();
    let agent_config = config.build_agent_config();
    let mut session = Session::new(&config.workdir, &agent_config);
    let ui_state = Arc::new(Mutex::new(UiState::default()));

    info!(
        "Session started: model={}, workdir={}",
        agent_config.model,
        config.workdir.display()
    );

    let repl = Repl {
        client: &client,
        tools: &tools,
        config: &agent_config,
        ui_state,
    };

    if let Some(prompt) = &cli.prompt {
        if repl.run_prompt(&mut session, prompt).await.is_err() {
            std::process::exit(1);
        }
        return;
    }

    eprintln!(
        "tiller-code {} \u{2022} {} \u{2022} {}",
        env!("CARGO_PKG_VERSION"),
        agent_config.model,
        config.workdir.display()
    );
    eprintln!("{}", "Type /help for commands, Ctrl-C to cancel a turn.".dim());
    repl.run(&mut session).await;
}

// ── Setup ─────────────────────────────────────────────────────────────

fn init_logging(verbose: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
    Ok(())
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(ConnectionConfig::default_path)
}

/// Merge the config file, environment, and flags. Flags win.
fn resolve_config(cli: &Cli) -> tiller_rs::Result<CodeConfig> {
    let path = config_path(cli);
    let mut connection =
        ConnectionConfig::load(&path)?.with_env_key(std::env::var(API_KEY_ENV).ok());
    if let Some(model) = &cli.model {
        connection.model = model.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        connection.endpoint = endpoint.clone();
    }
    if let Some(limit) = cli.context_limit {
        connection.context_limit = limit;
    }
    if cli.save_config {
        connection.save(&path)?;
        eprintln!("Saved config to {}", path.display());
    }

    let workdir = std::fs::canonicalize(&cli.workdir)
        .map_err(|e| AgentError::io(format!("invalid workdir {}", cli.workdir.display()), e))?;

    Ok(CodeConfig {
        connection,
        workdir,
        max_steps: cli.max_steps,
        command_timeout: Duration::from_secs(cli.command_timeout),
        auto_compact: !cli.no_auto_compact,
        confine_paths: !cli.no_confine,
        ..Default::default()
    })
}

// ── REPL ──────────────────────────────────────────────────────────────

struct Repl<'a> {
    client: &'a ChatClient,
    tools: &'a ToolDispatcher,
    config: &'a AgentConfig,
    ui_state: Arc<Mutex<UiState>>,
}

impl Repl<'_> {
    async fn run(&self, session: &mut Session) {
        let budget = self.config.budget();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("{} ", ">".bold());
            let _ = std::io::stdout().flush();

            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read input: {e}");
                    break;
                }
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            if let Some(command) = SlashCommand::parse(input) {
                match command.apply(session, &budget) {
                    CommandOutcome::Quit => break,
                    CommandOutcome::Reply(text) => println!("{text}"),
                }
                continue;
            }

            // Errors are already reported; the session stays usable.
            let _ = self.run_prompt(session, input).await;
        }
    }

    /// Run one turn, cancellable with Ctrl-C, and print its outcome.
    async fn run_prompt(&self, session: &mut Session, prompt: &str) -> tiller_rs::Result<()> {
        let mode = session.display_mode();
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let handler = CompositeEventHandler::new()
            .with(LoggingHandler)
            .with(UiEventHandler::new(self.ui_state.clone()))
            .with(ConsoleHandler::new(mode));
        let ticker = (mode == DisplayMode::Normal).then(|| Ticker::start(self.ui_state.clone()));

        let result = Harness::new(self.client, self.tools, self.config)
            .with_event_handler(&handler)
            .run_turn(session, prompt, &cancel)
            .await;

        if let Some(ticker) = ticker {
            ticker.stop();
        }
        watcher.abort();

        let usage = self.config.budget().estimate_usage(session.messages());
        match result {
            Ok(turn) => {
                if let Some(text) = &turn.final_text {
                    println!("{text}");
                }
                eprintln!(
                    "{}  {}",
                    turn_summary(&turn).dim(),
                    context_meter(usage.usage_pct)
                );
                Ok(())
            }
            Err(e) => {
                eprintln!("{} {e}", "Error:".red());
                Err(e)
            }
        }
    }
}
