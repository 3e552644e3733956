//! Context management and tool-invocation loop for terminal coding agents.
//!
//! `tiller-rs` turns natural-language prompts into local file edits and shell
//! actions by brokering a turn-based conversation with any OpenAI-compatible
//! chat completions endpoint. The core abstraction is the
//! [`Harness`](agent::harness::Harness): it appends the user prompt to an
//! explicit [`Session`](agent::session::Session), trims the history to stay
//! under the context budget, sends it to the model, dispatches the tool calls
//! the model asks for, and repeats until the model answers with plain text.
//!
//! # Getting started
//!
//! ```ignore
//! use tiller_rs::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> tiller_rs::Result<()> {
//!     let client = ChatClient::new("https://api.openai.com/v1", std::env::var("KEY").unwrap())?;
//!     let config = AgentConfig::new("gpt-4o", "You are a coding assistant.");
//!     let tools = ToolDispatcher::new("/path/to/project", DispatcherConfig::default());
//!     let mut session = Session::new("/path/to/project", &config);
//!
//!     let result = Harness::new(&client, &tools, &config)
//!         .with_event_handler(&LoggingHandler)
//!         .run_turn(&mut session, "Create hello.py printing Hello", &CancellationToken::new())
//!         .await?;
//!
//!     println!("{}", result.final_text.unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Estimating context usage:** [`ContextBudget`](context::ContextBudget).
//! - **Trimming history before each send:** [`TrimPolicy`](context::TrimPolicy).
//! - **Summarizing history when the budget runs out:**
//!   [`Compactor`](context::Compactor).
//! - **Running tools:** [`ToolDispatcher`](tools::ToolDispatcher) and the closed
//!   [`ToolName`](tools::ToolName) set.
//! - **Running a turn:** [`Harness`](agent::harness::Harness); observe it through
//!   [`EventHandler`](agent::events::EventHandler).
//! - **Slash commands:** [`SlashCommand`](agent::commands::SlashCommand).
//! - **Rendering progress:** [`ui`] holds the read-only snapshot a display
//!   thread polls.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Harness loop, session, configuration, events, slash commands |
//! | [`context`] | Context budget, trimming policy, summarization, compactor |
//! | [`tools`] | Tool names, dispatcher, workspace confinement, command runner |
//! | [`ui`] | Observer snapshot and the event handler that maintains it |
//! | [`error`] | [`AgentError`] taxonomy |

pub mod agent;
pub mod context;
pub mod error;
pub mod prelude;
pub mod tools;
pub mod ui;

pub use error::{AgentError, Result};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

/// Default OpenAI-compatible endpoint (base URL, without `/chat/completions`).
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default model for all LLM calls.
pub const DEFAULT_MODEL: &str = "gpt-4o";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between typed tool arguments
/// and the `parameters` object of the function-calling API.
///
/// ```
/// use tiller_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ReadArgs {
///     path: String,
/// }
///
/// let schema = json_schema_for::<ReadArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"path".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// Thinking text is never stored here; it travels on
/// [`ChatCompletion::reasoning`] and is dropped after the step that produced it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// An assistant message requesting tool calls, with optional text
    /// emitted alongside them.
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.filter(|c| !c.is_empty()),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }

    /// The text content, or `""` when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// The tool calls carried by this message, or an empty slice.
    pub fn calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call as it appears on the wire and in history.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<RawContent>,
    tool_calls: Option<Vec<ToolCall>>,
    reasoning: Option<String>,
    reasoning_content: Option<String>,
}

/// Assistant content is either a plain string or a list of typed blocks.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<RawContentBlock>),
}

#[derive(Deserialize, Debug)]
struct RawContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    text: Option<String>,
    thinking: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type of a chat call.
///
/// `content` never contains thinking; everything recognised as reasoning is
/// moved to `reasoning`.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
    /// Reasoning / extended thinking content returned by the model.
    pub reasoning: Option<String>,
}

impl ChatCompletion {
    /// A text-only completion. Handy for test doubles.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A completion that requests the given tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Split inline `<think>…</think>` spans out of model text.
///
/// Returns the visible text and the collected thinking, if any. An unclosed
/// `<think>` swallows the rest of the text. Text without a think tag is
/// returned unchanged.
pub fn split_thinking(text: &str) -> (String, Option<String>) {
    if !text.contains(THINK_OPEN) {
        return (text.to_string(), None);
    }
    let mut visible = String::with_capacity(text.len());
    let mut thoughts: Vec<&str> = Vec::new();
    let mut rest = text;
    while let Some((before, after)) = rest.split_once(THINK_OPEN) {
        visible.push_str(before);
        match after.split_once(THINK_CLOSE) {
            Some((inner, tail)) => {
                thoughts.push(inner.trim());
                rest = tail;
            }
            None => {
                thoughts.push(after.trim());
                rest = "";
            }
        }
    }
    visible.push_str(rest);
    thoughts.retain(|t| !t.is_empty());
    let thinking = (!thoughts.is_empty()).then(|| thoughts.join("\n"));
    (visible.trim().to_string(), thinking)
}

fn join_reasoning(parts: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    let parts: Vec<String> = parts
        .into_iter()
        .flatten()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}

impl RawResponseMessage {
    /// Separate visible text from every form of thinking the endpoint may use.
    fn into_parts(self) -> (Option<String>, Vec<ToolCall>, Option<String>) {
        let mut block_thinking = None;
        let raw_text = match self.content {
            Some(RawContent::Text(s)) => s,
            Some(RawContent::Blocks(blocks)) => {
                let mut text = String::new();
                let mut thinking = String::new();
                for block in blocks {
                    if block.block_type == "thinking" {
                        thinking.push_str(block.thinking.as_deref().unwrap_or_default());
                    } else if let Some(t) = block.text {
                        text.push_str(&t);
                    }
                }
                block_thinking = Some(thinking);
                text
            }
            None => String::new(),
        };
        let (visible, inline_thinking) = split_thinking(&raw_text);
        let visible = visible.trim().to_string();
        let reasoning = join_reasoning([
            self.reasoning_content,
            self.reasoning,
            block_thinking,
            inline_thinking,
        ]);
        let content = (!visible.is_empty()).then_some(visible);
        (content, self.tool_calls.unwrap_or_default(), reasoning)
    }
}

// ── Model seam ─────────────────────────────────────────────────────

/// Boxed future returned by [`ChatModel::chat`].
pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatCompletion>> + Send + 'a>>;

/// Anything that can answer a chat completion request.
///
/// Implemented by [`ChatClient`] for real endpoints and by scripted doubles
/// in tests. Kept dyn-compatible so the harness can borrow `&dyn ChatModel`.
pub trait ChatModel: Send + Sync {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a>;
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions endpoint.
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ChatClient {
    /// Create a client for the given base URL (e.g. `https://api.openai.com/v1`).
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tiller-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// The full URL requests are posted to.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    /// Send a one-line probe and check that the model answers with text.
    pub async fn check_connection(&self, model: &str) -> Result<()> {
        let probe = ChatRequest {
            model: model.to_string(),
            messages: vec![Message::user("Say 'ok' if you can read this.")],
            max_tokens: 10,
            ..Default::default()
        };
        let completion = self.send(&probe).await?;
        match completion.content {
            Some(text) if !text.trim().is_empty() => Ok(()),
            _ => Err(AgentError::Protocol(
                "connection check returned an empty reply".into(),
            )),
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<ChatCompletion> {
        let tool_count = body.tools.as_ref().map_or(0, |t| t.len());
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            tool_count,
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(AgentError::Network(format!("endpoint returned HTTP {status}: {text}")));
        }

        parse_completion(&text)
    }
}

impl ChatModel for ChatClient {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.send(request))
    }
}

/// Decode a chat completions response body.
fn parse_completion(body: &str) -> Result<ChatCompletion> {
    let parsed: RawChatResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::Protocol(format!("failed to parse response: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(AgentError::Protocol(format!("API error: {}", err.message)));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let Some(choice) = parsed.choices.and_then(|c| c.into_iter().next()) else {
        return Err(AgentError::Protocol("response contained no choices".into()));
    };

    let (content, tool_calls, reasoning) = choice.message.into_parts();
    debug!(
        "LLM output: {} chars text, {} tool call(s)",
        content.as_ref().map_or(0, |s| s.len()),
        tool_calls.len()
    );

    Ok(ChatCompletion {
        content,
        tool_calls,
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
        reasoning,
    })
}
