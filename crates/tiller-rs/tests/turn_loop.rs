//! End-to-end turns against a scripted model and a real temporary workspace.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tiller_rs::agent::{
    AgentConfig, AgentEvent, FnEventHandler, Harness, Session, TurnOutcome,
};
use tiller_rs::context::SUMMARY_PREFIX;
use tiller_rs::tools::command::CommandFuture;
use tiller_rs::tools::{CommandOutput, CommandRunner, DispatcherConfig, ToolDispatcher};
use tiller_rs::{
    AgentError, ChatCompletion, ChatFuture, ChatModel, ChatRequest, Message, MessageRole, Result,
    ToolCall, UsageInfo,
};
use tokio_util::sync::CancellationToken;

// ── Test doubles ───────────────────────────────────────────────────

/// Answers each request with the next scripted reply and records requests.
struct Scripted {
    replies: Mutex<VecDeque<Result<ChatCompletion>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Scripted {
    fn new(replies: Vec<Result<ChatCompletion>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChatModel for Scripted {
    fn chat<'a>(&'a self, request: &'a ChatRequest) -> ChatFuture<'a> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Network("script exhausted".into())));
        Box::pin(async move { next })
    }
}

/// Never answers.
struct Stalled;

impl ChatModel for Stalled {
    fn chat<'a>(&'a self, _request: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(std::future::pending())
    }
}

/// Always asks for another directory listing.
struct Looping(AtomicU32);

impl ChatModel for Looping {
    fn chat<'a>(&'a self, _request: &'a ChatRequest) -> ChatFuture<'a> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        let call = ToolCall::new(format!("call_{n}"), "list_files", "{}");
        Box::pin(async move { Ok(ChatCompletion::tool_calls(vec![call])) })
    }
}

/// Sleeps for the number of milliseconds given as the command, then echoes it.
struct SleepRunner;

impl CommandRunner for SleepRunner {
    fn run<'a>(&'a self, command: &'a str, _: &'a Path, _: Duration) -> CommandFuture<'a> {
        Box::pin(async move {
            let ms: u64 = command.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(CommandOutput {
                exit_code: Some(0),
                stdout: format!("slept {ms}"),
                stderr: String::new(),
                duration: Duration::from_millis(ms),
            })
        })
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, args.to_string())
}

fn config() -> AgentConfig {
    AgentConfig::new("test-model", "sys")
}

fn dispatcher(dir: &Path) -> ToolDispatcher {
    ToolDispatcher::new(dir, DispatcherConfig::default()).with_runner(SleepRunner)
}

fn tool_messages(session: &Session) -> Vec<&Message> {
    session
        .messages()
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .collect()
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test]
async fn creates_hello_py_and_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::new(vec![
        Ok(ChatCompletion::tool_calls(vec![call(
            "call_1",
            "write_file",
            serde_json::json!({"path": "hello.py", "content": "print('Hello')"}),
        )])),
        Ok(ChatCompletion::text("Created hello.py")),
    ]);
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);

    let result = Harness::new(&model, &tools, &config)
        .run_turn(&mut session, "create hello.py printing Hello", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.outcome, TurnOutcome::Completed);
    assert_eq!(result.final_text.as_deref(), Some("Created hello.py"));
    assert_eq!(result.steps, 2);
    assert_eq!(result.tool_calls, 1);
    assert_eq!(result.files_touched, vec!["hello.py".to_string()]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("hello.py")).unwrap(),
        "print('Hello')"
    );

    let roles: Vec<MessageRole> = session.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::Assistant
        ]
    );
    assert_eq!(session.messages()[2].tool_call_id.as_deref(), Some("call_1"));

    let requests = model.requests();
    assert_eq!(requests[0].messages[0].role, MessageRole::System);
    assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(5));
}

#[tokio::test]
async fn missing_edit_pattern_is_reported_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
    let model = Scripted::new(vec![
        Ok(ChatCompletion::tool_calls(vec![call(
            "e1",
            "edit_file",
            serde_json::json!({"path": "a.txt", "find": "absent", "replace": "x"}),
        )])),
        Ok(ChatCompletion::text("The pattern was not there.")),
    ]);
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);

    let result = Harness::new(&model, &tools, &config)
        .run_turn(&mut session, "rename absent", &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.finished());
    let tools_msgs = tool_messages(&session);
    assert_eq!(tools_msgs.len(), 1);
    assert!(
        tools_msgs[0].text().starts_with("Error: pattern not found"),
        "{}",
        tools_msgs[0].text()
    );
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hello");
    assert!(result.files_touched.is_empty());
}

#[tokio::test]
async fn tool_results_follow_call_order_regardless_of_latency() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::new(vec![
        Ok(ChatCompletion::tool_calls(vec![
            call("A", "run_command", serde_json::json!({"command": "60"})),
            call("B", "run_command", serde_json::json!({"command": "0"})),
            call("C", "run_command", serde_json::json!({"command": "20"})),
        ])),
        Ok(ChatCompletion::text("done")),
    ]);
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);

    Harness::new(&model, &tools, &config)
        .run_turn(&mut session, "run three", &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = tool_messages(&session)
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    assert!(tool_messages(&session)[0].text().contains("slept 60"));
}

/// Fills history so that the second turn's first window sits at 81% of a
/// 100-token budget: 3 (system) + 27 + 226 + 25 = 281 chars, ceil(281 / 3.5) = 81.
async fn seed_first_turn(model: &Scripted, tools: &ToolDispatcher, config: &AgentConfig, session: &mut Session) {
    Harness::new(model, tools, config)
        .run_turn(session, "build a cli", &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn compaction_at_81_percent_leaves_one_summary() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::new(vec![
        Ok(ChatCompletion::text("a".repeat(210))),
        Ok(ChatCompletion::text("Project: a CLI. Last request: add tests.")),
        Ok(ChatCompletion::text("Tests added.")),
    ]);
    let tools = dispatcher(dir.path());
    let config = config().with_context_budget(100);
    let mut session = Session::new(dir.path(), &config);
    seed_first_turn(&model, &tools, &config, &mut session).await;
    assert_eq!(session.compaction_count(), 0);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = FnEventHandler::new(move |event| {
        if let AgentEvent::CompactionStarted { context_usage, .. } = event {
            sink.lock().unwrap().push(context_usage.usage_pct);
        }
    });

    let result = Harness::new(&model, &tools, &config)
        .with_event_handler(&handler)
        .run_turn(&mut session, "add tests", &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.finished());
    assert_eq!(session.compaction_count(), 1);
    let started = seen.lock().unwrap().clone();
    assert_eq!(started.len(), 1);
    assert!((started[0] - 0.81).abs() < 1e-9, "usage was {}", started[0]);

    let summaries: Vec<&Message> = session
        .messages()
        .iter()
        .filter(|m| m.text().starts_with(SUMMARY_PREFIX))
        .collect();
    assert_eq!(summaries.len(), 1);
    assert!(session.messages()[0].text().starts_with(SUMMARY_PREFIX));
    assert_eq!(session.messages().len(), 2, "summary plus the final answer");

    let requests = model.requests();
    let summary_request = &requests[1];
    assert!(summary_request.tools.is_none());
    assert!(summary_request.messages[1].text().contains("=== FINAL USER REQUEST ===\nadd tests"));
    let main_request = &requests[2];
    assert_eq!(main_request.messages.len(), 2, "system prompt plus the summary");
}

#[tokio::test]
async fn failed_compaction_leaves_history_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::new(vec![
        Ok(ChatCompletion::text("a".repeat(210))),
        Err(AgentError::Network("summarizer unreachable".into())),
        Ok(ChatCompletion::text("Tests added.")),
    ]);
    let tools = dispatcher(dir.path());
    let config = config().with_context_budget(100);
    let mut session = Session::new(dir.path(), &config);
    seed_first_turn(&model, &tools, &config, &mut session).await;

    let failed = Arc::new(Mutex::new(Vec::new()));
    let sink = failed.clone();
    let handler = FnEventHandler::new(move |event| {
        if let AgentEvent::CompactionFailed { error } = event {
            sink.lock().unwrap().push((*error).clone());
        }
    });

    let mut expected = session.messages().to_vec();
    expected.push(Message::user("add tests"));

    let result = Harness::new(&model, &tools, &config)
        .with_event_handler(&handler)
        .run_turn(&mut session, "add tests", &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.finished());
    assert_eq!(session.compaction_count(), 0);
    assert_eq!(
        *failed.lock().unwrap(),
        vec![AgentError::Network("summarizer unreachable".into())]
    );

    // The window sent after the failure is exactly the uncompacted history.
    let requests = model.requests();
    assert_eq!(
        serde_json::to_string(&requests[2].messages[1..]).unwrap(),
        serde_json::to_string(&expected).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&session.messages()[..expected.len()]).unwrap(),
        serde_json::to_string(&expected).unwrap()
    );
}

#[tokio::test]
async fn window_never_exceeds_forty_messages() {
    let dir = tempfile::tempdir().unwrap();
    let replies = (0..25)
        .map(|i| Ok(ChatCompletion::text(format!("reply {i}"))))
        .collect();
    let model = Scripted::new(replies);
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);

    for i in 0..25 {
        Harness::new(&model, &tools, &config)
            .run_turn(&mut session, &format!("turn {i}"), &CancellationToken::new())
            .await
            .unwrap();
    }

    let requests = model.requests();
    let last = &requests[24].messages;
    assert_eq!(last.len(), 41, "system prompt plus 40 messages");
    assert_eq!(last[40].text(), "turn 24");
    assert_eq!(last[1].text(), "reply 4");
    assert!(requests.iter().all(|r| r.messages.len() <= 41));
}

#[tokio::test]
async fn cancellation_during_model_request_appends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let result = Harness::new(&Stalled, &tools, &config)
        .run_turn(&mut session, "wait forever", &cancel)
        .await
        .unwrap();

    assert_eq!(result.outcome, TurnOutcome::Cancelled);
    assert_eq!(session.messages(), &[Message::user("wait forever")]);
}

#[tokio::test]
async fn cancellation_during_dispatch_records_every_call() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::new(vec![Ok(ChatCompletion::tool_calls(vec![
        call("slow", "run_command", serde_json::json!({"command": "5000"})),
        call("next", "run_command", serde_json::json!({"command": "0"})),
    ]))]);
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = Harness::new(&model, &tools, &config)
        .run_turn(&mut session, "run", &cancel)
        .await
        .unwrap();

    assert_eq!(result.outcome, TurnOutcome::Cancelled);
    let texts: Vec<&str> = tool_messages(&session).iter().map(|m| m.text()).collect();
    assert_eq!(
        texts,
        vec!["Error: cancelled by user", "Error: skipped, turn cancelled"]
    );
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn unknown_tool_aborts_turn_with_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::new(vec![Ok(ChatCompletion::tool_calls(vec![call(
        "x",
        "delete_everything",
        serde_json::json!({}),
    )]))]);
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);

    let err = Harness::new(&model, &tools, &config)
        .run_turn(&mut session, "clean up", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, AgentError::Protocol("unknown tool 'delete_everything'".into()));
    assert_eq!(session.messages(), &[Message::user("clean up")]);
}

#[tokio::test]
async fn network_fault_keeps_committed_steps() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::new(vec![
        Ok(ChatCompletion::tool_calls(vec![call("l1", "list_files", serde_json::json!({}))])),
        Err(AgentError::Network("connection reset".into())),
    ]);
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);

    let err = Harness::new(&model, &tools, &config)
        .run_turn(&mut session, "look around", &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, AgentError::Network("connection reset".into()));
    let roles: Vec<MessageRole> = session.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant, MessageRole::Tool]);
}

#[tokio::test]
async fn step_limit_ends_the_turn() {
    let dir = tempfile::tempdir().unwrap();
    let model = Looping(AtomicU32::new(0));
    let tools = dispatcher(dir.path());
    let config = config().with_max_steps(3);
    let mut session = Session::new(dir.path(), &config);

    let result = Harness::new(&model, &tools, &config)
        .run_turn(&mut session, "explore", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.outcome, TurnOutcome::StepLimit);
    assert_eq!(result.steps, 3);
    assert_eq!(result.tool_calls, 3);
    assert!(result.final_text.is_none());
}

#[tokio::test]
async fn thinking_never_reaches_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut reply = ChatCompletion::text("<think>secret plan</think>Here you go.");
    reply.reasoning = Some("hidden reasoning".into());
    reply.usage = Some(UsageInfo {
        prompt_tokens: Some(40),
        completion_tokens: Some(8),
        total_tokens: Some(48),
    });
    let model = Scripted::new(vec![Ok(reply)]);
    let tools = dispatcher(dir.path());
    let config = config();
    let mut session = Session::new(dir.path(), &config);

    let reasoning = Arc::new(Mutex::new(Vec::new()));
    let sink = reasoning.clone();
    let handler = FnEventHandler::new(move |event| {
        if let AgentEvent::Reasoning(text) = event {
            sink.lock().unwrap().push(text.to_string());
        }
    });

    let result = Harness::new(&model, &tools, &config)
        .with_event_handler(&handler)
        .run_turn(&mut session, "explain", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.final_text.as_deref(), Some("Here you go."));
    assert_eq!(result.total_tokens(), 48);
    for message in session.messages() {
        let text = serde_json::to_string(message).unwrap();
        assert!(!text.contains("<think>"));
        assert!(!text.contains("secret plan"));
        assert!(!text.contains("hidden reasoning"));
    }
    assert_eq!(
        *reasoning.lock().unwrap(),
        vec!["hidden reasoning\nsecret plan".to_string()]
    );
}

#[tokio::test]
async fn clear_resets_compaction_count() {
    let dir = tempfile::tempdir().unwrap();
    let model = Scripted::new(vec![
        Ok(ChatCompletion::text("a".repeat(210))),
        Ok(ChatCompletion::text("summary")),
        Ok(ChatCompletion::text("ok")),
    ]);
    let tools = dispatcher(dir.path());
    let config = config().with_context_budget(100);
    let mut session = Session::new(dir.path(), &config);
    seed_first_turn(&model, &tools, &config, &mut session).await;
    Harness::new(&model, &tools, &config)
        .run_turn(&mut session, "add tests", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(session.compaction_count(), 1);

    session.clear();
    assert_eq!(session.compaction_count(), 0);
    assert!(session.messages().is_empty());
    assert!(session.auto_compact());
}
