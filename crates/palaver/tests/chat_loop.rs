//! End-to-end turns through the public API with a scripted model.

use palaver::prelude::*;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Deserialize, JsonSchema)]
struct EchoArgs {
    text: String,
}

fn echo_tool(invocations: Arc<AtomicUsize>) -> FnTool {
    FnTool::new(
        ToolDef::new("echo", "Repeat the text", json_schema_for::<EchoArgs>()),
        move |args: EchoArgs| {
            let invocations = invocations.clone();
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok(format!("echo: {}", args.text))
            }
        },
    )
}

fn echo_call(id: &str, text: &str) -> ToolCall {
    let mut args = Arguments::new();
    args.insert("text".into(), serde_json::json!(text));
    ToolCall::new(id, "echo", args)
}

fn assert_well_formed(conversation: &Conversation) {
    let mut seen = std::collections::HashSet::new();
    for message in conversation.messages() {
        for call in &message.tool_calls {
            assert!(seen.insert(call.id.clone()), "duplicate call id {}", call.id);
        }
        if message.role == MessageRole::Tool {
            let id = message.tool_call_id.as_deref().unwrap_or_default();
            assert!(seen.contains(id), "orphan tool result {id}");
        }
    }
    assert!(conversation.open_calls().is_empty());
}

#[tokio::test]
async fn reply_only_turn_makes_two_messages_and_no_tool_calls() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let tools = ToolSet::new().with(echo_tool(invocations.clone()));
    let model = ScriptedModel::always(Decision::Reply("ok".into()));
    let store = MemoryStore::new();
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

    let mut conversation = store.load("s").unwrap();
    let outcome = chat.run_turn(&mut conversation, "hello").await.unwrap();

    assert_eq!(outcome.new_messages, 2);
    assert_eq!(outcome.reply, "ok");
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn echo_turn_makes_four_messages_in_order() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let tools = ToolSet::new().with(echo_tool(invocations.clone()));
    let model = ScriptedModel::new([
        Decision::ToolRequest(vec![echo_call("call-1", "hi")]),
        Decision::Reply("It said hi.".into()),
    ]);
    let store = MemoryStore::new();
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

    let mut conversation = store.load("s").unwrap();
    chat.run_turn(&mut conversation, "echo hi").await.unwrap();

    let m = conversation.messages();
    assert_eq!(m.len(), 4);
    assert_eq!(m[0], Message::user("echo hi"));
    assert_eq!(m[1].tool_calls, vec![echo_call("call-1", "hi")]);
    assert_eq!(m[2], Message::tool_result("call-1", "echo: hi"));
    assert_eq!(m[3], Message::assistant_text("It said hi."));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_well_formed(&conversation);
}

#[tokio::test]
async fn unknown_tool_keeps_the_session_usable() {
    let tools = ToolSet::new().with(echo_tool(Arc::default()));
    let model = ScriptedModel::new([
        Decision::Reply("first".into()),
        Decision::ToolRequest(vec![ToolCall::new("x", "rm_rf", Arguments::new())]),
        Decision::Reply("third".into()),
    ]);
    let store = MemoryStore::new();
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

    let mut conversation = store.load("s").unwrap();
    chat.run_turn(&mut conversation, "one").await.unwrap();
    let before = conversation.messages().to_vec();

    let err = chat.run_turn(&mut conversation, "two").await.unwrap_err();
    assert!(matches!(err, ChatError::UnknownTool { .. }));
    assert_eq!(&conversation.messages()[..2], before.as_slice());
    assert_eq!(conversation.len(), 3);

    let outcome = chat.run_turn(&mut conversation, "three").await.unwrap();
    assert_eq!(outcome.reply, "third");
    assert_well_formed(&conversation);
}

#[tokio::test]
async fn endless_tool_requests_hit_the_cycle_limit() {
    let tools = ToolSet::new().with(echo_tool(Arc::default()));
    let model = ScriptedModel::new(
        (0..20).map(|i| Decision::ToolRequest(vec![echo_call(&format!("c{i}"), "more")])),
    );
    let store = MemoryStore::new();
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default().with_max_cycles(5));

    let mut conversation = store.load("s").unwrap();
    let err = chat.run_turn(&mut conversation, "go").await.unwrap_err();

    assert!(matches!(err, ChatError::CycleLimitReached { max_cycles: 5 }));
    assert_eq!(model.call_count(), 5);
    assert_well_formed(&conversation);
}

#[tokio::test]
async fn failing_tool_result_starts_with_error_and_loop_continues() {
    let broken = FnTool::new(
        ToolDef::new("broken", "Always fails", json_schema_for::<EchoArgs>()),
        |_: EchoArgs| async { Err(ToolError::execution("disk on fire")) },
    );
    let tools = ToolSet::new().with(broken);
    let model = ScriptedModel::new([
        Decision::ToolRequest(vec![{
            let mut call = echo_call("c1", "x");
            call.name = "broken".into();
            call
        }]),
        Decision::Reply("recovered".into()),
    ]);
    let store = MemoryStore::new();
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

    let mut conversation = store.load("s").unwrap();
    let outcome = chat.run_turn(&mut conversation, "try it").await.unwrap();

    assert_eq!(conversation.messages()[2].text(), "Error: disk on fire");
    assert_eq!(outcome.reply, "recovered");
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn file_store_round_trips_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let tools = ToolSet::new().with(echo_tool(Arc::default()));
    let model = ScriptedModel::new([
        Decision::ToolRequest(vec![echo_call("c1", "persist")]),
        Decision::Reply("saved".into()),
        Decision::Reply("still here".into()),
    ]);

    let store = FileStore::new(dir.path()).unwrap();
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());
    let mut conversation = store.load("thread-1").unwrap();
    chat.run_turn(&mut conversation, "remember this").await.unwrap();

    // A fresh store sees the same history, twice over.
    let reopened = FileStore::new(dir.path()).unwrap();
    let loaded = reopened.load("thread-1").unwrap();
    assert_eq!(loaded, conversation);
    assert_eq!(loaded, reopened.load("thread-1").unwrap());

    // And the conversation continues from it.
    let chat = ChatLoop::new(&model, &tools, &reopened, LoopConfig::default());
    let mut resumed = loaded;
    chat.run_turn(&mut resumed, "still there?").await.unwrap();
    assert_eq!(resumed.len(), 6);
    assert_eq!(model.calls()[2].history_len, 5);
    assert_eq!(reopened.manifest("thread-1").unwrap().unwrap().message_count, 6);
}

#[tokio::test]
async fn cancelled_turn_is_closed_before_the_next_one() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path()).unwrap();
    let tools = ToolSet::new().with(echo_tool(Arc::default()));
    let model = ScriptedModel::new([Decision::Reply("fine".into())]);
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

    // Simulate a turn dropped after the tool request was recorded.
    let mut conversation = store.load("s").unwrap();
    for message in [
        Message::user("slow question"),
        Message::assistant_tool_calls(vec![echo_call("c1", "a"), echo_call("c2", "b")]),
    ] {
        store.append("s", &message).unwrap();
        conversation.push(message).unwrap();
    }

    assert_eq!(chat.close_pending_calls(&mut conversation).unwrap(), 2);
    chat.run_turn(&mut conversation, "next").await.unwrap();

    let reloaded = store.load("s").unwrap();
    assert_eq!(reloaded, conversation);
    assert_eq!(reloaded.messages()[2].text(), "Error: tool call cancelled");
    assert_well_formed(&reloaded);
}

#[tokio::test]
async fn resumed_session_with_unanswered_call_is_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let tools = ToolSet::new().with(echo_tool(Arc::default()));

    // A previous process wrote the tool request and died before the result.
    {
        let store = FileStore::new(dir.path()).unwrap();
        store.append("s", &Message::user("look it up")).unwrap();
        store
            .append("s", &Message::assistant_tool_calls(vec![echo_call("c1", "a")]))
            .unwrap();
    }

    let store = FileStore::new(dir.path()).unwrap();
    let mut conversation = store.load("s").unwrap();
    assert_eq!(conversation.open_calls().len(), 1);

    let model = ScriptedModel::always(Decision::Reply("where were we?".into()));
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());
    chat.run_turn(&mut conversation, "hello again").await.unwrap();

    assert_well_formed(&conversation);
    assert_eq!(model.calls()[0].history_len, 4);
    let reloaded = store.load("s").unwrap();
    assert_eq!(reloaded, conversation);
    assert_eq!(reloaded.messages()[2].text(), "Error: tool call cancelled");
    assert_eq!(reloaded.messages()[3], Message::user("hello again"));
}

/// A store whose `fail_at`-th append (1-based) fails once.
struct FlakyStore {
    inner: MemoryStore,
    appends: AtomicUsize,
    fail_at: usize,
}

impl SessionStore for FlakyStore {
    fn load(&self, session_id: &str) -> Result<Conversation, ChatError> {
        self.inner.load(session_id)
    }

    fn append(&self, session_id: &str, message: &Message) -> Result<(), ChatError> {
        if self.appends.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
            return Err(ChatError::SessionWrite {
                session_id: session_id.to_string(),
                reason: "disk full".into(),
            });
        }
        self.inner.append(session_id, message)
    }
}

#[tokio::test]
async fn write_failure_mid_batch_does_not_poison_later_turns() {
    let tools = ToolSet::new().with(echo_tool(Arc::default()));
    let model = ScriptedModel::new([
        Decision::ToolRequest(vec![echo_call("c1", "x")]),
        Decision::Reply("recovered".into()),
    ]);
    // Appends: user, assistant(tool_calls), then the tool result fails.
    let store = FlakyStore {
        inner: MemoryStore::new(),
        appends: AtomicUsize::new(0),
        fail_at: 3,
    };
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

    let mut conversation = store.load("s").unwrap();
    let err = chat.run_turn(&mut conversation, "first").await.unwrap_err();
    assert!(matches!(err, ChatError::SessionWrite { .. }));
    assert_eq!(conversation.open_calls().len(), 1);

    let outcome = chat.run_turn(&mut conversation, "second").await.unwrap();
    assert_eq!(outcome.reply, "recovered");
    assert_well_formed(&conversation);
    let roles: Vec<MessageRole> = conversation.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::User,
            MessageRole::Assistant
        ]
    );
    assert_eq!(store.load("s").unwrap(), conversation);
}
