//! The control loop: one user turn from input to reply.
//!
//! [`ChatLoop::run_turn`] appends the user message, then alternates between
//! asking the model for its next step and running the tools it requested,
//! until the model answers with plain text or the cycle bound is hit.
//! Every message is written through to the [`SessionStore`] as it is
//! appended, so a crash mid-turn leaves a well-formed prefix on disk.

use super::config::LoopConfig;
use super::events::{ChatEvent, EventHandler, NoopHandler};
use crate::error::{ChatError, ProviderError, ToolError};
use crate::model::{ChatModel, Decision};
use crate::session::{Conversation, SessionStore};
use crate::tools::core::ToolSet;
use crate::{Message, ToolCall, ToolDef};
use tracing::{debug, info, warn};

// ── Turn outcome ───────────────────────────────────────────────────

/// What a completed turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// The assistant's final text.
    pub reply: String,
    /// Model calls made during the turn.
    pub cycles: usize,
    /// Tool invocations made during the turn.
    pub tool_calls: usize,
    /// Messages appended during the turn, the user message included.
    pub new_messages: usize,
}

enum LoopState {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
}

// ── ChatLoop ───────────────────────────────────────────────────────

/// Drives a conversation through model decisions and tool executions.
///
/// Borrows its collaborators; build one per session (or per turn, it is
/// cheap) after binding the model, tools and store to locals:
///
/// ```ignore
/// let model = RemoteModel::new(ChatClient::new(key)?, DEFAULT_MODEL);
/// let tools = ToolSet::new().with(WebSearch::from_env(SearchBackend::Tavily)?);
/// let store = MemoryStore::new();
/// let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());
///
/// let mut conversation = store.load("thread-1")?;
/// let outcome = chat.run_turn(&mut conversation, "What's new in Rust?").await?;
/// println!("Assistant: {}", outcome.reply);
/// ```
pub struct ChatLoop<'a> {
    model: &'a dyn ChatModel,
    tools: &'a ToolSet,
    store: &'a dyn SessionStore,
    config: LoopConfig,
    event_handler: &'a dyn EventHandler,
}

impl<'a> ChatLoop<'a> {
    pub fn new(
        model: &'a dyn ChatModel,
        tools: &'a ToolSet,
        store: &'a dyn SessionStore,
        config: LoopConfig,
    ) -> Self {
        Self {
            model,
            tools,
            store,
            config,
            event_handler: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run one user turn to completion.
    ///
    /// Tool calls left open by an earlier turn (a failed store write, or a
    /// process killed mid-batch and resumed from disk) are closed first, so
    /// the user message never follows an unanswered call.
    ///
    /// On success the conversation ends with the assistant's reply. On error
    /// everything appended before the failure stays in place (the user
    /// message included) and every tool call that was appended has its
    /// result, unless the store itself failed; an unknown tool or a failed
    /// model call appends nothing for the failing step.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        input: &str,
    ) -> Result<TurnOutcome, ChatError> {
        self.emit(ChatEvent::TurnStarted {
            session_id: conversation.session_id(),
            input,
        });
        self.close_pending_calls(conversation)?;
        let start_len = conversation.len();
        self.append(conversation, Message::user(input))?;

        let definitions = self.tools.definitions();
        let max_cycles = self.config.max_cycles;
        let mut cycles = 0;
        let mut tool_calls = 0;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if cycles >= max_cycles {
                        self.emit(ChatEvent::CycleLimitReached { max_cycles });
                        return Err(ChatError::CycleLimitReached { max_cycles });
                    }
                    cycles += 1;
                    self.emit(ChatEvent::CycleStart {
                        cycle: cycles,
                        max_cycles,
                    });

                    let decision = match self.decide(conversation.messages(), &definitions).await {
                        Ok(decision) => decision,
                        Err(e) => {
                            self.emit(ChatEvent::ModelError(&e));
                            return Err(e.into());
                        }
                    };

                    match decision {
                        Decision::Reply(text) => {
                            self.append(conversation, Message::assistant_text(text.clone()))?;
                            LoopState::Done(text)
                        }
                        Decision::ToolRequest(calls) if calls.is_empty() => {
                            warn!("Model requested an empty tool batch; treating as empty reply");
                            self.append(conversation, Message::assistant_text(""))?;
                            LoopState::Done(String::new())
                        }
                        Decision::ToolRequest(calls) => {
                            self.tools.validate_calls(&calls)?;
                            self.emit(ChatEvent::ToolCallsReceived {
                                cycle: cycles,
                                count: calls.len(),
                            });
                            self.append(conversation, Message::assistant_tool_calls(calls.clone()))?;
                            LoopState::ExecutingTools(calls)
                        }
                    }
                }

                LoopState::ExecutingTools(calls) => {
                    for call in &calls {
                        self.emit(ChatEvent::ToolExecuting { call });
                        let result = self.tools.execute(call).await?;
                        self.emit(ChatEvent::ToolResult {
                            call,
                            result: &result,
                        });
                        self.append(conversation, result.into_message())?;
                        tool_calls += 1;
                    }
                    LoopState::AwaitingModel
                }

                LoopState::Done(reply) => {
                    self.emit(ChatEvent::Reply(&reply));
                    let new_messages = conversation.len() - start_len;
                    info!(
                        "Turn finished: {cycles} cycle(s), {tool_calls} tool call(s), {new_messages} new message(s)"
                    );
                    return Ok(TurnOutcome {
                        reply,
                        cycles,
                        tool_calls,
                        new_messages,
                    });
                }
            };
        }
    }

    /// Answer every open tool call with a cancellation result.
    ///
    /// Call this after a turn was dropped mid-flight (e.g. on Ctrl-C) or a
    /// session was loaded, so the history stays well-formed for the next
    /// turn. [`run_turn`](Self::run_turn) does it on entry as well. Returns
    /// how many results were appended.
    pub fn close_pending_calls(&self, conversation: &mut Conversation) -> Result<usize, ChatError> {
        let open: Vec<String> = conversation
            .open_calls()
            .iter()
            .map(|c| c.id.clone())
            .collect();
        for call_id in &open {
            debug!("Closing interrupted tool call {call_id}");
            self.append(
                conversation,
                Message::tool_result(call_id.as_str(), ToolError::Cancelled.to_string()),
            )?;
        }
        if !open.is_empty() {
            info!("Closed {} interrupted tool call(s)", open.len());
        }
        Ok(open.len())
    }

    async fn decide(&self, history: &[Message], tools: &[ToolDef]) -> Result<Decision, ProviderError> {
        debug!(
            "Asking {} ({} messages, {} tools)",
            self.model.name(),
            history.len(),
            tools.len()
        );
        match self.config.model_timeout {
            Some(limit) => tokio::time::timeout(limit, self.model.decide(history, tools))
                .await
                .map_err(|_| ProviderError::Timeout(limit))?,
            None => self.model.decide(history, tools).await,
        }
    }

    /// Validate, write through to the store, then apply in memory.
    fn append(&self, conversation: &mut Conversation, message: Message) -> Result<(), ChatError> {
        conversation.check(&message)?;
        self.store.append(conversation.session_id(), &message)?;
        conversation.push(message)
    }

    fn emit(&self, event: ChatEvent<'_>) {
        self.event_handler.on_event(&event);
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::FnEventHandler;
    use crate::model::ScriptedModel;
    use crate::session::MemoryStore;
    use crate::tools::core::tests::{EchoTool, FailTool, echo_call};
    use crate::{Arguments, MessageRole};
    use std::sync::Mutex;
    use std::time::Duration;

    fn tools() -> ToolSet {
        ToolSet::new().with(EchoTool).with(FailTool)
    }

    #[tokio::test]
    async fn plain_reply_appends_two_messages() {
        let model = ScriptedModel::always(Decision::Reply("ok".into()));
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = Conversation::new("s");
        let outcome = chat.run_turn(&mut c, "hi").await.unwrap();

        assert_eq!(outcome.reply, "ok");
        assert_eq!(outcome.cycles, 1);
        assert_eq!(outcome.tool_calls, 0);
        assert_eq!(outcome.new_messages, 2);
        assert_eq!(c.messages()[0], Message::user("hi"));
        assert_eq!(c.messages()[1], Message::assistant_text("ok"));
        assert_eq!(model.calls()[0].tool_names, vec!["echo", "fail"]);
    }

    #[tokio::test]
    async fn tool_request_then_reply() {
        let model = ScriptedModel::new([
            Decision::ToolRequest(vec![echo_call("c1", "pong")]),
            Decision::Reply("done".into()),
        ]);
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = Conversation::new("s");
        let outcome = chat.run_turn(&mut c, "ping").await.unwrap();

        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.tool_calls, 1);
        let roles: Vec<MessageRole> = c.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::Tool,
                MessageRole::Assistant
            ]
        );
        assert_eq!(c.messages()[2], Message::tool_result("c1", "pong"));
        // The second model call saw the tool result.
        assert_eq!(model.calls()[1].history_len, 3);
    }

    #[tokio::test]
    async fn unknown_tool_leaves_only_the_user_message() {
        let model = ScriptedModel::new([Decision::ToolRequest(vec![
            echo_call("c1", "a"),
            ToolCall::new("c2", "teleport", Arguments::new()),
        ])]);
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = Conversation::new("s");
        let err = chat.run_turn(&mut c, "go").await.unwrap_err();
        assert!(matches!(err, ChatError::UnknownTool { ref name } if name == "teleport"));
        assert_eq!(c.messages(), &[Message::user("go")]);
        assert_eq!(store.load("s").unwrap(), c);
    }

    #[tokio::test]
    async fn cycle_limit_counts_model_calls() {
        let model = ScriptedModel::new(
            (0..10).map(|i| Decision::ToolRequest(vec![echo_call(&format!("c{i}"), "again")])),
        );
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default().with_max_cycles(3));

        let mut c = Conversation::new("s");
        let err = chat.run_turn(&mut c, "loop").await.unwrap_err();
        assert!(matches!(err, ChatError::CycleLimitReached { max_cycles: 3 }));
        assert_eq!(model.call_count(), 3);
        // user + 3 × (assistant, tool); every call answered.
        assert_eq!(c.len(), 7);
        assert!(c.open_calls().is_empty());
    }

    #[tokio::test]
    async fn failing_tool_feeds_error_back_to_model() {
        let model = ScriptedModel::new([
            Decision::ToolRequest(vec![ToolCall::new("c1", "fail", Arguments::new())]),
            Decision::Reply("sorry".into()),
        ]);
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = Conversation::new("s");
        let outcome = chat.run_turn(&mut c, "try").await.unwrap();
        assert_eq!(outcome.reply, "sorry");
        assert!(c.messages()[2].text().starts_with("Error:"));
    }

    #[tokio::test]
    async fn provider_error_keeps_user_message() {
        let model = ScriptedModel::default().then_fail(ProviderError::Http {
            status: 401,
            body: "bad key".into(),
        });
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = Conversation::new("s");
        let err = chat.run_turn(&mut c, "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(ProviderError::Http { status: 401, .. })));
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn empty_tool_batch_is_an_empty_reply() {
        let model = ScriptedModel::new([Decision::ToolRequest(vec![])]);
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = Conversation::new("s");
        let outcome = chat.run_turn(&mut c, "?").await.unwrap();
        assert_eq!(outcome.reply, "");
        assert_eq!(c.len(), 2);
    }

    #[tokio::test]
    async fn writes_through_to_the_store() {
        let model = ScriptedModel::new([
            Decision::ToolRequest(vec![echo_call("c1", "x")]),
            Decision::Reply("y".into()),
        ]);
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = store.load("thread").unwrap();
        chat.run_turn(&mut c, "q").await.unwrap();
        assert_eq!(store.load("thread").unwrap(), c);
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let model = ScriptedModel::new([
            Decision::ToolRequest(vec![echo_call("c1", "x")]),
            Decision::Reply("y".into()),
        ]);
        let tools = tools();
        let store = MemoryStore::new();
        let log = Mutex::new(Vec::new());
        let handler = FnEventHandler::new(|event| {
            let tag = match event {
                ChatEvent::TurnStarted { .. } => "turn",
                ChatEvent::CycleStart { .. } => "cycle",
                ChatEvent::ToolCallsReceived { .. } => "calls",
                ChatEvent::ToolExecuting { .. } => "exec",
                ChatEvent::ToolResult { .. } => "result",
                ChatEvent::Reply(_) => "reply",
                ChatEvent::ModelError(_) => "error",
                ChatEvent::CycleLimitReached { .. } => "limit",
            };
            log.lock().unwrap().push(tag);
        });
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default())
            .with_event_handler(&handler);

        let mut c = Conversation::new("s");
        chat.run_turn(&mut c, "q").await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["turn", "cycle", "calls", "exec", "result", "cycle", "reply"]
        );
    }

    struct StalledModel;

    impl ChatModel for StalledModel {
        fn decide<'a>(&'a self, _: &'a [Message], _: &'a [ToolDef]) -> crate::model::ModelFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Decision::Reply("late".into()))
            })
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn model_timeout_is_a_provider_error() {
        let tools = tools();
        let store = MemoryStore::new();
        let config = LoopConfig::default().with_model_timeout(Some(Duration::from_millis(20)));
        let chat = ChatLoop::new(&StalledModel, &tools, &store, config);

        let mut c = Conversation::new("s");
        let err = chat.run_turn(&mut c, "q").await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(ProviderError::Timeout(_))));
    }

    #[test]
    fn close_pending_calls_answers_open_calls() {
        let model = ScriptedModel::default();
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = Conversation::new("s");
        c.push(Message::user("q")).unwrap();
        c.push(Message::assistant_tool_calls(vec![
            echo_call("c1", "a"),
            echo_call("c2", "b"),
        ]))
        .unwrap();
        c.push(Message::tool_result("c1", "a")).unwrap();

        assert_eq!(chat.close_pending_calls(&mut c).unwrap(), 1);
        assert!(c.open_calls().is_empty());
        assert_eq!(c.messages()[3], Message::tool_result("c2", "Error: tool call cancelled"));
        assert_eq!(chat.close_pending_calls(&mut c).unwrap(), 0);
    }

    #[tokio::test]
    async fn run_turn_closes_calls_left_open() {
        let model = ScriptedModel::always(Decision::Reply("back".into()));
        let tools = tools();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());

        let mut c = Conversation::new("s");
        c.push(Message::user("q")).unwrap();
        c.push(Message::assistant_tool_calls(vec![echo_call("c1", "a")]))
            .unwrap();

        let outcome = chat.run_turn(&mut c, "again").await.unwrap();
        assert_eq!(outcome.new_messages, 2);
        assert_eq!(c.messages()[2], Message::tool_result("c1", "Error: tool call cancelled"));
        assert_eq!(c.messages()[3], Message::user("again"));
        assert!(c.open_calls().is_empty());
        // The model saw the closed history.
        assert_eq!(model.calls()[0].history_len, 4);
    }
}
