//! The interactive read-eval-print loop.
//!
//! One line of input is one turn. `quit`, `exit` and `q` end the session
//! without calling the model, blank lines are skipped, and end of input
//! ends the session cleanly. A failed turn is reported and the session
//! carries on with its history intact.

use std::io::{self, Write};

use palaver::agent::{ChatLoop, TurnOutcome};
use palaver::session::Conversation;
use palaver::ChatError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use crate::render::Renderer;

/// A classified line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    Empty,
    Message(String),
}

/// Classify one input line. Reserved words are matched case-insensitively
/// after trimming; messages keep their original text.
pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    match trimmed.to_lowercase().as_str() {
        "quit" | "exit" | "q" => Input::Quit,
        _ => Input::Message(trimmed.to_string()),
    }
}

/// How a turn ended, from the REPL's point of view.
#[derive(Debug)]
pub enum TurnResult {
    Done(TurnOutcome),
    Failed(ChatError),
    Interrupted,
}

/// Run one turn, abandoning it on Ctrl-C.
///
/// An interrupted or failed turn has its unanswered tool calls closed so
/// the next turn starts from a well-formed history.
pub async fn run_turn_interruptible(
    chat: &ChatLoop<'_>,
    conversation: &mut Conversation,
    text: &str,
) -> TurnResult {
    let result = tokio::select! {
        result = chat.run_turn(conversation, text) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    match result {
        Some(Ok(outcome)) => TurnResult::Done(outcome),
        Some(Err(e)) => {
            if let Err(close_err) = chat.close_pending_calls(conversation) {
                warn!("Failed to close tool calls after a failed turn: {close_err}");
            }
            TurnResult::Failed(e)
        }
        None => {
            if let Err(e) = chat.close_pending_calls(conversation) {
                warn!("Failed to close interrupted tool calls: {e}");
                return TurnResult::Failed(e);
            }
            TurnResult::Interrupted
        }
    }
}

/// Read lines from `input` until quit, end of input or Ctrl-C.
///
/// Only an input/output failure is returned as an error; turn failures are
/// printed and the loop continues.
pub async fn run<R, W>(
    chat: &ChatLoop<'_>,
    conversation: &mut Conversation,
    renderer: Renderer,
    input: R,
    out: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "{}", renderer.user_prompt())?;
        out.flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                writeln!(out)?;
                writeln!(out, "{}", renderer.goodbye())?;
                return Ok(());
            }
        };
        let Some(line) = line else {
            debug!("End of input");
            writeln!(out)?;
            writeln!(out, "{}", renderer.goodbye())?;
            return Ok(());
        };

        let text = match parse_input(&line) {
            Input::Quit => {
                writeln!(out, "{}", renderer.goodbye())?;
                return Ok(());
            }
            Input::Empty => continue,
            Input::Message(text) => text,
        };

        match run_turn_interruptible(chat, conversation, &text).await {
            TurnResult::Done(outcome) => writeln!(out, "{}", renderer.reply(&outcome.reply))?,
            TurnResult::Failed(e) => writeln!(out, "{}", renderer.error(&e))?,
            TurnResult::Interrupted => writeln!(out, "{}", renderer.notice("[turn interrupted]"))?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver::agent::LoopConfig;
    use palaver::model::{Decision, ScriptedModel};
    use palaver::session::{MemoryStore, SessionStore};
    use palaver::tools::ToolSet;
    use palaver::{Arguments, Message, ToolCall};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reserved_words_are_case_insensitive() {
        for word in ["quit", "EXIT", " Q ", "Quit\n"] {
            assert_eq!(parse_input(word), Input::Quit, "{word:?}");
        }
        assert_eq!(parse_input("   "), Input::Empty);
        assert_eq!(parse_input(""), Input::Empty);
        assert_eq!(
            parse_input("  quit smoking? "),
            Input::Message("quit smoking?".into())
        );
    }

    async fn drive(model: &ScriptedModel, script: &str) -> (Conversation, String) {
        let tools = ToolSet::new();
        let store = MemoryStore::new();
        let chat = ChatLoop::new(model, &tools, &store, LoopConfig::default());
        let mut conversation = store.load("repl").unwrap();
        let mut out = Vec::new();
        run(
            &chat,
            &mut conversation,
            Renderer::new(true),
            script.as_bytes(),
            &mut out,
        )
        .await
        .unwrap();
        (conversation, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn quit_never_calls_the_model() {
        let model = ScriptedModel::always(Decision::Reply("unused".into()));
        let (conversation, out) = drive(&model, "quit\nhello\n").await;
        assert_eq!(model.call_count(), 0);
        assert!(conversation.is_empty());
        assert_eq!(out, "User: Goodbye!\n");
    }

    #[tokio::test]
    async fn turns_print_replies_and_skip_blank_lines() {
        let model = ScriptedModel::new([
            Decision::Reply("Hi!".into()),
            Decision::Reply("Bye.".into()),
        ]);
        let (conversation, out) = drive(&model, "hello\n\n   \nsee you\nq\n").await;
        assert_eq!(model.call_count(), 2);
        assert_eq!(conversation.len(), 4);
        assert!(out.contains("Assistant: Hi!\n"));
        assert!(out.contains("Assistant: Bye.\n"));
        assert!(out.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn end_of_input_ends_the_session() {
        let model = ScriptedModel::always(Decision::Reply("ok".into()));
        let (conversation, out) = drive(&model, "one").await;
        assert_eq!(conversation.len(), 2);
        assert!(out.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn failed_turn_is_reported_and_session_continues() {
        let model = ScriptedModel::new([Decision::ToolRequest(vec![ToolCall::new(
            "c1",
            "nope",
            Arguments::new(),
        )])])
        .then(Decision::Reply("fine".into()));
        let (conversation, out) = drive(&model, "first\nsecond\n").await;
        assert!(out.contains("Error: model requested unknown tool 'nope'"));
        assert!(out.contains("Assistant: fine"));
        // user(first), user(second), assistant(fine)
        assert_eq!(conversation.len(), 3);
    }

    /// Fails the third append, then recovers.
    struct FlakyStore {
        inner: MemoryStore,
        appends: AtomicUsize,
    }

    impl SessionStore for FlakyStore {
        fn load(&self, session_id: &str) -> Result<Conversation, ChatError> {
            self.inner.load(session_id)
        }

        fn append(&self, session_id: &str, message: &Message) -> Result<(), ChatError> {
            if self.appends.fetch_add(1, Ordering::SeqCst) == 2 {
                return Err(ChatError::SessionWrite {
                    session_id: session_id.to_string(),
                    reason: "disk full".into(),
                });
            }
            self.inner.append(session_id, message)
        }
    }

    #[tokio::test]
    async fn failed_turn_leaves_no_open_calls() {
        let model = ScriptedModel::new([Decision::ToolRequest(vec![ToolCall::new(
            "c1",
            "echo",
            Arguments::new(),
        )])]);
        let tools = ToolSet::new().with(palaver::tools::FnTool::new(
            palaver::ToolDef::new("echo", "Echo", serde_json::json!({"type": "object"})),
            |_: serde_json::Value| async { Ok("ok".to_string()) },
        ));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            appends: AtomicUsize::new(0),
        };
        let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default());
        let mut conversation = store.load("s").unwrap();

        let result = run_turn_interruptible(&chat, &mut conversation, "go").await;
        assert!(matches!(
            result,
            TurnResult::Failed(ChatError::SessionWrite { .. })
        ));
        assert!(conversation.open_calls().is_empty());
        assert_eq!(conversation.len(), 3);
        assert_eq!(store.load("s").unwrap(), conversation);
    }
}
