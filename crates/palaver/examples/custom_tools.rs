//! Custom tools example: define domain tools with `FnTool` and
//! `ToolDescription`, and drive them with a scripted model.
//!
//! Runs offline; swap the `ScriptedModel` for a `RemoteModel` to talk to a
//! real endpoint.
//!
//! Demonstrates:
//! - Typed argument structs with `Deserialize` + `JsonSchema`
//! - Usage guidance via `ToolDescription`
//! - Conditional registration with `with_if`
//! - Composed event handlers
//!
//! # Usage
//!
//! ```bash
//! cargo run --example custom_tools
//! ```

use palaver::prelude::*;
use palaver::schemars;
use schemars::JsonSchema;
use serde::Deserialize;

// ── Typed argument structs ──────────────────────────────────────────

/// Arguments for the `lookup_word` tool.
#[derive(Deserialize, JsonSchema)]
struct LookupWordArgs {
    /// The word to look up.
    word: String,
}

/// Arguments for the `save_note` tool.
#[derive(Deserialize, JsonSchema)]
struct SaveNoteArgs {
    /// Title for the note.
    title: String,
    /// Note content (markdown).
    content: String,
}

// ── Tool constructors ───────────────────────────────────────────────

fn lookup_word_tool() -> FnTool {
    let def = ToolDescription::new("lookup_word", "Look up the definition of a word")
        .when_to_use("When the user asks about a word's meaning or etymology")
        .when_not_to_use("For translations")
        .parameters_for::<LookupWordArgs>()
        .example(
            "lookup_word(word='ephemeral')",
            "ephemeral: lasting for a very short time.",
        )
        .output_format("Plain text definition")
        .into_def();

    FnTool::new(def, |args: LookupWordArgs| async move {
        match args.word.as_str() {
            "ephemeral" => Ok("ephemeral: lasting for a very short time.".to_string()),
            other => Err(ToolError::execution(format!("no entry for '{other}'"))),
        }
    })
}

fn save_note_tool() -> FnTool {
    let def = ToolDescription::new("save_note", "Save a markdown note to the user's notebook")
        .when_to_use("When the user asks to save, remember, or write down something")
        .when_not_to_use("When the user is just asking a question; answer directly instead")
        .parameters_for::<SaveNoteArgs>()
        .into_def();

    FnTool::new(def, |args: SaveNoteArgs| async move {
        Ok(format!(
            "Saved note '{}' ({} bytes)",
            args.title,
            args.content.len()
        ))
    })
}

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    let arguments = match args {
        serde_json::Value::Object(map) => map,
        _ => Arguments::new(),
    };
    ToolCall::new(id, name, arguments)
}

// ── Main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), ChatError> {
    let notes_enabled = true;
    let tools = ToolSet::new()
        .with(lookup_word_tool())
        .with_if(notes_enabled, save_note_tool());

    // What a model might do: look the word up, save a note, then answer.
    let model = ScriptedModel::new([
        Decision::ToolRequest(vec![call(
            "call-1",
            "lookup_word",
            serde_json::json!({"word": "ephemeral"}),
        )]),
        Decision::ToolRequest(vec![call(
            "call-2",
            "save_note",
            serde_json::json!({"title": "ephemeral", "content": "Lasting a very short time."}),
        )]),
        Decision::Reply("'Ephemeral' means lasting a very short time. I saved a note.".into()),
    ]);

    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(|event| {
            if let ChatEvent::ToolResult { call, result } = event {
                eprintln!("[callback] {} -> {} bytes", call.name, result.content.len());
            }
        }));

    let store = MemoryStore::new();
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default())
        .with_event_handler(&handler);

    let mut conversation = store.load("notes")?;
    let outcome = chat
        .run_turn(
            &mut conversation,
            "Look up the word 'ephemeral' and save a note about it.",
        )
        .await?;

    println!("\n{}", outcome.reply);
    for message in conversation.messages() {
        println!("  [{}] {}", message.role, message.text());
    }
    Ok(())
}
