//! Line-oriented terminal output.
//!
//! Everything the REPL prints goes through a [`Renderer`], which either
//! styles lines with crossterm or leaves them plain. Formatting is kept in
//! pure functions returning `String` so it can be tested without a
//! terminal.

use crossterm::style::Stylize;
use palaver::agent::{ChatEvent, EventHandler};
use palaver::session::SessionManifest;
use palaver::ToolCall;

/// Width budget for argument summaries and result previews.
const PREVIEW_MAX: usize = 100;

// ── Helpers ─────────────────────────────────────────────────────────

/// Truncate to at most `max` bytes on a char boundary, appending "..." if cut.
pub fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let cut = (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
    format!("{}...", s.get(..cut).unwrap_or_default())
}

/// Summarize tool arguments into a compact `key=value` form.
pub fn summarize_args(call: &ToolCall, max_len: usize) -> String {
    let parts: Vec<String> = call
        .arguments
        .iter()
        .map(|(k, v)| {
            let val = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{k}={val}")
        })
        .collect();
    truncate_str(&parts.join(", "), max_len)
}

/// First non-empty line of a tool result, truncated.
pub fn result_preview(raw: &str, max_len: usize) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    truncate_str(line.trim(), max_len)
}

// ── Renderer ────────────────────────────────────────────────────────

/// Formats REPL output, styled or plain.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    plain: bool,
}

impl Renderer {
    pub fn new(plain: bool) -> Self {
        Self { plain }
    }

    pub fn user_prompt(&self) -> String {
        if self.plain {
            "User: ".to_string()
        } else {
            format!("{} ", "User:".bold().green())
        }
    }

    pub fn reply(&self, text: &str) -> String {
        if self.plain {
            format!("Assistant: {text}")
        } else {
            format!("{} {text}", "Assistant:".bold().cyan())
        }
    }

    pub fn tool_call(&self, call: &ToolCall) -> String {
        let args = summarize_args(call, PREVIEW_MAX);
        if self.plain {
            format!(">> {}  {args}", call.name)
        } else {
            format!(
                "{} {}",
                format!(">> {}", call.name).yellow(),
                args.dark_grey()
            )
        }
    }

    pub fn tool_result(&self, call: &ToolCall, content: &str, is_error: bool) -> String {
        let preview = result_preview(content, PREVIEW_MAX);
        if self.plain {
            return format!("<< {}  {preview}", call.name);
        }
        let line = format!("<< {}  {preview}", call.name);
        if is_error {
            line.red().to_string()
        } else {
            line.dark_grey().to_string()
        }
    }

    pub fn error(&self, message: impl std::fmt::Display) -> String {
        if self.plain {
            format!("Error: {message}")
        } else {
            format!("{} {message}", "Error:".bold().red())
        }
    }

    pub fn notice(&self, text: &str) -> String {
        if self.plain {
            text.to_string()
        } else {
            text.dark_grey().to_string()
        }
    }

    pub fn goodbye(&self) -> String {
        "Goodbye!".to_string()
    }

    /// One line of `--list-sessions` output.
    pub fn session_line(&self, manifest: &SessionManifest) -> String {
        let when = manifest.updated_at.format("%Y-%m-%d %H:%M");
        let preview = truncate_str(&manifest.preview.replace('\n', " "), 60);
        let id = if self.plain {
            manifest.session_id.clone()
        } else {
            manifest.session_id.as_str().bold().to_string()
        };
        format!("{id}  {when}  {:>3} msgs  {preview}", manifest.message_count)
    }
}

// ── Event handler ───────────────────────────────────────────────────

/// Prints tool-usage notices as the loop runs tools.
pub struct ToolNotices {
    renderer: Renderer,
}

impl ToolNotices {
    pub fn new(renderer: Renderer) -> Self {
        Self { renderer }
    }
}

impl EventHandler for ToolNotices {
    fn on_event(&self, event: &ChatEvent<'_>) {
        match event {
            ChatEvent::ToolExecuting { call } => {
                println!("{}", self.renderer.tool_call(call));
            }
            ChatEvent::ToolResult { call, result } => {
                println!(
                    "{}",
                    self.renderer
                        .tool_result(call, &result.content, result.is_error)
                );
            }
            _ => {}
        }
    }
}
