//! Tool abstraction and registry.
//!
//! The [`Tool`] trait defines what every tool provides: a definition (name,
//! description, JSON Schema) and an async `execute` method. Tools are
//! collected into a [`ToolSet`], which dispatches calls by exact name,
//! validates arguments, applies a timeout, and truncates large results.

use crate::error::{ChatError, ToolError};
use crate::{Arguments, Message, ToolCall, ToolDef};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 32 * 1024;

/// Default timeout for a single tool execution.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;

/// A capability the model can invoke.
///
/// # Example
///
/// ```ignore
/// struct Clock;
///
/// impl Tool for Clock {
///     fn definition(&self) -> ToolDef {
///         ToolDef::new("clock", "Current UTC time", json!({"type": "object", "properties": {}}))
///     }
///
///     fn execute(&self, _arguments: &Arguments) -> ToolFuture<'_> {
///         Box::pin(async { Ok(chrono::Utc::now().to_rfc3339()) })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The definition presented to the model.
    fn definition(&self) -> ToolDef;

    /// Execute with already-decoded arguments.
    ///
    /// Failures are returned as [`ToolError`]; the registry renders them
    /// into the tool result so the model can react.
    fn execute(&self, arguments: &Arguments) -> ToolFuture<'_>;

    fn name(&self) -> String {
        self.definition().function.name
    }
}

/// Outcome of one tool call, ready to append as a tool message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn into_message(self) -> Message {
        Message::tool_result(self.tool_call_id, self.content)
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// A registry of tools dispatched by name.
///
/// Definitions are exported in registration order.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_timeout(Some(Duration::from_secs(20)))
///     .with(WebSearch::tavily(key))
///     .with_if(db.is_some(), SqlListTables::new(db.clone()));
///
/// let defs = tools.definitions();
/// ```
pub struct ToolSet {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
    max_result_bytes: usize,
    validate_args: bool,
    timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("max_result_bytes", &self.max_result_bytes)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: true,
            timeout: Some(DEFAULT_TOOL_TIMEOUT),
        }
    }

    /// Set the maximum result size in bytes before truncation.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// Toggle JSON Schema argument validation (on by default).
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Per-execution timeout. `None` disables it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name();
        match self.index.get(&name) {
            Some(&slot) => {
                warn!("Tool '{name}' registered twice; keeping the later one");
                self.tools[slot] = Box::new(tool);
            }
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(Box::new(tool));
            }
        }
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register a tool only when `condition` holds.
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check that every call in a batch names a registered tool.
    pub fn validate_calls(&self, calls: &[ToolCall]) -> Result<(), ChatError> {
        match calls.iter().find(|c| !self.contains(&c.name)) {
            Some(call) => Err(ChatError::UnknownTool {
                name: call.name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Execute one tool call.
    ///
    /// An unregistered name is an [`ChatError::UnknownTool`]. Every other
    /// failure (bad arguments, tool error, timeout) becomes a result whose
    /// content starts with `Error:`.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ChatError> {
        let tool = self
            .index
            .get(&call.name)
            .map(|&slot| self.tools[slot].as_ref())
            .ok_or_else(|| ChatError::UnknownTool {
                name: call.name.clone(),
            })?;

        log_tool_call(call);
        let start = Instant::now();
        let outcome = self.run(tool, call).await;
        let elapsed = start.elapsed();

        let (content, is_error) = match outcome {
            Ok(content) => (content, false),
            Err(e) => {
                info!("Tool {} failed: {e}", call.name);
                (e.to_string(), true)
            }
        };
        debug!(
            "Tool {} completed in {:.0}ms ({} bytes)",
            call.name,
            elapsed.as_secs_f64() * 1000.0,
            content.len()
        );
        trace!("Tool {} result: {content}", call.name);

        Ok(ToolResult {
            tool_call_id: call.id.clone(),
            content: truncate_result(content, self.max_result_bytes),
            is_error,
        })
    }

    async fn run(&self, tool: &dyn Tool, call: &ToolCall) -> Result<String, ToolError> {
        if self.validate_args {
            validate_tool_arguments(&tool.definition(), &call.arguments)?;
        }
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, tool.execute(&call.arguments))
                .await
                .map_err(|_| ToolError::Timeout {
                    tool: call.name.clone(),
                    timeout: limit,
                })?,
            None => tool.execute(&call.arguments).await,
        }
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

// ── FnTool ────────────────────────────────────────────────────────

type ErasedToolHandler = Box<
    dyn Fn(Arguments) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// A closure-based tool that deserializes its arguments into `A`.
///
/// Use it for stateless tools; tools that hold a client or a database
/// handle are clearer as a struct implementing [`Tool`].
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct EchoArgs { text: String }
///
/// let echo = FnTool::new(
///     ToolDef::new("echo", "Repeat the text", json_schema_for::<EchoArgs>()),
///     |args: EchoArgs| async move { Ok(args.text) },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let name = def.function.name.clone();
        let erased = move |raw: Arguments| -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>> {
            match parse_tool_args::<A>(&name, &raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => Box::pin(async move { Err(e) }),
            }
        };
        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &Arguments) -> ToolFuture<'_> {
        (self.handler)(arguments.clone())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate arguments against a tool's declared JSON Schema.
///
/// A schema that itself fails to compile is skipped with a warning.
pub fn validate_tool_arguments(def: &ToolDef, arguments: &Arguments) -> Result<(), ToolError> {
    let validator = match jsonschema::validator_for(&def.function.parameters) {
        Ok(v) => v,
        Err(e) => {
            warn!("Skipping argument validation for '{}': {e}", def.name());
            return Ok(());
        }
    };

    let value = serde_json::Value::Object(arguments.clone());
    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments {
            tool: def.name().to_string(),
            reason: errors.join("; "),
        })
    }
}

/// Deserialize tool arguments into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: &Arguments,
) -> Result<T, ToolError> {
    serde_json::from_value(serde_json::Value::Object(arguments.clone())).map_err(|e| {
        ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(call: &ToolCall) {
    let arguments = call.arguments_json();
    let preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({preview}{})",
        call.name,
        if arguments.len() > preview.len() { "..." } else { "" }
    );
    trace!("[tool] {} id={} arguments: {arguments}", call.name, call.id);
}

/// Truncate to at most `max` bytes on a char boundary, appending a notice.
pub fn truncate_result(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let total = s.len();
    let cut = (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0);
    s.truncate(cut);
    s.push_str(&format!("...\n[truncated: {total} bytes total]"));
    s
}

// ── Tests ──────────────────────────────────────────────────────────
