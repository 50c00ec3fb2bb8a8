//! Tools the model can call.
//!
//! Every capability is a [`Tool`] implementor. Tools are collected into a
//! [`ToolSet`], which dispatches calls by exact name and turns tool failures
//! into `Error: ...` results for the model to read.
//!
//! # Defining tools
//!
//! - **[`FnTool`]**: closure-based, deserializes arguments into a typed
//!   struct. Best for stateless tools.
//! - **`impl Tool`**: a struct holding a client or handle. See
//!   [`search::WebSearch`] and the [`sql`] tools.
//!
//! # Submodules
//!
//! - [`core`]: [`Tool`] trait, [`ToolSet`], [`FnTool`], argument helpers.
//! - [`describe`]: [`ToolDescription`](describe::ToolDescription) builder for
//!   descriptions with `when_to_use` / `when_not_to_use` guidance.
//! - [`search`]: `web_search` over Tavily or Brave.
//! - [`sql`]: `sql_list_tables`, `sql_schema`, `sql_query` over SQLite.

pub mod core;
pub mod describe;
pub mod search;
pub mod sql;

pub use core::{
    DEFAULT_MAX_RESULT_BYTES, DEFAULT_TOOL_TIMEOUT, FnTool, Tool, ToolFuture, ToolResult, ToolSet,
    parse_tool_args, truncate_result, validate_tool_arguments,
};
pub use describe::ToolDescription;
pub use search::{SearchBackend, WebSearch};
pub use sql::{SqlDatabase, SqlListTables, SqlQuery, SqlSchema};
