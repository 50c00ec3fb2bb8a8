//! Terminal front end for `palaver`.
//!
//! The `palaver` binary reads lines from the terminal, runs each through a
//! [`ChatLoop`](palaver::agent::ChatLoop), and prints replies and
//! tool-usage notices. The pieces are exposed as a library so they can be
//! tested without a terminal:
//!
//! - [`config`]: `clap` options and [`ChatConfig`] startup assembly.
//! - [`repl`]: input classification and the interactive loop.
//! - [`render`]: styled or plain output lines and the [`ToolNotices`]
//!   event handler.
//! - [`prompt`]: the default system prompt.
//!
//! ```sh
//! # Interactive, web search only, history under .palaver/sessions
//! palaver
//!
//! # Resume a stored session with SQL tools over a local database
//! palaver --session thread-1 --db shop.db
//!
//! # One turn, plain output
//! palaver --plain --prompt "What changed in the Rust 2024 edition?"
//! ```

pub mod config;
pub mod prompt;
pub mod render;
pub mod repl;

pub use config::{ChatConfig, Cli, StoreChoice};
pub use prompt::default_system_prompt;
pub use render::{Renderer, ToolNotices};
