//! The chat control loop and its supporting pieces.
//!
//! - [`chat_loop::ChatLoop`]: runs one user turn through model decisions and
//!   tool executions. Start here.
//! - [`config::LoopConfig`]: cycle bound and model timeout.
//! - [`events`]: [`EventHandler`] and [`ChatEvent`] for observing the loop,
//!   with [`LoggingHandler`], [`CompositeEventHandler`] and [`FnEventHandler`].

pub mod chat_loop;
pub mod config;
pub mod events;

pub use chat_loop::{ChatLoop, TurnOutcome};
pub use config::{DEFAULT_MAX_CYCLES, LoopConfig};
pub use events::{
    ChatEvent, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler, NoopHandler,
};
