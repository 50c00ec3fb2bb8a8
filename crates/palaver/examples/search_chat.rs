//! Minimal chat: one turn against a live model with web search.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... TAVILY_API_KEY=tvly-... cargo run --example search_chat -- "What is new in Rust?"
//! ```

use palaver::prelude::*;

#[tokio::main]
async fn main() -> Result<(), ChatError> {
    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What do you know about the Rust 2024 edition?".to_string());

    // 1. The model, with retries for rate limits and 5xx responses.
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| ChatError::Config("set OPENROUTER_KEY".into()))?;
    let model = RemoteModel::new(ChatClient::new(api_key)?, DEFAULT_MODEL)
        .with_system_prompt("You are a helpful assistant. Be concise and cite sources.");

    // 2. Tools the model may call.
    let tools = ToolSet::new().with(WebSearch::from_env(SearchBackend::Tavily)?);

    // 3. An in-process store and the loop.
    let store = MemoryStore::new();
    let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default())
        .with_event_handler(&LoggingHandler);

    // 4. One turn.
    let mut conversation = store.load("example")?;
    let outcome = chat.run_turn(&mut conversation, &question).await?;

    println!("\n{}", outcome.reply);
    println!(
        "\n--- {} cycle(s) | {} tool call(s) ---",
        outcome.cycles, outcome.tool_calls
    );
    Ok(())
}
