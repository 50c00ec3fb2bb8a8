//! Terminal chat agent with web search, SQL tools and resumable sessions.
//!
//! Reads the model key from `OPENROUTER_KEY` (or the variable named by
//! `--api-key-env`) and the search key from `TAVILY_API_KEY` or
//! `BRAVE_SEARCH_KEY`. A `.env` file in the working directory is loaded
//! first.
//!
//! ```sh
//! palaver                                  # interactive
//! palaver --prompt "Summarize today's Rust news"
//! palaver --list-sessions
//! ```

use std::io::{self, IsTerminal};

use clap::Parser;
use palaver::agent::{ChatLoop, CompositeEventHandler, LoggingHandler};
use palaver::session::FileStore;
use palaver_cli::config::process_env;
use palaver_cli::repl::{self, TurnResult};
use palaver_cli::{ChatConfig, Cli, Renderer, ToolNotices};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        // A missing .env is normal.
        if !e.not_found() {
            eprintln!("Warning: failed to load .env: {e}");
        }
    }

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.list_sessions {
        let renderer = Renderer::new(cli.plain || !io::stdout().is_terminal());
        let sessions = FileStore::new(&cli.sessions_dir)?.list_sessions()?;
        if sessions.is_empty() {
            println!("No stored sessions in {}", cli.sessions_dir.display());
        }
        for manifest in &sessions {
            println!("{}", renderer.session_line(manifest));
        }
        return Ok(());
    }

    // Everything is validated before the first turn.
    let config = ChatConfig::from_cli(&cli)?;
    let renderer = Renderer::new(config.plain || !io::stdout().is_terminal());
    let model = config.build_model(process_env)?;
    let tools = config.build_tools(process_env)?;
    let store = config.build_store()?;
    let mut conversation = store.load(&config.session_id)?;
    info!(
        "Session {} with {} stored message(s)",
        config.session_id,
        conversation.len()
    );

    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(ToolNotices::new(renderer));
    let chat = ChatLoop::new(&model, &tools, store.as_ref(), config.loop_config.clone())
        .with_event_handler(&handler);

    // A session killed mid-batch is resumed with its open calls answered.
    chat.close_pending_calls(&mut conversation)?;

    if let Some(prompt) = &cli.prompt {
        debug!("One-shot mode");
        return match repl::run_turn_interruptible(&chat, &mut conversation, prompt).await {
            TurnResult::Done(outcome) => {
                println!("{}", renderer.reply(&outcome.reply));
                Ok(())
            }
            TurnResult::Failed(e) => Err(e.into()),
            TurnResult::Interrupted => Err("interrupted".into()),
        };
    }

    let tool_names = tools.names();
    println!(
        "{}",
        renderer.notice(&format!(
            "palaver | session {} | {} | tools: {} | type 'quit' to exit",
            config.session_id,
            config.model,
            if tool_names.is_empty() {
                "none".to_string()
            } else {
                tool_names.join(", ")
            }
        ))
    );
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    repl::run(&chat, &mut conversation, renderer, stdin, &mut io::stdout()).await?;
    Ok(())
}
