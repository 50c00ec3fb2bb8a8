//! Command-line options and startup assembly.
//!
//! [`Cli`] is the raw `clap` surface. [`ChatConfig`] validates it once at
//! startup and builds everything a session needs: the model, the tool set,
//! the session store and the loop configuration. Any missing key or
//! unopenable database is reported here, before the first turn.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use palaver::agent::LoopConfig;
use palaver::api::client::DEFAULT_REQUEST_TIMEOUT;
use palaver::api::{ChatClient, OPENROUTER_BASE_URL, RetryConfig};
use palaver::model::RemoteModel;
use palaver::session::{
    DEFAULT_SESSIONS_DIR, FileStore, MemoryStore, SessionStore, generate_session_id,
    validate_session_id,
};
use palaver::tools::search::{DEFAULT_MAX_RESULTS, MAX_RESULTS_CAP};
use palaver::tools::{SearchBackend, SqlDatabase, ToolSet, WebSearch};
use palaver::{ChatError, DEFAULT_MODEL};
use tracing::{debug, info};

use crate::prompt::default_system_prompt;

/// Tool-calling chat agent for the terminal.
#[derive(Parser, Debug, Clone)]
#[command(name = "palaver", version, about)]
pub struct Cli {
    /// Run one turn with this input and exit.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Model identifier understood by the endpoint.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// OpenAI-compatible API root.
    #[arg(long, default_value = OPENROUTER_BASE_URL)]
    pub base_url: String,

    /// Environment variable holding the model API key.
    #[arg(long, default_value = "OPENROUTER_KEY")]
    pub api_key_env: String,

    /// System prompt sent ahead of the conversation. Never stored.
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Maximum model calls per turn.
    #[arg(long, default_value_t = palaver::agent::DEFAULT_MAX_CYCLES)]
    pub max_cycles: usize,

    /// Retries for transient model failures.
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Per-tool timeout in seconds (0 disables it).
    #[arg(long, default_value_t = 30)]
    pub tool_timeout: u64,

    /// Web search provider.
    #[arg(long, default_value = "tavily")]
    pub search_backend: SearchBackend,

    /// Default number of search results.
    #[arg(long, default_value_t = DEFAULT_MAX_RESULTS)]
    pub max_results: u32,

    /// Do not register the web search tool.
    #[arg(long)]
    pub no_search: bool,

    /// SQLite database to expose through the SQL tools.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Allow `sql_query` to modify the database.
    #[arg(long, requires = "db")]
    pub db_writable: bool,

    /// Session to resume or create. A fresh id is generated when absent.
    #[arg(long)]
    pub session: Option<String>,

    /// Keep the conversation in memory only.
    #[arg(long)]
    pub memory: bool,

    /// Directory holding stored sessions.
    #[arg(long, default_value = DEFAULT_SESSIONS_DIR)]
    pub sessions_dir: PathBuf,

    /// Print stored sessions and exit.
    #[arg(long)]
    pub list_sessions: bool,

    /// Print unstyled `User:` / `Assistant:` lines.
    #[arg(long)]
    pub plain: bool,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Where conversations are kept.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChoice {
    Memory,
    Files(PathBuf),
}

/// Validated startup configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub system_prompt: String,
    pub loop_config: LoopConfig,
    pub retry: RetryConfig,
    pub tool_timeout: Option<Duration>,
    /// `None` when search is disabled.
    pub search: Option<(SearchBackend, u32)>,
    pub db: Option<(PathBuf, bool)>,
    pub session_id: String,
    pub store: StoreChoice,
    pub plain: bool,
}

impl ChatConfig {
    /// Validate command-line options that need no external resources.
    pub fn from_cli(cli: &Cli) -> Result<Self, ChatError> {
        if cli.max_cycles == 0 {
            return Err(ChatError::Config("--max-cycles must be at least 1".into()));
        }
        if !(1..=MAX_RESULTS_CAP).contains(&cli.max_results) {
            return Err(ChatError::Config(format!(
                "--max-results must be between 1 and {MAX_RESULTS_CAP}"
            )));
        }
        if cli.model.trim().is_empty() {
            return Err(ChatError::Config("--model must not be empty".into()));
        }
        let session_id = match &cli.session {
            Some(id) => {
                validate_session_id(id).map_err(|e| ChatError::Config(e.to_string()))?;
                id.clone()
            }
            None => generate_session_id(),
        };

        let retry = RetryConfig::with_retries(cli.max_retries);
        // The loop's bound must outlast every attempt the adapter may make.
        let model_timeout = retry.worst_case(DEFAULT_REQUEST_TIMEOUT);

        Ok(Self {
            model: cli.model.clone(),
            base_url: cli.base_url.clone(),
            api_key_env: cli.api_key_env.clone(),
            system_prompt: cli
                .system_prompt
                .clone()
                .unwrap_or_else(default_system_prompt),
            loop_config: LoopConfig::default()
                .with_max_cycles(cli.max_cycles)
                .with_model_timeout(Some(model_timeout)),
            retry,
            tool_timeout: (cli.tool_timeout > 0).then(|| Duration::from_secs(cli.tool_timeout)),
            search: (!cli.no_search).then_some((cli.search_backend, cli.max_results)),
            db: cli.db.clone().map(|path| (path, !cli.db_writable)),
            session_id,
            store: if cli.memory {
                StoreChoice::Memory
            } else {
                StoreChoice::Files(cli.sessions_dir.clone())
            },
            plain: cli.plain,
        })
    }

    /// Build the remote model, reading its API key through `env`.
    pub fn build_model(&self, env: impl Fn(&str) -> Option<String>) -> Result<RemoteModel, ChatError> {
        let key = required_key(&env, &self.api_key_env)?;
        let client = ChatClient::with_base_url(
            key,
            &self.base_url,
            DEFAULT_REQUEST_TIMEOUT,
        )?;
        debug!("Model endpoint: {}", client.endpoint());
        Ok(RemoteModel::new(client, self.model.clone())
            .with_system_prompt(self.system_prompt.clone())
            .with_retry(self.retry.clone()))
    }

    /// Assemble the tool set: web search unless disabled, SQL tools when a
    /// database was given.
    pub fn build_tools(&self, env: impl Fn(&str) -> Option<String>) -> Result<ToolSet, ChatError> {
        let mut tools = ToolSet::new().with_timeout(self.tool_timeout);

        if let Some((backend, max_results)) = self.search {
            let key = required_key(&env, backend.key_var())?;
            tools.register(WebSearch::new(backend, key)?.with_default_results(max_results));
        }
        if let Some((path, read_only)) = &self.db {
            let db = SqlDatabase::open(path, *read_only)?;
            info!(
                "SQL tools enabled for {} ({})",
                path.display(),
                if *read_only { "read-only" } else { "writable" }
            );
            tools = tools.with_sql_tools(db);
        }

        info!("Tools: {}", tools.names().join(", "));
        Ok(tools)
    }

    /// Open the configured session store.
    pub fn build_store(&self) -> Result<Box<dyn SessionStore>, ChatError> {
        Ok(match &self.store {
            StoreChoice::Memory => Box::new(MemoryStore::new()),
            StoreChoice::Files(dir) => Box::new(FileStore::new(dir)?),
        })
    }
}

fn required_key(env: &impl Fn(&str) -> Option<String>, var: &str) -> Result<String, ChatError> {
    env(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ChatError::Config(format!("{var} environment variable is not set")))
}

/// Reads the process environment.
pub fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("palaver").chain(args.iter().copied()))
    }

    fn env_with(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = ChatConfig::from_cli(&parse(&[])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.loop_config.max_cycles, 10);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(
            config.loop_config.model_timeout,
            Some(config.retry.worst_case(DEFAULT_REQUEST_TIMEOUT))
        );
        assert!(config.loop_config.model_timeout > Some(DEFAULT_REQUEST_TIMEOUT * 3));
        assert_eq!(config.tool_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.search, Some((SearchBackend::Tavily, 2)));
        assert_eq!(config.store, StoreChoice::Files(PathBuf::from(DEFAULT_SESSIONS_DIR)));
        assert!(config.session_id.starts_with("s-"));
        assert!(!config.plain);
    }

    #[test]
    fn options_map_onto_config() {
        let cli = parse(&[
            "--search-backend",
            "brave",
            "--max-results",
            "5",
            "--memory",
            "--session",
            "thread-1",
            "--tool-timeout",
            "0",
            "--max-cycles",
            "3",
            "--plain",
        ]);
        let config = ChatConfig::from_cli(&cli).unwrap();
        assert_eq!(config.search, Some((SearchBackend::Brave, 5)));
        assert_eq!(config.store, StoreChoice::Memory);
        assert_eq!(config.session_id, "thread-1");
        assert_eq!(config.tool_timeout, None);
        assert_eq!(config.loop_config.max_cycles, 3);
        assert!(config.plain);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ChatConfig::from_cli(&parse(&["--max-cycles", "0"])).is_err());
        assert!(ChatConfig::from_cli(&parse(&["--max-results", "11"])).is_err());
        assert!(ChatConfig::from_cli(&parse(&["--session", "../x"])).is_err());
        assert!(Cli::try_parse_from(["palaver", "--search-backend", "bing"]).is_err());
        assert!(Cli::try_parse_from(["palaver", "--db-writable"]).is_err());
    }

    #[test]
    fn missing_keys_are_config_errors() {
        let config = ChatConfig::from_cli(&parse(&[])).unwrap();
        match config.build_model(env_with(&[])) {
            Err(ChatError::Config(msg)) => assert!(msg.contains("OPENROUTER_KEY")),
            other => panic!("expected Config error, got {:?}", other.err()),
        }
        match config.build_tools(env_with(&[])) {
            Err(ChatError::Config(msg)) => assert!(msg.contains("TAVILY_API_KEY")),
            other => panic!("expected Config error, got {:?}", other.err()),
        }
    }

    #[test]
    fn alternate_api_key_variable() {
        let config = ChatConfig::from_cli(&parse(&["--api-key-env", "OPENAI_API_KEY"])).unwrap();
        assert!(config.build_model(env_with(&[("OPENAI_API_KEY", "sk-test")])).is_ok());
    }

    #[test]
    fn tool_set_follows_options() {
        let config = ChatConfig::from_cli(&parse(&["--no-search"])).unwrap();
        assert!(config.build_tools(env_with(&[])).unwrap().is_empty());

        let config = ChatConfig::from_cli(&parse(&[])).unwrap();
        let tools = config
            .build_tools(env_with(&[("TAVILY_API_KEY", "tvly-test")]))
            .unwrap();
        assert_eq!(tools.names(), vec!["web_search".to_string()]);
    }

    #[test]
    fn database_is_checked_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        std::fs::write(&path, b"definitely not sqlite, just some text padding").unwrap();
        let cli = parse(&["--no-search", "--db", path.to_str().unwrap()]);
        let config = ChatConfig::from_cli(&cli).unwrap();
        assert_eq!(config.db, Some((path.clone(), true)));
        assert!(matches!(
            config.build_tools(env_with(&[])),
            Err(ChatError::Config(_))
        ));
    }

    #[test]
    fn stores_are_built_per_choice() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = dir.path().join("sessions");
        let cli = parse(&["--sessions-dir", sessions.to_str().unwrap()]);
        let config = ChatConfig::from_cli(&cli).unwrap();
        let store = config.build_store().unwrap();
        store.append("s", &palaver::Message::user("hi")).unwrap();
        assert!(sessions.join("s").join("messages.jsonl").exists());

        let config = ChatConfig::from_cli(&parse(&["--memory"])).unwrap();
        assert!(config.build_store().unwrap().load("s").unwrap().is_empty());
    }
}
