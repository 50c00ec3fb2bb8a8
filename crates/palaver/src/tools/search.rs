//! Web search tool.
//!
//! Two backends are supported: [Tavily](https://tavily.com) (the default,
//! returning two results per query unless asked for more) and
//! [Brave Search](https://brave.com/search/api/).

use super::core::{Tool, ToolFuture, parse_tool_args};
use super::describe::ToolDescription;
use crate::error::{ChatError, ToolError};
use crate::{Arguments, ToolDef};
use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::debug;

const TAVILY_URL: &str = "https://api.tavily.com/search";
const BRAVE_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Results per query when the model does not ask for a count.
pub const DEFAULT_MAX_RESULTS: u32 = 2;

/// Upper bound on results per query, whatever the model asks for.
pub const MAX_RESULTS_CAP: u32 = 10;

/// Which search API to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Tavily,
    Brave,
}

impl SearchBackend {
    /// Environment variable holding the API key.
    pub fn key_var(self) -> &'static str {
        match self {
            SearchBackend::Tavily => "TAVILY_API_KEY",
            SearchBackend::Brave => "BRAVE_SEARCH_KEY",
        }
    }
}

impl std::str::FromStr for SearchBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tavily" => Ok(SearchBackend::Tavily),
            "brave" => Ok(SearchBackend::Brave),
            other => Err(format!("unknown search backend '{other}' (expected tavily or brave)")),
        }
    }
}

#[derive(Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// The search query, e.g. 'latest stable Rust release notes'.
    pub query: String,
    /// Number of results to return (default 2, max 10).
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// `web_search`: ranked web results for a query.
pub struct WebSearch {
    backend: SearchBackend,
    api_key: String,
    default_results: u32,
    client: reqwest::Client,
}

impl WebSearch {
    pub fn new(backend: SearchBackend, api_key: impl Into<String>) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build search client: {e}")))?;
        Ok(Self {
            backend,
            api_key: api_key.into(),
            default_results: DEFAULT_MAX_RESULTS,
            client,
        })
    }

    /// Read the backend's API key from the environment.
    pub fn from_env(backend: SearchBackend) -> Result<Self, ChatError> {
        let var = backend.key_var();
        let key = std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ChatError::Config(format!("{var} is not set")))?;
        Self::new(backend, key)
    }

    /// Results per query when the model does not specify a count.
    pub fn with_default_results(mut self, count: u32) -> Self {
        self.default_results = count.clamp(1, MAX_RESULTS_CAP);
        self
    }

    pub fn backend(&self) -> SearchBackend {
        self.backend
    }

    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchHit>, ToolError> {
        debug!("web_search via {:?}: {query} (max {count})", self.backend);
        let request = match self.backend {
            SearchBackend::Tavily => self
                .client
                .post(TAVILY_URL)
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({
                    "query": query,
                    "max_results": count,
                })),
            SearchBackend::Brave => self
                .client
                .get(format!("{BRAVE_URL}?q={}&count={count}", urlencoded(query)))
                .header("X-Subscription-Token", &self.api_key)
                .header("Accept", "application/json"),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| ToolError::execution(format!("web search failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ToolError::execution(format!("web search failed: {e}")))?;
        if !status.is_success() {
            return Err(ToolError::execution(format!(
                "web search failed: HTTP {status}: {body}"
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ToolError::execution(format!("web search returned invalid JSON: {e}")))?;
        let mut hits = match self.backend {
            SearchBackend::Tavily => parse_tavily(&json),
            SearchBackend::Brave => parse_brave(&json),
        };
        hits.truncate(count as usize);
        Ok(hits)
    }
}

impl Tool for WebSearch {
    fn definition(&self) -> ToolDef {
        ToolDescription::new(
            "web_search",
            "Search the web and return ranked results with titles, URLs, and snippets",
        )
        .when_to_use(
            "When you need current information, recent events, or facts you are unsure about. \
             Use specific, targeted queries",
        )
        .when_not_to_use(
            "When the answer is already known, or when the question is about the connected \
             database; use the sql_* tools for that",
        )
        .parameters_for::<WebSearchArgs>()
        .example(
            "web_search(query='LangGraph release notes')",
            "Two ranked results with title, URL and snippet",
        )
        .output_format("Numbered list of results: title, URL, and snippet")
        .into_def()
    }

    fn execute(&self, arguments: &Arguments) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<WebSearchArgs>("web_search", arguments);
        Box::pin(async move {
            let args = parsed?;
            if args.query.trim().is_empty() {
                return Err(ToolError::InvalidArguments {
                    tool: "web_search".into(),
                    reason: "query must not be empty".into(),
                });
            }
            let count = args
                .max_results
                .unwrap_or(self.default_results)
                .clamp(1, MAX_RESULTS_CAP);
            let hits = self.search(&args.query, count).await?;
            if hits.is_empty() {
                Ok(format!("No results found for '{}'", args.query))
            } else {
                Ok(format_hits(&hits))
            }
        })
    }
}

fn parse_tavily(body: &serde_json::Value) -> Vec<SearchHit> {
    body["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .map(|r| SearchHit {
                    title: r["title"].as_str().unwrap_or_default().to_string(),
                    url: r["url"].as_str().unwrap_or_default().to_string(),
                    snippet: r["content"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_brave(body: &serde_json::Value) -> Vec<SearchHit> {
    body["web"]["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .map(|r| SearchHit {
                    title: r["title"].as_str().unwrap_or_default().to_string(),
                    url: r["url"].as_str().unwrap_or_default().to_string(),
                    snippet: r["description"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Render hits as a numbered list.
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let mut entry = format!("{}. {}\n   {}", i + 1, hit.title, hit.url);
            if !hit.snippet.is_empty() {
                let _ = write!(entry, "\n   {}", hit.snippet.trim());
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Minimal percent-encoding for URL query parameters.
fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}
