//! Web search tool for the assistant
//!
//! The tool itself only formats results; the HTTP call is delegated to a
//! [`SearchBackend`] (Tavily when a key is configured, DuckDuckGo instant
//! answers otherwise).

use crate::base::{AiTool, ToolError};
use async_trait::async_trait;
use orchat_common::constants::{search, tools};
use orchat_common::{ChatError, Result, SearchResult};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Parameters for the web search tool.
#[derive(Deserialize)]
struct SearchParams {
    /// The search query to look up.
    query: String,
}

/// Collaborator that performs the raw web search
#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Ranked results for `query`
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Render results as numbered paragraphs separated by blank lines
pub fn format_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return search::NO_RESULTS_TEXT.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}\nURL: {}\n{}", i + 1, r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Tool for searching the web.
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl AiTool for WebSearchTool {
    fn name(&self) -> &str {
        tools::WEB_SEARCH
    }

    fn description(&self) -> &str {
        "Search the web for current information. Use this when you need up-to-date information about current events, weather, news, or any topic that requires recent data."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> std::result::Result<String, ToolError> {
        let params: SearchParams = serde_json::from_value(args).map_err(|_| {
            ToolError::InvalidArguments("Missing or invalid 'query' parameter".into())
        })?;

        debug!("Searching '{}' via {}", params.query, self.backend.name());

        let results = self
            .backend
            .search(&params.query)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        debug!("Search returned {} results", results.len());
        Ok(format_results(&results))
    }
}

/// Tavily search API client
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_results: usize,
    search_depth: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: search::TAVILY_API_URL.to_string(),
            max_results: search::DEFAULT_MAX_RESULTS,
            search_depth: search::DEFAULT_SEARCH_DEPTH.to_string(),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchBackend for TavilySearch {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let body = json!({
            "api_key": self.api_key,
            "query": query,
            "search_depth": self.search_depth,
            "include_answer": false,
            "max_results": self.max_results,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("Tavily request error: {}", e)))?;

        if !resp.status().is_success() {
            warn!("Tavily API error: {}", resp.status());
            return Err(ChatError::Transport(format!(
                "Tavily API error: {}",
                resp.status()
            )));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChatError::Transport(format!("Tavily body error: {}", e)))?;

        Ok(parse_tavily_response(&data))
    }
}

fn parse_tavily_response(data: &Value) -> Vec<SearchResult> {
    let Some(results) = data.get("results").and_then(Value::as_array) else {
        return Vec::new();
    };

    results
        .iter()
        .map(|r| SearchResult {
            title: str_field(r, "title").unwrap_or("Result").to_string(),
            url: str_field(r, "url").unwrap_or_default().to_string(),
            snippet: str_field(r, "content").unwrap_or_default().to_string(),
        })
        .collect()
}

/// DuckDuckGo instant answer API client; needs no key
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: search::DUCKDUCKGO_API_URL.to_string(),
            max_results: search::DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("DuckDuckGo request error: {}", e)))?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChatError::Transport(format!("DuckDuckGo body error: {}", e)))?;

        let mut results = parse_duckduckgo_response(&data);
        results.truncate(self.max_results);
        Ok(results)
    }
}

const DDG_RELATED_TOPICS: usize = 4;

fn parse_duckduckgo_response(data: &Value) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let (Some(url), Some(text)) = (
        str_field(data, "AbstractURL"),
        str_field(data, "AbstractText"),
    ) {
        if !url.is_empty() && !text.is_empty() {
            results.push(SearchResult {
                title: str_field(data, "Heading")
                    .filter(|h| !h.is_empty())
                    .unwrap_or("DuckDuckGo Result")
                    .to_string(),
                url: url.to_string(),
                snippet: text.to_string(),
            });
        }
    }

    if let Some(topics) = data.get("RelatedTopics").and_then(Value::as_array) {
        for topic in topics.iter().take(DDG_RELATED_TOPICS) {
            let (Some(url), Some(text)) = (str_field(topic, "FirstURL"), str_field(topic, "Text"))
            else {
                continue;
            };
            if url.is_empty() || text.is_empty() {
                continue;
            }
            let title = text.split(" - ").next().filter(|t| !t.is_empty()).unwrap_or("Result");
            results.push(SearchResult {
                title: title.to_string(),
                url: url.to_string(),
                snippet: text.to_string(),
            });
        }
    }

    results
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
