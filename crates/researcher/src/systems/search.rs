use async_trait::async_trait;
use indoc::indoc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

pub const TAVILY_HOST: &str = "https://api.tavily.com";
pub const DEFAULT_MAX_RESULTS: usize = 3;
pub const SEARCH_TOOL_NAME: &str = "tavily_search_results_json";

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub host: String,
    pub api_key: String,
    pub max_results: usize,
}

impl SearchConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: TAVILY_HOST.to_string(),
            api_key: api_key.into(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// One snippet returned by the search backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

impl SearchResult {
    fn render(&self) -> String {
        format!("### {}\n{}\nSource: {}", self.title, self.content, self.url)
    }
}

/// Web search through the Tavily API
#[derive(Clone)]
pub struct SearchSystem {
    client: Client,
    config: SearchConfig,
    tools: Vec<Tool>,
    instructions: String,
}

impl SearchSystem {
    pub fn new(config: SearchConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let search_tool = Tool::new(
            SEARCH_TOOL_NAME,
            "A search engine optimized for comprehensive, accurate, and trusted results. \
             Useful for when you need to answer questions about current events. \
             Input should be a search query.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "search query to look up"
                    }
                },
                "required": ["query"]
            }),
        );

        let instructions = indoc! {"
            Use the search engine to look up information.
            You are allowed to make multiple calls (either together or in sequence).
            Only look up information when you are sure of what you want.
            If you need to look up some information before asking a follow up question, you are allowed to do that!
        "}
        .to_string();

        Ok(Self {
            client,
            config,
            tools: vec![search_tool],
            instructions,
        })
    }

    /// Run one search and return the snippets in backend order
    pub async fn search(&self, query: &str) -> AgentResult<Vec<SearchResult>> {
        let url = format!("{}/search", self.config.host.trim_end_matches('/'));
        tracing::debug!(%query, max_results = self.config.max_results, "tavily search");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&SearchRequest {
                query,
                max_results: self.config.max_results,
            })
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("Search request failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => {
                let body: SearchResponse = response.json().await.map_err(|e| {
                    AgentError::ExecutionError(format!("Could not decode search response: {}", e))
                })?;
                Ok(body
                    .results
                    .into_iter()
                    .take(self.config.max_results)
                    .collect())
            }
            status => Err(AgentError::ExecutionError(format!(
                "Search backend returned {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl System for SearchSystem {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Web search for current information"
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        if tool_call.name != SEARCH_TOOL_NAME {
            return Err(AgentError::ToolNotFound(tool_call.name));
        }

        let query = tool_call
            .arguments
            .get("query")
            .and_then(|q| q.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                AgentError::InvalidParameters("The query parameter is required".to_string())
            })?;

        let results = self.search(query).await?;
        if results.is_empty() {
            return Ok(vec![Content::text("No results found.")]);
        }

        let rendered = results
            .iter()
            .map(SearchResult::render)
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(vec![Content::text(rendered)])
    }
}
