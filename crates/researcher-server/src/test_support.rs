use async_trait::async_trait;
use researcher::agent::Agent;
use researcher::errors::{AgentError, AgentResult};
use researcher::models::content::Content;
use researcher::models::message::Message;
use researcher::models::tool::{Tool, ToolCall};
use researcher::providers::mock::MockProvider;
use researcher::systems::System;
use serde_json::json;

use crate::state::AppState;

/// Stands in for web search with a canned snippet
pub struct FakeSearch {
    tools: Vec<Tool>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self {
            tools: vec![Tool::new(
                "search",
                "Look something up",
                json!({"type": "object", "properties": {"query": {"type": "string"}}}),
            )],
        }
    }
}

#[async_trait]
impl System for FakeSearch {
    fn name(&self) -> &str {
        "FakeSearch"
    }

    fn description(&self) -> &str {
        "Canned search results"
    }

    fn instructions(&self) -> &str {
        "Use search to look things up."
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            "search" => Ok(vec![Content::text("Sunny, 20C")]),
            other => Err(AgentError::ToolNotFound(other.to_string())),
        }
    }
}

pub fn search_turn() -> Message {
    Message::assistant().with_tool_request(
        "call_1",
        Ok(ToolCall::new("search", json!({"query": "weather in sf"}))),
    )
}

pub fn state_with(responses: Vec<Message>) -> AppState {
    state_for(MockProvider::new(responses))
}

/// A backend that is down for the first request
pub fn failing_state() -> AppState {
    state_for(MockProvider::with_results(vec![Err(
        "Server error: 503 Service Unavailable".to_string(),
    )]))
}

fn state_for(provider: MockProvider) -> AppState {
    let mut agent = Agent::new(Box::new(provider));
    agent.add_system(Box::new(FakeSearch::new()));
    AppState::new(agent)
}
