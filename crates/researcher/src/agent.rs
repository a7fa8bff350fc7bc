use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use strum_macros::{AsRefStr, Display};
use tokio::time::timeout;

use crate::conversation::ConversationStore;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::role::Role;
use crate::models::tool::Tool;
use crate::prompt_template::load_embedded_prompt;
use crate::providers::base::Provider;
use crate::systems::System;

/// Tool result handed back to the model when it asks for a tool nobody provides
pub const BAD_TOOL_NAME: &str = "bad tool name, retry";

pub const DEFAULT_MAX_TURNS: usize = 10;
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Which step of the loop produced a streamed fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Text written by the model
    Llm,
    /// Output of a tool call
    Action,
}

/// Limits applied to every reply
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Most model invocations a single query may use
    pub max_turns: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

impl SystemInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

/// Agent integrates a foundational LLM with the systems it needs to pilot
///
/// The agent also owns the conversation histories, so one instance is built at startup
/// and shared by every caller.
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider>,
    store: ConversationStore,
    config: AgentConfig,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            store: ConversationStore::new(),
            config: AgentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Start a new conversation and return its id
    pub fn new_conversation(&self) -> String {
        self.store.mint_id()
    }

    /// The stored history of a conversation
    pub fn history(&self, conversation_id: &str) -> AgentResult<Vec<Message>> {
        self.store.history(conversation_id)
    }

    /// Get all tools from all systems
    fn get_tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    /// Find the system that owns a tool name
    fn get_system_for_tool(&self, name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|system| system.has_tool(name))
            .map(|v| &**v)
    }

    fn get_system_prompt(&self) -> AgentResult<String> {
        let mut context = HashMap::new();
        let systems_info: Vec<SystemInfo> = self
            .systems
            .iter()
            .map(|system| {
                SystemInfo::new(system.name(), system.description(), system.instructions())
            })
            .collect();

        context.insert("systems", systems_info);
        load_embedded_prompt("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Ask the model for the next message, bounded by the model timeout
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> AgentResult<Message> {
        let completion = self.provider.complete(system_prompt, messages, tools);
        match timeout(self.config.model_timeout, completion).await {
            Ok(Ok((message, usage))) => {
                tracing::debug!(
                    input_tokens = ?usage.input_tokens,
                    output_tokens = ?usage.output_tokens,
                    tool_requests = message.tool_requests().len(),
                    "model turn complete"
                );
                Ok(message)
            }
            Ok(Err(e)) => Err(AgentError::ModelBackend(format!("{:#}", e))),
            Err(_) => Err(AgentError::BackendTimeout(self.config.model_timeout)),
        }
    }

    /// Run a single tool request. Problems with the request are returned as an error-valued
    /// result so they reach the model instead of the caller.
    async fn dispatch_tool_call(&self, request: &ToolRequest) -> AgentResult<Vec<Content>> {
        let call = match &request.tool_call {
            Ok(call) => call.clone(),
            Err(AgentError::ToolNotFound(_)) => return Ok(vec![Content::text(BAD_TOOL_NAME)]),
            Err(e) => return Err(e.clone()),
        };

        let Some(system) = self.get_system_for_tool(&call.name) else {
            tracing::warn!(tool = %call.name, "model requested an unknown tool");
            return Ok(vec![Content::text(BAD_TOOL_NAME)]);
        };

        let name = call.name.clone();
        match timeout(self.config.tool_timeout, system.call(call)).await {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::warn!(tool = %name, error = %e, "tool call failed");
                }
                result
            }
            Err(_) => {
                tracing::warn!(tool = %name, "tool call timed out");
                Err(AgentError::ExecutionError(format!(
                    "{} did not finish within {:?}",
                    name, self.config.tool_timeout
                )))
            }
        }
    }

    /// Create a stream that yields each message as it's generated by the agent.
    ///
    /// This includes both the assistant's responses and one tool message per tool call.
    /// The history only ever grows by whole steps: an assistant message that requests tools
    /// is stored together with their results once the batch finishes, so dropping the
    /// stream part way never leaves an unanswered call behind. Turns on the same
    /// conversation run one at a time. A blank query yields nothing and touches no state.
    pub fn reply(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> BoxStream<'_, AgentResult<Message>> {
        let query = query.to_string();
        let conversation_id = conversation_id.map(str::to_string);

        Box::pin(async_stream::try_stream! {
            if !query.trim().is_empty() {
                let system_prompt = self.get_system_prompt()?;
                let tools = self.get_tools();

                let id = match conversation_id {
                    Some(id) => id,
                    None => self.store.mint_id(),
                };
                let _turn = self.store.lock_turn(&id).await;
                let (id, mut messages) = self.store.get_or_create(Some(&id));
                tracing::info!(conversation = %id, history = messages.len(), "starting reply");

                let user_message = Message::user().with_text(query);
                self.store.append(&id, [user_message.clone()]);
                messages.push(user_message);

                let mut turns = 0;
                loop {
                    if turns >= self.config.max_turns {
                        tracing::error!(conversation = %id, turns, "turn budget exhausted");
                        Err::<(), _>(AgentError::LoopBudgetExceeded(turns))?;
                    }
                    turns += 1;

                    let response = self.complete(&system_prompt, &messages, &tools).await?;
                    let tool_requests = response.tool_requests();
                    if tool_requests.is_empty() {
                        self.store.append(&id, [response.clone()]);
                        messages.push(response.clone());
                        yield response.clone();
                        tracing::info!(conversation = %id, turns, "reply complete");
                        break;
                    }
                    yield response.clone();

                    let mut tool_messages = Vec::with_capacity(tool_requests.len());
                    for request in tool_requests {
                        let output = self.dispatch_tool_call(request).await;
                        tool_messages.push(
                            Message::tool().with_tool_response(request.id.clone(), output),
                        );
                    }

                    let step: Vec<Message> = std::iter::once(response.clone())
                        .chain(tool_messages.iter().cloned())
                        .collect();
                    self.store.append(&id, step.clone());
                    messages.extend(step);
                    for message in tool_messages {
                        yield message;
                    }
                }
            }
        })
    }

    /// Stream the non-empty text produced by each step, tagged with the step that produced it
    pub fn research_stream(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> BoxStream<'_, AgentResult<(Stage, String)>> {
        let mut replies = self.reply(query, conversation_id);

        Box::pin(async_stream::try_stream! {
            while let Some(message) = replies.next().await {
                for fragment in fragments(&message?) {
                    yield fragment;
                }
            }
        })
    }

    /// Run the loop to completion and return the final answer
    pub async fn research_query(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> AgentResult<String> {
        let mut replies = self.reply(query, conversation_id);
        let mut answer = String::new();
        while let Some(message) = replies.try_next().await? {
            if message.role == Role::Assistant && message.tool_requests().is_empty() {
                answer = message.text();
            }
        }
        Ok(answer)
    }
}

fn fragments(message: &Message) -> Vec<(Stage, String)> {
    match message.role {
        Role::Tool => message
            .tool_responses()
            .into_iter()
            .map(|response| response.as_text())
            .filter(|text| !text.is_empty())
            .map(|text| (Stage::Action, text))
            .collect(),
        _ => {
            let text = message.text();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![(Stage::Llm, text)]
            }
        }
    }
}
