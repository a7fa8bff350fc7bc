use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use super::base::Usage;
use crate::errors::{AgentError, AgentResult};
use crate::models::message::{Message, MessageContent, ToolRequest, ToolResponse};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref NOT_IN_FUNCTION_NAME: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
}

/// Stand-in name for a tool request we could not decode; the request keeps its
/// `tool_calls` entry so the result that answers it still has a parent.
const UNDECODABLE_TOOL_NAME: &str = "invalid_tool_call";

/// Error codes OpenAI uses when the prompt no longer fits the model
const CONTEXT_LENGTH_CODES: [&str; 2] = ["context_length_exceeded", "string_above_max_length"];

/// Lay out a history as chat completion messages
///
/// One stored message may expand to several entries: the assistant turn with its
/// `tool_calls` first, then one `tool` entry per result it carries.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut spec = Vec::with_capacity(messages.len());

    for message in messages {
        let mut text = None;
        let mut tool_calls = Vec::new();
        let mut results = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(part) if !part.text.is_empty() => text = Some(&part.text),
                MessageContent::Text(_) => {}
                MessageContent::ToolRequest(request) => tool_calls.push(encode_tool_call(request)),
                MessageContent::ToolResponse(response) => results.push(encode_tool_result(response)),
            }
        }

        if text.is_some() || !tool_calls.is_empty() {
            let mut entry = Map::new();
            entry.insert("role".to_string(), json!(message.role));
            if let Some(text) = text {
                entry.insert("content".to_string(), json!(text));
            }
            if !tool_calls.is_empty() {
                entry.insert("tool_calls".to_string(), Value::Array(tool_calls));
            }
            spec.push(Value::Object(entry));
        }
        spec.extend(results);
    }

    spec
}

fn encode_tool_call(request: &ToolRequest) -> Value {
    let (name, arguments) = match &request.tool_call {
        Ok(call) => (
            NOT_IN_FUNCTION_NAME.replace_all(&call.name, "_").into_owned(),
            call.arguments.to_string(),
        ),
        Err(_) => (UNDECODABLE_TOOL_NAME.to_string(), "{}".to_string()),
    };
    json!({
        "id": request.id,
        "type": "function",
        "function": {"name": name, "arguments": arguments},
    })
}

fn encode_tool_result(response: &ToolResponse) -> Value {
    // failures go back as plain text so the model can read what went wrong
    let content = match &response.tool_result {
        Ok(contents) => json!(contents),
        Err(_) => json!(response.as_text()),
    };
    json!({"role": "tool", "tool_call_id": response.id, "content": content})
}

/// Describe the available tools as OpenAI function definitions
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut seen = HashSet::new();
    tools
        .iter()
        .map(|tool| {
            if !seen.insert(tool.name.as_str()) {
                return Err(anyhow!("Duplicate tool name: {}", tool.name));
            }
            Ok(json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                },
            }))
        })
        .collect()
}

/// Read the first choice of a chat completion back into an assistant message
///
/// Tool calls that cannot be used are kept as failed requests rather than dropped,
/// so the model is told about them on the next turn.
pub fn openai_response_to_message(response: Value) -> Result<Message> {
    let choice = response
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("Response has no message choice: {}", response))?;

    let mut content = Vec::new();
    if let Some(text) = choice.get("content").and_then(Value::as_str) {
        content.push(MessageContent::text(text));
    }
    for call in choice
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let id = call["id"].as_str().unwrap_or_default();
        content.push(MessageContent::tool_request(id, decode_tool_call(id, call)));
    }

    Ok(Message {
        role: Role::Assistant,
        created: chrono::Utc::now().timestamp(),
        content,
    })
}

fn decode_tool_call(id: &str, call: &Value) -> AgentResult<ToolCall> {
    let name = call["function"]["name"].as_str().unwrap_or_default();
    if name.is_empty() || NOT_IN_FUNCTION_NAME.is_match(name) {
        return Err(AgentError::ToolNotFound(format!(
            "Tool name '{}' is not usable, names may only contain [a-zA-Z0-9_-]",
            name
        )));
    }

    let raw = call["function"]["arguments"].as_str().unwrap_or_default();
    let arguments = serde_json::from_str(raw).map_err(|e| {
        AgentError::InvalidParameters(format!("Arguments for tool call {} are not JSON: {}", id, e))
    })?;
    Ok(ToolCall::new(name, arguments))
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

/// Recognise the error object OpenAI returns when the history is too long
pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code").and_then(Value::as_str)?;
    CONTEXT_LENGTH_CODES.contains(&code).then(|| {
        let detail = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        ContextLengthExceededError(detail.to_string())
    })
}

/// Pull token counts out of an OpenAI style `usage` block
pub fn get_openai_usage(data: &Value) -> Result<Usage> {
    let usage = data
        .get("usage")
        .ok_or_else(|| anyhow!("No usage data in response"))?;
    let count = |key: &str| usage.get(key).and_then(Value::as_i64).map(|n| n as i32);

    let input = count("prompt_tokens");
    let output = count("completion_tokens");
    let total = count("total_tokens").or_else(|| Some(input? + output?));
    Ok(Usage::new(input, output, total))
}

/// Build the chat completion payload shared by every OpenAI compatible provider
pub fn create_openai_request_payload(
    model: &str,
    system: &str,
    messages: &[Message],
    tools: &[Tool],
    temperature: Option<f32>,
    max_tokens: Option<i32>,
) -> Result<Value> {
    let mut chat = vec![json!({"role": "system", "content": system})];
    chat.extend(messages_to_openai_spec(messages));

    let mut payload = Map::new();
    payload.insert("model".to_string(), json!(model));
    payload.insert("messages".to_string(), Value::Array(chat));
    if !tools.is_empty() {
        payload.insert("tools".to_string(), Value::Array(tools_to_openai_spec(tools)?));
    }
    if let Some(temperature) = temperature {
        payload.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(max_tokens) = max_tokens {
        payload.insert("max_tokens".to_string(), json!(max_tokens));
    }
    Ok(Value::Object(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::Content;
    use indoc::indoc;

    const SEARCH_CALL_RESPONSE: &str = indoc! {r#"
        {
            "id": "chatcmpl-42",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_7",
                        "type": "function",
                        "function": {
                            "name": "tavily_search_results_json",
                            "arguments": "{\"query\": \"tallest building in 2024\"}"
                        }
                    }]
                }
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 18, "total_tokens": 138}
        }
    "#};

    fn search_call() -> Result<Value> {
        Ok(serde_json::from_str(SEARCH_CALL_RESPONSE)?)
    }

    fn only_request(message: &Message) -> &ToolRequest {
        match message.content.as_slice() {
            [MessageContent::ToolRequest(request)] => request,
            other => panic!("Expected a single tool request, got {:?}", other),
        }
    }

    #[test]
    fn test_search_exchange_is_laid_out_in_order() {
        let history = vec![
            Message::user().with_text("Which building is tallest?"),
            Message::assistant().with_tool_request(
                "call_7",
                Ok(ToolCall::new(
                    "tavily_search_results_json",
                    json!({"query": "tallest building"}),
                )),
            ),
            Message::tool().with_tool_response("call_7", Ok(vec![Content::text("Burj Khalifa")])),
            Message::assistant().with_text("The Burj Khalifa."),
        ];

        let spec = messages_to_openai_spec(&history);

        let roles: Vec<&str> = spec.iter().filter_map(|m| m["role"].as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
        assert_eq!(spec[0]["content"], "Which building is tallest?");
        assert!(spec[1].get("content").is_none());
        let call = &spec[1]["tool_calls"][0];
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "tavily_search_results_json");
        assert_eq!(call["function"]["arguments"], r#"{"query":"tallest building"}"#);
        assert_eq!(spec[2]["tool_call_id"], call["id"]);
        assert_eq!(spec[2]["content"], json!([{"type": "text", "text": "Burj Khalifa"}]));
        assert_eq!(spec[3]["content"], "The Burj Khalifa.");
    }

    #[test]
    fn test_outgoing_tool_names_are_cleaned() {
        let history = vec![Message::assistant()
            .with_tool_request("call_1", Ok(ToolCall::new("web search!", json!({}))))];

        let spec = messages_to_openai_spec(&history);

        assert_eq!(spec[0]["tool_calls"][0]["function"]["name"], "web_search_");
    }

    #[test]
    fn test_undecodable_request_keeps_its_slot() {
        let failure = || AgentError::InvalidParameters("arguments were cut off".to_string());
        let history = vec![
            Message::assistant().with_tool_request("call_9", Err(failure())),
            Message::tool().with_tool_response("call_9", Err(failure())),
        ];

        let spec = messages_to_openai_spec(&history);

        assert_eq!(spec.len(), 2);
        assert_eq!(spec[0]["tool_calls"][0]["function"]["name"], UNDECODABLE_TOOL_NAME);
        assert_eq!(spec[0]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(spec[1]["tool_call_id"], "call_9");
        let text = spec[1]["content"].as_str().unwrap_or_default();
        assert!(text.contains("arguments were cut off"));
    }

    #[test]
    fn test_empty_assistant_text_is_skipped() {
        let spec = messages_to_openai_spec(&[Message::assistant().with_text("")]);
        assert!(spec.is_empty());
    }

    #[test]
    fn test_tools_become_function_definitions() -> Result<()> {
        let schema = json!({"type": "object", "properties": {"query": {"type": "string"}}});
        let tools = [Tool::new("tavily_search_results_json", "Search the web", schema.clone())];

        let spec = tools_to_openai_spec(&tools)?;

        assert_eq!(
            spec,
            vec![json!({
                "type": "function",
                "function": {
                    "name": "tavily_search_results_json",
                    "description": "Search the web",
                    "parameters": schema,
                }
            })]
        );
        assert!(tools_to_openai_spec(&[])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_tool_names_must_be_unique() {
        let search = Tool::new("search", "Search", json!({"type": "object"}));
        let err = tools_to_openai_spec(&[search.clone(), search]).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate tool name: search");
    }

    #[test]
    fn test_reads_text_answer() -> Result<()> {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "Mount Everest, 8849 m."}}]
        });

        let message = openai_response_to_message(response)?;

        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text(), "Mount Everest, 8849 m.");
        assert!(message.tool_requests().is_empty());
        Ok(())
    }

    #[test]
    fn test_response_without_choices_is_an_error() {
        let response = json!({"object": "chat.completion", "choices": []});
        assert!(openai_response_to_message(response).is_err());
    }

    #[test]
    fn test_reads_search_call() -> Result<()> {
        let message = openai_response_to_message(search_call()?)?;

        let request = only_request(&message);
        assert_eq!(request.id, "call_7");
        let call = request.tool_call.as_ref().map_err(|e| anyhow!("{}", e))?;
        assert_eq!(call.name, "tavily_search_results_json");
        assert_eq!(call.arguments, json!({"query": "tallest building in 2024"}));
        Ok(())
    }

    #[test]
    fn test_unusable_tool_name_becomes_failed_request() -> Result<()> {
        let mut response = search_call()?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["name"] =
            json!("search the web");

        let message = openai_response_to_message(response)?;

        match &only_request(&message).tool_call {
            Err(AgentError::ToolNotFound(msg)) => assert!(msg.contains("'search the web'")),
            other => panic!("Expected ToolNotFound, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_truncated_arguments_become_failed_request() -> Result<()> {
        let mut response = search_call()?;
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] =
            json!("{\"query\": \"tallest");

        let message = openai_response_to_message(response)?;

        match &only_request(&message).tool_call {
            Err(AgentError::InvalidParameters(msg)) => assert!(msg.contains("call_7")),
            other => panic!("Expected InvalidParameters, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_context_length_codes() {
        for code in CONTEXT_LENGTH_CODES {
            let error = json!({"code": code, "message": "history too long"});
            let err = check_openai_context_length_error(&error).map(|e| e.to_string());
            assert_eq!(err.as_deref(), Some("Context length exceeded. Message: history too long"));
        }

        let rate_limited = json!({"code": "rate_limit_exceeded", "message": "slow down"});
        assert!(check_openai_context_length_error(&rate_limited).is_none());
        assert!(check_openai_context_length_error(&json!({"message": "no code"})).is_none());
    }

    #[test]
    fn test_usage_counts() -> Result<()> {
        let usage = get_openai_usage(&search_call()?)?;
        assert_eq!(
            (usage.input_tokens, usage.output_tokens, usage.total_tokens),
            (Some(120), Some(18), Some(138))
        );

        let partial = get_openai_usage(&json!({"usage": {"prompt_tokens": 4, "completion_tokens": 6}}))?;
        assert_eq!(partial.total_tokens, Some(10));

        let input_only = get_openai_usage(&json!({"usage": {"prompt_tokens": 4}}))?;
        assert_eq!(input_only.total_tokens, None);

        assert!(get_openai_usage(&json!({})).is_err());
        Ok(())
    }

    #[test]
    fn test_payload_leads_with_system_prompt() -> Result<()> {
        let tool = Tool::new("search", "Search", json!({"type": "object"}));
        let payload = create_openai_request_payload(
            "gpt-4o",
            "You are a researcher.",
            &[Message::user().with_text("Hi")],
            &[tool],
            Some(0.2),
            None,
        )?;

        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(
            payload["messages"][0],
            json!({"role": "system", "content": "You are a researcher."})
        );
        assert_eq!(payload["messages"][1]["content"], "Hi");
        assert_eq!(payload["tools"][0]["function"]["name"], "search");
        assert!(payload.get("max_tokens").is_none());

        let bare = create_openai_request_payload("llama3.2", "sys", &[], &[], None, Some(64))?;
        assert!(bare.get("tools").is_none());
        assert_eq!(bare["max_tokens"], 64);
        Ok(())
    }
}
