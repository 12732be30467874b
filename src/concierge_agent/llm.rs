//! OpenAI-compatible Chat Completions client.
//!
//! Serves both the conversational runtime (with tool calling) and the
//! consolidation merger (a single user message, no tools). Transient
//! failures are retried with exponential backoff.

use super::runtime::{ModelRuntime, ModelStep, ToolCall};
use super::tools::ToolSchema;
use crate::memory::{ConversationEntry, NoteMerger};
use crate::{ConciergeConfig, ConciergeError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRY_ATTEMPTS: u32 = 4;
const RETRY_BASE_DELAY_MS: u64 = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ─── Chat Completions wire types ────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool<'a>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

// some compatible servers send `"tool_calls": null`
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ChatFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolSchema,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Convert the instructions and history into Chat Completions messages.
///
/// Consecutive tool calls become one assistant message carrying all of them;
/// each tool result becomes a `tool` message keyed by its call id.
fn to_chat_messages(instructions: &str, history: &[ConversationEntry]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::text("system", instructions)];

    for entry in history {
        match entry {
            ConversationEntry::User { content } => messages.push(ChatMessage::text("user", content)),
            ConversationEntry::Assistant { content } => {
                messages.push(ChatMessage::text("assistant", content))
            }
            ConversationEntry::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                let call = ChatToolCall {
                    id: call_id.clone(),
                    call_type: function_type(),
                    function: ChatFunctionCall {
                        name: name.clone(),
                        arguments: arguments.clone(),
                    },
                };
                match messages.last_mut() {
                    Some(last) if last.role == "assistant" && !last.tool_calls.is_empty() => {
                        last.tool_calls.push(call)
                    }
                    _ => messages.push(ChatMessage {
                        role: "assistant".to_string(),
                        content: None,
                        tool_calls: vec![call],
                        tool_call_id: None,
                    }),
                }
            }
            ConversationEntry::ToolResult { call_id, output } => messages.push(ChatMessage {
                role: "tool".to_string(),
                content: Some(output.clone()),
                tool_calls: Vec::new(),
                tool_call_id: Some(call_id.clone()),
            }),
        }
    }

    messages
}

fn to_model_step(message: ChatMessage) -> ModelStep {
    if message.tool_calls.is_empty() {
        return ModelStep::Final(message.content.unwrap_or_default());
    }
    if let Some(text) = message.content.as_deref().filter(|t| !t.trim().is_empty()) {
        debug!(
            "Dropping {} chars of assistant text sent alongside tool calls",
            text.len()
        );
    }
    ModelStep::ToolCalls(
        message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall {
                call_id: c.id,
                name: c.function.name,
                arguments: c.function.arguments,
            })
            .collect(),
    )
}

// ─── Client ─────────────────────────────────────────────────────────

/// Chat Completions client used for turns and consolidation
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// Build a client for the configured turn model. Requires `OPENAI_API_KEY`.
    pub fn from_config(config: &ConciergeConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConciergeError::Auth("OPENAI_API_KEY is not set".to_string()))?;
        Self::new(&config.base_url, api_key, &config.model)
    }

    pub fn new(base_url: &str, api_key: impl Into<String>, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConciergeError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.to_string(),
        })
    }

    /// Same endpoint and credentials, different model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn retry_backoff(attempt: u32) -> Duration {
        let exp = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(exp))
    }

    fn is_retryable_error(msg: &str) -> bool {
        msg.contains("timeout")
            || msg.contains("network")
            || msg.contains("retryable")
            || msg.contains("error sending request")
    }

    async fn send_once(&self, request: &ChatRequest<'_>) -> Result<ChatMessage> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;

        let response = Self::check_response_status(response).await?;
        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ConciergeError::Model(format!("malformed response: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ConciergeError::Model("response had no choices".to_string()))
    }

    /// Send a request, retrying transient failures.
    async fn send(&self, request: &ChatRequest<'_>) -> Result<ChatMessage> {
        debug!(
            "Calling {} with {} messages, {} tools",
            self.model,
            request.messages.len(),
            request.tools.len()
        );

        let mut last_err = None;
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                let delay = Self::retry_backoff(attempt);
                warn!(
                    "LLM request failed (attempt {}/{}), retrying in {:?}...",
                    attempt, MAX_RETRY_ATTEMPTS, delay
                );
                tokio::time::sleep(delay).await;
            }

            match self.send_once(request).await {
                Ok(message) => return Ok(message),
                Err(e) => {
                    if Self::is_retryable_error(&e.to_string()) && attempt + 1 < MAX_RETRY_ATTEMPTS {
                        last_err = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ConciergeError::Model("all retry attempts exhausted".to_string())))
    }

    async fn check_response_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let detail = Self::extract_error_detail(&body);
        let prefix = if status.is_server_error() {
            "retryable API error"
        } else {
            "API error"
        };
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ConciergeError::Auth(format!("{status}: {detail}")));
        }
        if detail.is_empty() {
            return Err(ConciergeError::Model(format!("{prefix} {status}")));
        }
        Err(ConciergeError::Model(format!("{prefix} {status}: {detail}")))
    }

    fn extract_error_detail(body: &str) -> String {
        let trimmed = body.trim();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(msg) = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
        }
        trimmed.chars().take(500).collect()
    }

    fn map_reqwest_error(e: reqwest::Error) -> ConciergeError {
        if e.is_timeout() {
            ConciergeError::Model(format!("timeout: {e}"))
        } else if e.is_connect() {
            ConciergeError::Model(format!("network: {e}"))
        } else {
            ConciergeError::Model(e.to_string())
        }
    }
}

#[async_trait]
impl ModelRuntime for LlmClient {
    async fn step(
        &self,
        instructions: &str,
        tools: &[ToolSchema],
        history: &[ConversationEntry],
    ) -> Result<ModelStep> {
        let request = ChatRequest {
            model: &self.model,
            messages: to_chat_messages(instructions, history),
            tools: tools
                .iter()
                .map(|function| ChatTool {
                    tool_type: "function",
                    function,
                })
                .collect(),
        };
        let message = self.send(&request).await?;
        Ok(to_model_step(message))
    }
}

#[async_trait]
impl NoteMerger for LlmClient {
    async fn merge_notes(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage::text("user", prompt)],
            tools: Vec::new(),
        };
        let message = self.send(&request).await?;
        Ok(message.content.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ConversationEntry {
        ConversationEntry::ToolCall {
            call_id: id.to_string(),
            name: name.to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[test]
    fn test_tool_calls_grouped_into_one_assistant_message() {
        let history = vec![
            ConversationEntry::user("Flights to Paris?"),
            call("a", "lookup_airport_code"),
            call("b", "search_flight_offers"),
            ConversationEntry::ToolResult {
                call_id: "a".to_string(),
                output: "{}".to_string(),
            },
            ConversationEntry::ToolResult {
                call_id: "b".to_string(),
                output: "[]".to_string(),
            },
            ConversationEntry::assistant("Here you go"),
        ];

        let messages = to_chat_messages("be helpful", &history);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(
            roles,
            vec!["system", "user", "assistant", "tool", "tool", "assistant"]
        );
        assert_eq!(messages[2].tool_calls.len(), 2);
        assert_eq!(messages[2].content, None);
        assert_eq!(messages[4].tool_call_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_serialized_shape() {
        let messages = to_chat_messages("sys", &[call("a", "lookup_airport_code")]);
        let value = serde_json::to_value(&messages[1]).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "a",
                    "type": "function",
                    "function": {"name": "lookup_airport_code", "arguments": "{}"}
                }]
            })
        );
    }

    #[test]
    fn test_response_to_step() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "save_memory_note", "arguments": "{\"text\":\"x\"}"}
            }]
        }))
        .unwrap();
        assert_eq!(
            to_model_step(message),
            ModelStep::ToolCalls(vec![ToolCall {
                call_id: "call_1".to_string(),
                name: "save_memory_note".to_string(),
                arguments: "{\"text\":\"x\"}".to_string(),
            }])
        );

        let message: ChatMessage = serde_json::from_value(
            json!({"role": "assistant", "content": "Hi", "tool_calls": null}),
        )
        .unwrap();
        assert_eq!(to_model_step(message), ModelStep::Final("Hi".to_string()));
    }

    #[test]
    fn test_tool_calls_win_over_accompanying_text() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": "Let me check flights.",
            "tool_calls": [{
                "id": "call_2",
                "type": "function",
                "function": {"name": "lookup_airport_code", "arguments": "{\"city_name\":\"Paris\"}"}
            }]
        }))
        .unwrap();
        assert_eq!(
            to_model_step(message),
            ModelStep::ToolCalls(vec![ToolCall {
                call_id: "call_2".to_string(),
                name: "lookup_airport_code".to_string(),
                arguments: "{\"city_name\":\"Paris\"}".to_string(),
            }])
        );
    }

    #[test]
    fn test_error_detail_extraction() {
        assert_eq!(
            LlmClient::extract_error_detail(r#"{"error": {"message": "bad key"}}"#),
            "bad key"
        );
        assert_eq!(LlmClient::extract_error_detail("  plain  "), "plain");
    }

    #[test]
    fn test_with_model_keeps_endpoint() {
        let client = LlmClient::new("https://example.test/v1/", "k", "gpt-4o").unwrap();
        let merger = client.with_model("gpt-4o-mini");
        assert_eq!(merger.model(), "gpt-4o-mini");
        assert_eq!(merger.base_url, "https://example.test/v1");
    }
}
