//! OpenAI-compatible chat completions client.
//!
//! Works against OpenAI, Perplexity, OpenRouter and any server exposing
//! `POST {base}/chat/completions`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Error;
use crate::tools::ToolSchema;
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::{LlmClient, LlmResponse};

pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const PERPLEXITY_API_URL: &str = "https://api.perplexity.ai";
pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1";

/// OpenAI-compatible client using bearer token authentication.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    /// Kept raw for the usage extractor.
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    /// JSON-encoded arguments string.
    arguments: String,
}

impl OpenAiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => json!({"role": "system", "content": m.content}),
                Role::User => json!({"role": "user", "content": m.content}),
                Role::Tool => json!({
                    "role": "tool",
                    "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                    "content": m.content
                }),
                Role::Assistant => match m.tool_calls {
                    Some(ref calls) if !calls.is_empty() => {
                        let calls: Vec<Value> = calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.arguments.to_string()
                                    }
                                })
                            })
                            .collect();
                        json!({"role": "assistant", "content": m.content, "tool_calls": calls})
                    }
                    _ => json!({"role": "assistant", "content": m.content}),
                },
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolSchema]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    }
                })
            })
            .collect()
    }

    fn parse_response(completion: ChatCompletion) -> Result<LlmResponse> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(Value::String(tc.function.arguments)),
            })
            .collect();

        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: completion.usage.unwrap_or(Value::Null),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmResponse> {
        let mut request = json!({
            "model": self.model,
            "messages": Self::convert_messages(messages),
        });

        if !tools.is_empty() {
            request["tools"] = json!(Self::convert_tools(tools));
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(Error::Llm(format!("{} API error ({status}): {error_text}", self.model)));
        }

        let completion: ChatCompletion = response.json().await?;
        Self::parse_response(completion)
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
