//! Gemini LLM client implementation (API key authentication).

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::Error;
use crate::tools::ToolSchema;
use crate::Result;

use super::super::message::{Message, Role, ToolCallRequest};
use super::{GeminiResponse, LlmClient, LlmResponse};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client using API key authentication.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiClient {
    /// Create a new Gemini client with API key.
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: Client::new(),
        }
    }

    fn build_url(&self) -> String {
        format!("{}/{}:generateContent", GEMINI_API_URL, self.model)
    }

    fn convert_messages(&self, messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| match m.role {
                Role::Tool => json!({
                    "role": "function",
                    "parts": [{
                        "functionResponse": {
                            "name": m.tool_name.as_deref().unwrap_or("unknown"),
                            "response": {"result": m.content}
                        }
                    }]
                }),
                _ => {
                    let role = if m.role == Role::Assistant { "model" } else { "user" };
                    match m.tool_calls {
                        Some(ref tool_calls) => {
                            let calls: Vec<Value> = tool_calls
                                .iter()
                                .map(|tc| json!({"functionCall": {"name": tc.name, "args": tc.arguments}}))
                                .collect();
                            json!({"role": role, "parts": calls})
                        }
                        None => json!({"role": role, "parts": [{"text": m.content}]}),
                    }
                }
            })
            .collect()
    }

    /// Gemini takes a single system instruction; later system messages are appended to it.
    fn get_system_instruction(&self, messages: &[Message]) -> Option<String> {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        (!system.is_empty()).then(|| system.join("\n\n"))
    }

    fn convert_tools(&self, tools: &[ToolSchema]) -> Option<Value> {
        if tools.is_empty() {
            return None;
        }

        let function_declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters
                })
            })
            .collect();

        Some(json!([{
            "functionDeclarations": function_declarations
        }]))
    }

    fn parse_response(&self, response: GeminiResponse) -> Result<LlmResponse> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("No candidates in response".to_string()))?;

        let mut content: Option<String> = None;
        let mut tool_calls = Vec::new();

        for part in candidate.content.parts {
            if let Some(text) = part.text {
                match content {
                    Some(ref mut existing) => existing.push_str(&text),
                    None => content = Some(text),
                }
            }

            if let Some(fc) = part.function_call {
                tool_calls.push(ToolCallRequest {
                    id: format!("tc_{}", tool_calls.len()),
                    name: fc.name,
                    arguments: fc.args,
                });
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
            finish_reason: candidate.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: response.usage_metadata.unwrap_or(Value::Null),
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmResponse> {
        let contents = self.convert_messages(messages);
        let system_instruction = self.get_system_instruction(messages);

        let mut request = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": 0.7,
                "maxOutputTokens": 8192
            }
        });

        if let Some(system) = system_instruction {
            request["systemInstruction"] = json!({
                "parts": [{"text": system}]
            });
        }

        if let Some(tool_config) = self.convert_tools(tools) {
            request["tools"] = tool_config;
        }

        let response = self
            .client
            .post(self.build_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(Error::Llm(format!("Gemini API error: {error_text}")));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        self.parse_response(gemini_response)
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function_call_and_usage() {
        let client = GeminiClient::new("k", "gemini-2.0-flash");
        let raw: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "Let me check."},
                    {"functionCall": {"name": "web_fetch", "args": {"url": "https://example.com"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16}
        }))
        .unwrap();

        let resp = client.parse_response(raw).unwrap();
        assert_eq!(resp.content.as_deref(), Some("Let me check."));
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "web_fetch");
        assert_eq!(resp.usage["totalTokenCount"], 16);
    }

    #[test]
    fn test_tool_result_uses_tool_name() {
        let client = GeminiClient::new("k", "m");
        let call = ToolCallRequest {
            id: "tc_0".to_string(),
            name: "web_fetch".to_string(),
            arguments: json!({}),
        };
        let messages = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant_with_tools("", vec![call.clone()]),
            Message::tool_result(&call, "ok"),
        ];

        let contents = client.convert_messages(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["name"], "web_fetch");
        assert_eq!(client.get_system_instruction(&messages).as_deref(), Some("sys"));
    }

    #[test]
    fn test_no_candidates_is_error() {
        let client = GeminiClient::new("k", "m");
        let raw: GeminiResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert!(client.parse_response(raw).is_err());
    }
}
