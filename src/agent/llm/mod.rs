//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ModelFactory`] / [`ProviderRegistry`] to build a client for a resolved tool
//! - Concrete implementations: Gemini, OpenAI-compatible chat completions
//!
//! Clients return the provider's usage object untouched; normalizing it is the
//! job of [`crate::billing::extract_usage`].
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `anthropic.rs`)
//! 2. Implement `LlmClient` trait
//! 3. Add to `ProviderRegistry::create()`
//! 4. Add catalog entries for its models in `catalog/mod.rs`

mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::billing::{extract_usage, ReportsUsage, UsageSignal};
use crate::catalog::ConfiguredTool;
use crate::error::Error;
use crate::tools::ToolSchema;
use crate::Result;

pub use types::*;

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use super::message::{Message, ToolCallRequest};

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the LLM.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Raw provider usage payload; its shape varies by provider.
    pub usage: Value,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Value::Null,
        }
    }

    /// Create a response that only requests tool calls.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
            finish_reason: "tool_calls".to_string(),
            usage: Value::Null,
        }
    }

    /// Attach a raw usage payload.
    pub fn with_usage(mut self, usage: Value) -> Self {
        self.usage = usage;
        self
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

impl ReportsUsage for LlmResponse {
    fn usage_signal(&self) -> UsageSignal {
        extract_usage(&self.usage)
    }
}

/// LLM client trait — swappable provider abstraction.
///
/// Implement this trait to add a new LLM provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send messages and get response.
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmResponse>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Builds a client for a resolved, credentialed tool.
pub trait ModelFactory: Send + Sync {
    fn create(&self, tool: &ConfiguredTool) -> Result<Arc<dyn LlmClient>>;
}

/// Provider registry — creates LLM clients from the tool's provider key.
///
/// # Example
///
/// ```ignore
/// let client = ProviderRegistry.create(&configured_tool)?;
/// let response = client.chat(&messages, &tools).await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["google", "openai", "perplexity", "openrouter"]
    }
}

impl ModelFactory for ProviderRegistry {
    /// Supported providers:
    /// - `"google"`: Gemini generateContent API
    /// - `"openai"`, `"perplexity"`, `"openrouter"`: OpenAI-compatible chat completions
    /// - anything else with an explicit `endpoint`: OpenAI-compatible
    fn create(&self, tool: &ConfiguredTool) -> Result<Arc<dyn LlmClient>> {
        let def = &tool.definition;
        let endpoint = def.endpoint.as_deref();

        match def.provider.as_str() {
            "google" | "gemini" => Ok(Arc::new(GeminiClient::new(&tool.token, &def.id))),
            "openai" => Ok(Arc::new(OpenAiClient::new(
                &tool.token,
                &def.id,
                endpoint.unwrap_or(openai::OPENAI_API_URL),
            ))),
            "perplexity" => Ok(Arc::new(OpenAiClient::new(
                &tool.token,
                &def.id,
                endpoint.unwrap_or(openai::PERPLEXITY_API_URL),
            ))),
            "openrouter" => Ok(Arc::new(OpenAiClient::new(
                &tool.token,
                &def.id,
                endpoint.unwrap_or(openai::OPENROUTER_API_URL),
            ))),
            other => match endpoint {
                Some(url) => Ok(Arc::new(OpenAiClient::new(&tool.token, &def.id, url))),
                None => Err(Error::Config(format!("Unknown provider: {other}"))),
            },
        }
    }
}

/// Fake LLM client for testing.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse>>>,
    calls: std::sync::atomic::AtomicUsize,
    received: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Usage payload attached to every scripted response.
    pub fn default_usage() -> Value {
        serde_json::json!({"prompt_tokens": 10, "completion_tokens": 5})
    }

    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::scripted(responses.iter().map(|s| Ok(LlmResponse::text(*s))).collect())
    }

    /// Create from arbitrary scripted results. Responses without usage get [`Self::default_usage`].
    pub fn scripted(responses: Vec<Result<LlmResponse>>) -> Self {
        let responses = responses
            .into_iter()
            .map(|r| {
                r.map(|resp| {
                    if resp.usage.is_null() {
                        resp.with_usage(Self::default_usage())
                    } else {
                        resp
                    }
                })
            })
            .collect();
        Self {
            responses: std::sync::Mutex::new(responses),
            calls: std::sync::atomic::AtomicUsize::new(0),
            received: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, args: Value, final_response: &str) -> Self {
        let call = ToolCallRequest {
            id: "tc_1".to_string(),
            name: name.to_string(),
            arguments: args,
        };
        Self::scripted(vec![
            Ok(LlmResponse::tool_calls(vec![call])),
            Ok(LlmResponse::text(final_response)),
        ])
    }

    /// Number of chat calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Messages passed to each chat call, oldest call first.
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(&self, messages: &[Message], _tools: &[ToolSchema]) -> Result<LlmResponse> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.received.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .unwrap_or_else(|| Err(Error::Llm("No more fake responses".to_string())))
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}
