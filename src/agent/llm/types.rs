//! Shared types for Gemini API responses.
//!
//! Only the fields the agent reads are modelled; usage metadata stays a raw
//! JSON value so billing sees exactly what the provider reported.

use serde::Deserialize;
use serde_json::Value;

/// Top-level Gemini API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    pub candidates: Vec<Candidate>,
    /// Kept raw for the usage extractor.
    pub usage_metadata: Option<Value>,
}

/// A single response candidate.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Content,
    pub finish_reason: Option<String>,
}

/// Content block containing parts.
#[derive(Debug, Deserialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

/// A single part of the response (text or function call).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub function_call: Option<FunctionCall>,
}

/// Function call requested by the model.
#[derive(Debug, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}
