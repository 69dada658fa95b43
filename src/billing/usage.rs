//! Tolerant usage extraction from provider-specific payloads.
//!
//! Providers name the same counters differently. Each concept has an ordered
//! alias list; the first alias present wins. Supporting a new provider schema
//! means adding its field names here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const INPUT_TOKENS: &[&str] = &["input_tokens", "prompt_tokens", "prompt_token_count", "promptTokenCount"];
const OUTPUT_TOKENS: &[&str] = &[
    "output_tokens",
    "completion_tokens",
    "candidates_token_count",
    "candidatesTokenCount",
];
const TOTAL_TOKENS: &[&str] = &["total_tokens", "total_token_count", "totalTokenCount"];

// Breakdown counters, only read from the top level of the payload.
const REASONING_TOKENS: &[&str] = &["reasoning_tokens"];
const CITATION_TOKENS: &[&str] = &["citation_tokens"];

const DURATION_SECONDS: &[&str] = &["duration_seconds", "duration", "audio_seconds"];
const IMAGE_SIZES: &[&str] = &["image_sizes", "sizes"];

/// Containers some providers wrap their counters in.
const CONTAINERS: &[&str] = &["usage", "usage_metadata", "usageMetadata"];

/// Normalized usage counters for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSignal {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub search_tokens: u64,
    pub total_tokens: u64,
    pub duration_seconds: f64,
    /// Billable calls for flat-priced tools that report no tokens.
    #[serde(default)]
    pub calls: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_sizes: Vec<String>,
}

impl UsageSignal {
    /// No tokens, durations, calls or image sizes.
    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
            && self.input_tokens == 0
            && self.output_tokens == 0
            && self.search_tokens == 0
            && self.duration_seconds <= 0.0
            && self.calls == 0
            && self.image_sizes.is_empty()
    }
}

/// Implemented by responses that carry a usage signal.
pub trait ReportsUsage {
    fn usage_signal(&self) -> UsageSignal;
}

/// Extract a [`UsageSignal`] from a raw provider usage payload.
pub fn extract_usage(payload: &Value) -> UsageSignal {
    let mut input = lookup_u64(payload, INPUT_TOKENS).unwrap_or(0);
    let mut output = lookup_u64(payload, OUTPUT_TOKENS).unwrap_or(0);
    let explicit_total = lookup_u64(payload, TOTAL_TOKENS);

    let reasoning = top_level_u64(payload, REASONING_TOKENS);
    let citation = top_level_u64(payload, CITATION_TOKENS);

    let mut search = 0;
    if reasoning.is_some() || citation.is_some() {
        input += reasoning.unwrap_or(0);
        output += citation.unwrap_or(0);
        if let Some(total) = explicit_total {
            search = total.saturating_sub(input + output);
        }
    }

    let total = match explicit_total {
        Some(total) => total,
        None if input > 0 && output > 0 => input + output,
        None => 0,
    };

    UsageSignal {
        input_tokens: input,
        output_tokens: output,
        search_tokens: search,
        total_tokens: total,
        duration_seconds: lookup_f64(payload, DURATION_SECONDS).unwrap_or(0.0),
        calls: 0,
        image_sizes: lookup_sizes(payload),
    }
}

fn scopes(payload: &Value) -> impl Iterator<Item = &Value> {
    std::iter::once(payload).chain(CONTAINERS.iter().filter_map(move |c| payload.get(*c)))
}

fn find<'a>(payload: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    scopes(payload).find_map(|scope| aliases.iter().find_map(|alias| scope.get(*alias)))
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lookup_u64(payload: &Value, aliases: &[&str]) -> Option<u64> {
    find(payload, aliases).and_then(as_u64)
}

fn top_level_u64(payload: &Value, aliases: &[&str]) -> Option<u64> {
    aliases.iter().find_map(|alias| payload.get(*alias)).and_then(as_u64)
}

fn lookup_f64(payload: &Value, aliases: &[&str]) -> Option<f64> {
    find(payload, aliases).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lookup_sizes(payload: &Value) -> Vec<String> {
    match find(payload, IMAGE_SIZES) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(size)) => vec![size.clone()],
        _ => vec![],
    }
}
