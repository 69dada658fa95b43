//! Web fetch tool

use async_trait::async_trait;
use serde_json::{json, Value};
use crate::Result;
use crate::error::Error;
use super::Tool;

const DEFAULT_MAX_LENGTH: usize = 10_000;

/// Fetches a URL and returns its readable text
pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str { "web_fetch" }
    fn description(&self) -> &str { "Fetch a web page and return its text content" }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch"
                },
                "max_length": {
                    "type": "number",
                    "description": "Maximum characters to return (default 10000)"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let url = params.get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Tool("Missing 'url' parameter".to_string()))?;

        let max_len = params.get("max_length")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_LENGTH);

        let response = self.client.get(url)
            .header("User-Agent", concat!("chatterbox/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|e| Error::Tool(format!("Failed to fetch {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Tool(format!("HTTP error: {}", status)));
        }

        let text = response.text().await
            .map_err(|e| Error::Tool(format!("Failed to read response: {}", e)))?;

        Ok(truncate_chars(&html_to_text(&text), max_len))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!(
            "{}...\n\n[Truncated - {} total chars]",
            &text[..cut],
            text.chars().count()
        ),
        None => text.to_string(),
    }
}

/// Strip one kind of element together with its content
fn strip_element(text: &str, open: &str, close: &str) -> String {
    let mut text = text.to_string();
    while let Some(start) = text.find(open) {
        match text[start..].find(close) {
            Some(end) => text.replace_range(start..start + end + close.len(), ""),
            None => break,
        }
    }
    text
}

/// Very basic HTML to text conversion
fn html_to_text(html: &str) -> String {
    let text = strip_element(html, "<script", "</script>");
    let text = strip_element(&text, "<style", "</style>");

    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
