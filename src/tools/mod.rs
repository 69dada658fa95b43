//! Tools module - actions the model can request mid-turn
//!
//! Each tool returns text or fails. The agent loop only sees tools through
//! [`ToolRunner::invoke_named`], which bills every attempt and turns every
//! failure into "no result".

mod runner;
mod web;

pub use runner::{ToolRunner, ToolSchema};
pub use web::WebFetchTool;

use async_trait::async_trait;
use serde_json::Value;
use crate::billing::{ReportsUsage, UsageSignal};
use crate::catalog::CostEstimate;
use crate::Result;

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<String>;

    /// Whether running this tool uploads media to the user.
    fn produces_media(&self) -> bool {
        false
    }

    /// Pricing for one call. Free unless the tool says otherwise.
    fn cost(&self) -> CostEstimate {
        CostEstimate::default()
    }

    /// Convert to tool schema for LLM
    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Text returned by a tool; each one counts as a single billable call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput(pub String);

impl ReportsUsage for ToolOutput {
    fn usage_signal(&self) -> UsageSignal {
        UsageSignal {
            calls: 1,
            ..UsageSignal::default()
        }
    }
}

/// Dummy tool for testing
#[cfg(test)]
pub struct DummyTool {
    pub name: String,
    pub result: Option<String>,
}

#[cfg(test)]
#[async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { "Dummy tool for testing" }
    fn parameters(&self) -> Value { serde_json::json!({"type": "object"}) }

    async fn execute(&self, _params: Value) -> Result<String> {
        self.result
            .clone()
            .ok_or_else(|| crate::error::Error::Tool(format!("{} declined", self.name)))
    }
}
