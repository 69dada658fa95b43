//! Tool runner - manages and executes tools

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use crate::Result;
use crate::agent::Invoker;
use crate::billing::UsageTracker;
use crate::catalog::{Capability, ConfiguredTool, ToolDefinition};
use crate::error::Error;
use super::{Tool, ToolOutput};
use super::web::WebFetchTool;

/// Provider recorded for tools that run in-process.
pub const LOCAL_PROVIDER: &str = "local";

/// Function schema advertised to the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool runner manages registered tools and executes them
pub struct ToolRunner {
    tools: HashMap<String, Box<dyn Tool>>,
    /// Registration order, so schemas are advertised deterministically.
    order: Vec<String>,
}

impl ToolRunner {
    /// Create an empty tool runner
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Create a tool runner with default tools
    pub fn new_with_defaults() -> Self {
        let mut runner = Self::new();
        runner.register(WebFetchTool::new());
        runner
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Box::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    /// Get tool schemas for LLM
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.to_schema())
            .collect()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, params: Value) -> Result<String> {
        let tool = self.tools.get(name)
            .ok_or_else(|| Error::Tool(format!("Unknown tool: {}", name)))?;

        tool.execute(params).await
    }

    /// Invoke a tool by name on behalf of `invoker`, recording its usage.
    ///
    /// Every attempt on a registered tool yields one usage record. `None` means
    /// the tool declined, failed or does not exist; unknown tools never run and
    /// are not recorded.
    pub async fn invoke_named(
        &self,
        name: &str,
        params: Value,
        tracker: &UsageTracker,
        invoker: &Invoker,
    ) -> Option<String> {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "Model requested an unknown tool");
            return None;
        };

        debug!(tool = name, "Invoking tool");
        let billed = self.billing_for(tool.as_ref(), invoker);
        let call = async move { tool.execute(params).await.map(ToolOutput) };

        match tracker.track(&billed, call).await {
            Ok(ToolOutput(result)) => {
                debug!(tool = name, chars = result.len(), "Tool succeeded");
                Some(result)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool produced no result");
                None
            }
        }
    }

    /// Billing context for a local tool run; the invoker's payer is charged.
    fn billing_for(&self, tool: &dyn Tool, invoker: &Invoker) -> ConfiguredTool {
        ConfiguredTool {
            definition: ToolDefinition::new(
                tool.name(),
                tool.name(),
                LOCAL_PROVIDER,
                &[Capability::ToolUse],
                tool.cost(),
            ),
            token: String::new(),
            purpose: Capability::ToolUse,
            invoker_id: invoker.id.clone(),
            payer_id: invoker.payer_id().to_string(),
            uses_credits: true,
        }
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Whether the named tool uploads media while running
    pub fn produces_media(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|t| t.produces_media())
    }

    /// List registered tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new()
    }
}
