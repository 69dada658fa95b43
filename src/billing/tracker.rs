//! Usage-tracking decorator around model and tool invocations.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::agent::llm::{LlmClient, LlmResponse};
use crate::agent::Message;
use crate::catalog::ConfiguredTool;
use crate::error::Error;
use crate::tools::ToolSchema;
use crate::Result;

use super::{compute_cost, CostBreakdown, ReportsUsage, UsageLedger, UsageRecord, UsageSignal};

/// Times an invocation, prices it and persists exactly one [`UsageRecord`].
#[derive(Clone)]
pub struct UsageTracker {
    ledger: Arc<dyn UsageLedger>,
    maintenance_fee: f64,
}

impl UsageTracker {
    pub fn new(ledger: Arc<dyn UsageLedger>, maintenance_fee: f64) -> Self {
        Self { ledger, maintenance_fee }
    }

    /// Run `call` on behalf of `tool` and record its usage.
    ///
    /// A failed call is recorded with `is_failed = true` and the original
    /// error is returned. A successful call without any usage signal is
    /// recorded and then reported as [`Error::UsageSignalMissing`].
    pub async fn track<T, F>(&self, tool: &ConfiguredTool, call: F) -> Result<T>
    where
        T: ReportsUsage,
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let outcome = call.await;
        let runtime_seconds = started.elapsed().as_secs_f64();

        match outcome {
            Ok(value) => {
                let usage = value.usage_signal();
                if usage.is_empty() {
                    self.record(tool, UsageSignal::default(), runtime_seconds, false);
                    return Err(Error::UsageSignalMissing {
                        tool: tool.id().to_string(),
                    });
                }
                self.record(tool, usage, runtime_seconds, false);
                Ok(value)
            }
            Err(e) => {
                warn!(tool = %tool.id(), error = %e, "Invocation failed, no usage reported");
                self.record(tool, UsageSignal::default(), runtime_seconds, true);
                Err(e)
            }
        }
    }

    fn record(&self, tool: &ConfiguredTool, usage: UsageSignal, runtime_seconds: f64, is_failed: bool) {
        let cost = if is_failed {
            CostBreakdown::default()
        } else {
            compute_cost(&tool.definition.cost, &usage, runtime_seconds, self.maintenance_fee)
        };

        let record = UsageRecord {
            id: Uuid::new_v4(),
            invoker_id: tool.invoker_id.clone(),
            payer_id: tool.payer_id.clone(),
            tool_id: tool.id().to_string(),
            purpose: tool.purpose,
            timestamp: Utc::now(),
            uses_credits: tool.uses_credits,
            runtime_seconds,
            cost,
            usage,
            is_failed,
        };

        // Persistence problems are logged; they never replace the call's own outcome.
        match self.ledger.persist(record) {
            Ok(stored) => debug!(
                record = %stored.id,
                tool = %stored.tool_id,
                credits = stored.cost.total,
                failed = stored.is_failed,
                "Usage recorded"
            ),
            Err(e) => error!(tool = %tool.id(), error = %e, "Failed to persist usage record"),
        }
    }
}

/// An [`LlmClient`] whose every call is usage-tracked.
pub struct TrackedLlmClient {
    inner: Arc<dyn LlmClient>,
    tool: ConfiguredTool,
    tracker: UsageTracker,
}

impl TrackedLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, tool: ConfiguredTool, tracker: UsageTracker) -> Self {
        Self { inner, tool, tracker }
    }

    pub fn tool(&self) -> &ConfiguredTool {
        &self.tool
    }
}

#[async_trait]
impl LlmClient for TrackedLlmClient {
    async fn chat(&self, messages: &[Message], tools: &[ToolSchema]) -> Result<LlmResponse> {
        self.tracker
            .track(&self.tool, self.inner.chat(messages, tools))
            .await
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }
}
