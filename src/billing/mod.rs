//! Billing module - usage tracking for every model and tool invocation.
//!
//! This module provides:
//! - [`extract_usage`] to normalize provider usage payloads
//! - [`compute_cost`] to price a call from catalog coefficients
//! - [`UsageTracker`] / [`TrackedLlmClient`], the decorator that records one
//!   [`UsageRecord`] per invocation attempt
//! - [`UsageLedger`] sinks (in-memory, JSON Lines file)

mod cost;
mod ledger;
mod tracker;
mod usage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Capability;

pub use cost::{compute_cost, image_price, CostBreakdown};
pub use ledger::{InMemoryLedger, JsonlLedger, UsageLedger};
pub use tracker::{TrackedLlmClient, UsageTracker};
pub use usage::{extract_usage, ReportsUsage, UsageSignal};

/// Immutable ledger entry for one invocation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub invoker_id: String,
    pub payer_id: String,
    pub tool_id: String,
    pub purpose: Capability,
    pub timestamp: DateTime<Utc>,

    /// Charged in credits rather than flat.
    pub uses_credits: bool,

    pub runtime_seconds: f64,
    pub cost: CostBreakdown,
    pub usage: UsageSignal,
    pub is_failed: bool,
}

/// Total credits across records that are billed in credits.
pub fn total_credits(records: &[UsageRecord]) -> f64 {
    records
        .iter()
        .filter(|r| r.uses_credits)
        .map(|r| r.cost.total)
        .sum()
}
