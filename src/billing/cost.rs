//! Credit cost computation from catalog pricing and a usage signal.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::CostEstimate;

use super::UsageSignal;

const PER_MILLION: f64 = 1_000_000.0;

/// Cost components of one invocation, in credits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// Token and image pricing.
    pub model: f64,
    /// Flat per-call fee.
    pub api: f64,
    /// Wall-clock runtime fee.
    pub runtime: f64,
    /// Platform maintenance fee.
    pub maintenance: f64,
    pub total: f64,
}

impl CostBreakdown {
    fn new(model: f64, api: f64, runtime: f64, maintenance: f64) -> Self {
        Self {
            model,
            api,
            runtime,
            maintenance,
            total: model + api + runtime + maintenance,
        }
    }
}

/// Compute the full cost of an invocation.
pub fn compute_cost(
    estimate: &CostEstimate,
    usage: &UsageSignal,
    runtime_seconds: f64,
    maintenance_fee: f64,
) -> CostBreakdown {
    let tokens = usage.input_tokens as f64 / PER_MILLION * estimate.input_per_million
        + usage.output_tokens as f64 / PER_MILLION * estimate.output_per_million
        + usage.search_tokens as f64 / PER_MILLION * estimate.search_per_million;

    let images: f64 = usage
        .image_sizes
        .iter()
        .filter_map(|size| image_price(estimate, size))
        .sum();

    CostBreakdown::new(
        tokens + images,
        estimate.per_call,
        runtime_seconds.max(0.0) * estimate.per_runtime_second,
        maintenance_fee,
    )
}

/// Price of one image: exact bucket first, then the bucket nearest in pixel area.
pub fn image_price(estimate: &CostEstimate, size: &str) -> Option<f64> {
    if let Some(price) = estimate.image_sizes.get(size) {
        return Some(*price);
    }

    let Some(area) = pixel_area(size) else {
        warn!(size, "Unparseable or oversized image size, not priced");
        return None;
    };

    let nearest = estimate
        .image_sizes
        .iter()
        .filter_map(|(bucket, price)| pixel_area(bucket).map(|a| (bucket, a.abs_diff(area), *price)))
        .min_by_key(|(_, distance, _)| *distance);

    match nearest {
        Some((bucket, _, price)) => {
            warn!(size, bucket = %bucket, "No exact image bucket, using nearest");
            Some(price)
        }
        None => {
            warn!(size, "No image buckets defined, not priced");
            None
        }
    }
}

fn pixel_area(size: &str) -> Option<u64> {
    let (w, h) = size.split_once(['x', 'X', '*'])?;
    let (w, h) = (w.trim().parse::<u64>().ok()?, h.trim().parse::<u64>().ok()?);
    w.checked_mul(h)
}
