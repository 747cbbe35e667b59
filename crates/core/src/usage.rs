// crates/core/src/usage.rs
//! Pure reduction of per-call token-usage items into per-model totals.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::event::UsageItem;

/// Summed token counts for one model. Derived, never stored independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Reduce usage items to a model-name → summed-counts map.
///
/// Commutative and associative: reducing any permutation of the same
/// multiset yields an equal map (IndexMap equality ignores order; only the
/// key insertion order follows first occurrence).
pub fn reduce_usage(items: &[UsageItem]) -> IndexMap<String, AggregatedUsage> {
    let mut totals: IndexMap<String, AggregatedUsage> = IndexMap::new();
    for item in items {
        let entry = totals.entry(item.model_name.clone()).or_default();
        entry.input_tokens += item.input_tokens;
        entry.output_tokens += item.output_tokens;
    }
    totals
}
