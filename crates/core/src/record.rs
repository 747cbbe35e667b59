// crates/core/src/record.rs
//! Persistable step records — the shape handed to the storage collaborator.

use serde::{Deserialize, Serialize};

/// Invocation-level metadata attached to every flushed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushMetadata {
    /// Identifier of the skill-invocation result these steps belong to.
    pub result_id: String,
}

impl FlushMetadata {
    pub fn new(result_id: impl Into<String>) -> Self {
        Self {
            result_id: result_id.into(),
        }
    }
}

/// One persisted step. `structured_data`, `artifacts`, and `token_usage`
/// are carried as JSON-encoded strings (map, array of artifact values, and
/// model → summed-counts map respectively), matching the storage contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub name: String,
    pub content: String,
    pub result_id: String,
    /// Zero-based position in the global step order.
    pub order: u32,
    pub structured_data: String,
    pub artifacts: String,
    pub token_usage: String,
}
