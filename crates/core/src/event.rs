// crates/core/src/event.rs
//! Normalized event and wire-facing types shared across the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Step name used when the producer supplies none.
pub const DEFAULT_STEP: &str = "default";

/// Reference to the named step an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub name: String,
}

impl StepRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An entity-identified side-output of a step (e.g. a generated file
/// reference). Updates with the same entity id fully replace the prior
/// value; producer-specific fields ride along untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Artifact {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            fields: serde_json::Map::new(),
        }
    }
}

/// One model call's token counts, attributed to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageItem {
    pub model_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Uniform tagged event consumed by the step aggregator, in arrival order.
///
/// `Log`, `StructuredData`, and `Artifact` mirror the producer's event
/// union; `Content` carries the incremental answer deltas the normalizer
/// derives from the answer zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SkillEvent {
    Log {
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<StepRef>,
        content: String,
    },
    StructuredData {
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<StepRef>,
        #[serde(
            rename = "structuredDataKey",
            skip_serializing_if = "Option::is_none"
        )]
        structured_data_key: Option<String>,
        content: Value,
    },
    Artifact {
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<StepRef>,
        artifact: Artifact,
    },
    Content {
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<StepRef>,
        content: String,
    },
}

impl SkillEvent {
    /// The step this event targets, falling back to [`DEFAULT_STEP`].
    pub fn step_name(&self) -> &str {
        let step = match self {
            Self::Log { step, .. }
            | Self::StructuredData { step, .. }
            | Self::Artifact { step, .. }
            | Self::Content { step, .. } => step,
        };
        step.as_ref().map_or(DEFAULT_STEP, |s| {
            if s.name.is_empty() {
                DEFAULT_STEP
            } else {
                &s.name
            }
        })
    }
}
