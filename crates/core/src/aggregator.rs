// crates/core/src/aggregator.rs
//! Stateful per-invocation step aggregator.
//!
//! Consumes normalized events in arrival order and maintains, per step,
//! accumulated content, a structured-data map, an artifact map, and the
//! token-usage item list. Global step order is the order in which each step
//! was first referenced — structural, because steps live in an
//! insertion-order-preserving map.
//!
//! The aggregator is a two-state machine: `Active` → `Aborted`, one-way.
//! Every mutation is a silent no-op once aborted; reads and `flush` work in
//! both states and return whatever accumulated before the abort.

use indexmap::IndexMap;
use serde_json::Value;

use crate::event::{Artifact, SkillEvent, UsageItem, DEFAULT_STEP};
use crate::record::{FlushMetadata, StepRecord};
use crate::usage::reduce_usage;
use crate::StreamError;

/// Aggregator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Active,
    Aborted,
}

/// Accumulated state of one named step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepData {
    /// Append-only answer content.
    pub content: String,
    /// Producer log lines, in arrival order.
    pub logs: Vec<String>,
    /// Last-write-wins per key.
    pub structured_data: IndexMap<String, Value>,
    /// Keyed by entity id; an update fully replaces the prior value.
    pub artifacts: IndexMap<String, Artifact>,
    /// Per-call token usage, in arrival order.
    pub usage_items: Vec<UsageItem>,
}

/// One aggregator instance per skill invocation. Mutated exclusively from
/// the single consumption loop; a multi-threaded runtime must serialize
/// access externally (one mutex or task per instance).
#[derive(Debug)]
pub struct StepAggregator {
    state: AggregatorState,
    steps: IndexMap<String, StepData>,
}

impl StepAggregator {
    pub fn new() -> Self {
        Self {
            state: AggregatorState::Active,
            steps: IndexMap::new(),
        }
    }

    pub fn state(&self) -> AggregatorState {
        self.state
    }

    pub fn is_aborted(&self) -> bool {
        self.state == AggregatorState::Aborted
    }

    /// Apply one event. No-op when aborted.
    pub fn add_event(&mut self, event: SkillEvent) {
        if self.is_aborted() {
            return;
        }
        let name = event.step_name().to_string();
        let step = self.steps.entry(name).or_default();
        match event {
            SkillEvent::Log { content, .. } => step.logs.push(content),
            SkillEvent::StructuredData {
                structured_data_key,
                content,
                ..
            } => {
                let key = structured_data_key.unwrap_or_else(|| DEFAULT_STEP.to_string());
                step.structured_data.insert(key, content);
            }
            SkillEvent::Artifact { artifact, .. } => {
                step.artifacts.insert(artifact.entity_id.clone(), artifact);
            }
            SkillEvent::Content { content, .. } => step.content.push_str(&content),
        }
    }

    /// Append a token-usage item to `step_name`, creating the step if it was
    /// never referenced by a content event. No-op when aborted.
    pub fn add_usage_item(&mut self, step_name: &str, item: UsageItem) {
        if self.is_aborted() {
            return;
        }
        let name = if step_name.is_empty() {
            DEFAULT_STEP
        } else {
            step_name
        };
        self.steps
            .entry(name.to_string())
            .or_default()
            .usage_items
            .push(item);
    }

    /// Irreversibly stop aggregation. Idempotent.
    pub fn abort(&mut self) {
        if self.state == AggregatorState::Active {
            tracing::debug!(steps = self.steps.len(), "aggregator aborted");
            self.state = AggregatorState::Aborted;
        }
    }

    /// Read access to one step.
    pub fn step(&self, name: &str) -> Option<&StepData> {
        self.steps.get(name)
    }

    /// Step names in first-reference order.
    pub fn step_order(&self) -> Vec<&str> {
        self.steps.keys().map(String::as_str).collect()
    }

    /// Produce persistable records, one per step in global order, each with
    /// its zero-based `order` index and reduced token usage. Side-effect
    /// free: repeated flushes of the same state return identical output.
    pub fn flush(&self, metadata: &FlushMetadata) -> Result<Vec<StepRecord>, StreamError> {
        let mut records = Vec::with_capacity(self.steps.len());
        for (order, (name, step)) in self.steps.iter().enumerate() {
            let structured_data = serde_json::to_string(&step.structured_data)
                .map_err(|source| StreamError::RecordEncode {
                    field: "structuredData",
                    source,
                })?;
            let artifacts: Vec<&Artifact> = step.artifacts.values().collect();
            let artifacts = serde_json::to_string(&artifacts).map_err(|source| {
                StreamError::RecordEncode {
                    field: "artifacts",
                    source,
                }
            })?;
            let token_usage = serde_json::to_string(&reduce_usage(&step.usage_items)).map_err(
                |source| StreamError::RecordEncode {
                    field: "tokenUsage",
                    source,
                },
            )?;
            records.push(StepRecord {
                name: name.clone(),
                content: step.content.clone(),
                result_id: metadata.result_id.clone(),
                order: order as u32,
                structured_data,
                artifacts,
                token_usage,
            });
        }
        Ok(records)
    }
}

impl Default for StepAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StepRef;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn step(name: &str) -> Option<StepRef> {
        Some(StepRef::new(name))
    }

    fn content(step_name: &str, text: &str) -> SkillEvent {
        SkillEvent::Content {
            step: step(step_name),
            content: text.into(),
        }
    }

    fn artifact(step_name: &str, entity_id: &str, title: &str) -> SkillEvent {
        let mut a = Artifact::new(entity_id);
        a.fields
            .insert("title".into(), Value::String(title.into()));
        SkillEvent::Artifact {
            step: step(step_name),
            artifact: a,
        }
    }

    #[test]
    fn log_deltas_and_structured_data_flush_to_one_record() {
        let mut agg = StepAggregator::new();
        agg.add_event(SkillEvent::Log {
            step: step("answerQuestion"),
            content: "start".into(),
        });
        agg.add_event(content("answerQuestion", "Hello "));
        agg.add_event(content("answerQuestion", "World"));
        agg.add_event(SkillEvent::StructuredData {
            step: step("answerQuestion"),
            structured_data_key: Some("sources".into()),
            content: json!([{"url": "https://a"}]),
        });

        let records = agg.flush(&FlushMetadata::new("res-1")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "answerQuestion");
        assert_eq!(records[0].content, "Hello World");
        assert_eq!(records[0].order, 0);
        assert_eq!(
            records[0].structured_data,
            r#"{"sources":[{"url":"https://a"}]}"#
        );
    }

    #[test]
    fn global_order_is_first_reference_order() {
        // Interleaving after first reference must not matter.
        let mut agg = StepAggregator::new();
        agg.add_event(content("draft", "d1"));
        agg.add_event(content("citation", "c1"));
        agg.add_event(content("draft", "d2"));
        agg.add_event(content("citation", "c2"));
        agg.add_event(content("draft", "d3"));

        assert_eq!(agg.step_order(), vec!["draft", "citation"]);
        let records = agg.flush(&FlushMetadata::new("r")).unwrap();
        assert_eq!(records[0].name, "draft");
        assert_eq!(records[0].order, 0);
        assert_eq!(records[0].content, "d1d2d3");
        assert_eq!(records[1].name, "citation");
        assert_eq!(records[1].order, 1);
    }

    #[test]
    fn artifact_updates_are_last_write_wins() {
        let mut agg = StepAggregator::new();
        agg.add_event(artifact("s", "doc-1", "first"));
        agg.add_event(artifact("s", "doc-1", "second"));
        agg.add_event(artifact("s", "doc-2", "other"));

        let step = agg.step("s").unwrap();
        assert_eq!(step.artifacts.len(), 2);
        assert_eq!(step.artifacts["doc-1"].fields["title"], "second");
    }

    #[test]
    fn structured_data_key_defaults() {
        let mut agg = StepAggregator::new();
        agg.add_event(SkillEvent::StructuredData {
            step: None,
            structured_data_key: None,
            content: json!({"k": 1}),
        });
        let step = agg.step(DEFAULT_STEP).unwrap();
        assert_eq!(step.structured_data[DEFAULT_STEP], json!({"k": 1}));
    }

    #[test]
    fn abort_freezes_state() {
        let mut agg = StepAggregator::new();
        agg.add_event(artifact("s", "doc-1", "kept"));
        agg.add_usage_item("s", UsageItem {
            model_name: "gpt".into(),
            input_tokens: 1,
            output_tokens: 1,
        });

        let before = agg.flush(&FlushMetadata::new("r")).unwrap();
        agg.abort();
        assert!(agg.is_aborted());

        agg.add_event(artifact("s", "doc-1", "dropped"));
        agg.add_event(content("s", "late"));
        agg.add_usage_item("s", UsageItem {
            model_name: "gpt".into(),
            input_tokens: 99,
            output_tokens: 99,
        });

        let after = agg.flush(&FlushMetadata::new("r")).unwrap();
        assert_eq!(before, after);
        assert_eq!(agg.step("s").unwrap().artifacts["doc-1"].fields["title"], "kept");
    }

    #[test]
    fn abort_is_idempotent() {
        let mut agg = StepAggregator::new();
        agg.abort();
        agg.abort();
        assert_eq!(agg.state(), AggregatorState::Aborted);
    }

    #[test]
    fn usage_item_creates_step_and_reduces_at_flush() {
        let mut agg = StepAggregator::new();
        agg.add_usage_item("answerQuestion", UsageItem {
            model_name: "gpt".into(),
            input_tokens: 10,
            output_tokens: 5,
        });
        agg.add_usage_item("answerQuestion", UsageItem {
            model_name: "gpt".into(),
            input_tokens: 3,
            output_tokens: 2,
        });

        let records = agg.flush(&FlushMetadata::new("r")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].token_usage,
            r#"{"gpt":{"inputTokens":13,"outputTokens":7}}"#
        );
    }

    #[test]
    fn flush_is_repeatable() {
        let mut agg = StepAggregator::new();
        agg.add_event(content("a", "x"));
        agg.add_event(artifact("b", "e-1", "t"));
        let meta = FlushMetadata::new("res");
        let first = agg.flush(&meta).unwrap();
        let second = agg.flush(&meta).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn flush_of_empty_aggregator_is_empty() {
        let agg = StepAggregator::new();
        assert!(agg.flush(&FlushMetadata::new("r")).unwrap().is_empty());
    }

    #[test]
    fn artifacts_flush_as_json_array_of_values() {
        let mut agg = StepAggregator::new();
        agg.add_event(artifact("s", "doc-1", "only"));
        let records = agg.flush(&FlushMetadata::new("r")).unwrap();
        let parsed: Value = serde_json::from_str(&records[0].artifacts).unwrap();
        assert_eq!(parsed, json!([{"entityId": "doc-1", "title": "only"}]));
    }
}
