// crates/core/src/normalizer.rs
//! Converts splitter segments into normalized [`SkillEvent`]s.
//!
//! Three concerns live here:
//!
//! - the sources zone parses as a JSON array of source entries, falling back
//!   to an empty list on malformed data (logged, never propagated);
//! - citation markers (`[[citation:N]]` or `[citation:N]`) in answer content
//!   are rewritten to the canonical inline form `[citation](N)`. The rewrite
//!   runs per emitted fragment, so a fragment ending inside a potential
//!   marker is buffered until the marker completes or the stream ends;
//! - related questions are emitted as structured data at stream end.

use regex_lite::Regex;
use serde_json::Value;

use crate::event::{SkillEvent, StepRef};
use crate::splitter::Segment;

/// Structured-data key the sources list is emitted under.
pub const SOURCES_KEY: &str = "sources";
/// Structured-data key the related questions are emitted under.
pub const RELATED_KEY: &str = "relatedQuestions";

/// A citation marker is short; only the tail of the pending buffer can hold
/// a partial one worth waiting for.
const MARKER_WINDOW: usize = 48;

pub struct EventNormalizer {
    step: Option<StepRef>,
    /// Answer text waiting for a safe emission boundary.
    pending: String,
    /// Source entries collected from line framing.
    sources: Vec<Value>,
    sources_flushed: bool,
    citation: Regex,
}

impl EventNormalizer {
    /// Events are attributed to `step` (`None` = the default step).
    pub fn new(step: Option<StepRef>) -> Self {
        Self {
            step,
            pending: String::new(),
            sources: Vec::new(),
            sources_flushed: false,
            citation: Regex::new(r"(?i)\[\[citation:\s*(\d+)\]\]|\[citation:\s*(\d+)\]")
                .expect("citation pattern is valid"),
        }
    }

    /// Normalize one segment into zero or more events.
    pub fn normalize(&mut self, segment: Segment) -> Vec<SkillEvent> {
        match segment {
            Segment::Sources(raw) => {
                self.sources_flushed = true;
                vec![self.structured(SOURCES_KEY, Value::Array(parse_source_list(&raw)))]
            }
            Segment::SourceEntry(line) => {
                match serde_json::from_str::<Value>(&line) {
                    Ok(value) => self.sources.push(value),
                    Err(err) => {
                        tracing::warn!(error = %err, "dropping malformed source entry");
                    }
                }
                Vec::new()
            }
            Segment::SourceBlockEnd => {
                self.sources_flushed = true;
                let entries = std::mem::take(&mut self.sources);
                vec![self.structured(SOURCES_KEY, Value::Array(entries))]
            }
            Segment::AnswerDelta(text) => {
                self.pending.push_str(&text);
                let cut = safe_boundary(&self.pending);
                if cut == 0 {
                    return Vec::new();
                }
                let fragment: String = self.pending.drain(..cut).collect();
                vec![self.content(&fragment)]
            }
            Segment::Related(raw) => {
                let questions = parse_related(&raw);
                if questions.is_empty() {
                    Vec::new()
                } else {
                    vec![self.structured(RELATED_KEY, Value::Array(questions))]
                }
            }
        }
    }

    /// Flush at end of stream: remaining answer text (rewritten) and any
    /// source entries whose end marker never arrived.
    pub fn finish(&mut self) -> Vec<SkillEvent> {
        let mut out = Vec::new();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            out.push(self.content(&rest));
        }
        if !self.sources_flushed && !self.sources.is_empty() {
            let entries = std::mem::take(&mut self.sources);
            self.sources_flushed = true;
            out.push(self.structured(SOURCES_KEY, Value::Array(entries)));
        }
        out
    }

    fn content(&self, text: &str) -> SkillEvent {
        let rewritten = self
            .citation
            .replace_all(text, |caps: &regex_lite::Captures<'_>| {
                let n = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                format!("[citation]({n})")
            })
            .into_owned();
        SkillEvent::Content {
            step: self.step.clone(),
            content: rewritten,
        }
    }

    fn structured(&self, key: &str, content: Value) -> SkillEvent {
        SkillEvent::StructuredData {
            step: self.step.clone(),
            structured_data_key: Some(key.to_string()),
            content,
        }
    }
}

/// Parse the sources zone. Anything other than a JSON array yields an empty
/// list — a malformed zone must not fail the stream.
fn parse_source_list(raw: &str) -> Vec<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            tracing::warn!("sources zone is valid JSON but not an array; ignoring");
            Vec::new()
        }
        Err(err) => {
            tracing::warn!(error = %err, "sources zone is not valid JSON; ignoring");
            Vec::new()
        }
    }
}

/// Related questions arrive either as a JSON array or as plain lines.
fn parse_related(raw: &str) -> Vec<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(trimmed) {
        return entries;
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| Value::String(l.to_string()))
        .collect()
}

/// Largest prefix of `s` that is safe to emit without risking a citation
/// marker split across fragments: hold back from the last `[` in the tail
/// window when everything after it still reads like the start of a marker.
fn safe_boundary(s: &str) -> usize {
    let mut window_start = s.len().saturating_sub(MARKER_WINDOW);
    while window_start > 0 && !s.is_char_boundary(window_start) {
        window_start -= 1;
    }
    if let Some(rel) = s[window_start..].rfind('[') {
        let mut open = window_start + rel;
        if open > 0 && s.as_bytes()[open - 1] == b'[' {
            open -= 1;
        }
        if could_be_marker(&s[open..]) {
            return open;
        }
    }
    s.len()
}

/// True if `tail` (starting at `[`) reads like a citation marker that is
/// not yet complete, so emitting it now could split the marker across
/// fragments.
fn could_be_marker(tail: &str) -> bool {
    const KEYWORD: &str = "citation:";
    let opens = tail.bytes().take_while(|&b| b == b'[').count();
    let rest = &tail[opens..];
    if rest.len() < KEYWORD.len() {
        return KEYWORD.as_bytes()[..rest.len()].eq_ignore_ascii_case(rest.as_bytes());
    }
    if !rest.as_bytes()[..KEYWORD.len()].eq_ignore_ascii_case(KEYWORD.as_bytes()) {
        return false;
    }
    let after = rest[KEYWORD.len()..].trim_start_matches(|c: char| c.is_ascii_whitespace());
    let digits = after.bytes().take_while(u8::is_ascii_digit).count();
    let closes = &after[digits..];
    closes.bytes().all(|b| b == b']') && closes.len() < opens
}
