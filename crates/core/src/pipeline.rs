// crates/core/src/pipeline.rs
//! End-to-end composition of the decode → split → normalize stages.
//!
//! One instance per stream. The request layer feeds raw network chunks in
//! and forwards the resulting events to a [`StepAggregator`]; the stages
//! keep their own cross-chunk state so fragmentation never changes the
//! output.

use crate::decode::ChunkDecoder;
use crate::event::{SkillEvent, StepRef};
use crate::normalizer::EventNormalizer;
use crate::splitter::{LineSentinels, SentinelSplitter, ZoneSentinels};

/// Which wire framing the producer speaks.
#[derive(Debug, Clone)]
pub enum Framing {
    Zone(ZoneSentinels),
    Line(LineSentinels),
}

impl Default for Framing {
    fn default() -> Self {
        Self::Zone(ZoneSentinels::default())
    }
}

pub struct SkillStreamPipeline {
    decoder: ChunkDecoder,
    splitter: SentinelSplitter,
    normalizer: EventNormalizer,
}

impl SkillStreamPipeline {
    /// `step` is the step the decoded content events are attributed to.
    pub fn new(framing: Framing, step: Option<StepRef>) -> Self {
        let splitter = match framing {
            Framing::Zone(sentinels) => SentinelSplitter::zoned(sentinels),
            Framing::Line(sentinels) => SentinelSplitter::line_framed(sentinels),
        };
        Self {
            decoder: ChunkDecoder::new(),
            splitter,
            normalizer: EventNormalizer::new(step),
        }
    }

    /// Process one raw network chunk into zero or more events.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SkillEvent> {
        let text = self.decoder.decode(chunk);
        let mut events = Vec::new();
        for segment in self.splitter.push(&text) {
            events.extend(self.normalizer.normalize(segment));
        }
        events
    }

    /// Signal end of stream and collect the trailing events.
    pub fn finish(&mut self) -> Vec<SkillEvent> {
        let tail = self.decoder.finish();
        let mut events = Vec::new();
        for segment in self.splitter.push(&tail) {
            events.extend(self.normalizer.normalize(segment));
        }
        for segment in self.splitter.finish() {
            events.extend(self.normalizer.normalize(segment));
        }
        events.extend(self.normalizer.finish());
        events
    }
}
