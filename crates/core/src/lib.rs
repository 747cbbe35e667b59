// crates/core/src/lib.rs
//! Core skill-execution streaming pipeline: chunked byte decoding, sentinel
//! splitting, event normalization, step aggregation, and token-usage
//! reduction. Pure — no I/O; the driving request layer lives in
//! `skillstream-client`.

pub mod aggregator;
pub mod decode;
pub mod error;
pub mod event;
pub mod normalizer;
pub mod pipeline;
pub mod record;
pub mod splitter;
pub mod usage;

pub use aggregator::{AggregatorState, StepAggregator, StepData};
pub use decode::ChunkDecoder;
pub use error::StreamError;
pub use event::{Artifact, SkillEvent, StepRef, UsageItem, DEFAULT_STEP};
pub use normalizer::EventNormalizer;
pub use pipeline::{Framing, SkillStreamPipeline};
pub use record::{FlushMetadata, StepRecord};
pub use splitter::{LineSentinels, Segment, SentinelSplitter, ZoneSentinels};
pub use usage::{reduce_usage, AggregatedUsage};
