// crates/client/tests/replay_dump.rs
//! Offline replay of captured dumps: the same pipeline the live client
//! drives, fed from a file, must reproduce the live result regardless of
//! the chunk size chosen.

use std::io::Write;

use skillstream_core::{FlushMetadata, Framing, SkillStreamPipeline, StepAggregator, StepRef};

const DUMP: &str = "[{\"url\":\"https://a\"}]__LLM_RESPONSE__Résumé [[citation:2]] done__RELATED_QUESTIONS__[\"more?\"][DONE]";

fn replay(bytes: &[u8], chunk_size: usize) -> Vec<skillstream_core::StepRecord> {
    let mut pipeline = SkillStreamPipeline::new(
        Framing::Zone(Default::default()),
        Some(StepRef::new("answerQuestion")),
    );
    let mut aggregator = StepAggregator::new();
    for piece in bytes.chunks(chunk_size) {
        for event in pipeline.push(piece) {
            aggregator.add_event(event);
        }
    }
    for event in pipeline.finish() {
        aggregator.add_event(event);
    }
    aggregator.flush(&FlushMetadata::new("replay")).unwrap()
}

#[test]
fn dump_file_replays_like_the_live_stream() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(DUMP.as_bytes()).unwrap();

    let bytes = std::fs::read(file.path()).unwrap();
    let records = replay(&bytes, 4096);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "answerQuestion");
    assert_eq!(records[0].content, "Résumé [citation](2) done");
}

#[test]
fn line_framed_dump_replays() {
    let dump = "refly-sse-source: {\"url\":\"https://a\"}\n\
                [REFLY-SOURCE-END]\n\
                refly-sse-data: Hello \n\
                refly-sse-data: World\n";
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(dump.as_bytes()).unwrap();

    let bytes = std::fs::read(file.path()).unwrap();
    let mut pipeline = SkillStreamPipeline::new(
        Framing::Line(Default::default()),
        Some(StepRef::new("answerQuestion")),
    );
    let mut aggregator = StepAggregator::new();
    for piece in bytes.chunks(16) {
        for event in pipeline.push(piece) {
            aggregator.add_event(event);
        }
    }
    for event in pipeline.finish() {
        aggregator.add_event(event);
    }

    let records = aggregator.flush(&FlushMetadata::new("replay")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "Hello World");
    assert_eq!(
        records[0].structured_data,
        r#"{"sources":[{"url":"https://a"}]}"#
    );
}

#[test]
fn chunk_size_does_not_change_the_flush() {
    let bytes = DUMP.as_bytes();
    let reference = replay(bytes, bytes.len());
    for chunk_size in [1, 2, 3, 5, 7, 64] {
        assert_eq!(replay(bytes, chunk_size), reference, "chunk {chunk_size}");
    }
}
