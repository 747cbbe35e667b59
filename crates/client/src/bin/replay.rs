// crates/client/src/bin/replay.rs
//! Replay a captured raw stream dump through the full pipeline and print
//! the flushed step records as JSON.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use skillstream_core::{FlushMetadata, Framing, SkillStreamPipeline, StepAggregator, StepRef};

#[derive(Parser)]
#[command(
    name = "replay",
    about = "Run a captured skill-stream dump through the pipeline offline"
)]
struct Args {
    /// Raw byte dump of the response body.
    dump: PathBuf,

    /// Wire framing of the dump.
    #[arg(long, value_enum, default_value_t = FramingArg::Zone)]
    framing: FramingArg,

    /// Step name the answer content is attributed to.
    #[arg(long, default_value = "answerQuestion")]
    step: String,

    /// Result id stamped on the flushed records.
    #[arg(long, default_value = "replay")]
    result_id: String,

    /// Feed the dump in chunks of this many bytes to exercise the same
    /// fragmentation handling as the live client.
    #[arg(long, default_value_t = 4096)]
    chunk_size: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum FramingArg {
    Zone,
    Line,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let bytes = std::fs::read(&args.dump)
        .with_context(|| format!("reading {}", args.dump.display()))?;

    let framing = match args.framing {
        FramingArg::Zone => Framing::Zone(Default::default()),
        FramingArg::Line => Framing::Line(Default::default()),
    };
    let mut pipeline = SkillStreamPipeline::new(framing, Some(StepRef::new(args.step.as_str())));
    let mut aggregator = StepAggregator::new();
    for piece in bytes.chunks(args.chunk_size.max(1)) {
        for event in pipeline.push(piece) {
            aggregator.add_event(event);
        }
    }
    for event in pipeline.finish() {
        aggregator.add_event(event);
    }

    let records = aggregator.flush(&FlushMetadata::new(args.result_id.as_str()))?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
