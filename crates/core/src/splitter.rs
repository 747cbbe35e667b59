// crates/core/src/splitter.rs
//! Sentinel-based segment splitter for the skill wire stream.
//!
//! Two framing variants share one splitter type:
//!
//! - **Zone framing**: `__LLM_RESPONSE__` ends the sources zone,
//!   `__RELATED_QUESTIONS__` begins the related-questions zone, `[DONE]`
//!   terminates the stream. Zones always arrive in that fixed order.
//! - **Line framing**: newline-delimited frames prefixed `refly-sse-data: `
//!   (answer content) or `refly-sse-source: ` (one source entry per line),
//!   with `[REFLY-SOURCE-END]` closing the source block.
//!
//! Sentinels may be cut anywhere by chunk boundaries. Instead of re-scanning
//! a growing accumulator on every push, the splitter tracks a scan position
//! and holds back only `needle_len - 1` bytes of unemitted tail, so matching
//! stays linear in stream length.

use memchr::memmem;

/// Ends the sources zone (zone framing).
pub const SOURCES_END_SENTINEL: &str = "__LLM_RESPONSE__";
/// Begins the related-questions zone (zone framing).
pub const RELATED_BEGIN_SENTINEL: &str = "__RELATED_QUESTIONS__";
/// Terminal token signalling end of stream (zone framing).
pub const STREAM_DONE_SENTINEL: &str = "[DONE]";
/// Answer-content line prefix (line framing).
pub const DATA_LINE_PREFIX: &str = "refly-sse-data: ";
/// Source-entry line prefix (line framing).
pub const SOURCE_LINE_PREFIX: &str = "refly-sse-source: ";
/// Marks the end of the source block (line framing).
pub const SOURCE_END_MARKER: &str = "[REFLY-SOURCE-END]";

/// Sentinel set for zone framing.
#[derive(Debug, Clone)]
pub struct ZoneSentinels {
    pub sources_end: String,
    pub related_begin: String,
    pub done: String,
}

impl Default for ZoneSentinels {
    fn default() -> Self {
        Self {
            sources_end: SOURCES_END_SENTINEL.to_string(),
            related_begin: RELATED_BEGIN_SENTINEL.to_string(),
            done: STREAM_DONE_SENTINEL.to_string(),
        }
    }
}

/// Sentinel set for line framing.
#[derive(Debug, Clone)]
pub struct LineSentinels {
    pub data_prefix: String,
    pub source_prefix: String,
    pub source_end: String,
}

impl Default for LineSentinels {
    fn default() -> Self {
        Self {
            data_prefix: DATA_LINE_PREFIX.to_string(),
            source_prefix: SOURCE_LINE_PREFIX.to_string(),
            source_end: SOURCE_END_MARKER.to_string(),
        }
    }
}

/// One logical segment of the response, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Raw sources-zone text. Emitted exactly once per stream (possibly
    /// empty when the sentinel never appeared).
    Sources(String),
    /// One raw source entry (line framing).
    SourceEntry(String),
    /// The source block is complete (line framing).
    SourceBlockEnd,
    /// Incremental answer content.
    AnswerDelta(String),
    /// Raw related-questions zone text, emitted once at stream end
    /// (possibly empty).
    Related(String),
}

/// Streaming splitter over decoded text. Feed increments via
/// [`push`](SentinelSplitter::push), then call
/// [`finish`](SentinelSplitter::finish) exactly once at end of stream.
pub struct SentinelSplitter {
    mode: Mode,
    finished: bool,
}

enum Mode {
    Zone(ZoneState),
    Line(LineState),
}

impl SentinelSplitter {
    /// Zone-framed splitter (`__LLM_RESPONSE__` / `__RELATED_QUESTIONS__`).
    pub fn zoned(sentinels: ZoneSentinels) -> Self {
        Self {
            mode: Mode::Zone(ZoneState::new(sentinels)),
            finished: false,
        }
    }

    /// Line-framed splitter (`refly-sse-data: ` / `refly-sse-source: `).
    pub fn line_framed(sentinels: LineSentinels) -> Self {
        Self {
            mode: Mode::Line(LineState::new(sentinels)),
            finished: false,
        }
    }

    /// Append one decoded text increment and collect completed segments.
    pub fn push(&mut self, text: &str) -> Vec<Segment> {
        if self.finished || text.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        match &mut self.mode {
            Mode::Zone(state) => {
                state.buf.push_str(text);
                state.drain(&mut out, &mut self.finished);
            }
            Mode::Line(state) => {
                state.buf.push_str(text);
                state.drain_lines(&mut out);
            }
        }
        out
    }

    /// Signal end of stream and collect the trailing segments. The sources
    /// and related zones that never saw their sentinel are emitted empty
    /// rather than erroring.
    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        match &mut self.mode {
            Mode::Zone(state) => state.finish(&mut out),
            Mode::Line(state) => state.finish(&mut out),
        }
        self.finished = true;
        out
    }
}

// =============================================================================
// Zone framing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZonePhase {
    Sources,
    Answer,
    Related,
}

struct ZoneState {
    sources_end: memmem::Finder<'static>,
    related_begin: memmem::Finder<'static>,
    done: memmem::Finder<'static>,
    sources_end_len: usize,
    related_begin_len: usize,
    done_len: usize,
    phase: ZonePhase,
    /// Unemitted text of the current phase.
    buf: String,
    /// Bytes of `buf` already scanned without a match. The next scan backs
    /// up by `needle_len - 1` to catch sentinels spanning the boundary.
    scanned: usize,
    finished_emitted: bool,
}

impl ZoneState {
    fn new(sentinels: ZoneSentinels) -> Self {
        Self {
            sources_end: memmem::Finder::new(sentinels.sources_end.as_bytes()).into_owned(),
            related_begin: memmem::Finder::new(sentinels.related_begin.as_bytes()).into_owned(),
            done: memmem::Finder::new(sentinels.done.as_bytes()).into_owned(),
            sources_end_len: sentinels.sources_end.len(),
            related_begin_len: sentinels.related_begin.len(),
            done_len: sentinels.done.len(),
            phase: ZonePhase::Sources,
            buf: String::new(),
            scanned: 0,
            finished_emitted: false,
        }
    }

    /// Max sentinel length relevant to the current phase, for backing up the
    /// scan position and sizing the held-back tail.
    fn max_needle(&self) -> usize {
        match self.phase {
            ZonePhase::Sources => self.sources_end_len.max(self.done_len),
            ZonePhase::Answer => self.related_begin_len.max(self.done_len),
            ZonePhase::Related => self.done_len,
        }
    }

    fn scan_start(&self) -> usize {
        self.scanned.saturating_sub(self.max_needle().saturating_sub(1))
    }

    fn find(&self, finder: &memmem::Finder<'static>) -> Option<usize> {
        let start = self.scan_start();
        finder
            .find(&self.buf.as_bytes()[start..])
            .map(|i| i + start)
    }

    fn drain(&mut self, out: &mut Vec<Segment>, finished: &mut bool) {
        loop {
            match self.phase {
                ZonePhase::Sources => {
                    // Honor whichever sentinel occurs first so the result
                    // does not depend on how the stream was fragmented.
                    let end = self.find(&self.sources_end);
                    let done = self.find(&self.done);
                    if let Some(i) = end.filter(|&i| done.map_or(true, |d| i < d)) {
                        out.push(Segment::Sources(self.buf[..i].to_string()));
                        self.buf.drain(..i + self.sources_end_len);
                        self.scanned = 0;
                        self.phase = ZonePhase::Answer;
                        continue;
                    }
                    if let Some(i) = done {
                        // Producer ended before ever emitting the sentinel.
                        self.buf.truncate(i);
                        *finished = true;
                    } else {
                        self.scanned = self.buf.len();
                    }
                    return;
                }
                ZonePhase::Answer => {
                    let related = self.find(&self.related_begin);
                    let done = self.find(&self.done);
                    if let Some(i) = related.filter(|&i| done.map_or(true, |d| i < d)) {
                        if i > 0 {
                            out.push(Segment::AnswerDelta(self.buf[..i].to_string()));
                        }
                        self.buf.drain(..i + self.related_begin_len);
                        self.scanned = 0;
                        self.phase = ZonePhase::Related;
                        continue;
                    }
                    if let Some(i) = done {
                        if i > 0 {
                            out.push(Segment::AnswerDelta(self.buf[..i].to_string()));
                        }
                        self.buf.clear();
                        self.scanned = 0;
                        *finished = true;
                        return;
                    }
                    // No sentinel yet: emit everything except a tail that
                    // could still be the start of one.
                    let hold = self.max_needle().saturating_sub(1);
                    if self.buf.len() > hold {
                        let cut = floor_char_boundary(&self.buf, self.buf.len() - hold);
                        if cut > 0 {
                            out.push(Segment::AnswerDelta(self.buf[..cut].to_string()));
                            self.buf.drain(..cut);
                        }
                    }
                    self.scanned = self.buf.len();
                    return;
                }
                ZonePhase::Related => {
                    if let Some(i) = self.find(&self.done) {
                        self.buf.truncate(i);
                        *finished = true;
                    } else {
                        self.scanned = self.buf.len();
                    }
                    return;
                }
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<Segment>) {
        if self.finished_emitted {
            return;
        }
        self.finished_emitted = true;
        let buf = std::mem::take(&mut self.buf);
        match self.phase {
            // Sentinel never seen: the sources zone falls back to empty and
            // whatever accumulated is preserved as answer content.
            ZonePhase::Sources => {
                out.push(Segment::Sources(String::new()));
                if !buf.is_empty() {
                    out.push(Segment::AnswerDelta(buf));
                }
                out.push(Segment::Related(String::new()));
            }
            ZonePhase::Answer => {
                if !buf.is_empty() {
                    out.push(Segment::AnswerDelta(buf));
                }
                out.push(Segment::Related(String::new()));
            }
            ZonePhase::Related => {
                out.push(Segment::Related(buf));
            }
        }
    }
}

// =============================================================================
// Line framing
// =============================================================================

struct LineState {
    sentinels: LineSentinels,
    buf: String,
}

impl LineState {
    fn new(sentinels: LineSentinels) -> Self {
        Self {
            sentinels,
            buf: String::new(),
        }
    }

    fn drain_lines(&mut self, out: &mut Vec<Segment>) {
        while let Some(pos) = self.buf.find('\n') {
            let line = self.buf[..pos].to_string();
            self.buf.drain(..=pos);
            self.classify(&line, out);
        }
    }

    fn classify(&self, line: &str, out: &mut Vec<Segment>) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim() == self.sentinels.source_end {
            out.push(Segment::SourceBlockEnd);
        } else if let Some(rest) = line.strip_prefix(&self.sentinels.source_prefix) {
            out.push(Segment::SourceEntry(rest.to_string()));
        } else if let Some(rest) = line.strip_prefix(&self.sentinels.data_prefix) {
            out.push(Segment::AnswerDelta(rest.to_string()));
        } else if !line.trim().is_empty() {
            tracing::debug!(line_len = line.len(), "ignoring unframed line");
        }
    }

    fn finish(&mut self, out: &mut Vec<Segment>) {
        let rest = std::mem::take(&mut self.buf);
        if !rest.is_empty() {
            self.classify(&rest, out);
        }
    }
}

/// Largest char boundary at or below `i`.
fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
