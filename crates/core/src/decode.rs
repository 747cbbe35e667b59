// crates/core/src/decode.rs
//! Stateful chunk-to-text decoder for the skill byte stream.
//!
//! Network reads hand us arbitrary byte fragments; a multi-byte UTF-8
//! sequence can be cut anywhere. The decoder retains the incomplete trailing
//! bytes of each chunk and prefixes them onto the next one, so concatenating
//! the outputs across any fragmentation equals decoding the stream in one
//! piece. Malformed sequences are replaced with U+FFFD and never fail the
//! stream.

/// Incremental UTF-8 decoder. One instance per stream.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    /// Incomplete trailing multi-byte sequence from the previous chunk
    /// (at most 3 bytes).
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, prefixed with any bytes held from the previous one.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(
                        std::str::from_utf8(valid).expect("prefix below valid_up_to is UTF-8"),
                    );
                    match err.error_len() {
                        // Malformed sequence inside the chunk: substitute and
                        // keep going.
                        Some(len) => {
                            out.push('\u{FFFD}');
                            rest = &after[len..];
                        }
                        // Incomplete trailing sequence: hold it for the next
                        // chunk.
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush at end of stream. A truncated trailing sequence decodes lossily
    /// (replacement marker), matching the never-throws contract.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }
}
