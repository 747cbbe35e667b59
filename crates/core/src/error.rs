// crates/core/src/error.rs
use thiserror::Error;

/// Errors surfaced by the core pipeline.
///
/// Most failure modes in this pipeline are handled locally and never become
/// errors: malformed bytes decode to a replacement marker, unparseable zone
/// content falls back to an empty collection, and a missing sentinel falls
/// back to an empty zone. What remains is record encoding at flush time.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to encode step record field `{field}`: {source}")]
    RecordEncode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
