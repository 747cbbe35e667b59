// crates/client/src/error.rs
//! Request-layer errors.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure: DNS, connect, TLS, or a dropped body stream.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status other than 401. Terminal, never retried.
    #[error("skill endpoint returned {status}")]
    Status { status: StatusCode },

    /// Still 401 after a credential refresh and one retry.
    #[error("unauthorized after credential refresh")]
    Unauthorized,

    /// The token-refresh collaborator failed.
    #[error("credential refresh failed: {message}")]
    Refresh { message: String },

    /// Error surfaced by the core pipeline (record encoding).
    #[error(transparent)]
    Stream(#[from] skillstream_core::StreamError),

    /// The invocation task ended without producing a result.
    #[error("invocation task failed: {message}")]
    Task { message: String },
}

impl ClientError {
    pub fn refresh(message: impl Into<String>) -> Self {
        Self::Refresh {
            message: message.into(),
        }
    }
}
