// crates/client/src/lib.rs
//! HTTP request layer for the skill-execution streaming pipeline: bearer
//! auth with single-flight refresh, the streaming invocation loop, and
//! cooperative cancellation. The pure pipeline stages live in
//! `skillstream-core`.

pub mod auth;
pub mod error;
pub mod invoke;

pub use auth::{CredentialStore, TokenRefresher};
pub use error::ClientError;
pub use invoke::{InvocationHandle, InvocationRequest, InvokeConfig, SkillClient};
