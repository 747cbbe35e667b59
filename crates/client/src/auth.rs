// crates/client/src/auth.rs
//! Bearer-credential storage with single-flight refresh.
//!
//! Every outbound request reads the current token. On a 401 the caller
//! hands the stale token back to [`CredentialStore::refresh_if_stale`];
//! concurrent callers queue on one refresh and reuse its result instead of
//! each triggering their own.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::ClientError;

/// Collaborator that produces a fresh bearer token. Implemented by the
/// embedding application (OAuth exchange, key vault, static secret in
/// tests).
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self) -> Result<String, ClientError>;
}

pub struct CredentialStore {
    token: RwLock<String>,
    /// Serializes refreshes; holders that arrive while a refresh is in
    /// flight wait here and then find the token already replaced.
    refresh_gate: Mutex<()>,
    refresher: Arc<dyn TokenRefresher>,
}

impl CredentialStore {
    pub fn new(initial_token: impl Into<String>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            token: RwLock::new(initial_token.into()),
            refresh_gate: Mutex::new(()),
            refresher,
        }
    }

    /// Current bearer token.
    pub async fn bearer(&self) -> String {
        self.token.read().await.clone()
    }

    /// Called after observing a 401 issued with `stale`. Returns the token
    /// to retry with. If another caller already refreshed while we waited
    /// for the gate, that result is reused without a second refresh.
    pub async fn refresh_if_stale(&self, stale: &str) -> Result<String, ClientError> {
        let _gate = self.refresh_gate.lock().await;
        {
            let current = self.token.read().await;
            if *current != stale {
                tracing::debug!("credential already refreshed by a concurrent request");
                return Ok(current.clone());
            }
        }
        tracing::info!("refreshing bearer credential");
        let fresh = self.refresher.refresh().await?;
        *self.token.write().await = fresh.clone();
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self) -> Result<String, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("fresh-{n}"))
        }
    }

    struct FailingRefresher;

    #[async_trait]
    impl TokenRefresher for FailingRefresher {
        async fn refresh(&self) -> Result<String, ClientError> {
            Err(ClientError::refresh("idp unreachable"))
        }
    }

    #[tokio::test]
    async fn refresh_replaces_token() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
        });
        let store = CredentialStore::new("stale", refresher);
        assert_eq!(store.bearer().await, "stale");
        let fresh = store.refresh_if_stale("stale").await.unwrap();
        assert_eq!(fresh, "fresh-1");
        assert_eq!(store.bearer().await, "fresh-1");
    }

    #[tokio::test]
    async fn concurrent_stale_callers_share_one_refresh() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(CredentialStore::new(
            "stale",
            Arc::clone(&refresher) as Arc<dyn TokenRefresher>,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(
                async move { store.refresh_if_stale("stale").await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "fresh-1");
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_rotated_token_is_reused() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
        });
        let store =
            CredentialStore::new("current", Arc::clone(&refresher) as Arc<dyn TokenRefresher>);
        // The caller's 401 was issued with a token that has since rotated.
        let token = store.refresh_if_stale("older").await.unwrap();
        assert_eq!(token, "current");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_failure_propagates() {
        let store = CredentialStore::new("stale", Arc::new(FailingRefresher));
        let err = store.refresh_if_stale("stale").await.unwrap_err();
        assert!(matches!(err, ClientError::Refresh { .. }));
        // The stale token stays in place.
        assert_eq!(store.bearer().await, "stale");
    }
}
