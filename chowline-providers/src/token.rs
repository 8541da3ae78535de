use async_trait::async_trait;
use chowline_core::DeliveryResult;
use chowline_shared::Masked;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: Masked<String>,
    pub expires_at: DateTime<Utc>,
}

/// Where fresh tokens come from (an OAuth client-credentials endpoint in
/// production).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> DeliveryResult<AccessToken>;
}

/// Process-wide access token cache. Refreshes lazily on first use after
/// expiry; the lock is held across the refresh so concurrent callers wait for
/// the one in flight instead of starting their own.
pub struct TokenCache<S> {
    source: S,
    refresh_margin: Duration,
    current: Mutex<Option<AccessToken>>,
}

impl<S: TokenSource> TokenCache<S> {
    pub fn new(source: S) -> Self {
        Self::with_margin(source, Duration::seconds(60))
    }

    /// `refresh_margin`: treat tokens this close to expiry as already expired.
    pub fn with_margin(source: S, refresh_margin: Duration) -> Self {
        Self {
            source,
            refresh_margin,
            current: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> DeliveryResult<String> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if token.expires_at - self.refresh_margin > Utc::now() {
                return Ok(token.value.expose().clone());
            }
        }

        debug!("Refreshing provider access token");
        let fresh = self.source.fetch_token().await?;
        let value = fresh.value.expose().clone();
        *current = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token, e.g. after the provider rejects it.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chowline_core::DeliveryError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        calls: AtomicUsize,
        lifetime: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> DeliveryResult<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(AccessToken {
                value: Masked(format!("token-{n}")),
                expires_at: Utc::now() + self.lifetime,
            })
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TokenSource for FailingSource {
        async fn fetch_token(&self) -> DeliveryResult<AccessToken> {
            Err(DeliveryError::ProviderAuthFailure("invalid_client".into()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh() {
        let cache = Arc::new(TokenCache::new(CountingSource {
            calls: AtomicUsize::new(0),
            lifetime: Duration::hours(1),
        }));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.token().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refreshes_inside_margin() {
        let cache = TokenCache::new(CountingSource {
            calls: AtomicUsize::new(0),
            lifetime: Duration::seconds(30),
        });

        assert_eq!(cache.token().await.unwrap(), "token-1");
        assert_eq!(cache.token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let cache = TokenCache::new(CountingSource {
            calls: AtomicUsize::new(0),
            lifetime: Duration::hours(1),
        });

        cache.token().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_auth_failure_propagates() {
        let cache = TokenCache::new(FailingSource);
        assert!(matches!(
            cache.token().await,
            Err(DeliveryError::ProviderAuthFailure(_))
        ));
    }
}
