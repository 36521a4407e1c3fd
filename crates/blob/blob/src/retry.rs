use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use medidoc_core::StorageKey;

use crate::error::BlobError;
use crate::store::BlobStore;

/// Exponential backoff for transient blob store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based): `base * 2^attempt`,
    /// clamped to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A [`BlobStore`] wrapper that retries [`BlobError::Unavailable`] with
/// backoff. Every other outcome is returned as-is.
pub struct RetryingBlobStore {
    inner: Arc<dyn BlobStore>,
    policy: RetryPolicy,
}

impl RetryingBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, BlobError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, BlobError>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Err(e) if e.is_transient() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(op, attempt, ?delay, error = %e, "blob store unavailable, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl BlobStore for RetryingBlobStore {
    async fn put(&self, data: Bytes) -> Result<StorageKey, BlobError> {
        self.with_retry("put", || self.inner.put(data.clone())).await
    }

    async fn get(&self, key: &StorageKey) -> Result<Option<Bytes>, BlobError> {
        self.with_retry("get", || self.inner.get(key)).await
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, BlobError> {
        self.with_retry("delete", || self.inner.delete(key)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Fails with `Unavailable` a fixed number of times, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: fn() -> BlobError,
    }

    impl Flaky {
        fn new(failures: u32, error: fn() -> BlobError) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                error,
            }
        }

        fn tick(&self) -> Result<(), BlobError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl BlobStore for Flaky {
        async fn put(&self, _data: Bytes) -> Result<StorageKey, BlobError> {
            self.tick()?;
            Ok(StorageKey::new("k"))
        }

        async fn get(&self, _key: &StorageKey) -> Result<Option<Bytes>, BlobError> {
            self.tick()?;
            Ok(Some(Bytes::from_static(b"ok")))
        }

        async fn delete(&self, _key: &StorageKey) -> Result<bool, BlobError> {
            self.tick()?;
            Ok(true)
        }
    }

    fn unavailable() -> BlobError {
        BlobError::Unavailable("down".into())
    }

    fn storage() -> BlobError {
        BlobError::Storage("disk full".into())
    }

    #[test]
    fn delay_is_exponential_and_clamped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let flaky = Arc::new(Flaky::new(2, unavailable));
        let store = RetryingBlobStore::new(flaky.clone(), RetryPolicy::default());

        let key = store.put(Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(key.as_str(), "k");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let flaky = Arc::new(Flaky::new(10, unavailable));
        let store = RetryingBlobStore::new(flaky.clone(), RetryPolicy::default());

        let err = store.get(&StorageKey::new("k")).await.unwrap_err();
        assert!(matches!(err, BlobError::Unavailable(_)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let flaky = Arc::new(Flaky::new(1, storage));
        let store = RetryingBlobStore::new(flaky.clone(), RetryPolicy::default());

        let err = store.delete(&StorageKey::new("k")).await.unwrap_err();
        assert!(matches!(err, BlobError::Storage(_)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
