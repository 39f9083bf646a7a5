// ============================================================================
// Per-Key Rate Limiting
// ============================================================================
//
// Fixed window counter per API key, kept only in the shared cache under
// `throttle:api_key:{key}`:
//
// - count >= limit      → reject; wait = remaining TTL (or full window)
// - count == 0 / absent → set 1 with TTL = window (only place a TTL starts)
// - otherwise           → increment, TTL untouched
//
// The read and the write are separate cache calls, so concurrent requests
// near the limit can overshoot it slightly. Requests without a principal
// are not throttled here.
//
// ============================================================================

use std::sync::Arc;

use crate::auth::Principal;
use crate::cache::RateCache;
use crate::config::RateLimitConfig;
use crate::error::{AppError, AppResult};
use crate::metrics;

pub struct RateLimiter {
    cache: Arc<dyn RateCache>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn RateCache>, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    pub fn cache_key(key: &str) -> String {
        format!("throttle:api_key:{}", key)
    }

    /// Admits the request or returns `RateLimitExceeded` with the wait in seconds
    pub async fn check(&self, principal: Option<&Principal>) -> AppResult<()> {
        let Some(principal) = principal else {
            return Ok(());
        };

        let key = Self::cache_key(principal.key());
        let window = self.config.window_secs;
        let count = self.cache.get(&key).await?.unwrap_or(0);

        if count >= self.config.max_requests {
            let wait_secs = match self.cache.time_to_live(&key).await? {
                Some(ttl) if ttl > 0 => ttl,
                _ => window,
            };
            tracing::info!(
                credential_id = principal.credential_id(),
                count = count,
                wait_secs = wait_secs,
                "Rate limit exceeded"
            );
            metrics::THROTTLED_REQUESTS_TOTAL.inc();
            return Err(AppError::RateLimitExceeded { wait_secs });
        }

        if count == 0 {
            self.cache.set_with_expiry(&key, 1, window).await?;
        } else if self.cache.increment(&key).await? == 1 {
            // Counter expired between the read and the increment
            self.cache.set_with_expiry(&key, 1, window).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::Credential;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted cache that records every call
    struct StubCache {
        value: Option<u64>,
        ttl: Option<u64>,
        /// Overrides what `increment` returns
        incremented: Option<u64>,
        calls: Mutex<Vec<String>>,
    }

    impl StubCache {
        fn new(value: Option<u64>, ttl: Option<u64>) -> Self {
            Self {
                value,
                ttl,
                incremented: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_increment_result(mut self, value: u64) -> Self {
            self.incremented = Some(value);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl RateCache for StubCache {
        async fn get(&self, key: &str) -> anyhow::Result<Option<u64>> {
            self.push(format!("get {}", key));
            Ok(self.value)
        }

        async fn increment(&self, key: &str) -> anyhow::Result<u64> {
            self.push(format!("incr {}", key));
            Ok(self
                .incremented
                .unwrap_or_else(|| self.value.unwrap_or(0) + 1))
        }

        async fn set_with_expiry(&self, key: &str, value: u64, ttl: u64) -> anyhow::Result<()> {
            self.push(format!("set {} {} {}", key, value, ttl));
            Ok(())
        }

        async fn time_to_live(&self, key: &str) -> anyhow::Result<Option<u64>> {
            self.push(format!("ttl {}", key));
            Ok(self.ttl)
        }

        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn principal(key: &str) -> Principal {
        Principal {
            credential: Arc::new(Credential {
                id: 7,
                name: "client".to_string(),
                key: key.to_string(),
                is_active: true,
                created_at: Utc::now(),
            }),
        }
    }

    fn limiter(cache: Arc<dyn RateCache>) -> RateLimiter {
        RateLimiter::new(cache, RateLimitConfig::default())
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(RateLimiter::cache_key("abc"), "throttle:api_key:abc");
    }

    #[tokio::test]
    async fn test_first_request_sets_counter_with_window() {
        let cache = Arc::new(StubCache::new(None, None));
        limiter(cache.clone())
            .check(Some(&principal("abc")))
            .await
            .unwrap();

        assert_eq!(
            cache.calls(),
            vec![
                "get throttle:api_key:abc".to_string(),
                "set throttle:api_key:abc 1 3600".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_below_limit_increments_without_touching_ttl() {
        let cache = Arc::new(StubCache::new(Some(50), Some(1200)));
        limiter(cache.clone())
            .check(Some(&principal("abc")))
            .await
            .unwrap();

        assert_eq!(
            cache.calls(),
            vec![
                "get throttle:api_key:abc".to_string(),
                "incr throttle:api_key:abc".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_counter_expired_before_increment_rearms_window() {
        let cache = Arc::new(StubCache::new(Some(5), Some(2)).with_increment_result(1));
        limiter(cache.clone())
            .check(Some(&principal("abc")))
            .await
            .unwrap();

        assert_eq!(
            cache.calls(),
            vec![
                "get throttle:api_key:abc".to_string(),
                "incr throttle:api_key:abc".to_string(),
                "set throttle:api_key:abc 1 3600".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_at_limit_rejects_with_remaining_ttl() {
        let cache = Arc::new(StubCache::new(Some(100), Some(1800)));
        let err = limiter(cache.clone())
            .check(Some(&principal("abc")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimitExceeded { wait_secs: 1800 }));
        assert!(!cache.calls().iter().any(|c| c.starts_with("incr")));
    }

    #[tokio::test]
    async fn test_at_limit_without_ttl_waits_full_window() {
        let cache = Arc::new(StubCache::new(Some(150), None));
        let err = limiter(cache)
            .check(Some(&principal("abc")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimitExceeded { wait_secs: 3600 }));
    }

    #[tokio::test]
    async fn test_no_principal_is_admitted_without_cache_calls() {
        let cache = Arc::new(StubCache::new(Some(1000), Some(10)));
        limiter(cache.clone()).check(None).await.unwrap();
        assert!(cache.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_window_restart() {
        let cache = Arc::new(MemoryCache::new());
        let limiter = RateLimiter::new(
            cache.clone(),
            RateLimitConfig {
                max_requests: 3,
                window_secs: 60,
            },
        );
        let who = principal("abc");

        for _ in 0..3 {
            limiter.check(Some(&who)).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(20)).await;
        match limiter.check(Some(&who)).await {
            Err(AppError::RateLimitExceeded { wait_secs }) => {
                assert!(wait_secs > 0 && wait_secs <= 60);
                assert_eq!(wait_secs, 40);
            }
            other => panic!("expected throttle, got {:?}", other),
        }

        tokio::time::advance(Duration::from_secs(40)).await;
        limiter.check(Some(&who)).await.unwrap();
        assert_eq!(
            cache
                .get(&RateLimiter::cache_key("abc"))
                .await
                .unwrap(),
            Some(1)
        );
        assert_eq!(
            cache
                .time_to_live(&RateLimiter::cache_key("abc"))
                .await
                .unwrap(),
            Some(60)
        );
    }

    #[tokio::test]
    async fn test_keys_are_counted_independently() {
        let cache = Arc::new(MemoryCache::new());
        let limiter = RateLimiter::new(
            cache,
            RateLimitConfig {
                max_requests: 1,
                window_secs: 60,
            },
        );

        limiter.check(Some(&principal("a"))).await.unwrap();
        limiter.check(Some(&principal("b"))).await.unwrap();
        assert!(limiter.check(Some(&principal("a"))).await.is_err());
    }
}
