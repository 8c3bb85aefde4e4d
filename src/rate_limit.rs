//! Per-caller rolling-window request limiter.
//!
//! Request timestamps live in the session store under `rate:{caller}`, so
//! the limit holds across processes sharing one store.

use std::time::Duration;

use chrono::Utc;
use zip_content_replacer_core::error::{ImportError, ImportResult};
use zip_content_replacer_core::session::{load_json, rate_key, save_json, SessionStore};

#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Record one request for `caller`, or fail with `Throttled` when the
    /// window is already full. A refused request is not recorded.
    pub async fn check(&self, sessions: &dyn SessionStore, caller: &str) -> ImportResult<()> {
        let key = rate_key(caller);
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = self.window.as_millis() as i64;

        let mut stamps: Vec<i64> = load_json(sessions, &key).await?.unwrap_or_default();
        stamps.retain(|t| now_ms - *t < window_ms);

        if stamps.len() >= self.max_requests {
            let oldest = stamps.iter().copied().min().unwrap_or(now_ms);
            let wait_ms = (oldest + window_ms - now_ms).max(0);
            let retry_after_secs = ((wait_ms + 999) / 1000).max(1) as u64;
            tracing::warn!(caller, retry_after_secs, "request throttled");
            return Err(ImportError::Throttled { retry_after_secs });
        }

        stamps.push(now_ms);
        save_json(sessions, &key, &stamps, self.window).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip_content_replacer_core::session::memory::InMemorySessionStore;

    #[tokio::test]
    async fn twenty_first_request_is_throttled() {
        let sessions = InMemorySessionStore::new();
        let limiter = RateLimiter::new(20, Duration::from_secs(60));
        for _ in 0..20 {
            limiter.check(&sessions, "alice").await.unwrap();
        }
        let err = limiter.check(&sessions, "alice").await.unwrap_err();
        assert!(matches!(err, ImportError::Throttled { retry_after_secs } if retry_after_secs >= 1));
        // Other callers are unaffected.
        limiter.check(&sessions, "bob").await.unwrap();
    }

    #[tokio::test]
    async fn window_expiry_frees_slots() {
        let sessions = InMemorySessionStore::new();
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        limiter.check(&sessions, "c").await.unwrap();
        assert!(limiter.check(&sessions, "c").await.is_err());
        tokio::time::sleep(Duration::from_millis(80)).await;
        limiter.check(&sessions, "c").await.unwrap();
    }
}
