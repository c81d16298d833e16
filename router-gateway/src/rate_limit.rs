//! # Token-Bucket Rate Limiter
//!
//! One bucket per key, `burst_size` tokens, refilled lazily at
//! `requests_per_minute / 60` tokens/sec computed from elapsed time on each
//! `allow` call rather than a background ticker. A separate reclaimer task
//! removes buckets that have sat idle longer than twice the rate window so
//! memory doesn't grow with the set of keys ever seen.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub retry_after: Option<Duration>,
    /// Time until the bucket is back to full capacity, for the
    /// `X-RateLimit-Reset` header.
    pub reset_after: Duration,
}

pub struct RateLimiter {
    buckets: DashMap<String, Mutex<Bucket>>,
    enabled: bool,
    requests_per_minute: u64,
    burst_size: u64,
    cleanup_interval: Duration,
}

/// The window a `requests_per_minute` rate is defined over; idle buckets
/// are reclaimed after twice this.
const WINDOW: Duration = Duration::from_secs(60);

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            enabled: config.enabled,
            requests_per_minute: config.requests_per_minute,
            burst_size: config.burst_size,
            cleanup_interval: config.cleanup_interval,
        }
    }

    fn refill_rate(&self) -> f64 {
        self.requests_per_minute as f64 / WINDOW.as_secs_f64()
    }

    pub fn allow(&self, key: &str) -> RateLimitDecision {
        if !self.enabled {
            return RateLimitDecision {
                allowed: true,
                limit: self.burst_size,
                remaining: self.requests_per_minute,
                retry_after: None,
                reset_after: WINDOW,
            };
        }

        let rate = self.refill_rate();
        let entry = self.buckets.entry(key.to_string()).or_insert_with(|| {
            Mutex::new(Bucket {
                tokens: self.burst_size as f64,
                last_refill: Instant::now(),
            })
        });
        let mut bucket = entry.lock().unwrap();

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(self.burst_size as f64);
        bucket.last_refill = now;

        let reset_after = Duration::from_secs_f64((self.burst_size as f64 - bucket.tokens).max(0.0) / rate);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision {
                allowed: true,
                limit: self.burst_size,
                remaining: bucket.tokens as u64,
                retry_after: None,
                reset_after,
            }
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after = Duration::from_secs_f64(deficit / rate);
            RateLimitDecision {
                allowed: false,
                limit: self.burst_size,
                remaining: 0,
                retry_after: Some(retry_after),
                reset_after,
            }
        }
    }

    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Removes buckets idle longer than `2 * WINDOW`. Intended to run on a
    /// `cleanup_interval` tick from the caller (see `start_reclaimer`).
    fn reclaim_idle(&self) {
        let threshold = WINDOW * 2;
        self.buckets
            .retain(|_, bucket| bucket.lock().unwrap().last_refill.elapsed() < threshold);
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }
}

pub async fn start_reclaimer(limiter: Arc<RateLimiter>) {
    let mut interval = tokio::time::interval(limiter.cleanup_interval());
    loop {
        interval.tick().await;
        limiter.reclaim_idle();
    }
}

/// Key extraction: prefer the authenticated user identity over the
/// connecting IP address.
pub fn extract_key(user_id: Option<&str>, remote_addr: Option<&str>) -> String {
    match (user_id, remote_addr) {
        (Some(user), _) => format!("user:{user}"),
        (None, Some(addr)) => format!("ip:{addr}"),
        (None, None) => "anonymous".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rpm: u64, burst: u64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            requests_per_minute: rpm,
            burst_size: burst,
            cleanup_interval: Duration::from_secs(300),
        }
    }

    #[test]
    fn disabled_limiter_always_allows() {
        let mut cfg = config(60, 10);
        cfg.enabled = false;
        let limiter = RateLimiter::new(&cfg);
        let decision = limiter.allow("user:1");
        assert!(decision.allowed);
    }

    #[test]
    fn key_extraction_prefers_user_over_ip() {
        assert_eq!(extract_key(Some("u1"), Some("1.2.3.4")), "user:u1");
        assert_eq!(extract_key(None, Some("1.2.3.4")), "ip:1.2.3.4");
        assert_eq!(extract_key(None, None), "anonymous");
    }

    #[test]
    fn reset_clears_a_bucket() {
        let limiter = RateLimiter::new(&config(2, 2));
        limiter.allow("a");
        limiter.allow("a");
        assert!(!limiter.allow("a").allowed);
        limiter.reset("a");
        assert!(limiter.allow("a").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_exhausts_then_refills_after_the_expected_delay() {
        // burst=2, rpm=2 => refill rate is 1 token per 30s.
        let limiter = RateLimiter::new(&config(2, 2));

        assert!(limiter.allow("u").allowed);
        assert!(limiter.allow("u").allowed);
        let denied = limiter.allow("u");
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.allow("u").allowed);
    }
}
