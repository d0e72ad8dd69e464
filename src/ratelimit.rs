//! Fixed-window rate limiter guarding the control plane.
//!
//! A per-client bucket tracks a request count and the window's start time.
//! Lookup takes the map's read lock; only a miss (first request from a new
//! client) takes the write lock to insert. Each bucket then has its own
//! lock, so concurrent requests from different clients never contend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

struct Bucket {
    count: u32,
    window_start: chrono::DateTime<chrono::Utc>,
    last_seen: chrono::DateTime<chrono::Utc>,
}

impl Bucket {
    fn new(now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_seen: now,
        }
    }
}

/// Keyed by client identifier, derived in priority order by the caller:
/// authenticated user id, then presented API key, then client IP (honoring
/// `X-Forwarded-For` first IP, then `X-Real-IP`).
pub struct RateLimiter {
    limit: u32,
    window: chrono::Duration,
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::seconds(60)),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    async fn bucket_for(&self, client: &str) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.buckets.read().await.get(client) {
            return bucket.clone();
        }
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(client.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(chrono::Utc::now()))))
            .clone()
    }

    /// Check-and-increment for `client`. If the window has elapsed, resets
    /// the counter before evaluating the limit.
    pub async fn check(&self, client: &str) -> Decision {
        let bucket = self.bucket_for(client).await;
        let mut bucket = bucket.lock().await;
        let now = chrono::Utc::now();

        if now - bucket.window_start >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }
        bucket.last_seen = now;

        let reset_after = (bucket.window_start + self.window - now)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if bucket.count >= self.limit {
            return Decision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                reset_after,
            };
        }

        bucket.count += 1;
        Decision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit - bucket.count,
            reset_after,
        }
    }

    /// Evict buckets idle longer than 2x the window. Intended to be driven
    /// by a periodic sweeper task.
    pub async fn sweep(&self) -> usize {
        let now = chrono::Utc::now();
        let idle_threshold = self.window * 2;
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        let mut stale = Vec::new();
        for (client, bucket) in buckets.iter() {
            let last_seen = bucket.lock().await.last_seen;
            if now - last_seen >= idle_threshold {
                stale.push(client.clone());
            }
        }
        for client in &stale {
            buckets.remove(client);
        }
        before - buckets.len()
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// Spawn the periodic sweeper as a background task, stopping when
    /// `shutdown` fires (mirrors the scheduler/queue worker shutdown shape).
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("rate limiter sweeper shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        let evicted = self.sweep().await;
                        if evicted > 0 {
                            tracing::debug!(evicted, "swept idle rate-limit buckets");
                        }
                    }
                }
            }
        })
    }
}

/// Derives the client identifier used to key rate-limit buckets: the
/// authenticated user id if present, else a presented API key, else the
/// client IP (preferring the first `X-Forwarded-For` hop, then
/// `X-Real-IP`, falling back to the socket's peer address).
pub fn client_key(
    user_id: Option<&str>,
    api_key: Option<&str>,
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer_ip: Option<&str>,
) -> String {
    if let Some(id) = user_id {
        return format!("user:{id}");
    }
    if let Some(key) = api_key {
        return format!("apikey:{key}");
    }
    if let Some(forwarded) = forwarded_for {
        if let Some(first) = forwarded.split(',').next() {
            let ip = first.trim();
            if !ip.is_empty() {
                return format!("ip:{ip}");
            }
        }
    }
    if let Some(ip) = real_ip {
        return format!("ip:{ip}");
    }
    format!("ip:{}", peer_ip.unwrap_or("unknown"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limit_of_three_accepts_three_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for expected_remaining in [2, 1, 0] {
            let d = limiter.check("client-a").await;
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }
        let rejected = limiter.check("client-a").await;
        assert!(!rejected.allowed);
        assert!(rejected.reset_after <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn different_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a").await.allowed);
        assert!(limiter.check("b").await.allowed);
        assert!(!limiter.check("a").await.allowed);
    }

    #[tokio::test]
    async fn window_rollover_resets_the_counter() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("a").await.allowed);
        assert!(!limiter.check("a").await.allowed);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let d = limiter.check("a").await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn sweep_evicts_only_idle_buckets() {
        let limiter = RateLimiter::new(5, Duration::from_millis(10));
        limiter.check("stale").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.check("fresh").await;
        let evicted = limiter.sweep().await;
        assert_eq!(evicted, 1);
        assert_eq!(limiter.bucket_count().await, 1);
    }

    #[test]
    fn client_key_prefers_user_then_api_key_then_forwarded_ip() {
        assert_eq!(
            client_key(Some("u1"), Some("k1"), Some("1.2.3.4"), None, None),
            "user:u1"
        );
        assert_eq!(
            client_key(None, Some("k1"), Some("1.2.3.4"), None, None),
            "apikey:k1"
        );
        assert_eq!(
            client_key(None, None, Some("1.2.3.4, 5.6.7.8"), Some("9.9.9.9"), None),
            "ip:1.2.3.4"
        );
        assert_eq!(client_key(None, None, None, Some("9.9.9.9"), None), "ip:9.9.9.9");
        assert_eq!(client_key(None, None, None, None, Some("10.0.0.1")), "ip:10.0.0.1");
    }
}
