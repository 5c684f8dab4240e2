use crate::metrics::Metrics;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A single cached redirect response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub location: String,
    pub code: u16,
    pub cache_control_max_age: i64,
    created_at: i64,
    ttl: i64,
}

impl CacheEntry {
    fn expired(&self, now: i64) -> bool {
        now > self.created_at + self.ttl
    }
}

/// In-memory response cache keyed by (host, path).
///
/// Lookups take the shared lock, writes and deletions the exclusive lock.
/// Entries outlive their TTL until the eviction sweep observes them; `get`
/// deliberately does not check expiry. The cache never consults the rule
/// table, so entries for rules removed by a reload persist until expiry.
pub struct ResponseCache {
    ttl: i64,
    cleanup_interval: u64,
    metrics: Arc<Metrics>,
    // {host: {path: entry}}
    entries: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
}

impl ResponseCache {
    pub fn new(ttl: i64, cleanup_interval: u64, metrics: Arc<Metrics>) -> Self {
        Self {
            ttl,
            cleanup_interval,
            metrics,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, host: &str, path: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        match entries.get(host).and_then(|paths| paths.get(path)) {
            Some(entry) => {
                debug!(%host, %path, "cache hit for path");
                self.metrics.record_cache_hit(host, path);
                Some(entry.clone())
            }
            None => {
                debug!(%host, %path, "cache miss");
                self.metrics.record_cache_miss(host, path);
                None
            }
        }
    }

    pub async fn set(
        &self,
        host: &str,
        path: &str,
        location: String,
        code: u16,
        cache_control_max_age: i64,
    ) {
        let entry = CacheEntry {
            location,
            code,
            cache_control_max_age,
            created_at: Utc::now().timestamp(),
            ttl: self.ttl,
        };

        debug!(%host, %path, code, ttl = self.ttl, location = %entry.location, "adding item to cache");
        let mut entries = self.entries.write().await;
        entries
            .entry(host.to_string())
            .or_default()
            .insert(path.to_string(), entry);
    }

    /// Remove every entry past its TTL.
    ///
    /// Expired keys are snapshotted under the read lock, then each is deleted
    /// under the write lock, so readers are never blocked for the whole sweep.
    async fn evict_expired(&self) {
        let now = Utc::now().timestamp();

        let expired: Vec<(String, String)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .flat_map(|(host, paths)| {
                    paths
                        .iter()
                        .filter(|(_, entry)| entry.expired(now))
                        .map(|(path, _)| (host.clone(), path.clone()))
                })
                .collect()
        };

        for (host, path) in expired {
            debug!(%host, %path, "removing expired entry from cache");
            let mut entries = self.entries.write().await;
            if let Some(paths) = entries.get_mut(&host) {
                paths.remove(&path);
            }
        }
    }

    /// Background eviction loop; sweeps immediately, then every
    /// `cleanup_interval` seconds until the token is cancelled.
    pub async fn run_eviction(&self, cancel_token: CancellationToken) {
        loop {
            let start = Instant::now();
            debug!("starting cache cleanup");
            self.evict_expired().await;
            self.metrics
                .observe_cleanup_duration(start.elapsed().as_secs_f64() * 1000.0);
            debug!("finished cache cleanup");

            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("stopping cache cleanup");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.cleanup_interval)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl: i64) -> ResponseCache {
        ResponseCache::new(ttl, 1, Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = cache(60);
        cache
            .set("example.com", "/x", "https://foo.com/x".to_string(), 301, 0)
            .await;

        let entry = cache.get("example.com", "/x").await.unwrap();
        assert_eq!(entry.location, "https://foo.com/x");
        assert_eq!(entry.code, 301);
        assert_eq!(entry.cache_control_max_age, 0);
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let cache = cache(60);
        assert!(cache.get("example.com", "/x").await.is_none());
        cache
            .set("example.com", "/x", "https://foo.com/x".to_string(), 301, 0)
            .await;
        // host-level hit, path-level miss
        assert!(cache.get("example.com", "/other").await.is_none());
    }

    #[tokio::test]
    async fn test_negative_entries_are_cacheable() {
        let cache = cache(60);
        cache.set("example.com", "/gone", String::new(), 404, 0).await;
        let entry = cache.get("example.com", "/gone").await.unwrap();
        assert!(entry.location.is_empty());
        assert_eq!(entry.code, 404);
    }

    #[tokio::test]
    async fn test_eviction_removes_expired_entries() {
        // ttl of -1 means everything is already expired at sweep time
        let cache = cache(-1);
        cache
            .set("example.com", "/x", "https://foo.com/x".to_string(), 301, 0)
            .await;

        cache.evict_expired().await;
        assert!(cache.get("example.com", "/x").await.is_none());
    }

    #[tokio::test]
    async fn test_eviction_keeps_live_entries() {
        let cache = cache(3600);
        cache
            .set("example.com", "/x", "https://foo.com/x".to_string(), 301, 0)
            .await;

        cache.evict_expired().await;
        assert!(cache.get("example.com", "/x").await.is_some());
    }

    #[tokio::test]
    async fn test_eviction_loop_exits_on_cancel() {
        let cache = Arc::new(cache(60));
        let token = CancellationToken::new();
        let handle = {
            let cache = Arc::clone(&cache);
            let token = token.clone();
            tokio::spawn(async move { cache.run_eviction(token).await })
        };

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("eviction loop did not stop")
            .unwrap();
    }
}
