use prometheus::{
    Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
}

/// Service metrics behind an explicit registry.
///
/// The registry is owned here rather than using the process-global default so
/// independent instances (one per test, one per server) never collide on
/// registration.
pub struct Metrics {
    registry: Registry,
    cache_hit: IntCounterVec,
    cache_miss: IntCounterVec,
    cache_cleanup_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let cache_hit = IntCounterVec::new(
            Opts::new("cache_hit", "Number of cache hits"),
            &["host", "path"],
        )?;
        registry.register(Box::new(cache_hit.clone()))?;

        let cache_miss = IntCounterVec::new(
            Opts::new("cache_miss", "Number of cache misses"),
            &["host", "path"],
        )?;
        registry.register(Box::new(cache_miss.clone()))?;

        let cache_cleanup_duration = Histogram::with_opts(HistogramOpts::new(
            "cache_cleanup_job_duration_milliseconds",
            "Duration of the cache cleanup job",
        ))?;
        registry.register(Box::new(cache_cleanup_duration.clone()))?;

        Ok(Self {
            registry,
            cache_hit,
            cache_miss,
            cache_cleanup_duration,
        })
    }

    pub fn record_cache_hit(&self, host: &str, path: &str) {
        self.cache_hit.with_label_values(&[host, path]).inc();
    }

    pub fn record_cache_miss(&self, host: &str, path: &str) {
        self.cache_miss.with_label_values(&[host, path]).inc();
    }

    pub fn observe_cleanup_duration(&self, millis: f64) {
        self.cache_cleanup_duration.observe(millis);
    }

    /// Render the registry in the prometheus text exposition format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_appear_in_exposition() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache_hit("example.com", "/x");
        metrics.record_cache_miss("example.com", "/y");
        metrics.observe_cleanup_duration(1.5);

        let text = metrics.gather().unwrap();
        assert!(text.contains(r#"cache_hit{host="example.com",path="/x"} 1"#));
        assert!(text.contains(r#"cache_miss{host="example.com",path="/y"} 1"#));
        assert!(text.contains("cache_cleanup_job_duration_milliseconds"));
    }

    #[test]
    fn test_independent_instances_do_not_collide() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_cache_hit("a.example", "/");
        assert!(!second.gather().unwrap().contains("a.example"));
    }
}
