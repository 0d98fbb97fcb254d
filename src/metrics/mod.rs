// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

// Re-export for public API
pub use server::{health_handler, metrics_handler};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Ingestion throughput, outcomes and latency
// - Cache hits, misses, evictions and size
// - Store fallbacks on the read path
//
// All metrics are registered with one Prometheus registry, scraped via /metrics
// ============================================================================

/// Central metrics registry for the service
pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub messages_received: IntCounter,
    pub messages_processed: IntCounterVec,
    pub processing_duration: HistogramVec,

    // Cache
    pub cache_lookups: IntCounterVec,
    pub cache_evictions: IntCounter,
    pub cache_entries: IntGauge,

    // Read path fallback
    pub store_fallbacks: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let messages_received = IntCounter::new(
            "ingest_messages_received_total",
            "Total messages pulled from the order stream",
        )?;
        registry.register(Box::new(messages_received.clone()))?;

        let messages_processed = IntCounterVec::new(
            Opts::new("ingest_messages_processed_total", "Messages by final processing outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(messages_processed.clone()))?;

        let processing_duration = HistogramVec::new(
            HistogramOpts::new("ingest_processing_duration_seconds", "Time from receipt to final outcome")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Cache lookups by result"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        let cache_evictions = IntCounter::new(
            "cache_evictions_total",
            "Entries evicted to respect cache capacity",
        )?;
        registry.register(Box::new(cache_evictions.clone()))?;

        let cache_entries = IntGauge::new("cache_entries", "Orders currently cached")?;
        registry.register(Box::new(cache_entries.clone()))?;

        let store_fallbacks = IntCounterVec::new(
            Opts::new("read_store_fallbacks_total", "Store reads after a cache miss, by result"),
            &["result"],
        )?;
        registry.register(Box::new(store_fallbacks.clone()))?;

        Ok(Self {
            registry,
            messages_received,
            messages_processed,
            processing_duration,
            cache_lookups,
            cache_evictions,
            cache_entries,
            store_fallbacks,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the final outcome of one message
    pub fn record_message(&self, outcome: &str, duration_secs: f64) {
        self.messages_processed.with_label_values(&[outcome]).inc();
        self.processing_duration.with_label_values(&[outcome]).observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    /// Track a cache write: the evicted key (if any) and the resulting size
    pub fn record_cache_put(&self, evicted: bool, entries: usize) {
        if evicted {
            self.cache_evictions.inc();
        }
        self.cache_entries.set(entries as i64);
    }

    pub fn record_store_fallback(&self, result: &str) {
        self.store_fallbacks.with_label_values(&[result]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_message() {
        let metrics = Metrics::new().unwrap();
        metrics.record_message("acknowledged", 0.05);
        metrics.record_message("invalid", 0.001);

        let gathered = metrics.registry.gather();
        let processed = gathered.iter().find(|m| m.name() == "ingest_messages_processed_total").unwrap();
        assert_eq!(processed.metric.len(), 2); // Two different outcome labels
    }

    #[test]
    fn test_record_cache_activity() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_cache_put(true, 3);

        let gathered = metrics.registry.gather();
        let evictions = gathered.iter().find(|m| m.name() == "cache_evictions_total").unwrap();
        assert_eq!(evictions.metric[0].counter.value, Some(1.0));

        let entries = gathered.iter().find(|m| m.name() == "cache_entries").unwrap();
        assert_eq!(entries.metric[0].gauge.value, Some(3.0));
    }
}
