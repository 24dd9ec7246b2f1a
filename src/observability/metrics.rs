use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::Decision;

/// Metrics registry for the application.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Reviews that produced a decision
    pub reviews_total: AtomicU64,

    /// Reviews by outcome
    pub reviews_allowed: AtomicU64,
    pub reviews_denied: AtomicU64,
    pub reviews_default_deny: AtomicU64,

    /// Reviews that failed because the store could not be read
    pub reviews_failed: AtomicU64,

    /// Rejected request envelopes
    pub bad_requests_total: AtomicU64,

    /// Review latency buckets
    pub latency_under_1ms: AtomicU64,
    pub latency_1_5ms: AtomicU64,
    pub latency_5_10ms: AtomicU64,
    pub latency_10_50ms: AtomicU64,
    pub latency_50_100ms: AtomicU64,
    pub latency_over_100ms: AtomicU64,
    pub latency_sum_micros: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        MetricsRegistry::default()
    }

    /// Record a review outcome.
    pub fn record_decision(&self, decision: &Decision) {
        self.reviews_total.fetch_add(1, Ordering::Relaxed);

        if decision.allowed {
            self.reviews_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reviews_denied.fetch_add(1, Ordering::Relaxed);
        }
        if decision.is_default() {
            self.reviews_default_deny.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.reviews_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bad_request(&self) {
        self.bad_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record review latency.
    pub fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros() as u64;
        self.latency_sum_micros.fetch_add(micros, Ordering::Relaxed);

        if micros < 1000 {
            self.latency_under_1ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 5000 {
            self.latency_1_5ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 10000 {
            self.latency_5_10ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 50000 {
            self.latency_10_50ms.fetch_add(1, Ordering::Relaxed);
        } else if micros < 100000 {
            self.latency_50_100ms.fetch_add(1, Ordering::Relaxed);
        } else {
            self.latency_over_100ms.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Cumulative `(le, count)` pairs, ending with `+Inf`.
    fn latency_buckets(&self) -> [(&'static str, u64); 6] {
        let counts = [
            ("0.001", &self.latency_under_1ms),
            ("0.005", &self.latency_1_5ms),
            ("0.01", &self.latency_5_10ms),
            ("0.05", &self.latency_10_50ms),
            ("0.1", &self.latency_50_100ms),
            ("+Inf", &self.latency_over_100ms),
        ];

        let mut running = 0;
        counts.map(|(le, bucket)| {
            running += bucket.load(Ordering::Relaxed);
            (le, running)
        })
    }

    /// Export metrics in Prometheus format.
    ///
    /// `invalid_patterns` comes from the pattern matcher, which keeps its own
    /// count.
    pub fn to_prometheus(&self, uptime_secs: u64, invalid_patterns: u64) -> String {
        let buckets = self.latency_buckets();
        let histogram: String = buckets
            .iter()
            .map(|(le, count)| {
                format!("kir_review_latency_seconds_bucket{{le=\"{}\"}} {}\n", le, count)
            })
            .collect();
        let count = buckets[buckets.len() - 1].1;
        let sum_secs = self.latency_sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;

        format!(
            r#"# HELP kir_uptime_seconds Application uptime in seconds
# TYPE kir_uptime_seconds counter
kir_uptime_seconds {}

# HELP kir_reviews_total Reviews that produced a decision
# TYPE kir_reviews_total counter
kir_reviews_total {}

# HELP kir_reviews Reviews by outcome
# TYPE kir_reviews counter
kir_reviews{{outcome="allowed"}} {}
kir_reviews{{outcome="denied"}} {}
kir_reviews{{outcome="default_deny"}} {}

# HELP kir_reviews_failed_total Reviews that failed to read the rule store
# TYPE kir_reviews_failed_total counter
kir_reviews_failed_total {}

# HELP kir_bad_requests_total Rejected review envelopes
# TYPE kir_bad_requests_total counter
kir_bad_requests_total {}

# HELP kir_invalid_pattern_evaluations_total Pattern evaluations skipped because the stored pattern does not compile
# TYPE kir_invalid_pattern_evaluations_total counter
kir_invalid_pattern_evaluations_total {}

# HELP kir_review_latency_seconds Review latency
# TYPE kir_review_latency_seconds histogram
{}kir_review_latency_seconds_sum {}
kir_review_latency_seconds_count {}
"#,
            uptime_secs,
            self.reviews_total.load(Ordering::Relaxed),
            self.reviews_allowed.load(Ordering::Relaxed),
            self.reviews_denied.load(Ordering::Relaxed),
            self.reviews_default_deny.load(Ordering::Relaxed),
            self.reviews_failed.load(Ordering::Relaxed),
            self.bad_requests_total.load(Ordering::Relaxed),
            invalid_patterns,
            histogram,
            sum_secs,
            count,
        )
    }
}

/// Guard that records latency when dropped.
pub struct TimingGuard<'a> {
    registry: &'a MetricsRegistry,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(registry: &'a MetricsRegistry) -> Self {
        TimingGuard {
            registry,
            start: Instant::now(),
        }
    }
}

impl<'a> Drop for TimingGuard<'a> {
    fn drop(&mut self) {
        self.registry.record_latency(self.start);
    }
}
