//! Per-index query statistics: latency, distance evaluations and misses.

use std::time::Duration;

/// One answered query.
#[derive(Debug, Clone, Copy)]
pub struct QuerySample {
    pub latency: Duration,
    /// True-distance evaluations reported by the index.
    pub comparisons: usize,
    /// Whether any neighbor came back.
    pub found: bool,
}

/// Collects query samples and insert counts for one index.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    samples: Vec<QuerySample>,
    inserts: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&mut self, latency: Duration, comparisons: usize, found: bool) {
        self.samples.push(QuerySample {
            latency,
            comparisons,
            found,
        });
    }

    pub fn record_insert(&mut self) {
        self.inserts += 1;
    }

    pub fn samples(&self) -> &[QuerySample] {
        &self.samples
    }

    pub fn total_queries(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn total_inserts(&self) -> u64 {
        self.inserts
    }

    /// Queries that came back without any candidate.
    pub fn not_found(&self) -> u64 {
        self.samples.iter().filter(|s| !s.found).count() as u64
    }

    fn mean(&self, value: impl Fn(&QuerySample) -> f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(value).sum::<f64>() / self.samples.len() as f64
    }

    /// Mean query latency in microseconds.
    pub fn avg_query_latency_us(&self) -> f64 {
        self.mean(|s| s.latency.as_secs_f64() * 1e6)
    }

    /// Nearest-rank latency percentile in microseconds, e.g. 50.0 or 99.0.
    pub fn percentile_query_latency_us(&self, percentile: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut latencies: Vec<Duration> = self.samples.iter().map(|s| s.latency).collect();
        latencies.sort_unstable();

        let last = latencies.len() - 1;
        let rank = ((percentile.clamp(0.0, 100.0) / 100.0) * last as f64).round() as usize;
        latencies[rank.min(last)].as_secs_f64() * 1e6
    }

    /// Mean distance evaluations per query.
    pub fn avg_comparisons(&self) -> f64 {
        self.mean(|s| s.comparisons as f64)
    }

    pub fn max_comparisons(&self) -> usize {
        self.samples.iter().map(|s| s.comparisons).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut m = MetricsCollector::new();
        m.record_insert();
        m.record_insert();
        m.record_query(Duration::from_micros(5), 3, false);

        assert_eq!(m.total_inserts(), 2);
        assert_eq!(m.total_queries(), 1);
        assert_eq!(m.not_found(), 1);
        assert_eq!(m.samples().len(), 1);
    }

    #[test]
    fn test_latency_and_comparisons() {
        let mut m = MetricsCollector::new();
        m.record_query(Duration::from_micros(300), 30, true);
        m.record_query(Duration::from_micros(100), 10, true);
        m.record_query(Duration::from_micros(200), 20, true);

        assert!((m.avg_query_latency_us() - 200.0).abs() < 1e-6);
        assert!((m.percentile_query_latency_us(50.0) - 200.0).abs() < 1e-6);
        assert!((m.percentile_query_latency_us(100.0) - 300.0).abs() < 1e-6);
        assert!((m.avg_comparisons() - 20.0).abs() < 1e-9);
        assert_eq!(m.max_comparisons(), 30);
        assert_eq!(m.not_found(), 0);
    }

    #[test]
    fn test_empty() {
        let m = MetricsCollector::new();
        assert_eq!(m.avg_query_latency_us(), 0.0);
        assert_eq!(m.percentile_query_latency_us(99.0), 0.0);
        assert_eq!(m.avg_comparisons(), 0.0);
        assert_eq!(m.max_comparisons(), 0);
    }
}
