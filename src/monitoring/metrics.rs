/*!
 * Metrics Collection
 * Lightweight counters, gauges and histograms for the request lifecycle
 */

use crate::csq::CsqStats;
use crate::deferred::DispatcherStats;
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bucket upper bounds in seconds
const DURATION_BUCKETS: [f64; 9] = [0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

#[derive(Debug, Clone)]
struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new(buckets: &[f64]) -> Self {
        Self {
            buckets: buckets.to_vec(),
            counts: vec![0; buckets.len()],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;

        for (i, &bucket) in self.buckets.iter().enumerate() {
            if value <= bucket {
                self.counts[i] += 1;
            }
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        let target = (self.count as f64 * p).ceil() as u64;
        for (i, &count) in self.counts.iter().enumerate() {
            if count >= target {
                return self.buckets[i];
            }
        }
        self.buckets.last().copied().unwrap_or(0.0)
    }

    fn stats(&self) -> HistogramStats {
        HistogramStats {
            count: self.count,
            sum: self.sum,
            avg: if self.count > 0 {
                self.sum / self.count as f64
            } else {
                0.0
            },
            p50: self.percentile(0.50),
            p95: self.percentile(0.95),
            p99: self.percentile(0.99),
        }
    }
}

/// Metrics collector
///
/// Cache-line aligned; shared between devices through an `Arc`.
#[repr(C, align(64))]
pub struct MetricsCollector {
    counters: DashMap<String, f64, RandomState>,
    gauges: DashMap<String, f64, RandomState>,
    histograms: DashMap<String, Histogram, RandomState>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: DashMap::with_hasher(RandomState::new()),
            gauges: DashMap::with_hasher(RandomState::new()),
            histograms: DashMap::with_hasher(RandomState::new()),
            start_time: Instant::now(),
        }
    }

    pub fn inc_counter(&self, name: &str, value: f64) {
        self.counters
            .entry(name.to_string())
            .and_modify(|v| *v += value)
            .or_insert(value);
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.gauges.insert(name.to_string(), value);
    }

    pub fn observe_histogram(&self, name: &str, value: f64) {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(&DURATION_BUCKETS))
            .observe(value);
    }

    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.observe_histogram(name, duration.as_secs_f64());
    }

    /// Publish a queue's counters as gauges under `csq.<scope>.*`
    pub fn record_queue(&self, scope: &str, stats: &CsqStats) {
        let gauges = [
            ("inserted", stats.inserted as f64),
            ("dequeued", stats.dequeued as f64),
            ("cancelled", stats.cancelled as f64),
            ("rejected", stats.rejected as f64),
            ("pending", stats.pending as f64),
        ];
        for (name, value) in gauges {
            self.set_gauge(&format!("csq.{}.{}", scope, name), value);
        }
    }

    /// Publish dispatcher counters as gauges under `deferred.*`
    pub fn record_dispatcher(&self, stats: &DispatcherStats) {
        let gauges = [
            ("scheduled", stats.scheduled as f64),
            ("coalesced", stats.coalesced as f64),
            ("rejected", stats.rejected as f64),
            ("executed", stats.executed as f64),
            ("panicked", stats.panicked as f64),
            ("immediate_depth", stats.immediate_depth as f64),
        ];
        for (name, value) in gauges {
            self.set_gauge(&format!("deferred.{}", name), value);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            gauges: self
                .gauges
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            histograms: self
                .histograms
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().stats()))
                .collect(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn reset(&self) {
        self.counters.clear();
        self.gauges.clear();
        self.histograms.clear();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Histogram statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramStats {
    pub count: u64,
    pub sum: f64,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub counters: HashMap<String, f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub gauges: HashMap<String, f64>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub histograms: HashMap<String, HistogramStats>,
    pub uptime_secs: u64,
}

/// Records its lifetime into a histogram when stopped
pub struct Timer {
    start: Instant,
    name: &'static str,
    collector: Arc<MetricsCollector>,
}

impl Timer {
    pub fn new(name: &'static str, collector: Arc<MetricsCollector>) -> Self {
        Self {
            start: Instant::now(),
            name,
            collector,
        }
    }

    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        self.collector.record_duration(self.name, duration);
        duration
    }
}
