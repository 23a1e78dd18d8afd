use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sampler::Sample;

// ---------------------------------------------------------------------------
// BucketStats — per-second statistics window
// ---------------------------------------------------------------------------

/// Aggregated statistics for a single one-second time bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BucketStats {
    pub requests: u64,
    pub failures: u64,
    pub sum_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

// ---------------------------------------------------------------------------
// MetricsSnapshot
// ---------------------------------------------------------------------------

/// A point-in-time view of the collector's aggregates.
///
/// Derived data only — recomputable at any time from the recorded samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_failures: u64,
    /// Failures / total; defined as 0.0 when no requests were recorded.
    pub failure_rate: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub requests_per_second: f64,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// TimeBucketEntry — serializable time-series entry for reports
// ---------------------------------------------------------------------------

/// A single per-second time-series entry for the summary report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeBucketEntry {
    pub second: u64,
    pub requests: u64,
    pub failures: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Running statistics aggregator for a test in progress.
///
/// Held behind an `Arc<RwLock<_>>`: one aggregation task drains the sample
/// channel and calls [`record`](Self::record), while readers take snapshots
/// concurrently for progress events and threshold evaluation.
pub struct MetricsCollector {
    total_requests: u64,
    total_failures: u64,
    /// All individual response times (ms). Kept for exact percentile
    /// computation; growth is bounded by the test's duration and rate.
    durations_ms: Vec<u64>,
    min_ms: u64,
    max_ms: u64,
    sum_ms: u64,
    start_time: Instant,
    started_at: DateTime<Utc>,
    /// Per-second buckets keyed by seconds-since-start.
    time_buckets: BTreeMap<u64, BucketStats>,
}

impl MetricsCollector {
    /// Create a new collector, capturing the current wall-clock start time.
    pub fn new() -> Self {
        Self {
            total_requests: 0,
            total_failures: 0,
            durations_ms: Vec::new(),
            min_ms: u64::MAX,
            max_ms: 0,
            sum_ms: 0,
            start_time: Instant::now(),
            started_at: Utc::now(),
            time_buckets: BTreeMap::new(),
        }
    }

    /// Wall-clock time at which the collector was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record one completed sample. O(1) amortized.
    pub fn record(&mut self, sample: &Sample) {
        let elapsed_ms = sample.elapsed_ms;
        let failed = sample.is_failure();

        self.total_requests += 1;
        if failed {
            self.total_failures += 1;
        }

        self.durations_ms.push(elapsed_ms);
        self.sum_ms += elapsed_ms;
        if elapsed_ms < self.min_ms {
            self.min_ms = elapsed_ms;
        }
        if elapsed_ms > self.max_ms {
            self.max_ms = elapsed_ms;
        }

        let bucket_key = self.start_time.elapsed().as_secs();
        let bucket = self.time_buckets.entry(bucket_key).or_insert(BucketStats {
            requests: 0,
            failures: 0,
            sum_ms: 0,
            min_ms: u64::MAX,
            max_ms: 0,
        });
        bucket.requests += 1;
        if failed {
            bucket.failures += 1;
        }
        bucket.sum_ms += elapsed_ms;
        if elapsed_ms < bucket.min_ms {
            bucket.min_ms = elapsed_ms;
        }
        if elapsed_ms > bucket.max_ms {
            bucket.max_ms = elapsed_ms;
        }
    }

    /// Calculate the p-th percentile response time using the nearest-rank
    /// method: the `ceil(p/100 · n)`-th value (1-based) of the sorted
    /// durations. Deterministic for a given sample multiset and independent
    /// of insertion order — threshold verdicts depend on this.
    ///
    /// `p` must be in the range (0.0, 100.0].
    /// Returns 0 when no requests have been recorded yet.
    pub fn percentile(&self, p: f64) -> u64 {
        if self.durations_ms.is_empty() {
            return 0;
        }
        let mut sorted = self.durations_ms.clone();
        sorted.sort_unstable();
        let idx = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let idx = idx.saturating_sub(1).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Requests per second averaged over the entire elapsed duration.
    pub fn requests_per_second(&self) -> f64 {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        if elapsed_secs < 0.001 {
            return 0.0;
        }
        self.total_requests as f64 / elapsed_secs
    }

    /// Build a [`MetricsSnapshot`] from all samples recorded so far.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests;
        let failed = self.total_failures;
        let mean_ms = if total > 0 {
            self.sum_ms as f64 / total as f64
        } else {
            0.0
        };
        let failure_rate = if total > 0 {
            failed as f64 / total as f64
        } else {
            0.0
        };
        let min_ms = if self.min_ms == u64::MAX { 0 } else { self.min_ms };

        MetricsSnapshot {
            total_requests: total,
            total_failures: failed,
            failure_rate,
            min_ms,
            max_ms: self.max_ms,
            mean_ms,
            p50_ms: self.percentile(50.0),
            p95_ms: self.percentile(95.0),
            p99_ms: self.percentile(99.0),
            requests_per_second: self.requests_per_second(),
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
        }
    }

    /// Return per-second time-series data as a sorted vec of entries.
    pub fn time_series(&self) -> Vec<TimeBucketEntry> {
        self.time_buckets
            .iter()
            .map(|(&second, bucket)| TimeBucketEntry {
                second,
                requests: bucket.requests,
                failures: bucket.failures,
                avg_ms: if bucket.requests > 0 {
                    bucket.sum_ms as f64 / bucket.requests as f64
                } else {
                    0.0
                },
                min_ms: if bucket.min_ms == u64::MAX {
                    0
                } else {
                    bucket.min_ms
                },
                max_ms: bucket.max_ms,
            })
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
