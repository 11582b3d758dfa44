//! The analyzer (spec.md §4.10): a read-only view over a finished
//! `SimulationOutput`. Nothing here mutates the run; it only reshapes the
//! collector's flat logs into the summaries a report wants.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use asyncflow_engine::collector::{LatencyRecord, SampledMetric};
use asyncflow_engine::SimulationOutput;

const DEFAULT_THROUGHPUT_WINDOW_S: f64 = 1.0;

/// Latency distribution statistics over a completed run (spec.md §4.10).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencySummary {
    fn empty() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            p95: 0.0,
            p99: 0.0,
            min: 0.0,
            max: 0.0,
        }
    }
}

/// One window of the completions-per-second series.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ThroughputPoint {
    pub window_start: f64,
    pub count: u64,
    pub rate: f64,
}

/// `{metric_name → {entity_id → [values in recorded order]}}` (spec.md §4.10),
/// with an implicit time base of `k * sample_period_s` for the k-th value of
/// any entity's series.
pub type SampledSeries = HashMap<&'static str, HashMap<Arc<str>, Vec<f64>>>;

fn metric_name(metric: SampledMetric) -> &'static str {
    match metric {
        SampledMetric::EdgeInFlight => "edge_in_flight",
        SampledMetric::ServerRamInUse => "server_ram_in_use",
        SampledMetric::ServerReadyQ => "server_ready_q",
        SampledMetric::ServerIoQ => "server_io_q",
    }
}

/// Reads a finished run. Cheap to construct; every accessor recomputes from
/// the underlying `SimulationOutput` rather than caching, since a run is
/// analyzed at most a handful of times.
pub struct Analyzer<'a> {
    output: &'a SimulationOutput,
}

impl<'a> Analyzer<'a> {
    pub fn new(output: &'a SimulationOutput) -> Self {
        Self { output }
    }

    /// Per-request latency array, in completion order (spec.md §4.10).
    pub fn latencies(&self) -> Vec<f64> {
        self.output
            .latencies
            .iter()
            .map(|r: &LatencyRecord| r.finish_time - r.initial_time)
            .collect()
    }

    /// Latency records paired with their request id, for reports that need
    /// to cite individual slow requests.
    pub fn latency_records(&self) -> &[LatencyRecord] {
        &self.output.latencies
    }

    pub fn latency_summary(&self) -> LatencySummary {
        summarize(&self.latencies())
    }

    /// Fixed-width completion-rate windows over `[0, last_completion]`
    /// (spec.md §4.10: "fixed windows of 1 s by default, configurable at read
    /// time; rate = completions in window / window size").
    pub fn throughput_series(&self, window_s: f64) -> Vec<ThroughputPoint> {
        if self.output.latencies.is_empty() {
            return Vec::new();
        }
        debug_assert!(window_s > 0.0, "throughput window must be positive");
        let last = self
            .output
            .latencies
            .iter()
            .map(|r| r.finish_time)
            .fold(0.0_f64, f64::max);
        let window_count = (last / window_s).floor() as usize + 1;
        let mut counts = vec![0u64; window_count];
        for r in &self.output.latencies {
            let idx = (r.finish_time / window_s).floor() as usize;
            counts[idx.min(window_count - 1)] += 1;
        }
        counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| ThroughputPoint {
                window_start: i as f64 * window_s,
                count,
                rate: count as f64 / window_s,
            })
            .collect()
    }

    /// Throughput series using the spec's default 1 s window.
    pub fn default_throughput_series(&self) -> Vec<ThroughputPoint> {
        self.throughput_series(DEFAULT_THROUGHPUT_WINDOW_S)
    }

    /// Every sampled gauge series, grouped by metric kind then entity id.
    pub fn sampled_series(&self) -> SampledSeries {
        let mut series: SampledSeries = HashMap::new();
        for (metric, entity_id, point) in &self.output.sampled {
            series
                .entry(metric_name(*metric))
                .or_default()
                .entry(entity_id.clone())
                .or_default()
                .push(point.value);
        }
        series
    }
}

fn summarize(values: &[f64]) -> LatencySummary {
    if values.is_empty() {
        return LatencySummary::empty();
    }
    let count = values.len();
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let sum: f64 = sorted.iter().sum();
    let mean = sum / count as f64;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

    LatencySummary {
        count,
        mean,
        median: percentile(&sorted, 0.5),
        std_dev: variance.sqrt(),
        p95: percentile(&sorted, 0.95),
        p99: percentile(&sorted, 0.99),
        min: sorted[0],
        max: sorted[count - 1],
    }
}

/// Nearest-rank percentile over an already-sorted slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (p * (n - 1) as f64).round() as usize;
    sorted[rank.min(n - 1)]
}
