//! The read model (spec.md §4.10): turns a raw `asyncflow_engine::SimulationOutput`
//! into the per-request latencies, summary statistics, throughput windows, and
//! sampled time series a report or CLI wants to render.

#![forbid(unsafe_code)]

pub mod analyzer;

pub use analyzer::{Analyzer, LatencySummary, SampledSeries, ThroughputPoint};
