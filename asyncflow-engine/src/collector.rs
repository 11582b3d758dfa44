//! Raw metrics capture (spec §4.9): a per-request completion log, a sampled
//! time-series log (periodic gauge sampling), and an event log (drops,
//! outages, spikes) feeding `asyncflow-telemetry`'s read model.

use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct LatencyRecord {
    pub request_id: u64,
    pub initial_time: f64,
    pub finish_time: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SampledPoint {
    pub t: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampledMetric {
    EdgeInFlight,
    ServerRamInUse,
    ServerReadyQ,
    ServerIoQ,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Dropped { edge_id: Arc<str>, t: f64 },
    ServerDown { server_id: Arc<str>, t: f64 },
    ServerUp { server_id: Arc<str>, t: f64 },
    SpikeStart { edge_id: Arc<str>, t: f64, spike_s: f64 },
    SpikeEnd { edge_id: Arc<str>, t: f64 },
}

/// The write side of the collector (spec §4.9). Sits behind an
/// `Rc<RefCell<_>>` in [`crate::simulation::Simulation`]; actor runtimes push
/// into it as they run.
#[derive(Default)]
pub struct Collector {
    latencies: Vec<LatencyRecord>,
    sampled: Vec<(SampledMetric, Arc<str>, SampledPoint)>,
    events: Vec<EngineEvent>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completion(&mut self, request_id: u64, initial_time: f64, finish_time: f64) {
        self.latencies.push(LatencyRecord {
            request_id,
            initial_time,
            finish_time,
        });
    }

    pub fn record_sample(&mut self, metric: SampledMetric, entity_id: Arc<str>, t: f64, value: f64) {
        self.sampled.push((metric, entity_id, SampledPoint { t, value }));
    }

    pub fn record_event(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    pub fn latencies(&self) -> &[LatencyRecord] {
        &self.latencies
    }

    pub fn sampled(&self) -> &[(SampledMetric, Arc<str>, SampledPoint)] {
        &self.sampled
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }
}
