//! The validated data model (spec.md §3): the types engines, samplers, and the
//! analyzer operate on. Values of these types only ever come from
//! [`crate::validate::validate`] — there is no public constructor that skips
//! validation, so runtime code can assume every invariant in spec.md §3 holds.

use crate::schema::{Distribution, EventKind, LbAlgorithm, StepKind};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RVConfig {
    pub mean: f64,
    pub distribution: Distribution,
    pub variance: f64,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: Arc<str>,
    pub source: Arc<str>,
    pub target: Arc<str>,
    pub latency: RVConfig,
    pub dropout_rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub enum StepOp {
    Cpu { cpu_time: f64 },
    Ram { necessary_ram: f64 },
    Io { io_waiting_time: f64 },
}

impl StepOp {
    pub fn kind(&self) -> StepKind {
        match self {
            StepOp::Cpu { .. } => StepKind::Cpu,
            StepOp::Ram { .. } => StepKind::Ram,
            StepOp::Io { .. } => StepKind::Io,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub op: StepOp,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub name: Arc<str>,
    /// Selection weight; uniform selection applies when `None` (spec.md §9 Open
    /// Question (ii), resolved in SPEC_FULL.md §3).
    pub probability: Option<f64>,
    pub steps: Vec<Step>,
}

impl Endpoint {
    /// Total RAM required upfront (spec.md §4.4 step 2): the sum of every RAM
    /// step's `necessary_ram`.
    pub fn total_ram(&self) -> f64 {
        self.steps
            .iter()
            .filter_map(|s| match s.op {
                StepOp::Ram { necessary_ram } => Some(necessary_ram),
                _ => None,
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ServerResources {
    pub cpu_cores: u32,
    pub ram_mb: f64,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub id: Arc<str>,
    pub resources: ServerResources,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbPolicy {
    RoundRobin,
    LeastConnections,
}

impl From<LbAlgorithm> for LbPolicy {
    fn from(a: LbAlgorithm) -> Self {
        match a {
            LbAlgorithm::RoundRobin => LbPolicy::RoundRobin,
            LbAlgorithm::LeastConnections => LbPolicy::LeastConnections,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    pub id: Arc<str>,
    pub policy: LbPolicy,
    /// `(server_id, edge_id)` pairs in the order declared by the scenario; this
    /// is the initial insertion order of `LBRuntime.out_edges` (spec.md §3).
    pub covered: Vec<(Arc<str>, Arc<str>)>,
}

#[derive(Debug, Clone)]
pub struct Client {
    pub id: Arc<str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Server,
    Spike,
}

#[derive(Debug, Clone, Copy)]
pub enum EventMarker {
    ServerDown,
    ServerUp,
    SpikeStart { spike_s: f64 },
    SpikeEnd,
}

impl EventMarker {
    pub fn family(&self) -> EventFamily {
        match self {
            EventMarker::ServerDown | EventMarker::ServerUp => EventFamily::Server,
            EventMarker::SpikeStart { .. } | EventMarker::SpikeEnd => EventFamily::Spike,
        }
    }
}

impl From<EventKind> for EventFamily {
    fn from(k: EventKind) -> Self {
        match k {
            EventKind::ServerDown | EventKind::ServerUp => EventFamily::Server,
            EventKind::NetworkSpikeStart | EventKind::NetworkSpikeEnd => EventFamily::Spike,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventInjection {
    pub event_id: Arc<str>,
    pub target_id: Arc<str>,
    pub family: EventFamily,
    pub t_start: f64,
    pub t_end: f64,
    /// Set only for the spike family (spec.md §3 invariant: present iff spike).
    pub spike_s: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct SimulationSettings {
    pub total_simulation_time: f64,
    pub sample_period_s: f64,
}

/// The validated, immutable simulation input (spec.md §3/§6). The only way to
/// produce one is [`crate::validate::validate`].
#[derive(Debug, Clone)]
pub struct SimulationInput {
    pub generator: RqsGenerator,
    pub client: Client,
    pub servers: Vec<Server>,
    pub load_balancer: Option<LoadBalancer>,
    pub edges: Vec<Edge>,
    pub settings: SimulationSettings,
    pub events: Vec<EventInjection>,
    pub enabled_sample_metrics: Vec<Arc<str>>,
    pub enabled_event_metrics: Vec<Arc<str>>,
}

#[derive(Debug, Clone)]
pub struct RqsGenerator {
    pub id: Arc<str>,
    pub avg_active_users: RVConfig,
    /// Must be `Poisson` (spec.md §6 validation contract).
    pub avg_request_per_minute_per_user: RVConfig,
    pub user_sampling_window: u32,
}
