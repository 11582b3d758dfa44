//! The scenario wire format (spec.md §6): the payload accepted from YAML/JSON,
//! before cross-field validation has run. Field names match the original
//! Python project's schema so existing scenario files deserialize unchanged.

use serde::{Deserialize, Serialize};

fn default_user_sampling_window() -> u32 {
    60
}

fn default_total_simulation_time() -> f64 {
    3600.0
}

fn default_sample_period_s() -> f64 {
    1.0
}

/// A stochastic variable configuration shared by inter-arrival sampling, edge
/// latency, and endpoint timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RVConfig {
    pub mean: f64,
    pub distribution: Distribution,
    #[serde(default)]
    pub variance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    Poisson,
    Normal,
    LogNormal,
    Uniform,
    Exponential,
}

/// The generator's compound inter-arrival process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RqsGeneratorInput {
    pub id: String,
    pub avg_active_users: RVConfig,
    pub avg_request_per_minute_per_user: RVConfig,
    #[serde(default = "default_user_sampling_window")]
    pub user_sampling_window: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientNode {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LbAlgorithm {
    RoundRobin,
    LeastConnections,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerNode {
    pub id: String,
    pub algorithms: LbAlgorithm,
    pub server_covered: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    Cpu,
    Ram,
    Io,
}

/// A single step in an endpoint's execution pipeline (spec.md §3 `Endpoint.Step`).
///
/// Exactly one of `cpu_time`, `necessary_ram`, `io_waiting_time` is set,
/// matching the step's `kind`; this coherence is checked during validation
/// rather than encoded in the wire type, so malformed input produces a
/// field-pathed `ValidationError` instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInput {
    pub kind: StepKind,
    #[serde(default)]
    pub cpu_time: Option<f64>,
    #[serde(default)]
    pub necessary_ram: Option<f64>,
    #[serde(default)]
    pub io_waiting_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInput {
    pub name: String,
    #[serde(default)]
    pub probability: Option<f64>,
    pub steps: Vec<StepInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResources {
    pub cpu_cores: u32,
    pub ram_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerNode {
    pub id: String,
    pub resources: ServerResources,
    pub endpoints: Vec<EndpointInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNodes {
    pub client: ClientNode,
    pub servers: Vec<ServerNode>,
    #[serde(default)]
    pub load_balancer: Option<LoadBalancerNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeInput {
    pub id: String,
    pub source: String,
    pub target: String,
    pub latency: RVConfig,
    #[serde(default)]
    pub dropout_rate: Option<f64>,
    #[serde(default)]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyGraph {
    pub nodes: TopologyNodes,
    pub edges: Vec<EdgeInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettingsInput {
    #[serde(default = "default_total_simulation_time")]
    pub total_simulation_time: f64,
    #[serde(default = "default_sample_period_s")]
    pub sample_period_s: f64,
    #[serde(default)]
    pub enabled_sample_metrics: Vec<String>,
    #[serde(default)]
    pub enabled_event_metrics: Vec<String>,
}

impl Default for SimulationSettingsInput {
    fn default() -> Self {
        Self {
            total_simulation_time: default_total_simulation_time(),
            sample_period_s: default_sample_period_s(),
            enabled_sample_metrics: Vec::new(),
            enabled_event_metrics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    ServerDown,
    ServerUp,
    NetworkSpikeStart,
    NetworkSpikeEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStart {
    pub kind: EventKind,
    pub t_start: f64,
    #[serde(default)]
    pub spike_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnd {
    pub kind: EventKind,
    pub t_end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInjectionInput {
    pub event_id: String,
    pub target_id: String,
    pub start: EventStart,
    pub end: EventEnd,
}

/// The full scenario payload (spec.md §6): everything needed to run a simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationPayload {
    pub rqs_input: RqsGeneratorInput,
    pub topology_graph: TopologyGraph,
    #[serde(default)]
    pub sim_settings: SimulationSettingsInput,
    #[serde(default)]
    pub events: Option<Vec<EventInjectionInput>>,
}

impl SimulationPayload {
    pub fn from_yaml(text: &str) -> crate::error::Result<Self> {
        serde_yaml::from_str(text).map_err(|e| crate::error::Error::parse(e.to_string()))
    }

    pub fn from_json(text: &str) -> crate::error::Result<Self> {
        serde_json::from_str(text).map_err(|e| crate::error::Error::parse(e.to_string()))
    }
}
