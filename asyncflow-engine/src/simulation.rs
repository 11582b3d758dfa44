//! Run orchestration (SPEC_FULL.md §4.12): [`Simulation::build`] wires every
//! actor runtime named by a validated `SimulationInput` into the topology
//! graph and schedules their initial tasks; [`Simulation::run`] drives the
//! scheduler to completion and returns a [`SimulationOutput`].
//!
//! This is pure composition of the components named in spec.md §2 — it was
//! not named as its own component there because it has no behavior of its
//! own beyond wiring the others together.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;

use asyncflow_core::model::SimulationInput;

use crate::client::ClientRuntime;
use crate::collector::{Collector, EngineEvent, LatencyRecord, SampledMetric, SampledPoint};
use crate::edge::{EdgeHandle, EdgeRuntime};
use crate::errors::{EngineError, Result};
use crate::event_injection;
use crate::generator::GeneratorRuntime;
use crate::load_balancer::{LbHandle, LbRuntime};
use crate::request::RequestState;
use crate::resources::Store;
use crate::scheduler::{drive_until, Scheduler};
use crate::server::{ServerHandle, ServerRuntime};
use crate::world::World;

/// The result of driving a [`SimulationInput`] to completion: everything
/// `asyncflow-telemetry::Analyzer` needs (spec.md §4.10/§6).
pub struct SimulationOutput {
    pub latencies: Vec<LatencyRecord>,
    pub sampled: Vec<(SampledMetric, Arc<str>, SampledPoint)>,
    pub events: Vec<EngineEvent>,
}

const ALL_SAMPLE_METRICS: [&str; 4] = ["edge_in_flight", "server_ram_in_use", "server_ready_q", "server_io_q"];
const ALL_EVENT_METRICS: [&str; 5] = ["dropped", "server_down", "server_up", "spike_start", "spike_end"];

fn event_metric_name(e: &EngineEvent) -> &'static str {
    match e {
        EngineEvent::Dropped { .. } => "dropped",
        EngineEvent::ServerDown { .. } => "server_down",
        EngineEvent::ServerUp { .. } => "server_up",
        EngineEvent::SpikeStart { .. } => "spike_start",
        EngineEvent::SpikeEnd { .. } => "spike_end",
    }
}

type InboxHandle = Rc<RefCell<Store<RequestState>>>;

/// The top-level object (SPEC_FULL.md §4.12): builds runtimes from a
/// validated `SimulationInput` and a seed, wires the topology graph, and
/// drives the scheduler to completion. Not named as its own component in
/// spec.md §2 since it is pure composition of the components named there.
pub struct Simulation {
    world: World,
    horizon: f64,
    enabled_event_metrics: Vec<Arc<str>>,
}

impl Simulation {
    /// Build every actor runtime named by `input` and schedule its initial
    /// tasks (generator arrivals, event-injection markers, the sampling
    /// tick), but do not yet drive the clock.
    pub fn build(input: &SimulationInput, seed: u64) -> Result<Self> {
        build(input, seed)
    }

    /// Drive the scheduler until `now` reaches the simulation horizon
    /// (spec.md §5), then return the collected output.
    pub fn run(self) -> SimulationOutput {
        drive_until(&self.world.scheduler, self.horizon);
        collect(&self.world, &self.enabled_event_metrics)
    }
}

/// Convenience wrapper combining [`Simulation::build`] and [`Simulation::run`]
/// for callers (the CLI, integration tests) that don't need the two phases
/// split apart.
pub fn run(input: &SimulationInput, seed: u64) -> Result<SimulationOutput> {
    Ok(Simulation::build(input, seed)?.run())
}

/// Apply spec.md §6's `enabled_event_metrics` filter (empty = all enabled) and
/// log a completion summary (spec.md §9: "structured tracing events at
/// suspension points and lifecycle transitions").
fn collect(world: &World, enabled_event_metrics: &[Arc<str>]) -> SimulationOutput {
    let collector = world.collector.borrow();
    let enabled: Vec<&str> = if enabled_event_metrics.is_empty() {
        ALL_EVENT_METRICS.to_vec()
    } else {
        enabled_event_metrics.iter().map(|s| s.as_ref()).collect()
    };
    let events: Vec<EngineEvent> = collector
        .events()
        .iter()
        .filter(|e| enabled.contains(&event_metric_name(e)))
        .cloned()
        .collect();

    tracing::info!(
        requests_completed = collector.latencies().len(),
        events = events.len(),
        "simulation run complete"
    );

    SimulationOutput {
        latencies: collector.latencies().to_vec(),
        sampled: collector.sampled().to_vec(),
        events,
    }
}

fn build(input: &SimulationInput, seed: u64) -> Result<Simulation> {
    let world = World {
        scheduler: Rc::new(RefCell::new(Scheduler::new())),
        rng: Rc::new(RefCell::new(StdRng::seed_from_u64(seed))),
        collector: Rc::new(RefCell::new(Collector::new())),
    };

    let horizon = input.settings.total_simulation_time;
    let mut edges: HashMap<Arc<str>, EdgeHandle> = HashMap::new();
    let mut node_inbox: HashMap<Arc<str>, InboxHandle> = HashMap::new();
    let mut servers: Vec<ServerHandle> = Vec::new();

    let find_edge_by_id = |id: &str| input.edges.iter().find(|e| e.id.as_ref() == id);
    let find_edge_by_source = |id: &str| {
        input
            .edges
            .iter()
            .filter(|e| e.source.as_ref() == id)
            .collect::<Vec<_>>()
    };

    let client_inbox: InboxHandle = Rc::new(RefCell::new(Store::new()));
    let client_completed: InboxHandle = Rc::new(RefCell::new(Store::new()));
    node_inbox.insert(input.client.id.clone(), client_inbox.clone());

    // Servers, innermost first: each server's outbound edge always targets
    // the client (spec §2 data flow), so its runtime can be built before
    // anything that routes into it.
    for server_cfg in &input.servers {
        let out_edges = find_edge_by_source(server_cfg.id.as_ref());
        let out_edge_cfg = out_edges.first().ok_or_else(|| {
            EngineError::invariant(format!("server '{}' has no outbound edge", server_cfg.id))
        })?;
        let out_edge = EdgeRuntime::new(
            (*out_edge_cfg).clone(),
            client_inbox.clone(),
            world.clone(),
        );
        edges.insert(out_edge_cfg.id.clone(), out_edge.clone());

        let server = ServerRuntime::new(server_cfg.clone(), out_edge, world.clone());
        node_inbox.insert(server_cfg.id.clone(), server.inbox());
        server.start();
        servers.push(server);
    }

    // Load balancer, if declared: one edge per covered server, wired in
    // declaration order (spec.md §3: the initial insertion order of
    // `LBRuntime.out_edges`).
    let lb: Option<LbHandle> = match &input.load_balancer {
        None => None,
        Some(lb_cfg) => {
            let mut out_edges: IndexMap<Arc<str>, EdgeHandle> = IndexMap::new();
            for (server_id, edge_id) in &lb_cfg.covered {
                let target_inbox = node_inbox.get(server_id).cloned().ok_or_else(|| {
                    EngineError::invariant(format!("load balancer covers unknown server '{server_id}'"))
                })?;
                let edge_cfg = find_edge_by_id(edge_id).ok_or_else(|| {
                    EngineError::invariant(format!("load balancer edge '{edge_id}' not declared"))
                })?;
                let edge = EdgeRuntime::new(edge_cfg.clone(), target_inbox, world.clone());
                edges.insert(edge_id.clone(), edge.clone());
                out_edges.insert(edge_id.clone(), edge);
            }
            let runtime = LbRuntime::new(lb_cfg.clone(), out_edges, world.clone());
            node_inbox.insert(lb_cfg.id.clone(), runtime.inbox());
            runtime.start();
            Some(runtime)
        }
    };

    // Client's outbound edge: forwards toward the load balancer if one
    // exists, otherwise straight to whichever server the scenario wires it
    // to (spec §2: "LB" is optional in the data flow).
    let client_out_edges = find_edge_by_source(input.client.id.as_ref());
    let client_out_cfg = client_out_edges.first().ok_or_else(|| {
        EngineError::invariant(format!("client '{}' has no outbound edge", input.client.id))
    })?;
    let client_out_target = node_inbox.get(client_out_cfg.target.as_ref()).cloned().ok_or_else(|| {
        EngineError::invariant(format!(
            "client outbound edge targets unknown node '{}'",
            client_out_cfg.target
        ))
    })?;
    let client_out_edge = EdgeRuntime::new((*client_out_cfg).clone(), client_out_target, world.clone());
    edges.insert(client_out_cfg.id.clone(), client_out_edge.clone());

    let client = ClientRuntime::new(
        input.client.clone(),
        client_out_edge,
        client_inbox.clone(),
        client_completed,
        world.clone(),
    );
    client.start();

    // Generator's outbound edge always targets the client (spec §2).
    let generator_out_cfg = find_edge_by_source(input.generator.id.as_ref())
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::invariant(format!("generator '{}' has no outbound edge", input.generator.id)))?;
    let generator_out_edge = EdgeRuntime::new(generator_out_cfg.clone(), client_inbox, world.clone());
    edges.insert(generator_out_cfg.id.clone(), generator_out_edge.clone());

    let generator = GeneratorRuntime::new(input.generator.clone(), generator_out_edge, world.clone(), horizon);
    generator.start();

    // Any declared edge not yet wired by a role above (e.g. one that exists
    // only to be targeted by an event injection) still gets a runtime, so
    // spikes and sampling can address it by id.
    for edge_cfg in &input.edges {
        if edges.contains_key(&edge_cfg.id) {
            continue;
        }
        if let Some(target_inbox) = node_inbox.get(edge_cfg.target.as_ref()).cloned() {
            let edge = EdgeRuntime::new(edge_cfg.clone(), target_inbox, world.clone());
            edges.insert(edge_cfg.id.clone(), edge);
        } else {
            tracing::warn!(edge_id = %edge_cfg.id, target = %edge_cfg.target, "edge targets a node with no inbox; skipping");
        }
    }

    event_injection::schedule(&input.events, &edges, lb, world.clone());
    schedule_sampling(input, &edges, &servers, world.clone());

    Ok(Simulation {
        world,
        horizon,
        enabled_event_metrics: input.enabled_event_metrics.clone(),
    })
}

/// Schedule the periodic sampled-metric collector (spec §4.9): first tick at
/// `sample_period_s`, not `t=0`.
fn schedule_sampling(
    input: &SimulationInput,
    edges: &HashMap<Arc<str>, EdgeHandle>,
    servers: &[ServerHandle],
    world: World,
) {
    let period = input.settings.sample_period_s;
    let enabled: Vec<String> = if input.enabled_sample_metrics.is_empty() {
        ALL_SAMPLE_METRICS.iter().map(|s| s.to_string()).collect()
    } else {
        input.enabled_sample_metrics.iter().map(|s| s.to_string()).collect()
    };
    // `HashMap`'s default `RandomState` seeds differently per instance, so
    // collecting `edges.values()` directly would make the per-tick sample
    // order (and so the flat `sampled` vec) nondeterministic across runs with
    // the same seed (spec §8 invariant 8). Sort by id for a stable order.
    let mut edges: Vec<EdgeHandle> = edges.values().cloned().collect();
    edges.sort_by(|a, b| a.config.id.cmp(&b.config.id));
    let servers: Vec<ServerHandle> = servers.to_vec();
    schedule_tick(period, enabled, edges, servers, world, period);
}

#[allow(clippy::too_many_arguments)]
fn schedule_tick(
    period: f64,
    enabled: Vec<String>,
    edges: Vec<EdgeHandle>,
    servers: Vec<ServerHandle>,
    world: World,
    at: f64,
) {
    let w = world.clone();
    world.scheduler.borrow_mut().schedule_at(
        at,
        Box::new(move || {
            let t = w.now();
            let mut collector = w.collector.borrow_mut();
            if enabled.iter().any(|m| m == "edge_in_flight") {
                for edge in &edges {
                    collector.record_sample(
                        SampledMetric::EdgeInFlight,
                        edge.config.id.clone(),
                        t,
                        edge.in_flight() as f64,
                    );
                }
            }
            for server in &servers {
                if enabled.iter().any(|m| m == "server_ram_in_use") {
                    collector.record_sample(
                        SampledMetric::ServerRamInUse,
                        server.config.id.clone(),
                        t,
                        (server.ram_capacity() - server.ram_level()) as f64,
                    );
                }
                if enabled.iter().any(|m| m == "server_ready_q") {
                    collector.record_sample(SampledMetric::ServerReadyQ, server.config.id.clone(), t, server.ready_q() as f64);
                }
                if enabled.iter().any(|m| m == "server_io_q") {
                    collector.record_sample(SampledMetric::ServerIoQ, server.config.id.clone(), t, server.io_q() as f64);
                }
            }
            drop(collector);
            schedule_tick(period, enabled, edges, servers, world, t + period);
        }),
    );
}
