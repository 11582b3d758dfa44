//! The validation pass (spec.md §6/§7): turns a [`crate::schema::SimulationPayload`]
//! into a validated [`crate::model::SimulationInput`], or a list of field-pathed
//! errors. No partial state escapes a failed validation.

use crate::error::ValidationError;
use crate::model::*;
use crate::schema::{self, Distribution, EventKind, SimulationPayload, StepKind};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const MIN_SIMULATION_TIME: f64 = 1800.0;
const MIN_USER_SAMPLING_WINDOW: u32 = 1;
const MAX_USER_SAMPLING_WINDOW: u32 = 120;

struct Errors(Vec<ValidationError>);

impl Errors {
    fn new() -> Self {
        Self(Vec::new())
    }
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationError::new(field, message));
    }
}

/// Validate a scenario payload, producing a [`SimulationInput`] ready to drive
/// `asyncflow-engine::Simulation`.
pub fn validate(payload: &SimulationPayload) -> Result<SimulationInput, Vec<ValidationError>> {
    let mut errors = Errors::new();

    let rv_mean_and_variance = |field: &str, cfg: &schema::RVConfig, errors: &mut Errors| -> RVConfig {
        if cfg.mean <= 0.0 {
            errors.push(format!("{field}.mean"), "mean must be > 0");
        }
        let variance = match cfg.distribution {
            Distribution::Uniform => 0.0,
            Distribution::Normal | Distribution::LogNormal => cfg.variance.unwrap_or(cfg.mean),
            _ => cfg.variance.unwrap_or(cfg.mean),
        };
        if variance < 0.0 {
            errors.push(format!("{field}.variance"), "variance must be >= 0");
        }
        RVConfig {
            mean: cfg.mean,
            distribution: cfg.distribution,
            variance,
        }
    };

    // --- generator ---
    let avg_active_users = rv_mean_and_variance(
        "rqs_input.avg_active_users",
        &payload.rqs_input.avg_active_users,
        &mut errors,
    );
    let avg_rpm = rv_mean_and_variance(
        "rqs_input.avg_request_per_minute_per_user",
        &payload.rqs_input.avg_request_per_minute_per_user,
        &mut errors,
    );
    if payload.rqs_input.avg_request_per_minute_per_user.distribution != Distribution::Poisson {
        errors.push(
            "rqs_input.avg_request_per_minute_per_user.distribution",
            "must be poisson",
        );
    }
    if payload.rqs_input.user_sampling_window < MIN_USER_SAMPLING_WINDOW
        || payload.rqs_input.user_sampling_window > MAX_USER_SAMPLING_WINDOW
    {
        errors.push(
            "rqs_input.user_sampling_window",
            format!(
                "must be within [{MIN_USER_SAMPLING_WINDOW}, {MAX_USER_SAMPLING_WINDOW}]"
            ),
        );
    }

    // --- settings ---
    let total_simulation_time = payload.sim_settings.total_simulation_time;
    if total_simulation_time < MIN_SIMULATION_TIME {
        errors.push(
            "sim_settings.total_simulation_time",
            format!("must be >= {MIN_SIMULATION_TIME}"),
        );
    }
    if payload.sim_settings.sample_period_s <= 0.0 {
        errors.push("sim_settings.sample_period_s", "must be > 0");
    }

    // --- id uniqueness across nodes ---
    let mut seen_ids: BTreeSet<String> = BTreeSet::new();
    let mut dup = |field: String, id: &str, errors: &mut Errors, seen_ids: &mut BTreeSet<String>| {
        if !seen_ids.insert(id.to_string()) {
            errors.push(field, format!("duplicate id '{id}'"));
        }
    };

    dup(
        "topology_graph.nodes.client.id".into(),
        &payload.topology_graph.nodes.client.id,
        &mut errors,
        &mut seen_ids,
    );
    for (i, s) in payload.topology_graph.nodes.servers.iter().enumerate() {
        dup(
            format!("topology_graph.nodes.servers[{i}].id"),
            &s.id,
            &mut errors,
            &mut seen_ids,
        );
    }
    if let Some(lb) = &payload.topology_graph.nodes.load_balancer {
        dup(
            "topology_graph.nodes.load_balancer.id".into(),
            &lb.id,
            &mut errors,
            &mut seen_ids,
        );
    }
    for (i, e) in payload.topology_graph.edges.iter().enumerate() {
        dup(
            format!("topology_graph.edges[{i}].id"),
            &e.id,
            &mut errors,
            &mut seen_ids,
        );
    }

    // valid target ids: every declared node (external sources are fine as
    // edge sources but never as targets, per spec.md §6).
    let mut valid_targets: BTreeSet<String> = BTreeSet::new();
    valid_targets.insert(payload.topology_graph.nodes.client.id.clone());
    for s in &payload.topology_graph.nodes.servers {
        valid_targets.insert(s.id.clone());
    }
    if let Some(lb) = &payload.topology_graph.nodes.load_balancer {
        valid_targets.insert(lb.id.clone());
    }

    // --- edges ---
    let mut edges = Vec::with_capacity(payload.topology_graph.edges.len());
    let mut edge_by_id: HashMap<String, usize> = HashMap::new();
    for (i, e) in payload.topology_graph.edges.iter().enumerate() {
        let field = format!("topology_graph.edges[{i}]");
        if e.source == e.target {
            errors.push(format!("{field}.target"), "source must not equal target");
        }
        if !valid_targets.contains(&e.target) {
            errors.push(
                format!("{field}.target"),
                format!("unknown target node '{}'", e.target),
            );
        }
        let latency = rv_mean_and_variance(&format!("{field}.latency"), &e.latency, &mut errors);
        let dropout_rate = e.dropout_rate.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&dropout_rate) {
            errors.push(format!("{field}.dropout_rate"), "must be within [0, 1]");
        }
        edge_by_id.insert(e.id.clone(), edges.len());
        edges.push(Edge {
            id: Arc::from(e.id.as_str()),
            source: Arc::from(e.source.as_str()),
            target: Arc::from(e.target.as_str()),
            latency,
            dropout_rate,
        });
    }

    // --- servers & endpoints ---
    let mut servers = Vec::with_capacity(payload.topology_graph.nodes.servers.len());
    for (si, s) in payload.topology_graph.nodes.servers.iter().enumerate() {
        let field = format!("topology_graph.nodes.servers[{si}]");
        if s.resources.cpu_cores < 1 {
            errors.push(format!("{field}.resources.cpu_cores"), "must be >= 1");
        }
        if s.resources.ram_mb <= 0.0 {
            errors.push(format!("{field}.resources.ram_mb"), "must be > 0");
        }
        if s.endpoints.is_empty() {
            errors.push(format!("{field}.endpoints"), "must declare at least one endpoint");
        }

        let any_probability = s.endpoints.iter().any(|e| e.probability.is_some());
        if any_probability {
            let all_probability = s.endpoints.iter().all(|e| e.probability.is_some());
            if !all_probability {
                errors.push(
                    format!("{field}.endpoints"),
                    "either all endpoints declare a probability or none do",
                );
            } else {
                let sum: f64 = s.endpoints.iter().filter_map(|e| e.probability).sum();
                if (sum - 1.0).abs() > 1e-6 {
                    errors.push(
                        format!("{field}.endpoints"),
                        format!("endpoint probabilities must sum to 1.0 (got {sum})"),
                    );
                }
            }
        }

        let mut endpoints = Vec::with_capacity(s.endpoints.len());
        for (ei, ep) in s.endpoints.iter().enumerate() {
            let efield = format!("{field}.endpoints[{ei}]");
            let mut steps = Vec::with_capacity(ep.steps.len());
            for (sti, st) in ep.steps.iter().enumerate() {
                let sfield = format!("{efield}.steps[{sti}]");
                let op = match st.kind {
                    StepKind::Cpu => match st.cpu_time {
                        Some(t) if t >= 0.0 => Some(StepOp::Cpu { cpu_time: t }),
                        _ => {
                            errors.push(format!("{sfield}.cpu_time"), "CPU step requires cpu_time >= 0");
                            None
                        }
                    },
                    StepKind::Ram => match st.necessary_ram {
                        Some(r) if r >= 0.0 => Some(StepOp::Ram { necessary_ram: r }),
                        _ => {
                            errors.push(
                                format!("{sfield}.necessary_ram"),
                                "RAM step requires necessary_ram >= 0",
                            );
                            None
                        }
                    },
                    StepKind::Io => match st.io_waiting_time {
                        Some(t) if t >= 0.0 => Some(StepOp::Io { io_waiting_time: t }),
                        _ => {
                            errors.push(
                                format!("{sfield}.io_waiting_time"),
                                "IO step requires io_waiting_time >= 0",
                            );
                            None
                        }
                    },
                };
                if let Some(op) = op {
                    steps.push(Step { op });
                }
            }
            endpoints.push(Endpoint {
                name: Arc::from(ep.name.as_str()),
                probability: ep.probability,
                steps,
            });
        }

        servers.push(Server {
            id: Arc::from(s.id.as_str()),
            resources: ServerResources {
                cpu_cores: s.resources.cpu_cores,
                ram_mb: s.resources.ram_mb,
            },
            endpoints,
        });
    }

    // --- load balancer ---
    let load_balancer = match &payload.topology_graph.nodes.load_balancer {
        None => None,
        Some(lb) => {
            let field = "topology_graph.nodes.load_balancer";
            let server_ids: BTreeSet<&str> =
                payload.topology_graph.nodes.servers.iter().map(|s| s.id.as_str()).collect();
            let mut covered = Vec::with_capacity(lb.server_covered.len());
            for sid in &lb.server_covered {
                if !server_ids.contains(sid.as_str()) {
                    errors.push(
                        format!("{field}.server_covered"),
                        format!("covered server '{sid}' does not exist"),
                    );
                    continue;
                }
                // an LB->server edge must exist: an edge whose source is the
                // LB id and whose target is this server id.
                let matching_edge = payload
                    .topology_graph
                    .edges
                    .iter()
                    .find(|e| e.source == lb.id && &e.target == sid);
                match matching_edge {
                    Some(e) => covered.push((Arc::from(sid.as_str()), Arc::from(e.id.as_str()))),
                    None => errors.push(
                        format!("{field}.server_covered"),
                        format!("no edge from load balancer to covered server '{sid}'"),
                    ),
                }
            }
            Some(LoadBalancer {
                id: Arc::from(lb.id.as_str()),
                policy: lb.algorithms.into(),
                covered,
            })
        }
    };

    // --- events ---
    let mut events = Vec::new();
    if let Some(raw_events) = &payload.events {
        let mut event_ids: BTreeSet<&str> = BTreeSet::new();
        for (i, ev) in raw_events.iter().enumerate() {
            let field = format!("events[{i}]");
            if !event_ids.insert(&ev.event_id) {
                errors.push(format!("{field}.event_id"), "duplicate event_id");
            }

            let start_family: EventFamily = ev.start.kind.into();
            let end_family: EventFamily = ev.end.kind.into();
            if start_family != end_family {
                errors.push(format!("{field}.end.kind"), "start/end kind families must match");
            }
            let expected_end = match ev.start.kind {
                EventKind::ServerDown => EventKind::ServerUp,
                EventKind::NetworkSpikeStart => EventKind::NetworkSpikeEnd,
                other => {
                    errors.push(format!("{field}.start.kind"), "must be a start-family kind");
                    other
                }
            };
            if ev.end.kind != expected_end {
                errors.push(
                    format!("{field}.end.kind"),
                    format!("expected {expected_end:?} to match start kind"),
                );
            }

            if ev.start.t_start < 0.0 {
                errors.push(format!("{field}.start.t_start"), "must be >= 0");
            }
            if ev.end.t_end <= ev.start.t_start {
                errors.push(format!("{field}.end.t_end"), "must be > start.t_start");
            }
            if ev.start.t_start > total_simulation_time || ev.end.t_end > total_simulation_time {
                errors.push(format!("{field}"), "event window exceeds simulation horizon");
            }

            let family: EventFamily = ev.start.kind.into();
            match family {
                EventFamily::Server => {
                    if !payload.topology_graph.nodes.servers.iter().any(|s| s.id == ev.target_id) {
                        errors.push(
                            format!("{field}.target_id"),
                            format!("target '{}' is not a known server", ev.target_id),
                        );
                    }
                }
                EventFamily::Spike => {
                    if !edge_by_id.contains_key(&ev.target_id) {
                        errors.push(
                            format!("{field}.target_id"),
                            format!("target '{}' is not a known edge", ev.target_id),
                        );
                    }
                    if ev.start.spike_s.is_none() {
                        errors.push(format!("{field}.start.spike_s"), "spike events require spike_s");
                    }
                }
            }

            events.push(EventInjection {
                event_id: Arc::from(ev.event_id.as_str()),
                target_id: Arc::from(ev.target_id.as_str()),
                family,
                t_start: ev.start.t_start,
                t_end: ev.end.t_end,
                spike_s: ev.start.spike_s,
            });
        }

        check_no_simultaneous_total_outage(&payload.topology_graph.nodes.servers, &events, &mut errors);
    }

    if !errors.0.is_empty() {
        return Err(errors.0);
    }

    let enabled_sample_metrics = payload
        .sim_settings
        .enabled_sample_metrics
        .iter()
        .map(|s| Arc::from(s.as_str()))
        .collect();
    let enabled_event_metrics = payload
        .sim_settings
        .enabled_event_metrics
        .iter()
        .map(|s| Arc::from(s.as_str()))
        .collect();

    Ok(SimulationInput {
        generator: RqsGenerator {
            id: Arc::from(payload.rqs_input.id.as_str()),
            avg_active_users,
            avg_request_per_minute_per_user: avg_rpm,
            user_sampling_window: payload.rqs_input.user_sampling_window,
        },
        client: Client {
            id: Arc::from(payload.topology_graph.nodes.client.id.as_str()),
        },
        servers,
        load_balancer,
        edges,
        settings: SimulationSettings {
            total_simulation_time,
            sample_period_s: payload.sim_settings.sample_period_s,
        },
        events,
        enabled_sample_metrics,
        enabled_event_metrics,
    })
}

/// Best-effort check for spec.md §6's "not all servers may be simultaneously
/// down at any instant": sweeps every event boundary timestamp and rejects a
/// scenario where, at some boundary, every declared server has an active
/// `SERVER_DOWN` window covering it.
fn check_no_simultaneous_total_outage(
    servers: &[schema::ServerNode],
    events: &[EventInjection],
    errors: &mut Errors,
) {
    if servers.is_empty() {
        return;
    }
    let outages: Vec<&EventInjection> = events
        .iter()
        .filter(|e| matches!(e.family, EventFamily::Server))
        .collect();
    if outages.is_empty() {
        return;
    }
    let mut boundaries: BTreeSet<ordered_float::OrderedFloat<f64>> = BTreeSet::new();
    for e in &outages {
        boundaries.insert(ordered_float::OrderedFloat(e.t_start));
    }
    for b in boundaries {
        let t = b.0;
        let all_down = servers.iter().all(|s| {
            outages
                .iter()
                .any(|e| e.target_id.as_ref() == s.id && e.t_start <= t && t < e.t_end)
        });
        if all_down {
            errors.push(
                "events",
                format!("all servers are simultaneously down at t={t}"),
            );
            return;
        }
    }
}
