//! Property tests over full scenario runs (spec.md §8 invariants/laws), driven
//! through the real `validate -> Simulation::build -> Simulation::run`
//! pipeline rather than hand-wired runtimes (see `scenarios.rs` for those).
//!
//! `scenario(..)` always produces a well-formed payload by construction, so
//! `validate::validate` is expected to succeed for every input `proptest`
//! generates here — a validation failure inside a property test is itself a
//! finding, not an expected branch.

#![forbid(unsafe_code)]

use std::sync::Arc;

use proptest::prelude::*;

use asyncflow_core::schema::{
    ClientNode, Distribution, EdgeInput, EndpointInput, RVConfig, RqsGeneratorInput, ServerNode,
    ServerResources, SimulationPayload, SimulationSettingsInput, StepInput, StepKind, TopologyGraph,
    TopologyNodes,
};
use asyncflow_core::validate;
use asyncflow_engine::Simulation;
use asyncflow_telemetry::Analyzer;

const SAMPLE_PERIOD_S: f64 = 5.0;
const HORIZON_S: f64 = 1800.0;

fn scenario(cpu_time: f64, io_time: f64, ram_mb: f64, cores: u32, rpm: f64, users: f64) -> SimulationPayload {
    SimulationPayload {
        rqs_input: RqsGeneratorInput {
            id: "generator".to_string(),
            avg_active_users: RVConfig { mean: users, distribution: Distribution::Normal, variance: None },
            avg_request_per_minute_per_user: RVConfig {
                mean: rpm,
                distribution: Distribution::Poisson,
                variance: None,
            },
            user_sampling_window: 30,
        },
        topology_graph: TopologyGraph {
            nodes: TopologyNodes {
                client: ClientNode { id: "client".to_string() },
                servers: vec![ServerNode {
                    id: "server-1".to_string(),
                    resources: ServerResources { cpu_cores: cores, ram_mb },
                    endpoints: vec![EndpointInput {
                        name: "/".to_string(),
                        probability: None,
                        steps: vec![
                            StepInput {
                                kind: StepKind::Cpu,
                                cpu_time: Some(cpu_time),
                                necessary_ram: None,
                                io_waiting_time: None,
                            },
                            StepInput {
                                kind: StepKind::Io,
                                cpu_time: None,
                                necessary_ram: None,
                                io_waiting_time: Some(io_time),
                            },
                        ],
                    }],
                }],
                load_balancer: None,
            },
            edges: vec![
                EdgeInput {
                    id: "gen-to-client".to_string(),
                    source: "generator".to_string(),
                    target: "client".to_string(),
                    latency: RVConfig { mean: 0.001, distribution: Distribution::Exponential, variance: None },
                    dropout_rate: None,
                    probability: None,
                },
                EdgeInput {
                    id: "client-to-server".to_string(),
                    source: "client".to_string(),
                    target: "server-1".to_string(),
                    latency: RVConfig { mean: 0.002, distribution: Distribution::Exponential, variance: None },
                    dropout_rate: None,
                    probability: None,
                },
                EdgeInput {
                    id: "server-to-client".to_string(),
                    source: "server-1".to_string(),
                    target: "client".to_string(),
                    latency: RVConfig { mean: 0.002, distribution: Distribution::Exponential, variance: None },
                    dropout_rate: None,
                    probability: None,
                },
            ],
        },
        sim_settings: SimulationSettingsInput {
            total_simulation_time: HORIZON_S,
            sample_period_s: SAMPLE_PERIOD_S,
            enabled_sample_metrics: Vec::new(),
            enabled_event_metrics: Vec::new(),
        },
        events: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Invariant: every completed request's finish time is at or after its
    /// initial time, and no completion is recorded at or past the horizon
    /// (spec.md §5: the instant the horizon is reached is never executed).
    #[test]
    fn completions_never_precede_arrival_or_reach_the_horizon(
        cpu_time in 0.001f64..0.050,
        io_time in 0.001f64..0.100,
        ram_mb in 256.0f64..4096.0,
        cores in 1u32..4,
        rpm in 1.0f64..10.0,
        users in 5.0f64..80.0,
    ) {
        let payload = scenario(cpu_time, io_time, ram_mb, cores, rpm, users);
        let input = validate::validate(&payload).expect("scenario is well-formed by construction");
        let output = Simulation::build(&input, 123).expect("topology wires cleanly").run();

        for record in &output.latencies {
            prop_assert!(record.finish_time >= record.initial_time);
            prop_assert!(record.finish_time < HORIZON_S);
        }
    }

    /// Invariant: a sampled `server_ram_in_use` value never exceeds the
    /// server's configured capacity and never goes negative (spec.md §4.4:
    /// RAM is a bounded container).
    #[test]
    fn sampled_ram_in_use_stays_within_capacity(
        cpu_time in 0.001f64..0.050,
        io_time in 0.001f64..0.100,
        ram_mb in 256.0f64..4096.0,
        cores in 1u32..4,
        rpm in 1.0f64..10.0,
        users in 5.0f64..80.0,
    ) {
        let payload = scenario(cpu_time, io_time, ram_mb, cores, rpm, users);
        let input = validate::validate(&payload).expect("scenario is well-formed by construction");
        let output = Simulation::build(&input, 456).expect("topology wires cleanly").run();
        let series = Analyzer::new(&output).sampled_series();

        if let Some(ram_series) = series.get("server_ram_in_use") {
            for values in ram_series.values() {
                for v in values {
                    prop_assert!(*v >= 0.0 && *v <= ram_mb + 1e-6);
                }
            }
        }
    }
}

/// Boundary: the sampling tick never fires at `t=0`, and the k-th sample of
/// any entity's series lands at exactly `k * sample_period_s` (spec.md §4.9:
/// "first tick at `sample_period_s`, not `t=0`").
#[test]
fn sample_ticks_skip_t_zero_and_land_on_exact_multiples_of_the_period() {
    let payload = scenario(0.01, 0.02, 1024.0, 2, 3.0, 30.0);
    let input = validate::validate(&payload).expect("scenario is well-formed by construction");
    let output = Simulation::build(&input, 7).expect("topology wires cleanly").run();

    let mut times: Vec<f64> = output.sampled.iter().map(|(_, _, point)| point.t).collect();
    times.sort_by(f64::total_cmp);
    times.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

    assert!(!times.is_empty(), "a run this long samples at least once");
    for (k, t) in times.iter().enumerate() {
        assert!(*t > 0.0, "no sample at t=0");
        let expected = (k as f64 + 1.0) * SAMPLE_PERIOD_S;
        assert!((*t - expected).abs() < 1e-6, "sample {k} landed at {t}, expected {expected}");
    }
}

/// Determinism (spec.md §8): the same payload and seed produce byte-for-byte
/// identical latency and sampled-series output on two independent runs.
#[test]
fn same_seed_yields_identical_output_across_independent_runs() {
    let payload = scenario(0.01, 0.02, 1024.0, 2, 3.0, 30.0);
    let input = validate::validate(&payload).expect("scenario is well-formed by construction");

    let out1 = Simulation::build(&input, 555).expect("topology wires cleanly").run();
    let out2 = Simulation::build(&input, 555).expect("topology wires cleanly").run();

    let lat1: Vec<(u64, f64, f64)> =
        out1.latencies.iter().map(|r| (r.request_id, r.initial_time, r.finish_time)).collect();
    let lat2: Vec<(u64, f64, f64)> =
        out2.latencies.iter().map(|r| (r.request_id, r.initial_time, r.finish_time)).collect();
    assert_eq!(lat1, lat2);
    assert!(!lat1.is_empty(), "a run this long completes at least one request");

    let sampled1: Vec<(u8, Arc<str>, f64, f64)> = out1
        .sampled
        .iter()
        .map(|(metric, id, point)| (*metric as u8, id.clone(), point.t, point.value))
        .collect();
    let sampled2: Vec<(u8, Arc<str>, f64, f64)> = out2
        .sampled
        .iter()
        .map(|(metric, id, point)| (*metric as u8, id.clone(), point.t, point.value))
        .collect();
    assert_eq!(sampled1, sampled2);
}

/// A different seed is not guaranteed to change the outcome in general, but
/// for a scenario with genuinely random inter-arrival timing and edge
/// latency, two distinct seeds producing the exact same completion count
/// *and* the exact same finish times would be a coincidence worth
/// investigating rather than assuming away; this run's scale makes that
/// coincidence vanishingly unlikely, so divergence is asserted directly.
#[test]
fn different_seeds_explore_different_trajectories() {
    let payload = scenario(0.01, 0.02, 1024.0, 2, 3.0, 30.0);
    let input = validate::validate(&payload).expect("scenario is well-formed by construction");

    let out1 = Simulation::build(&input, 1).expect("topology wires cleanly").run();
    let out2 = Simulation::build(&input, 2).expect("topology wires cleanly").run();

    let finishes1: Vec<f64> = out1.latencies.iter().map(|r| r.finish_time).collect();
    let finishes2: Vec<f64> = out2.latencies.iter().map(|r| r.finish_time).collect();
    assert_ne!(finishes1, finishes2);
}
