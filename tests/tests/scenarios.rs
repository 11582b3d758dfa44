//! End-to-end scenario tests (spec.md §8 S1-S6), each hand-wiring the actor
//! runtimes directly (`asyncflow_engine::{edge, server, client, load_balancer,
//! event_injection}`) rather than going through `Simulation::build`. This
//! sidesteps the stochastic inter-arrival process entirely: requests are
//! injected at exact virtual times via `Scheduler::schedule_at`, and every
//! "zero-latency" edge uses a `normal` distribution with `variance = 0.0`,
//! which always samples exactly its mean (`asyncflow_sampler::distributions`)
//! — giving fully deterministic, reproducible timings without needing to
//! predict an RNG draw.

#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;

use asyncflow_core::model::{
    Edge, Endpoint, EventFamily, EventInjection, LbPolicy, LoadBalancer, Server, ServerResources,
    Step, StepOp,
};
use asyncflow_core::schema::Distribution;
use asyncflow_engine::collector::Collector;
use asyncflow_engine::edge::{EdgeHandle, EdgeRuntime};
use asyncflow_engine::event_injection;
use asyncflow_engine::load_balancer::LbRuntime;
use asyncflow_engine::request::{ComponentType, RequestState};
use asyncflow_engine::resources::Store;
use asyncflow_engine::scheduler::{drive_until, Scheduler};
use asyncflow_engine::server::ServerRuntime;
use asyncflow_engine::client::ClientRuntime;
use asyncflow_engine::World;

type Inbox = Rc<RefCell<Store<RequestState>>>;

fn new_world(seed: u64) -> World {
    World {
        scheduler: Rc::new(RefCell::new(Scheduler::new())),
        rng: Rc::new(RefCell::new(StdRng::seed_from_u64(seed))),
        collector: Rc::new(RefCell::new(Collector::new())),
    }
}

fn new_inbox() -> Inbox {
    Rc::new(RefCell::new(Store::new()))
}

/// A deterministic latency: `normal(mean, 0)` always draws exactly `mean`
/// (`rand_distr::Normal::new(mean, 0.0)` is a point distribution).
fn const_rv(seconds: f64) -> asyncflow_core::model::RVConfig {
    asyncflow_core::model::RVConfig {
        mean: seconds,
        distribution: Distribution::Normal,
        variance: 0.0,
    }
}

fn edge_cfg(id: &str, source: &str, target: &str, latency_s: f64) -> Edge {
    Edge {
        id: Arc::from(id),
        source: Arc::from(source),
        target: Arc::from(target),
        latency: const_rv(latency_s),
        dropout_rate: 0.0,
    }
}

/// Drains every queued value out of a `Store`, in FIFO order.
fn drain_ids(store: &Inbox) -> Vec<u64> {
    let collected: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
    while !store.borrow().is_empty() {
        let c = collected.clone();
        store.borrow_mut().get(Box::new(move |state: RequestState| c.borrow_mut().push(state.id)));
    }
    Rc::try_unwrap(collected).expect("no other references remain").into_inner()
}

fn inject_at(world: &World, t: f64, id: u64, out_edge: EdgeHandle) {
    let w = world.clone();
    world.scheduler.borrow_mut().schedule_at(
        t,
        Box::new(move || {
            let mut state = RequestState::new(id, w.now());
            state.record_hop(ComponentType::Generator, Arc::from("generator"), w.now());
            out_edge.transport(state);
        }),
    );
}

/// S1 — a single server, no events, one arrival. The request crosses three
/// zero-latency edges plus a 0.005 s CPU step and a 0.020 s IO step, so it
/// must finish exactly `cpu_time + io_waiting_time` after it was emitted, and
/// both of the server's containers must be back at capacity afterward.
#[test]
fn s1_minimal_single_server_completes_with_expected_latency() {
    let world = new_world(1);
    let client_inbox = new_inbox();
    let client_completed = new_inbox();

    let server_cfg = Server {
        id: Arc::from("server-1"),
        resources: ServerResources { cpu_cores: 1, ram_mb: 1024.0 },
        endpoints: vec![Endpoint {
            name: Arc::from("/"),
            probability: None,
            steps: vec![
                Step { op: StepOp::Ram { necessary_ram: 128.0 } },
                Step { op: StepOp::Cpu { cpu_time: 0.005 } },
                Step { op: StepOp::Io { io_waiting_time: 0.020 } },
            ],
        }],
    };
    let server_out_edge = EdgeRuntime::new(
        edge_cfg("server-to-client", "server-1", "client", 0.0),
        client_inbox.clone(),
        world.clone(),
    );
    let server = ServerRuntime::new(server_cfg, server_out_edge.clone(), world.clone());
    server.start();

    let client_out_edge = EdgeRuntime::new(
        edge_cfg("client-to-server", "client", "server-1", 0.0),
        server.inbox(),
        world.clone(),
    );
    let client = ClientRuntime::new(
        asyncflow_core::model::Client { id: Arc::from("client") },
        client_out_edge.clone(),
        client_inbox.clone(),
        client_completed,
        world.clone(),
    );
    client.start();

    let gen_out_edge = EdgeRuntime::new(
        edge_cfg("gen-to-client", "generator", "client", 0.0),
        client_inbox,
        world.clone(),
    );
    inject_at(&world, 0.010, 1, gen_out_edge.clone());

    drive_until(&world.scheduler, 1.0);

    let collector = world.collector.borrow();
    let latencies = collector.latencies();
    assert_eq!(latencies.len(), 1);
    assert_eq!(latencies[0].request_id, 1);
    assert!((latencies[0].initial_time - 0.010).abs() < 1e-9);
    assert!((latencies[0].finish_time - 0.035).abs() < 1e-9);
    drop(collector);

    assert_eq!(server.cpu_level(), 1, "the single core is released once the request finishes");
    assert_eq!(server.ram_level(), server.ram_capacity(), "RAM is fully released");
    assert_eq!(gen_out_edge.in_flight(), 0);
    assert_eq!(client_out_edge.in_flight(), 0);
    assert_eq!(server_out_edge.in_flight(), 0);
}

/// S2 — two requests land on a single-core server a millisecond apart. The
/// second must queue behind the first (observable as `ready_q == 1` while it
/// waits) and only start its own CPU step once the first releases the core.
#[test]
fn s2_two_requests_contend_for_one_core() {
    let world = new_world(2);
    let client_inbox = new_inbox();
    let client_completed = new_inbox();

    let server_cfg = Server {
        id: Arc::from("server-1"),
        resources: ServerResources { cpu_cores: 1, ram_mb: 1024.0 },
        endpoints: vec![Endpoint {
            name: Arc::from("/"),
            probability: None,
            steps: vec![
                Step { op: StepOp::Cpu { cpu_time: 0.005 } },
                Step { op: StepOp::Io { io_waiting_time: 0.020 } },
            ],
        }],
    };
    let server_out_edge = EdgeRuntime::new(
        edge_cfg("server-to-client", "server-1", "client", 0.0),
        client_inbox.clone(),
        world.clone(),
    );
    let server = ServerRuntime::new(server_cfg, server_out_edge, world.clone());
    server.start();

    let client_out_edge = EdgeRuntime::new(
        edge_cfg("client-to-server", "client", "server-1", 0.0),
        server.inbox(),
        world.clone(),
    );
    let client = ClientRuntime::new(
        asyncflow_core::model::Client { id: Arc::from("client") },
        client_out_edge.clone(),
        client_inbox.clone(),
        client_completed,
        world.clone(),
    );
    client.start();

    let gen_out_edge = EdgeRuntime::new(
        edge_cfg("gen-to-client", "generator", "client", 0.0),
        client_inbox,
        world.clone(),
    );
    inject_at(&world, 0.0, 1, gen_out_edge.clone());
    inject_at(&world, 0.001, 2, gen_out_edge);

    let ready_probe: Rc<RefCell<Option<u64>>> = Rc::new(RefCell::new(None));
    let probe_capture = ready_probe.clone();
    let probe_server = server.clone();
    world.scheduler.borrow_mut().schedule_at(
        0.003,
        Box::new(move || {
            *probe_capture.borrow_mut() = Some(probe_server.ready_q());
        }),
    );

    drive_until(&world.scheduler, 1.0);

    assert_eq!(
        ready_probe.borrow().unwrap(),
        1,
        "request 2 is queued behind request 1's CPU step at t=0.003"
    );

    let collector = world.collector.borrow();
    let mut latencies = collector.latencies().to_vec();
    latencies.sort_by_key(|r| r.request_id);
    assert_eq!(latencies.len(), 2);
    assert!((latencies[0].finish_time - 0.025).abs() < 1e-9, "request 1 runs CPU+IO back to back");
    assert!(
        (latencies[1].finish_time - 0.030).abs() < 1e-9,
        "request 2 starts its CPU step exactly when request 1 releases the core"
    );
}

/// S3 — an edge spike adds additively to the base latency of any transport in
/// flight while the spike is active; a request entering before the spike
/// starts but landing before it ends still observes the elevated delay if it
/// enters inside the active window.
#[test]
fn s3_edge_spike_adds_to_in_flight_transport_latency() {
    let world = new_world(3);
    let target = new_inbox();
    let edge = EdgeRuntime::new(edge_cfg("spike-edge", "a", "b", 0.002), target.clone(), world.clone());

    let mut edges: HashMap<Arc<str>, EdgeHandle> = HashMap::new();
    edges.insert(Arc::from("spike-edge"), edge.clone());

    let events = vec![EventInjection {
        event_id: Arc::from("spike-a"),
        target_id: Arc::from("spike-edge"),
        family: EventFamily::Spike,
        t_start: 2.0,
        t_end: 4.0,
        spike_s: Some(0.050),
    }];
    event_injection::schedule(&events, &edges, None, world.clone());

    let arrival: Rc<RefCell<Option<f64>>> = Rc::new(RefCell::new(None));
    let arrival_capture = arrival.clone();
    let w = world.clone();
    target.borrow_mut().get(Box::new(move |_state| {
        *arrival_capture.borrow_mut() = Some(w.now());
    }));

    let w2 = world.clone();
    world.scheduler.borrow_mut().schedule_at(
        2.5,
        Box::new(move || {
            let state = RequestState::new(1, w2.now());
            edge.transport(state);
        }),
    );

    drive_until(&world.scheduler, 10.0);

    assert!(
        (arrival.borrow().unwrap() - 2.552).abs() < 1e-9,
        "2.5 entry + 0.002 base latency + 0.050 active spike"
    );
}

/// S4 — a round-robin load balancer alternates across its backends in
/// declaration order, regardless of arrival spacing.
#[test]
fn s4_round_robin_alternates_across_backends_in_insertion_order() {
    let world = new_world(4);
    let inbox1 = new_inbox();
    let inbox2 = new_inbox();

    let e1 = EdgeRuntime::new(edge_cfg("E1", "lb", "srv1", 0.0), inbox1.clone(), world.clone());
    let e2 = EdgeRuntime::new(edge_cfg("E2", "lb", "srv2", 0.0), inbox2.clone(), world.clone());

    let mut out_edges: IndexMap<Arc<str>, EdgeHandle> = IndexMap::new();
    out_edges.insert(Arc::from("E1"), e1);
    out_edges.insert(Arc::from("E2"), e2);

    let lb = LbRuntime::new(
        LoadBalancer {
            id: Arc::from("lb"),
            policy: LbPolicy::RoundRobin,
            covered: vec![(Arc::from("srv1"), Arc::from("E1")), (Arc::from("srv2"), Arc::from("E2"))],
        },
        out_edges,
        world.clone(),
    );
    lb.start();

    for (i, t) in [0.0, 0.001, 0.002].into_iter().enumerate() {
        let w = world.clone();
        let lb_inbox = lb.inbox();
        world.scheduler.borrow_mut().schedule_at(
            t,
            Box::new(move || {
                let mut state = RequestState::new(i as u64 + 1, w.now());
                state.record_hop(ComponentType::Client, Arc::from("client"), w.now());
                lb_inbox.borrow_mut().put(state);
            }),
        );
    }

    drive_until(&world.scheduler, 1.0);

    assert_eq!(drain_ids(&inbox1), vec![1, 3], "srv1 gets the first and third request");
    assert_eq!(drain_ids(&inbox2), vec![2], "srv2 gets the second request");
}

/// S5 — a server outage pulls its edge out of the load balancer's mapping for
/// the outage window and restores it at the tail once it ends; a request
/// that arrives exactly when the outage ends observes the restored mapping,
/// since the outage-end marker is registered (and so scheduled) ahead of it.
#[test]
fn s5_server_outage_removes_and_restores_lb_edge() {
    let world = new_world(5);
    let inbox1 = new_inbox();
    let inbox2 = new_inbox();

    let e1 = EdgeRuntime::new(edge_cfg("E1", "lb", "srv1", 0.0), inbox1.clone(), world.clone());
    let e2 = EdgeRuntime::new(edge_cfg("E2", "lb", "srv2", 0.0), inbox2.clone(), world.clone());

    let mut out_edges: IndexMap<Arc<str>, EdgeHandle> = IndexMap::new();
    out_edges.insert(Arc::from("E1"), e1.clone());
    out_edges.insert(Arc::from("E2"), e2.clone());

    let lb = LbRuntime::new(
        LoadBalancer {
            id: Arc::from("lb"),
            policy: LbPolicy::RoundRobin,
            covered: vec![(Arc::from("srv1"), Arc::from("E1")), (Arc::from("srv2"), Arc::from("E2"))],
        },
        out_edges,
        world.clone(),
    );
    lb.start();

    let mut edges: HashMap<Arc<str>, EdgeHandle> = HashMap::new();
    edges.insert(Arc::from("E1"), e1);
    edges.insert(Arc::from("E2"), e2);

    let events = vec![EventInjection {
        event_id: Arc::from("outage-1"),
        target_id: Arc::from("srv1"),
        family: EventFamily::Server,
        t_start: 1.0,
        t_end: 2.0,
        spike_s: None,
    }];
    // Registered before the t=2.0 arrival below, so its SERVER_UP marker is
    // scheduled (and so applied) first at the shared timestamp (spec.md §5).
    event_injection::schedule(&events, &edges, Some(lb.clone()), world.clone());

    let w = world.clone();
    let lb_inbox = lb.inbox();
    world.scheduler.borrow_mut().schedule_at(
        2.0,
        Box::new(move || {
            let mut state = RequestState::new(1, w.now());
            state.record_hop(ComponentType::Client, Arc::from("client"), w.now());
            lb_inbox.borrow_mut().put(state);
        }),
    );

    let mid_outage_edge_count: Rc<RefCell<Option<usize>>> = Rc::new(RefCell::new(None));
    let probe_lb = lb.clone();
    let probe_capture = mid_outage_edge_count.clone();
    world.scheduler.borrow_mut().schedule_at(
        1.5,
        Box::new(move || {
            *probe_capture.borrow_mut() = Some(probe_lb.out_edge_count());
        }),
    );

    drive_until(&world.scheduler, 3.0);

    assert_eq!(mid_outage_edge_count.borrow().unwrap(), 1, "srv1's edge is pulled out during the outage");
    assert_eq!(lb.out_edge_count(), 2, "both edges are back once the run ends");
    assert!(drain_ids(&inbox1).is_empty(), "srv1 never receives the t=2.0 request");
    assert_eq!(
        drain_ids(&inbox2),
        vec![1],
        "the restored mapping puts E2 ahead of the re-appended E1, and the cursor still points at index 0"
    );
}

/// S6 — two spike windows on the same edge overlap for one second; `spike_s`
/// must equal the sum of every currently active spike, not just the latest.
#[test]
fn s6_superposed_spikes_sum_additively_while_both_active() {
    let world = new_world(6);
    let target = new_inbox();
    let edge = EdgeRuntime::new(edge_cfg("spike-edge", "a", "b", 0.0), target, world.clone());

    let mut edges: HashMap<Arc<str>, EdgeHandle> = HashMap::new();
    edges.insert(Arc::from("spike-edge"), edge.clone());

    let events = vec![
        EventInjection {
            event_id: Arc::from("a"),
            target_id: Arc::from("spike-edge"),
            family: EventFamily::Spike,
            t_start: 1.0,
            t_end: 5.0,
            spike_s: Some(0.3),
        },
        EventInjection {
            event_id: Arc::from("b"),
            target_id: Arc::from("spike-edge"),
            family: EventFamily::Spike,
            t_start: 2.0,
            t_end: 3.0,
            spike_s: Some(0.2),
        },
    ];
    event_injection::schedule(&events, &edges, None, world.clone());

    let samples: Rc<RefCell<Vec<(f64, f64)>>> = Rc::new(RefCell::new(Vec::new()));
    for t in [0.5, 1.5, 2.5, 3.5, 5.5] {
        let e = edge.clone();
        let s = samples.clone();
        world
            .scheduler
            .borrow_mut()
            .schedule_at(t, Box::new(move || s.borrow_mut().push((t, e.spike_s()))));
    }

    drive_until(&world.scheduler, 6.0);

    let samples = samples.borrow();
    assert!((samples[0].1 - 0.0).abs() < 1e-12, "before either spike starts");
    assert!((samples[1].1 - 0.3).abs() < 1e-12, "only A is active");
    assert!((samples[2].1 - 0.5).abs() < 1e-12, "both A and B are active: 0.3 + 0.2");
    assert!((samples[3].1 - 0.3).abs() < 1e-12, "B ended, only A remains");
    assert!((samples[4].1 - 0.0).abs() < 1e-12, "both have ended");
}

/// The sorted-marker scheduling order in `event_injection::schedule` is
/// independent of the order events are declared in: B-before-A in the input
/// slice must produce the same trajectory as A-before-B.
#[test]
fn spike_trajectory_is_independent_of_event_declaration_order() {
    for (seed, order_swapped) in [(10, false), (11, true)] {
        let world = new_world(seed);
        let target = new_inbox();
        let edge = EdgeRuntime::new(edge_cfg("spike-edge", "a", "b", 0.0), target, world.clone());

        let mut edges: HashMap<Arc<str>, EdgeHandle> = HashMap::new();
        edges.insert(Arc::from("spike-edge"), edge.clone());

        let event_a = EventInjection {
            event_id: Arc::from("a"),
            target_id: Arc::from("spike-edge"),
            family: EventFamily::Spike,
            t_start: 1.0,
            t_end: 5.0,
            spike_s: Some(0.3),
        };
        let event_b = EventInjection {
            event_id: Arc::from("b"),
            target_id: Arc::from("spike-edge"),
            family: EventFamily::Spike,
            t_start: 2.0,
            t_end: 3.0,
            spike_s: Some(0.2),
        };
        let events = if order_swapped { vec![event_b, event_a] } else { vec![event_a, event_b] };
        event_injection::schedule(&events, &edges, None, world.clone());

        let sample: Rc<RefCell<Option<f64>>> = Rc::new(RefCell::new(None));
        let s = sample.clone();
        let e = edge.clone();
        world.scheduler.borrow_mut().schedule_at(2.5, Box::new(move || *s.borrow_mut() = Some(e.spike_s())));

        drive_until(&world.scheduler, 6.0);
        assert!((sample.borrow().unwrap() - 0.5).abs() < 1e-12);
    }
}
