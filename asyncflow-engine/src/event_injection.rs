//! Event injection runtime (spec §4.6): translates the validated
//! `EventInjection` list into scheduled mutations of edge spikes and server
//! outages.
//!
//! All markers (both families, both start and end) are sorted once into a
//! single timeline before anything is scheduled, then handed to the
//! scheduler in that order. Since the scheduler breaks equal-time ties by
//! registration order (spec §4.1/§5), sorting first and scheduling in the
//! sorted order is sufficient to get the required tie-break for free: END
//! before START within a family (spec §4.6), and — since spec.md leaves
//! cross-family ordering at equal time unspecified — edge-spike markers
//! before server-outage markers, chosen here as the stable, documented
//! resolution (see `DESIGN.md`).

use std::collections::HashMap;
use std::sync::Arc;

use asyncflow_core::model::{EventFamily, EventInjection};

use crate::collector::EngineEvent;
use crate::edge::EdgeHandle;
use crate::load_balancer::LbHandle;
use crate::world::World;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    End,
    Start,
}

struct Marker {
    t: f64,
    family: EventFamily,
    kind: MarkerKind,
    target_id: Arc<str>,
    spike_delta: f64,
}

fn family_rank(f: EventFamily) -> u8 {
    match f {
        EventFamily::Spike => 0,
        EventFamily::Server => 1,
    }
}

fn kind_rank(k: MarkerKind) -> u8 {
    match k {
        MarkerKind::End => 0,
        MarkerKind::Start => 1,
    }
}

/// Every edge id that appears in any spike event, computed once at start
/// (spec §4.6 "Marking").
pub fn affected_edges(events: &[EventInjection]) -> std::collections::BTreeSet<Arc<str>> {
    events
        .iter()
        .filter(|e| e.family == EventFamily::Spike)
        .map(|e| e.target_id.clone())
        .collect()
}

/// Schedule every marker derived from `events`. `edges` must contain every
/// edge id any spike event can target; `lb` is `None` when the topology has
/// no load balancer, in which case server outage markers are no-ops for
/// routing (spec §4.5: "Removing is a no-op for servers not behind any LB.")
/// but are still recorded on the event log.
pub fn schedule(events: &[EventInjection], edges: &HashMap<Arc<str>, EdgeHandle>, lb: Option<LbHandle>, world: World) {
    let mut markers = Vec::with_capacity(events.len() * 2);
    for ev in events {
        let spike_delta = ev.spike_s.unwrap_or(0.0);
        markers.push(Marker {
            t: ev.t_start,
            family: ev.family,
            kind: MarkerKind::Start,
            target_id: ev.target_id.clone(),
            spike_delta,
        });
        markers.push(Marker {
            t: ev.t_end,
            family: ev.family,
            kind: MarkerKind::End,
            target_id: ev.target_id.clone(),
            spike_delta,
        });
    }
    markers.sort_by(|a, b| {
        a.t.total_cmp(&b.t)
            .then(family_rank(a.family).cmp(&family_rank(b.family)))
            .then(kind_rank(a.kind).cmp(&kind_rank(b.kind)))
    });

    // Removed-edge bookkeeping for server outages: edges pulled from the LB
    // mapping at SERVER_DOWN are held here until the matching SERVER_UP
    // restores them (spec §4.6: "at t_end re-insert them at the tail").
    let removed: Rc<RefCell<HashMap<Arc<str>, Vec<(Arc<str>, EdgeHandle)>>>> =
        Rc::new(RefCell::new(HashMap::new()));

    for marker in markers {
        let world = world.clone();
        let edges = edges.clone();
        let lb = lb.clone();
        let removed = removed.clone();
        world.scheduler.borrow_mut().schedule_at(
            marker.t,
            Box::new(move || {
                apply_marker(&marker, &edges, lb, &removed, &world);
            }),
        );
    }
}

fn apply_marker(
    marker: &Marker,
    edges: &HashMap<Arc<str>, EdgeHandle>,
    lb: Option<LbHandle>,
    removed: &Rc<RefCell<HashMap<Arc<str>, Vec<(Arc<str>, EdgeHandle)>>>>,
    world: &World,
) {
    let t = world.now();
    match marker.family {
        EventFamily::Spike => {
            let Some(edge) = edges.get(&marker.target_id) else {
                tracing::warn!(edge_id = %marker.target_id, "spike event targets an unknown edge");
                return;
            };
            match marker.kind {
                MarkerKind::Start => {
                    edge.add_spike(marker.spike_delta);
                    world.collector.borrow_mut().record_event(EngineEvent::SpikeStart {
                        edge_id: marker.target_id.clone(),
                        t,
                        spike_s: marker.spike_delta,
                    });
                    tracing::debug!(edge_id = %marker.target_id, delta = marker.spike_delta, t, "spike started");
                }
                MarkerKind::End => {
                    edge.add_spike(-marker.spike_delta);
                    world.collector.borrow_mut().record_event(EngineEvent::SpikeEnd {
                        edge_id: marker.target_id.clone(),
                        t,
                    });
                    tracing::debug!(edge_id = %marker.target_id, t, "spike ended");
                }
            }
        }
        EventFamily::Server => {
            match marker.kind {
                MarkerKind::Start => {
                    world.collector.borrow_mut().record_event(EngineEvent::ServerDown {
                        server_id: marker.target_id.clone(),
                        t,
                    });
                    tracing::debug!(server_id = %marker.target_id, t, "server outage started");
                    let Some(lb) = lb else { return };
                    let pulled = lb.out_edges_targeting(&marker.target_id);
                    for (edge_id, _) in &pulled {
                        lb.remove_edge(edge_id);
                    }
                    removed.borrow_mut().insert(marker.target_id.clone(), pulled);
                }
                MarkerKind::End => {
                    world.collector.borrow_mut().record_event(EngineEvent::ServerUp {
                        server_id: marker.target_id.clone(),
                        t,
                    });
                    tracing::debug!(server_id = %marker.target_id, t, "server outage ended");
                    let Some(lb) = lb else { return };
                    if let Some(edges) = removed.borrow_mut().remove(&marker.target_id) {
                        for (edge_id, edge) in edges {
                            lb.restore_edge(edge_id, edge);
                        }
                    }
                }
            }
        }
    }
}
