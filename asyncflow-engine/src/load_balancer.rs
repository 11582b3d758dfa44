//! Load balancer runtime (spec §4.5): fans requests out across a set of
//! outbound edges, one per backend server, using either round-robin or
//! least-connections selection. Edges can be pulled out (server outage) and
//! reinserted (outage end) by the event-injection runtime without losing
//! their place in line: an edge list is an [`IndexMap`] so reinsertion after
//! removal appends at the tail, exactly like a fresh registration.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use asyncflow_core::model::{LbPolicy, LoadBalancer as LbConfig};

use crate::edge::EdgeHandle;
use crate::request::{ComponentType, RequestState};
use crate::resources::Store;
use crate::world::World;

pub struct LbRuntime {
    pub config: LbConfig,
    world: World,
    inbox: Rc<RefCell<Store<RequestState>>>,
    out_edges: RefCell<IndexMap<Arc<str>, EdgeHandle>>,
    /// Requests that arrived while `out_edges` was empty; flushed in order as
    /// soon as an edge is restored (spec §4.5: "requests accumulate in the LB
    /// inbox until at least one edge is restored").
    pending: RefCell<VecDeque<RequestState>>,
    rr_cursor: Cell<usize>,
}

pub type LbHandle = Rc<LbRuntime>;

impl LbRuntime {
    pub fn new(config: LbConfig, out_edges: IndexMap<Arc<str>, EdgeHandle>, world: World) -> LbHandle {
        Rc::new(Self {
            config,
            world,
            inbox: Rc::new(RefCell::new(Store::new())),
            out_edges: RefCell::new(out_edges),
            pending: RefCell::new(VecDeque::new()),
            rr_cursor: Cell::new(0),
        })
    }

    pub fn inbox(&self) -> Rc<RefCell<Store<RequestState>>> {
        self.inbox.clone()
    }

    pub fn out_edge_count(&self) -> usize {
        self.out_edges.borrow().len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// All currently wired edges whose target is `server_id`, used by
    /// event injection to find what to remove on a server outage.
    pub fn out_edges_targeting(&self, server_id: &str) -> Vec<(Arc<str>, EdgeHandle)> {
        self.out_edges
            .borrow()
            .iter()
            .filter(|(_, edge)| edge.config.target.as_ref() == server_id)
            .map(|(id, edge)| (id.clone(), edge.clone()))
            .collect()
    }

    pub fn remove_edge(&self, edge_id: &str) -> Option<EdgeHandle> {
        self.out_edges.borrow_mut().shift_remove(edge_id)
    }

    /// Reinserts a previously removed edge at the tail and flushes whatever
    /// backed up while the fleet had no outbound edges at all.
    pub fn restore_edge(self: &Rc<Self>, edge_id: Arc<str>, edge: EdgeHandle) {
        self.out_edges.borrow_mut().insert(edge_id, edge);
        self.try_drain();
    }

    pub fn start(self: &Rc<Self>) {
        Self::dispatch_loop(self.clone());
    }

    fn dispatch_loop(this: Rc<Self>) {
        let outer = this.clone();
        this.inbox.borrow_mut().get(Box::new(move |state| {
            let relisten = outer.clone();
            outer.world.scheduler.borrow_mut().schedule_after(
                0.0,
                Box::new(move || {
                    Self::dispatch_loop(relisten);
                }),
            );
            outer.on_message(state);
        }));
    }

    fn on_message(self: &Rc<Self>, mut state: RequestState) {
        let t = self.world.now();
        state.record_hop(ComponentType::LoadBalancer, self.config.id.clone(), t);
        self.pending.borrow_mut().push_back(state);
        self.try_drain();
    }

    fn try_drain(self: &Rc<Self>) {
        while !self.out_edges.borrow().is_empty() {
            let Some(state) = self.pending.borrow_mut().pop_front() else {
                break;
            };
            let edge = self.select_edge();
            edge.transport(state);
        }
    }

    fn select_edge(&self) -> EdgeHandle {
        let edges = self.out_edges.borrow();
        match self.config.policy {
            LbPolicy::RoundRobin => {
                let idx = self.rr_cursor.get() % edges.len();
                self.rr_cursor.set((idx + 1) % edges.len());
                edges.get_index(idx).expect("idx < len").1.clone()
            }
            LbPolicy::LeastConnections => edges
                .values()
                .min_by_key(|edge| edge.in_flight())
                .expect("non-empty, checked by try_drain")
                .clone(),
        }
    }
}
