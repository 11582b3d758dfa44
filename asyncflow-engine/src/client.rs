//! Client runtime (spec §4.8): acts as both the sending and receiving side of
//! the round trip. A single forwarder task blocks on the shared inbox; the
//! same inbox receives both the generator's first delivery and the eventual
//! return from the server/load-balancer side.
//!
//! First visit vs. return is decided from the hop history alone, not an
//! auxiliary flag (spec §4.8). A request's history immediately before the
//! client's own hop is recorded is exactly `[Generator, Network]` on a first
//! visit — one generator hop, one network hop for the edge that carried it
//! here — and strictly longer on any return, since a return has travelled
//! through at least one more actor and edge beyond the client. Checking the
//! pre-append history length is therefore sufficient without inspecting
//! individual hop kinds.

use std::rc::Rc;

use asyncflow_core::model::Client as ClientConfig;

use crate::edge::EdgeHandle;
use crate::request::{ComponentType, RequestState};
use crate::resources::Store;
use crate::world::World;
use std::cell::RefCell;

pub struct ClientRuntime {
    pub config: ClientConfig,
    world: World,
    inbox: Rc<RefCell<Store<RequestState>>>,
    completed: Rc<RefCell<Store<RequestState>>>,
    out_edge: EdgeHandle,
}

pub type ClientHandle = Rc<ClientRuntime>;

impl ClientRuntime {
    pub fn new(
        config: ClientConfig,
        out_edge: EdgeHandle,
        inbox: Rc<RefCell<Store<RequestState>>>,
        completed: Rc<RefCell<Store<RequestState>>>,
        world: World,
    ) -> ClientHandle {
        Rc::new(Self {
            config,
            world,
            inbox,
            completed,
            out_edge,
        })
    }

    pub fn inbox(&self) -> Rc<RefCell<Store<RequestState>>> {
        self.inbox.clone()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.borrow().len()
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
        let first_visit = state.history.len() == 2;
        let t = self.world.now();
        state.record_hop(ComponentType::Client, self.config.id.clone(), t);

        if first_visit {
            self.out_edge.transport(state);
        } else {
            state.finish(t);
            self.world.collector.borrow_mut().record_completion(
                state.id,
                state.initial_time,
                t,
            );
            tracing::trace!(
                client = %self.config.id,
                request_id = state.id,
                latency = t - state.initial_time,
                "request completed"
            );
            self.completed.borrow_mut().put(state);
        }
    }
}
