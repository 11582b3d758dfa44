//! Edge runtime (spec §4.3): a unidirectional link with stochastic latency,
//! drop probability, and an additive "spike" mutated only by the
//! event-injection runtime. `in_flight` is a live gauge read by the
//! sampled-metric collector and by least-connections load-balancer selection.

use std::cell::Cell;
use std::rc::Rc;

use rand::Rng;

use asyncflow_core::model::Edge as EdgeConfig;
use asyncflow_sampler::distributions;

use crate::collector::EngineEvent;
use crate::request::{ComponentType, RequestState};
use crate::resources::Store;
use crate::world::World;
use std::cell::RefCell;

/// Lives for the whole run, shared by whatever forwards into it (generator,
/// client, load balancer, server) and by the event-injection runtime, which
/// is the only writer of `spike_s`.
pub struct EdgeRuntime {
    pub config: EdgeConfig,
    world: World,
    target_inbox: Rc<RefCell<Store<RequestState>>>,
    in_flight: Cell<u64>,
    spike_s: Cell<f64>,
}

pub type EdgeHandle = Rc<EdgeRuntime>;

impl EdgeRuntime {
    pub fn new(
        config: EdgeConfig,
        target_inbox: Rc<RefCell<Store<RequestState>>>,
        world: World,
    ) -> EdgeHandle {
        Rc::new(Self {
            config,
            world,
            target_inbox,
            in_flight: Cell::new(0),
            spike_s: Cell::new(0.0),
        })
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.get()
    }

    pub fn spike_s(&self) -> f64 {
        self.spike_s.get()
    }

    /// Mutated only by `event_injection::EventInjectionRuntime` (spec §3/§4.6).
    pub fn add_spike(&self, delta: f64) {
        self.spike_s.set(self.spike_s.get() + delta);
    }

    /// Called by the upstream node; spawns an independent transport
    /// continuation that drops, delays, and delivers `state` (spec §4.3).
    pub fn transport(self: &Rc<Self>, mut state: RequestState) {
        let u: f64 = self.world.rng.borrow_mut().gen();
        if u < self.config.dropout_rate {
            let t = self.world.now();
            self.world.collector.borrow_mut().record_event(EngineEvent::Dropped {
                edge_id: self.config.id.clone(),
                t,
            });
            return;
        }

        self.in_flight.set(self.in_flight.get() + 1);
        let base = distributions::sample(&self.config.latency, &mut *self.world.rng.borrow_mut());
        // Snapshot `spike_s` now: later mutations don't retroactively alter
        // this in-flight transport (spec §4.3/§4.6).
        let delay = base + self.spike_s.get();

        let this = self.clone();
        self.world.scheduler.borrow_mut().schedule_after(
            delay,
            Box::new(move || {
                let t = this.world.now();
                state.record_hop(ComponentType::Network, this.config.id.clone(), t);
                this.in_flight.set(this.in_flight.get().saturating_sub(1));
                this.target_inbox.borrow_mut().put(state);
            }),
        );
    }
}
