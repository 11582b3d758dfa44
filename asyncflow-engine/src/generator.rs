//! Generator runtime (spec §4.7): produces requests from the compound
//! stochastic inter-arrival process and injects each into its outbound edge.
//! The request id sequence starts at 1 and increases monotonically for the
//! life of the run.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use asyncflow_core::model::RqsGenerator;
use asyncflow_sampler::InterArrivalProcess;

use crate::edge::EdgeHandle;
use crate::request::{ComponentType, RequestState};
use crate::world::World;

pub struct GeneratorRuntime {
    config: RqsGenerator,
    world: World,
    out_edge: EdgeHandle,
    process: RefCell<InterArrivalProcess>,
    next_id: Cell<u64>,
}

pub type GeneratorHandle = Rc<GeneratorRuntime>;

impl GeneratorRuntime {
    pub fn new(config: RqsGenerator, out_edge: EdgeHandle, world: World, horizon: f64) -> GeneratorHandle {
        let process = InterArrivalProcess::new(
            config.avg_active_users,
            config.avg_request_per_minute_per_user.mean,
            config.user_sampling_window as f64,
            horizon,
        );
        Rc::new(Self {
            config,
            world,
            out_edge,
            process: RefCell::new(process),
            next_id: Cell::new(1),
        })
    }

    /// Schedule the first arrival; each arrival schedules its own successor
    /// until the inter-arrival process runs out of horizon (spec §4.2).
    pub fn start(self: &Rc<Self>) {
        Self::schedule_next(self.clone());
    }

    fn schedule_next(this: Rc<Self>) {
        let now = this.world.now();
        let next = {
            let mut rng = this.world.rng.borrow_mut();
            this.process.borrow_mut().next_arrival(now, &mut rng)
        };
        let Some(t) = next else {
            tracing::debug!(generator = %this.config.id, "inter-arrival process exhausted the horizon");
            return;
        };
        let delay = t - now;
        let this2 = this.clone();
        this.world.scheduler.borrow_mut().schedule_after(
            delay.max(0.0),
            Box::new(move || {
                Self::emit(this2.clone());
                Self::schedule_next(this2);
            }),
        );
    }

    fn emit(this: Rc<Self>) {
        let t = this.world.now();
        let id = this.next_id.get();
        this.next_id.set(id + 1);
        let mut state = RequestState::new(id, t);
        state.record_hop(ComponentType::Generator, this.config.id.clone(), t);
        tracing::trace!(generator = %this.config.id, request_id = id, t, "emitted request");
        this.out_edge.transport(state);
    }
}
