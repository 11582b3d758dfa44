//! The shared handles every actor runtime needs: the scheduler timeline, the
//! process-wide seeded RNG, and the collector. Bundled into one `Clone`-able
//! struct so `Simulation::build` doesn't have to thread three separate `Rc`s
//! through every constructor (spec §9: "thread a single seeded RNG handle
//! through the builders into each runtime explicitly; no hidden globals").

use std::cell::RefCell;
use std::rc::Rc;

use rand::rngs::StdRng;

use crate::collector::Collector;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct World {
    pub scheduler: Rc<RefCell<Scheduler>>,
    pub rng: Rc<RefCell<StdRng>>,
    pub collector: Rc<RefCell<Collector>>,
}

impl World {
    pub fn now(&self) -> f64 {
        self.scheduler.borrow().now()
    }
}
