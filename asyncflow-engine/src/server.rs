//! Server runtime (spec §4.4): a dispatcher that spawns one handler per
//! inbound request. Each handler acquires RAM upfront, then alternates CPU
//! (holding a core) and IO (not holding a core) steps before releasing RAM
//! and forwarding to its outbound edge.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::Rng;

use asyncflow_core::model::{Endpoint, Server as ServerConfig, StepOp};

use crate::edge::EdgeHandle;
use crate::request::{ComponentType, RequestState};
use crate::resources::{Container, Store};
use crate::world::World;

/// Converts a continuous MB/core amount from the validated model into the
/// integral units `Container` works with. Every scenario in this workspace
/// (and every example scenario in the retrieved corpus) uses whole-MB
/// quantities, so rounding loses nothing in practice.
fn units(x: f64) -> usize {
    x.round().max(0.0) as usize
}

pub struct ServerRuntime {
    pub config: ServerConfig,
    world: World,
    inbox: Rc<RefCell<Store<RequestState>>>,
    cpu: Rc<RefCell<Container>>,
    ram: Rc<RefCell<Container>>,
    out_edge: EdgeHandle,
    ready_q: Cell<u64>,
    io_q: Cell<u64>,
}

pub type ServerHandle = Rc<ServerRuntime>;

impl ServerRuntime {
    pub fn new(config: ServerConfig, out_edge: EdgeHandle, world: World) -> ServerHandle {
        let cpu_cap = config.resources.cpu_cores as usize;
        let ram_cap = units(config.resources.ram_mb);
        Rc::new(Self {
            config,
            world,
            inbox: Rc::new(RefCell::new(Store::new())),
            cpu: Rc::new(RefCell::new(Container::new(cpu_cap, cpu_cap))),
            ram: Rc::new(RefCell::new(Container::new(ram_cap, ram_cap))),
            out_edge,
            ready_q: Cell::new(0),
            io_q: Cell::new(0),
        })
    }

    pub fn inbox(&self) -> Rc<RefCell<Store<RequestState>>> {
        self.inbox.clone()
    }

    pub fn cpu_level(&self) -> usize {
        self.cpu.borrow().level()
    }

    pub fn ram_level(&self) -> usize {
        self.ram.borrow().level()
    }

    pub fn ram_capacity(&self) -> usize {
        self.ram.borrow().capacity()
    }

    pub fn ready_q(&self) -> u64 {
        self.ready_q.get()
    }

    pub fn io_q(&self) -> u64 {
        self.io_q.get()
    }

    pub fn start(self: &Rc<Self>) {
        Self::dispatch_loop(self.clone());
    }

    fn dispatch_loop(this: Rc<Self>) {
        let outer = this.clone();
        this.inbox.borrow_mut().get(Box::new(move |state| {
            // Re-registering the listener is deferred: `get`'s caller may still
            // be holding `inbox`'s `RefCell` borrow (e.g. a `put` invoking us as
            // its waiter), and calling `get` again here would borrow it twice.
            let relisten = outer.clone();
            outer.world.scheduler.borrow_mut().schedule_after(
                0.0,
                Box::new(move || {
                    Self::dispatch_loop(relisten);
                }),
            );
            Self::spawn_handler(outer, state);
        }));
    }

    fn select_endpoint(&self) -> Endpoint {
        let endpoints = &self.config.endpoints;
        if endpoints.len() == 1 {
            return endpoints[0].clone();
        }
        let any_probability = endpoints.iter().any(|e| e.probability.is_some());
        let mut rng = self.world.rng.borrow_mut();
        if any_probability {
            let u: f64 = rng.gen();
            let mut acc = 0.0;
            for e in endpoints {
                acc += e.probability.unwrap_or(0.0);
                if u < acc {
                    return e.clone();
                }
            }
            return endpoints.last().expect("non-empty, checked above").clone();
        }
        let idx = rng.gen_range(0..endpoints.len());
        endpoints[idx].clone()
    }

    fn spawn_handler(this: Rc<Self>, mut state: RequestState) {
        let t = this.world.now();
        state.record_hop(ComponentType::Server, this.config.id.clone(), t);

        let endpoint = this.select_endpoint();
        let total_ram = units(endpoint.total_ram());
        let steps: Rc<Vec<_>> = Rc::new(endpoint.steps);

        if total_ram > 0 {
            let this2 = this.clone();
            this.ram.borrow_mut().get(
                total_ram,
                Box::new(move || {
                    // Deferred one tick: an endpoint with no CPU/IO steps would
                    // otherwise run to completion and call `ram.put` while this
                    // `ram.get` call is still on the stack, borrowing the same
                    // `RefCell` twice.
                    let this3 = this2.clone();
                    this2.world.scheduler.borrow_mut().schedule_after(
                        0.0,
                        Box::new(move || {
                            Self::run_step(this3, state, steps, 0, false, false, total_ram);
                        }),
                    );
                }),
            );
        } else {
            Self::run_step(this, state, steps, 0, false, false, total_ram);
        }
    }

    /// Drives one endpoint step at a time; `holding_cpu`/`in_io` track which
    /// resource, if any, this handler currently holds across consecutive
    /// steps of the same kind (spec §4.4: "consecutive CPU/IO steps reuse
    /// the same token/stay in the same state").
    #[allow(clippy::too_many_arguments)]
    fn run_step(
        this: Rc<Self>,
        state: RequestState,
        steps: Rc<Vec<asyncflow_core::model::Step>>,
        idx: usize,
        holding_cpu: bool,
        in_io: bool,
        total_ram: usize,
    ) {
        if idx >= steps.len() {
            Self::finish_handler(this, state, holding_cpu, in_io, total_ram);
            return;
        }

        match steps[idx].op {
            StepOp::Cpu { cpu_time } => {
                let in_io = if in_io {
                    this.io_q.set(this.io_q.get().saturating_sub(1));
                    false
                } else {
                    in_io
                };
                if holding_cpu {
                    let this2 = this.clone();
                    this.world.scheduler.borrow_mut().schedule_after(
                        cpu_time,
                        Box::new(move || {
                            Self::run_step(this2, state, steps, idx + 1, true, false, total_ram);
                        }),
                    );
                } else {
                    this.ready_q.set(this.ready_q.get() + 1);
                    let this2 = this.clone();
                    this.cpu.borrow_mut().get(
                        1,
                        Box::new(move || {
                            this2.ready_q.set(this2.ready_q.get().saturating_sub(1));
                            let this3 = this2.clone();
                            this2.world.scheduler.borrow_mut().schedule_after(
                                cpu_time,
                                Box::new(move || {
                                    Self::run_step(
                                        this3,
                                        state,
                                        steps,
                                        idx + 1,
                                        true,
                                        false,
                                        total_ram,
                                    );
                                }),
                            );
                        }),
                    );
                }
            }
            StepOp::Io { io_waiting_time } => {
                if holding_cpu {
                    this.cpu.borrow_mut().put(1);
                }
                if !in_io {
                    this.io_q.set(this.io_q.get() + 1);
                }
                let this2 = this.clone();
                this.world.scheduler.borrow_mut().schedule_after(
                    io_waiting_time,
                    Box::new(move || {
                        Self::run_step(this2, state, steps, idx + 1, false, true, total_ram);
                    }),
                );
            }
            StepOp::Ram { .. } => {
                let in_io = if in_io {
                    this.io_q.set(this.io_q.get().saturating_sub(1));
                    false
                } else {
                    in_io
                };
                Self::run_step(this, state, steps, idx + 1, holding_cpu, in_io, total_ram);
            }
        }
    }

    fn finish_handler(this: Rc<Self>, state: RequestState, holding_cpu: bool, in_io: bool, total_ram: usize) {
        if holding_cpu {
            this.cpu.borrow_mut().put(1);
        }
        if in_io {
            this.io_q.set(this.io_q.get().saturating_sub(1));
        }
        if total_ram > 0 {
            this.ram.borrow_mut().put(total_ram);
        }
        this.out_edge.transport(state);
    }
}
