//! The virtual-time timeline (spec §4.1/§5): a min-heap of pending
//! continuations ordered by `(time, sequence)`, giving strict FIFO
//! tie-breaking at equal virtual time. This is a plain callback scheduler, not
//! `async`/`await` — each pending step is a boxed `FnOnce()` closure that runs
//! to completion and, before returning, may schedule its own follow-up
//! continuation. Since the simulation is single-threaded, actor state is
//! shared between continuations via `Rc<RefCell<_>>` rather than borrowed.

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::rc::Rc;

pub type Action = Box<dyn FnOnce()>;

struct Entry {
    time: f64,
    seq: u64,
    action: Action,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.total_cmp(&other.time).then(self.seq.cmp(&other.seq))
    }
}

/// Owns the pending-event timeline and the current virtual clock. Lives
/// behind an `Rc<RefCell<_>>` so actor continuations can schedule follow-up
/// work on it — see [`drive`]/[`drive_until`], which never hold that
/// `RefCell`'s borrow while an action runs.
#[derive(Default)]
pub struct Scheduler {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    now: f64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            now: 0.0,
        }
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// The scheduled time of the earliest pending continuation, without
    /// advancing the clock or removing it.
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(entry)| entry.time)
    }

    /// Schedule `action` to run at an absolute virtual time. Registration
    /// order (`seq`) breaks ties at equal `time`, per spec §5.
    pub fn schedule_at(&mut self, time: f64, action: Action) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { time, seq, action }));
    }

    /// Schedule `action` to run `delay` virtual seconds from now. This is the
    /// `timeout(d)` primitive of spec §4.1.
    pub fn schedule_after(&mut self, delay: f64, action: Action) {
        debug_assert!(delay >= 0.0, "timeout delay must be non-negative");
        self.schedule_at(self.now + delay, action);
    }

    /// Pop the earliest pending continuation *without running it*, advancing
    /// the clock to its scheduled time. Callers must drop any borrow of this
    /// `Scheduler` before invoking the returned action, since the action is
    /// free to call back into `schedule_at`/`schedule_after`.
    pub fn pop_next(&mut self) -> Option<Action> {
        let Reverse(entry) = self.heap.pop()?;
        debug_assert!(
            entry.time >= self.now,
            "scheduler clock must be monotone non-decreasing"
        );
        self.now = entry.time;
        Some(entry.action)
    }
}

/// Drive `scheduler` to completion. Each popped action runs with the
/// `RefCell` borrow released, so it may freely schedule further work on the
/// same scheduler — which virtually every continuation does.
pub fn drive(scheduler: &Rc<RefCell<Scheduler>>) {
    loop {
        let action = {
            let mut s = scheduler.borrow_mut();
            match s.pop_next() {
                Some(a) => a,
                None => break,
            }
        };
        action();
    }
}

/// Drive `scheduler` until its clock would reach or pass `horizon`. Per spec
/// §5: "the run terminates when `now` reaches `total_simulation_time`
/// (events scheduled at exactly that time are not executed)."
pub fn drive_until(scheduler: &Rc<RefCell<Scheduler>>, horizon: f64) {
    loop {
        let action = {
            let mut s = scheduler.borrow_mut();
            match s.peek_time() {
                Some(t) if t < horizon => s.pop_next(),
                _ => None,
            }
        };
        match action {
            Some(a) => a(),
            None => break,
        }
    }
}
