//! Resource primitives (spec §4.1): `Container`, a bounded integer level with
//! FIFO waiters (used for CPU cores and RAM), and `Store`, an unbounded FIFO
//! message queue with FIFO consumers (used for inboxes). Both are plain,
//! single-threaded structures — no locking, since exactly one task runs at a
//! time.

use std::collections::VecDeque;

/// A bounded integer level (`0..=capacity`). `get(n)` blocks until
/// `level >= n`, then decrements; `put(n)` increments (never exceeding
/// capacity) and wakes waiters in strict FIFO order — a large `get(n)` blocks
/// smaller `get` calls registered behind it.
pub struct Container {
    level: usize,
    capacity: usize,
    waiters: VecDeque<(usize, Box<dyn FnOnce()>)>,
}

impl Container {
    pub fn new(capacity: usize, initial: usize) -> Self {
        debug_assert!(initial <= capacity);
        Self {
            level: initial,
            capacity,
            waiters: VecDeque::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Request `n` units. Runs `on_ready` synchronously if satisfiable right
    /// now (respecting FIFO order against any already-queued waiters);
    /// otherwise queues the request.
    pub fn get(&mut self, n: usize, on_ready: Box<dyn FnOnce()>) {
        debug_assert!(n <= self.capacity, "request exceeds container capacity");
        if self.waiters.is_empty() && n <= self.level {
            self.level -= n;
            on_ready();
        } else {
            self.waiters.push_back((n, on_ready));
        }
    }

    /// Release `n` units back to the container, then wake as many
    /// front-of-queue waiters as can now be satisfied.
    pub fn put(&mut self, n: usize) {
        self.level += n;
        debug_assert!(
            self.level <= self.capacity,
            "container level exceeded its capacity"
        );
        self.wake_ready_waiters();
    }

    fn wake_ready_waiters(&mut self) {
        while let Some(&(n, _)) = self.waiters.front() {
            if n > self.level {
                break;
            }
            let (n, on_ready) = self.waiters.pop_front().expect("front just peeked");
            self.level -= n;
            on_ready();
        }
    }
}

/// An unbounded FIFO queue. `put` never blocks; `get` blocks when empty, with
/// waiters served in FIFO order.
pub struct Store<T> {
    queue: VecDeque<T>,
    waiters: VecDeque<Box<dyn FnOnce(T)>>,
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Store<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            waiters: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn put(&mut self, value: T) {
        if let Some(waiter) = self.waiters.pop_front() {
            waiter(value);
        } else {
            self.queue.push_back(value);
        }
    }

    pub fn get(&mut self, on_ready: Box<dyn FnOnce(T)>) {
        if let Some(value) = self.queue.pop_front() {
            on_ready(value);
        } else {
            self.waiters.push_back(on_ready);
        }
    }
}
