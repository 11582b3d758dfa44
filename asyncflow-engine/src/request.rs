//! The token threaded through the topology (spec §3 `RequestState`/`Hop`).

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    Generator,
    Client,
    LoadBalancer,
    Server,
    Network,
}

#[derive(Debug, Clone)]
pub struct Hop {
    pub component_type: ComponentType,
    pub component_id: Arc<str>,
    pub t: f64,
}

/// `history[0]` is always the generator hop; finalized (given a
/// `finish_time`) only once.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub id: u64,
    pub initial_time: f64,
    pub finish_time: Option<f64>,
    pub history: Vec<Hop>,
}

impl RequestState {
    pub fn new(id: u64, initial_time: f64) -> Self {
        Self {
            id,
            initial_time,
            finish_time: None,
            history: Vec::new(),
        }
    }

    pub fn record_hop(&mut self, component_type: ComponentType, component_id: Arc<str>, t: f64) {
        self.history.push(Hop {
            component_type,
            component_id,
            t,
        });
    }

    pub fn last_component_type(&self) -> Option<ComponentType> {
        self.history.last().map(|h| h.component_type)
    }

    pub fn finish(&mut self, t: f64) {
        debug_assert!(self.finish_time.is_none(), "a request may only finish once");
        debug_assert!(t >= self.initial_time);
        self.finish_time = Some(t);
    }
}
