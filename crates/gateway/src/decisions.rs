//! Bounded in-memory history of routing decisions, served on a debug
//! endpoint for observability.

use std::collections::VecDeque;
use std::sync::Mutex;

use switchboard_common::types::RoutingDecision;

pub struct DecisionLog {
    capacity: usize,
    ring: Mutex<VecDeque<RoutingDecision>>,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, decision: RoutingDecision) {
        let mut ring = self.ring.lock().unwrap();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(decision);
    }

    /// Most-recent-first copy of the retained decisions.
    pub fn snapshot(&self) -> Vec<RoutingDecision> {
        let ring = self.ring.lock().unwrap();
        ring.iter().rev().cloned().collect()
    }
}
