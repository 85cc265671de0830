use filament_core::constants::{
    CONFIRMATION_WAIT_FACTOR, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, RECEPTION_DELAY_FACTOR,
};
use serde::{Deserialize, Serialize};

/// Topology figures the timing checks derive their windows from. The node
/// count and average connection count may be unknown, in which case every
/// estimate falls back to the maximum delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub node_count: Option<u64>,
    pub avg_connections: Option<u64>,
    pub min_delay: u64,
    pub max_delay: u64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            node_count: None,
            avg_connections: None,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl NetworkParams {
    pub fn new(node_count: u64, avg_connections: u64, min_delay: u64, max_delay: u64) -> Self {
        Self {
            node_count: Some(node_count),
            avg_connections: Some(avg_connections),
            min_delay,
            max_delay,
        }
    }

    /// Estimated ticks for a flood to reach the whole network:
    /// `max(1, ⌈log_k n⌉ × max(1, max_delay))` where k = max(2, average
    /// connections). Falls back to `max_delay` when the topology is unknown.
    ///
    /// The ceil-log is computed in integer arithmetic (smallest hop count h
    /// with k^h ≥ n), so boundary cases like n = k^h never wobble on
    /// floating-point rounding.
    pub fn broadcast_time(&self) -> u64 {
        let (n, k) = match (self.node_count, self.avg_connections) {
            (Some(n), Some(k)) => (n, k),
            _ => return self.max_delay,
        };
        let base = k.max(2);
        let mut hops = 0u64;
        let mut reach = 1u64;
        while reach < n {
            reach = reach.saturating_mul(base);
            hops += 1;
        }
        (hops * self.max_delay.max(1)).max(1)
    }

    /// Window after which an accepted transfer may confirm: four broadcast
    /// times.
    pub fn confirmation_wait(&self) -> u64 {
        CONFIRMATION_WAIT_FACTOR * self.broadcast_time()
    }

    /// Oldest acceptable record age at reception: two broadcast times.
    pub fn max_reception_delay(&self) -> u64 {
        RECEPTION_DELAY_FACTOR * self.broadcast_time()
    }
}
