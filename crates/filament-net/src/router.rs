use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use filament_core::constants::{
    DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, HIGH_PRIORITY_MAX_DELAY, MESSAGE_MAX_AGE_TICKS,
};
use filament_core::types::{NodeId, Tick};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, trace};

use crate::message::{BroadcastId, Message, MessageBody, MessageId};
use crate::node::NodeTable;

// ── Configuration / metrics ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub struct RouterConfig {
    pub min_delay: u64,
    pub max_delay: u64,
    /// Messages older than this many ticks are discarded instead of
    /// delivered.
    pub max_age: u64,
    /// Probability that any scheduled delivery is silently lost.
    pub failure_rate: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_age: MESSAGE_MAX_AGE_TICKS,
            failure_rate: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct RouterMetrics {
    pub delivered: u64,
    pub forwarded: u64,
    pub dropped_failure: u64,
    pub dropped_expired: u64,
    pub dropped_duplicate: u64,
}

/// Aggregate result of a flooding broadcast.
#[derive(Clone, Debug)]
pub struct BroadcastReceipt {
    pub id: BroadcastId,
    pub message_id: MessageId,
    pub origin: NodeId,
    /// Deliveries scheduled for the initial fan-out.
    pub scheduled: usize,
    /// Unique nodes the flood will reach as it converges.
    pub reached: usize,
    /// ≈ 1.5× the largest delay drawn for the fan-out.
    pub estimated_duration: u64,
}

// ── Internal queue entries ───────────────────────────────────────────────────

struct Delivery {
    to: NodeId,
    sender: Option<NodeId>,
    message: Message,
    /// Flood deliveries re-forward from the receiving node.
    flood: bool,
}

struct HighEntry {
    due: Tick,
    priority: u8,
    seq: u64,
    delivery: Delivery,
}

impl HighEntry {
    fn key(&self) -> (Tick, u8, u64) {
        (self.due, self.priority, self.seq)
    }
}

impl PartialEq for HighEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for HighEntry {}
impl PartialOrd for HighEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HighEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Tick-driven message scheduler.
///
/// High-priority traffic (priority ≤ 3) lives in a due-ordered queue and is
/// drained before the per-tick bucket; within a tick, delivery follows
/// priority order with FIFO among equals. Per-message delay is drawn
/// uniformly — [1, min(3, max_delay)] for high priority, [min_delay,
/// max_delay] otherwise — from a seeded RNG so runs replay exactly.
pub struct Router {
    config: RouterConfig,
    rng: StdRng,
    buckets: BTreeMap<Tick, Vec<(u8, u64, Delivery)>>,
    high: BinaryHeap<Reverse<HighEntry>>,
    message_seq: u64,
    delivery_seq: u64,
    broadcast_seq: u64,
    metrics: RouterMetrics,
}

impl Router {
    pub fn new(config: RouterConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            buckets: BTreeMap::new(),
            high: BinaryHeap::new(),
            message_seq: 0,
            delivery_seq: 0,
            broadcast_seq: 0,
            metrics: RouterMetrics::default(),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    /// Scheduled deliveries not yet due.
    pub fn pending(&self) -> usize {
        self.high.len() + self.buckets.values().map(Vec::len).sum::<usize>()
    }

    pub fn next_message_id(&mut self) -> MessageId {
        self.message_seq += 1;
        MessageId(self.message_seq)
    }

    // ── Scheduling ───────────────────────────────────────────────────────────

    fn draw_delay(&mut self, high_priority: bool) -> u64 {
        if high_priority {
            let hi = self.config.max_delay.min(HIGH_PRIORITY_MAX_DELAY).max(1);
            self.rng.gen_range(1..=hi)
        } else {
            let lo = self.config.min_delay.min(self.config.max_delay).max(1);
            self.rng.gen_range(lo..=self.config.max_delay.max(lo))
        }
    }

    /// Schedule a point-to-point delivery. Returns the due tick, or `None`
    /// when the simulated failure rate ate the message.
    pub fn send(
        &mut self,
        now: Tick,
        to: NodeId,
        sender: Option<NodeId>,
        message: Message,
    ) -> Option<Tick> {
        self.schedule(
            now,
            Delivery {
                to,
                sender,
                message,
                flood: false,
            },
        )
    }

    fn schedule(&mut self, now: Tick, delivery: Delivery) -> Option<Tick> {
        if self.config.failure_rate > 0.0 && self.rng.gen_bool(self.config.failure_rate) {
            self.metrics.dropped_failure += 1;
            return None;
        }
        let priority = delivery.message.priority();
        let high = delivery.message.is_high_priority();
        let due = now + self.draw_delay(high);
        self.delivery_seq += 1;
        let seq = self.delivery_seq;
        trace!(
            to = %delivery.to,
            message = %delivery.message.id,
            kind = delivery.message.kind(),
            due,
            "delivery scheduled"
        );
        if high {
            self.high.push(Reverse(HighEntry {
                due,
                priority,
                seq,
                delivery,
            }));
        } else {
            self.buckets
                .entry(due)
                .or_default()
                .push((priority, seq, delivery));
        }
        Some(due)
    }

    /// Flood a message from `origin`: schedule to its peers; each
    /// receiving node re-forwards to its own peers except the sender,
    /// deduplicated by message id at the node level.
    pub fn broadcast(
        &mut self,
        now: Tick,
        origin: NodeId,
        body: MessageBody,
        nodes: &mut NodeTable,
    ) -> BroadcastReceipt {
        let message_id = self.next_message_id();
        let message = Message::new(message_id, body, now, Some(origin));

        let peers: Vec<NodeId> = nodes
            .get(&origin)
            .map(|n| n.peers().iter().copied().collect())
            .unwrap_or_default();
        if let Some(node) = nodes.get_mut(&origin) {
            node.mark_seen(message_id);
        }

        let mut scheduled = 0usize;
        let mut longest_delay = 0u64;
        for peer in peers {
            if let Some(due) = self.schedule(
                now,
                Delivery {
                    to: peer,
                    sender: Some(origin),
                    message: message.clone(),
                    flood: true,
                },
            ) {
                scheduled += 1;
                longest_delay = longest_delay.max(due - now);
            }
        }

        self.broadcast_seq += 1;
        let receipt = BroadcastReceipt {
            id: BroadcastId(self.broadcast_seq),
            message_id,
            origin,
            scheduled,
            reached: nodes.reachable_from(origin),
            estimated_duration: longest_delay * 3 / 2,
        };
        debug!(
            broadcast = %receipt.id,
            origin = %origin,
            scheduled,
            reached = receipt.reached,
            "broadcast started"
        );
        receipt
    }

    // ── Delivery ─────────────────────────────────────────────────────────────

    /// Deliver everything due at `now`: the high-priority queue first, then
    /// the tick bucket in priority order (FIFO among equal priority).
    /// Returns the number of deliveries made.
    pub fn process_tick(&mut self, now: Tick, nodes: &mut NodeTable) -> usize {
        let mut delivered = 0usize;

        while let Some(Reverse(entry)) = self.high.peek() {
            if entry.due > now {
                break;
            }
            let Reverse(entry) = self.high.pop().expect("peeked entry present");
            if self.deliver(now, entry.delivery, nodes) {
                delivered += 1;
            }
        }

        let due_ticks: Vec<Tick> = self.buckets.range(..=now).map(|(t, _)| *t).collect();
        for t in due_ticks {
            let mut entries = self.buckets.remove(&t).unwrap_or_default();
            entries.sort_by_key(|(priority, seq, _)| (*priority, *seq));
            for (_, _, delivery) in entries {
                if self.deliver(now, delivery, nodes) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    fn deliver(&mut self, now: Tick, delivery: Delivery, nodes: &mut NodeTable) -> bool {
        if now.saturating_sub(delivery.message.timestamp) > self.config.max_age {
            self.metrics.dropped_expired += 1;
            return false;
        }

        let forward_targets: Vec<NodeId> = {
            let Some(node) = nodes.get_mut(&delivery.to) else {
                return false;
            };
            if delivery.flood && !node.mark_seen(delivery.message.id) {
                self.metrics.dropped_duplicate += 1;
                return false;
            }
            node.receive(delivery.message.clone(), delivery.sender, now);
            if delivery.flood {
                node.peers()
                    .iter()
                    .copied()
                    .filter(|p| Some(*p) != delivery.sender)
                    .collect()
            } else {
                Vec::new()
            }
        };
        self.metrics.delivered += 1;

        for peer in forward_targets {
            // Skip peers that already hold the message; late copies would be
            // dropped at delivery anyway.
            if nodes
                .get(&peer)
                .map_or(true, |n| n.has_seen(&delivery.message.id))
            {
                continue;
            }
            self.metrics.forwarded += 1;
            self.schedule(
                now,
                Delivery {
                    to: peer,
                    sender: Some(delivery.to),
                    message: delivery.message.clone(),
                    flood: true,
                },
            );
        }
        true
    }

    /// Drop every queued delivery whose message has exceeded the max age.
    pub fn reap(&mut self, now: Tick) -> u64 {
        let max_age = self.config.max_age;
        let mut dropped = 0u64;
        for entries in self.buckets.values_mut() {
            let before = entries.len();
            entries.retain(|(_, _, d)| now.saturating_sub(d.message.timestamp) <= max_age);
            dropped += (before - entries.len()) as u64;
        }
        self.buckets.retain(|_, v| !v.is_empty());

        let retained: Vec<Reverse<HighEntry>> = self
            .high
            .drain()
            .filter(|Reverse(e)| {
                let fresh = now.saturating_sub(e.delivery.message.timestamp) <= max_age;
                if !fresh {
                    dropped += 1;
                }
                fresh
            })
            .collect();
        self.high = retained.into_iter().collect();

        self.metrics.dropped_expired += dropped;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use filament_core::types::{ChainId, RecordId};
    use filament_security::{ForkInfo, ForkReason, ForkWarning};

    fn line_topology(n: u32) -> NodeTable {
        let mut nodes = NodeTable::new();
        for i in 0..n {
            nodes.insert(Node::new(NodeId(i)));
        }
        for i in 0..n.saturating_sub(1) {
            nodes.connect(NodeId(i), NodeId(i + 1));
        }
        nodes
    }

    fn fork_warning_body() -> MessageBody {
        MessageBody::ForkWarning(ForkWarning::from_info(
            ForkInfo {
                reason: ForkReason::DoubleSpend,
                chain: ChainId(RecordId::from_bytes([1u8; 32])),
                record: RecordId::from_bytes([2u8; 32]),
                attacker: None,
                conflicting: vec![],
            },
            0,
        ))
    }

    fn run_until_idle(router: &mut Router, nodes: &mut NodeTable, from: Tick, limit: Tick) -> Tick {
        let mut t = from;
        while router.pending() > 0 && t < limit {
            t += 1;
            router.process_tick(t, nodes);
        }
        t
    }

    #[test]
    fn delivery_lands_within_delay_bounds() {
        let mut nodes = line_topology(2);
        let mut router = Router::new(RouterConfig::default(), 7);
        let id = router.next_message_id();
        let due = router
            .send(
                10,
                NodeId(1),
                Some(NodeId(0)),
                Message::new(id, MessageBody::Heartbeat, 10, Some(NodeId(0))),
            )
            .unwrap();
        assert!((11..=19).contains(&due));

        for t in 11..=due {
            router.process_tick(t, &mut nodes);
        }
        assert_eq!(nodes.get(&NodeId(1)).unwrap().inbox_len(), 1);
    }

    #[test]
    fn high_priority_delivers_before_normal_within_a_tick() {
        let mut nodes = line_topology(2);
        // min = max = 1 pins every delay to one tick.
        let config = RouterConfig {
            min_delay: 1,
            max_delay: 1,
            ..RouterConfig::default()
        };
        let mut router = Router::new(config, 7);

        let normal_id = router.next_message_id();
        router.send(
            0,
            NodeId(1),
            None,
            Message::new(normal_id, MessageBody::Heartbeat, 0, None),
        );
        let high_id = router.next_message_id();
        router.send(
            0,
            NodeId(1),
            None,
            Message::new(high_id, fork_warning_body(), 0, None),
        );

        router.process_tick(1, &mut nodes);
        let inbox: Vec<MessageId> = nodes
            .get(&NodeId(1))
            .unwrap()
            .inbox()
            .map(|e| e.message.id)
            .collect();
        assert_eq!(inbox, vec![high_id, normal_id]);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut nodes = line_topology(2);
        let config = RouterConfig {
            min_delay: 1,
            max_delay: 1,
            ..RouterConfig::default()
        };
        let mut router = Router::new(config, 7);
        let first = router.next_message_id();
        let second = router.next_message_id();
        router.send(
            0,
            NodeId(1),
            None,
            Message::new(first, MessageBody::Heartbeat, 0, None),
        );
        router.send(
            0,
            NodeId(1),
            None,
            Message::new(second, MessageBody::Heartbeat, 0, None),
        );

        router.process_tick(1, &mut nodes);
        let inbox: Vec<MessageId> = nodes
            .get(&NodeId(1))
            .unwrap()
            .inbox()
            .map(|e| e.message.id)
            .collect();
        assert_eq!(inbox, vec![first, second]);
    }

    #[test]
    fn broadcast_floods_a_line_exactly_once_per_node() {
        let mut nodes = line_topology(5);
        let mut router = Router::new(RouterConfig::default(), 42);

        let receipt = router.broadcast(0, NodeId(0), MessageBody::Heartbeat, &mut nodes);
        assert_eq!(receipt.scheduled, 1);
        assert_eq!(receipt.reached, 4);

        let finished = run_until_idle(&mut router, &mut nodes, 0, 100);
        // End-to-end bound: four hops, each at most max_delay ticks.
        assert!(finished <= 4 * router.config().max_delay);
        for i in 1..5 {
            assert_eq!(
                nodes.get(&NodeId(i)).unwrap().inbox_len(),
                1,
                "node {i} should hold exactly one copy"
            );
        }
        // The origin never receives its own broadcast.
        assert_eq!(nodes.get(&NodeId(0)).unwrap().inbox_len(), 0);
    }

    #[test]
    fn broadcast_on_denser_topology_still_deduplicates() {
        let mut nodes = line_topology(6);
        // Extra chords create multiple delivery paths.
        nodes.connect(NodeId(0), NodeId(3));
        nodes.connect(NodeId(1), NodeId(4));
        nodes.connect(NodeId(2), NodeId(5));
        let mut router = Router::new(RouterConfig::default(), 3);

        router.broadcast(0, NodeId(0), MessageBody::Heartbeat, &mut nodes);
        run_until_idle(&mut router, &mut nodes, 0, 200);

        for i in 1..6 {
            assert_eq!(nodes.get(&NodeId(i)).unwrap().inbox_len(), 1);
        }
    }

    #[test]
    fn expired_messages_are_dropped() {
        let mut nodes = line_topology(2);
        let mut router = Router::new(RouterConfig::default(), 7);
        let id = router.next_message_id();
        // Created at tick 0 but scheduled at tick 200: stale on arrival.
        let due = router
            .send(
                200,
                NodeId(1),
                None,
                Message::new(id, MessageBody::Heartbeat, 0, None),
            )
            .unwrap();
        router.process_tick(due, &mut nodes);
        assert_eq!(nodes.get(&NodeId(1)).unwrap().inbox_len(), 0);
        assert_eq!(router.metrics().dropped_expired, 1);
    }

    #[test]
    fn reap_purges_stale_queue_entries() {
        let mut router = Router::new(RouterConfig::default(), 7);
        let id = router.next_message_id();
        router.send(
            5,
            NodeId(1),
            None,
            Message::new(id, MessageBody::Heartbeat, 0, None),
        );
        assert_eq!(router.pending(), 1);
        assert_eq!(router.reap(500), 1);
        assert_eq!(router.pending(), 0);
    }

    #[test]
    fn failure_rate_one_drops_everything() {
        let config = RouterConfig {
            failure_rate: 1.0,
            ..RouterConfig::default()
        };
        let mut router = Router::new(config, 7);
        let id = router.next_message_id();
        let due = router.send(
            0,
            NodeId(1),
            None,
            Message::new(id, MessageBody::Heartbeat, 0, None),
        );
        assert!(due.is_none());
        assert_eq!(router.metrics().dropped_failure, 1);
    }
}
