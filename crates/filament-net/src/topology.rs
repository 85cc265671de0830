use filament_core::types::NodeId;
use rand::rngs::StdRng;
use rand::Rng;

use crate::node::{Node, NodeTable};

/// `n` nodes in a line: 0–1–2–…–(n-1).
pub fn linear(n: u32) -> NodeTable {
    let mut nodes = NodeTable::new();
    for i in 0..n {
        nodes.insert(Node::new(NodeId(i)));
    }
    for i in 0..n.saturating_sub(1) {
        nodes.connect(NodeId(i), NodeId(i + 1));
    }
    nodes
}

/// `n` nodes on a ring with `extra_per_node` additional random chords per
/// node. The ring guarantees connectivity; the chords approximate the
/// configured connection count.
pub fn ring_with_chords(n: u32, extra_per_node: u32, rng: &mut StdRng) -> NodeTable {
    let mut nodes = NodeTable::new();
    for i in 0..n {
        nodes.insert(Node::new(NodeId(i)));
    }
    if n < 2 {
        return nodes;
    }
    for i in 0..n {
        nodes.connect(NodeId(i), NodeId((i + 1) % n));
    }
    if n > 2 {
        for i in 0..n {
            for _ in 0..extra_per_node {
                let peer = rng.gen_range(0..n);
                nodes.connect(NodeId(i), NodeId(peer));
            }
        }
    }
    nodes
}
