use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use filament_core::types::{NodeId, Tick};
use filament_crypto::KeyPair;
use tracing::trace;

use crate::message::{Message, MessageId};

/// One inbox slot: the message plus delivery metadata.
#[derive(Clone, Debug)]
pub struct InboxEntry {
    pub message: Message,
    pub sender: Option<NodeId>,
    pub arrived_at: Tick,
}

// ── Node ─────────────────────────────────────────────────────────────────────

/// A simulated network peer: key pair, outbound connections, FIFO inbox,
/// and the seen-set used to deduplicate flooded messages. A node never
/// interprets record semantics; it only transports.
pub struct Node {
    id: NodeId,
    keys: KeyPair,
    peers: BTreeSet<NodeId>,
    inbox: VecDeque<InboxEntry>,
    seen: HashSet<MessageId>,
}

impl Node {
    /// Create a node with a freshly generated key pair.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            keys: KeyPair::generate(),
            peers: BTreeSet::new(),
            inbox: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    pub fn peers(&self) -> &BTreeSet<NodeId> {
        &self.peers
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    pub fn inbox(&self) -> impl Iterator<Item = &InboxEntry> {
        self.inbox.iter()
    }

    /// Append to the inbox.
    pub fn receive(&mut self, message: Message, sender: Option<NodeId>, arrived_at: Tick) {
        trace!(node = %self.id, message = %message.id, kind = message.kind(), "received");
        self.inbox.push_back(InboxEntry {
            message,
            sender,
            arrived_at,
        });
    }

    /// Take every queued entry in arrival order.
    pub fn drain_inbox(&mut self) -> Vec<InboxEntry> {
        self.inbox.drain(..).collect()
    }

    pub fn clear_inbox(&mut self) {
        self.inbox.clear();
    }

    /// Flood dedup: returns true the first time an id is seen.
    pub fn mark_seen(&mut self, id: MessageId) -> bool {
        self.seen.insert(id)
    }

    pub fn has_seen(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    pub(crate) fn add_peer(&mut self, peer: NodeId) -> bool {
        self.peers.insert(peer)
    }

    pub(crate) fn remove_peer(&mut self, peer: &NodeId) -> bool {
        self.peers.remove(peer)
    }
}

// ── NodeTable ────────────────────────────────────────────────────────────────

/// All nodes in the simulation, keyed by id. Connection management lives
/// here so connects stay bidirectional and idempotent.
#[derive(Default)]
pub struct NodeTable {
    nodes: BTreeMap<NodeId, Node>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id(), node);
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Connect two nodes. Bidirectional; a repeat connect is a no-op.
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&a) {
            node.add_peer(b);
        }
        if let Some(node) = self.nodes.get_mut(&b) {
            node.add_peer(a);
        }
    }

    pub fn disconnect(&mut self, a: NodeId, b: NodeId) {
        if let Some(node) = self.nodes.get_mut(&a) {
            node.remove_peer(&b);
        }
        if let Some(node) = self.nodes.get_mut(&b) {
            node.remove_peer(&a);
        }
    }

    /// Nodes reachable from `origin` by flooding, excluding `origin`
    /// itself.
    pub fn reachable_from(&self, origin: NodeId) -> usize {
        let mut visited = BTreeSet::new();
        let mut frontier = vec![origin];
        visited.insert(origin);
        while let Some(id) = frontier.pop() {
            if let Some(node) = self.nodes.get(&id) {
                for peer in node.peers() {
                    if visited.insert(*peer) {
                        frontier.push(*peer);
                    }
                }
            }
        }
        visited.len().saturating_sub(1)
    }
}
