use filament_core::constants::{
    HIGH_PRIORITY_THRESHOLD, PRIORITY_BLACKLIST_UPDATE, PRIORITY_BLOCK_BROADCAST,
    PRIORITY_DEFAULT, PRIORITY_FORK_WARNING, PRIORITY_HEARTBEAT, PRIORITY_NODE_STATUS,
    PRIORITY_REJECTION_NOTIFICATION, PRIORITY_TRANSFER_CONFIRMATION,
};
use filament_core::record::Record;
use filament_core::types::{ChainId, EcdsaPublicKey, NodeId, RecordId, Tick};
use filament_security::ForkWarning;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Router-allocated message identifier. Flood forwards keep the original
/// id, which is what node-level dedup keys on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Debug)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct BroadcastId(pub u64);

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bcast-{}", self.0)
    }
}

// ── MessageBody ──────────────────────────────────────────────────────────────

/// Typed message payloads exchanged between simulated nodes. The transport
/// never interprets them; priority and kind string derive from the variant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MessageBody {
    /// A freshly minted record flooding through the network.
    BlockBroadcast(Record),

    /// High-priority fork alarm.
    ForkWarning(ForkWarning),

    /// Blacklist membership change.
    BlacklistUpdate {
        user: EcdsaPublicKey,
        blacklisted: bool,
    },

    /// A rejection record documenting a refused submission. These are
    /// carried here and never enter a chain log.
    RejectionNotification(Record),

    /// A transfer finished its confirmation wait.
    TransferConfirmation { record: RecordId, chain: ChainId },

    NodeStatus {
        node: NodeId,
        peer_count: usize,
        inbox_len: usize,
    },

    Heartbeat,

    /// Unrecognized application traffic; routed at default priority.
    Custom {
        kind: String,
        data: serde_json::Value,
    },
}

impl MessageBody {
    pub fn kind(&self) -> &str {
        match self {
            MessageBody::BlockBroadcast(_) => "BLOCK_BROADCAST",
            MessageBody::ForkWarning(_) => "FORK_WARNING",
            MessageBody::BlacklistUpdate { .. } => "BLACKLIST_UPDATE",
            MessageBody::RejectionNotification(_) => "REJECTION_NOTIFICATION",
            MessageBody::TransferConfirmation { .. } => "TRANSFER_CONFIRMATION",
            MessageBody::NodeStatus { .. } => "NODE_STATUS",
            MessageBody::Heartbeat => "HEARTBEAT",
            MessageBody::Custom { kind, .. } => kind,
        }
    }

    /// Fixed priority table; lower number = higher priority.
    pub fn priority(&self) -> u8 {
        match self {
            MessageBody::ForkWarning(_) => PRIORITY_FORK_WARNING,
            MessageBody::BlacklistUpdate { .. } => PRIORITY_BLACKLIST_UPDATE,
            MessageBody::RejectionNotification(_) => PRIORITY_REJECTION_NOTIFICATION,
            MessageBody::BlockBroadcast(_) => PRIORITY_BLOCK_BROADCAST,
            MessageBody::TransferConfirmation { .. } => PRIORITY_TRANSFER_CONFIRMATION,
            MessageBody::NodeStatus { .. } => PRIORITY_NODE_STATUS,
            MessageBody::Heartbeat => PRIORITY_HEARTBEAT,
            MessageBody::Custom { .. } => PRIORITY_DEFAULT,
        }
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority() <= HIGH_PRIORITY_THRESHOLD
    }
}

// ── Message ──────────────────────────────────────────────────────────────────

/// The envelope the router moves between nodes: body, creation tick, and
/// optional source node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub body: MessageBody,
    pub timestamp: Tick,
    pub source: Option<NodeId>,
}

impl Message {
    pub fn new(id: MessageId, body: MessageBody, timestamp: Tick, source: Option<NodeId>) -> Self {
        Self {
            id,
            body,
            timestamp,
            source,
        }
    }

    pub fn kind(&self) -> &str {
        self.body.kind()
    }

    pub fn priority(&self) -> u8 {
        self.body.priority()
    }

    pub fn is_high_priority(&self) -> bool {
        self.body.is_high_priority()
    }
}
