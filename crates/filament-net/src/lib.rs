pub mod clock;
pub mod message;
pub mod node;
pub mod router;
pub mod topology;

pub use clock::Clock;
pub use message::{BroadcastId, Message, MessageBody, MessageId};
pub use node::{InboxEntry, Node, NodeTable};
pub use router::{BroadcastReceipt, Router, RouterConfig, RouterMetrics};
