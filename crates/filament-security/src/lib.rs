pub mod ledger;
pub mod warning;

pub use ledger::{
    BlacklistReason, SecurityAction, SecurityEvent, SecurityEventKind, SecurityLedger,
    SecurityState,
};
pub use warning::{ForkInfo, ForkReason, ForkWarning, RecommendedAction, Severity};
