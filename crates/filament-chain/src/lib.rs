pub mod dump;
pub mod log;

pub use dump::ChainDump;
pub use log::{ChainLog, ChainState, ForkCheck};
