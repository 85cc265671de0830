pub mod canonical;
pub mod constants;
pub mod definition;
pub mod error;
pub mod record;
pub mod types;

pub use canonical::CanonicalWriter;
pub use constants::*;
pub use definition::{ChainDefinition, SerialRange};
pub use error::FilamentError;
pub use record::{Payload, Record};
pub use types::*;
