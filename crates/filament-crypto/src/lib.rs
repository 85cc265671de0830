pub mod ecdsa;
pub mod hash;
pub mod keypair;

pub use ecdsa::{sign, verify_signature, SignatureError};
pub use hash::{random_bytes, sha256, user_id_from_pubkey};
pub use keypair::KeyPair;
