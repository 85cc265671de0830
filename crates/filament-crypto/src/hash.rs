use filament_core::types::{EcdsaPublicKey, UserId};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// SHA-256 of arbitrary bytes → 32-byte digest. Identical input always
/// produces an identical digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&digest);
    arr
}

/// Derive a stable UserId from a public key: SHA-256 of the SEC1 bytes.
pub fn user_id_from_pubkey(public_key: &EcdsaPublicKey) -> UserId {
    UserId::from_bytes(sha256(public_key.as_bytes()))
}

/// `n` bytes from the operating system CSPRNG.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"filament"), sha256(b"filament"));
        assert_ne!(sha256(b"filament"), sha256(b"filamenu"));
    }

    #[test]
    fn user_ids_do_not_depend_on_byte_identity() {
        let pk_a = EcdsaPublicKey(vec![4u8; 65]);
        let pk_b = EcdsaPublicKey(vec![4u8; 65]);
        assert_eq!(user_id_from_pubkey(&pk_a), user_id_from_pubkey(&pk_b));
    }

    #[test]
    fn random_bytes_length() {
        assert_eq!(random_bytes(16).len(), 16);
    }
}
