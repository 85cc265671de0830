use filament_core::error::FilamentError;
use filament_core::record::Record;
use filament_core::types::{EcdsaPublicKey, EcdsaSignature, UserId};
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::hash::user_id_from_pubkey;

/// A Filament key pair: P-256 public + secret keys with the derived UserId.
///
/// The secret scalar is wiped from memory on drop.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub user_id: UserId,
    pub public_key: EcdsaPublicKey,
    secret_key: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh P-256 key pair from the OS CSPRNG. The public key
    /// is exported as an uncompressed SEC1 point.
    pub fn generate() -> Self {
        let sk = SigningKey::random(&mut OsRng);
        let pk_bytes = sk.verifying_key().to_encoded_point(false).as_bytes().to_vec();
        let public_key = EcdsaPublicKey(pk_bytes);
        let user_id = user_id_from_pubkey(&public_key);
        Self {
            user_id,
            public_key,
            secret_key: sk.to_bytes().as_slice().to_vec(),
        }
    }

    /// Sign `message` using this key pair's secret key.
    pub fn sign(&self, message: &[u8]) -> EcdsaSignature {
        let sk = Zeroizing::new(self.secret_key.clone());
        crate::ecdsa::sign(&sk, message).expect("sign with valid secret key is infallible")
    }

    /// Sign a record's id bytes and attach the detached signature.
    /// Fails if the record is already signed.
    pub fn sign_record(&self, record: &mut Record) -> Result<(), FilamentError> {
        let sig = self.sign(record.id_bytes());
        record.attach_signature(sig)
    }

    /// Read-only view of the secret scalar bytes.
    pub fn secret_key_bytes(&self) -> &[u8] {
        &self.secret_key
    }

    /// Restore a KeyPair from raw bytes.
    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        let public_key = EcdsaPublicKey(pk_bytes);
        let user_id = user_id_from_pubkey(&public_key);
        Self {
            user_id,
            public_key,
            secret_key: sk_bytes,
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ user_id: {:?} }}", self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecdsa::verify_signature;
    use filament_core::record::Payload;
    use filament_core::types::Creator;

    #[test]
    fn generated_keys_are_distinct() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public_key, b.public_key);
        assert_ne!(a.user_id, b.user_id);
    }

    #[test]
    fn sign_record_attaches_verifiable_signature() {
        let kp = KeyPair::generate();
        let mut record = Record::new(
            Payload::Ownership {
                owner: kp.public_key.clone(),
            },
            Some(filament_core::types::RecordId::from_bytes([1u8; 32])),
            Creator::User(kp.public_key.clone()),
            3,
        );
        kp.sign_record(&mut record).unwrap();
        let sig = record.signature.clone().unwrap();
        assert!(verify_signature(&kp.public_key, record.id_bytes(), &sig).is_ok());

        // second sign must fail
        assert!(kp.sign_record(&mut record).is_err());
    }

    #[test]
    fn from_raw_round_trips_public_key() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_raw(
            kp.public_key.as_bytes().to_vec(),
            kp.secret_key_bytes().to_vec(),
        );
        assert_eq!(restored.user_id, kp.user_id);
        let sig = restored.sign(b"restored");
        assert!(verify_signature(&kp.public_key, b"restored", &sig).is_ok());
    }
}
