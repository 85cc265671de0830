use filament_core::types::{EcdsaPublicKey, EcdsaSignature};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    SignatureInvalid,
    #[error("malformed public key ({0} bytes)")]
    KeyInvalid(usize),
    #[error("malformed secret key")]
    SecretKeyInvalid,
}

/// Sign `message` with a P-256 secret scalar. ECDSA over the SHA-256 digest
/// of the input; returns a detached 64-byte (r ‖ s) signature.
pub fn sign(secret_key_bytes: &[u8], message: &[u8]) -> Result<EcdsaSignature, SignatureError> {
    let sk =
        SigningKey::from_slice(secret_key_bytes).map_err(|_| SignatureError::SecretKeyInvalid)?;
    let sig: Signature = sk.sign(message);
    Ok(EcdsaSignature(sig.to_vec()))
}

/// Verify a detached ECDSA P-256 signature. Verification is deterministic:
/// the same inputs always produce the same verdict.
pub fn verify_signature(
    public_key: &EcdsaPublicKey,
    message: &[u8],
    signature: &EcdsaSignature,
) -> Result<(), SignatureError> {
    let vk = VerifyingKey::from_sec1_bytes(public_key.as_bytes())
        .map_err(|_| SignatureError::KeyInvalid(public_key.as_bytes().len()))?;
    let sig = Signature::from_slice(signature.as_bytes())
        .map_err(|_| SignatureError::SignatureInvalid)?;
    vk.verify(message, &sig)
        .map_err(|_| SignatureError::SignatureInvalid)
}
