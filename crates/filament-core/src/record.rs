use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalWriter;
use crate::error::FilamentError;
use crate::types::{ChainId, Creator, DefinitionHash, EcdsaPublicKey, EcdsaSignature, RecordId, Tick};

// ── Payload ──────────────────────────────────────────────────────────────────

/// Every record carries exactly one of these variants. The integrity walker
/// and the legality checker dispatch on the tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Head of a chain. Minted by the system when a chain is provisioned.
    Root {
        definition_hash: DefinitionHash,
        serial: u64,
    },

    /// Assigns the initial owner. At most one per chain, directly after
    /// the root.
    Ownership { owner: EcdsaPublicKey },

    /// Moves the chain to a designated next owner. Only the current owner
    /// may mint one.
    Transfer {
        chain: ChainId,
        next_owner: EcdsaPublicKey,
        prev_record: RecordId,
    },

    /// Documents a rejected record. Carried by security messages only;
    /// never enters a chain log.
    Rejection {
        rejected: RecordId,
        reason: String,
        rejector: Creator,
        rejected_at: Tick,
    },
}

impl Payload {
    /// Canonical variant tag, the first byte of every record's canonical form.
    pub fn tag(&self) -> u8 {
        match self {
            Payload::Root { .. } => 0,
            Payload::Ownership { .. } => 1,
            Payload::Transfer { .. } => 2,
            Payload::Rejection { .. } => 3,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Root { .. } => "root",
            Payload::Ownership { .. } => "ownership",
            Payload::Transfer { .. } => "transfer",
            Payload::Rejection { .. } => "rejection",
        }
    }

    fn write_canonical(&self, w: &mut CanonicalWriter) {
        w.put_u8(self.tag());
        match self {
            Payload::Root {
                definition_hash,
                serial,
            } => {
                w.put_digest(definition_hash.as_bytes());
                w.put_u64(*serial);
            }
            Payload::Ownership { owner } => {
                w.put_bytes(owner.as_bytes());
            }
            Payload::Transfer {
                chain,
                next_owner,
                prev_record,
            } => {
                w.put_digest(chain.as_record_id().as_bytes());
                w.put_bytes(next_owner.as_bytes());
                w.put_digest(prev_record.as_bytes());
            }
            Payload::Rejection {
                rejected,
                reason,
                rejector,
                rejected_at,
            } => {
                w.put_digest(rejected.as_bytes());
                w.put_str(reason);
                w.put_bytes(rejector.canonical_bytes());
                w.put_u64(*rejected_at);
            }
        }
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

/// The atomic, content-addressed log element. The id is fixed at
/// construction (SHA-256 over the canonical form) and the signature is a
/// detached ECDSA signature over the id bytes. Once signed, nothing may
/// change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub payload: Payload,
    pub prev_id: Option<RecordId>,
    pub creator: Creator,
    pub tick: Tick,
    pub signature: Option<EcdsaSignature>,
}

impl Record {
    /// Construct an unsigned record. The id is final after this call.
    pub fn new(payload: Payload, prev_id: Option<RecordId>, creator: Creator, tick: Tick) -> Self {
        let id = compute_id(&payload, prev_id.as_ref(), &creator, tick);
        Self {
            id,
            payload,
            prev_id,
            creator,
            tick,
            signature: None,
        }
    }

    /// Canonical bytes: variant tag + payload fields, prev-id or empty,
    /// creator bytes, tick as u64 big-endian. The signature is never part
    /// of the canonical form.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.payload, self.prev_id.as_ref(), &self.creator, self.tick)
    }

    /// The bytes a detached signature commits to.
    pub fn id_bytes(&self) -> &[u8; 32] {
        self.id.as_bytes()
    }

    /// Attach a detached signature. Signing twice is an error.
    pub fn attach_signature(&mut self, signature: EcdsaSignature) -> Result<(), FilamentError> {
        if self.signature.is_some() {
            return Err(FilamentError::AlreadySigned(self.id.to_hex()));
        }
        self.signature = Some(signature);
        Ok(())
    }

    /// Structural self-check: the id must match a recomputation over the
    /// canonical form, and a signature must be present unless the record is
    /// a system-minted root. Does not verify the signature against a key.
    pub fn verify_basic(&self) -> Result<(), FilamentError> {
        let expected = compute_id(&self.payload, self.prev_id.as_ref(), &self.creator, self.tick);
        if expected != self.id {
            return Err(FilamentError::IdMismatch {
                expected: expected.to_hex(),
                got: self.id.to_hex(),
            });
        }
        if self.signature.is_none() && !self.is_system_root() {
            return Err(FilamentError::SignatureMissing(self.id.to_hex()));
        }
        Ok(())
    }

    pub fn is_root(&self) -> bool {
        matches!(self.payload, Payload::Root { .. })
    }

    pub fn is_ownership(&self) -> bool {
        matches!(self.payload, Payload::Ownership { .. })
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self.payload, Payload::Transfer { .. })
    }

    /// A well-formed system root: system creator, root payload, no prev-id.
    pub fn is_system_root(&self) -> bool {
        self.creator.is_system() && self.is_root() && self.prev_id.is_none()
    }

    /// For transfers, the designated next owner.
    pub fn next_owner(&self) -> Option<&EcdsaPublicKey> {
        match &self.payload {
            Payload::Transfer { next_owner, .. } => Some(next_owner),
            _ => None,
        }
    }
}

fn canonical_bytes(
    payload: &Payload,
    prev_id: Option<&RecordId>,
    creator: &Creator,
    tick: Tick,
) -> Vec<u8> {
    let mut w = CanonicalWriter::new();
    payload.write_canonical(&mut w);
    w.put_opt_digest(prev_id.map(|p| p.as_bytes()));
    w.put_bytes(creator.canonical_bytes());
    w.put_u64(tick);
    w.finish()
}

fn compute_id(
    payload: &Payload,
    prev_id: Option<&RecordId>,
    creator: &Creator,
    tick: Tick,
) -> RecordId {
    let bytes = canonical_bytes(payload, prev_id, creator, tick);
    let digest = Sha256::digest(&bytes);
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&digest);
    RecordId::from_bytes(arr)
}
