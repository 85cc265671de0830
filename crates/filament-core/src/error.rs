use thiserror::Error;

/// Workspace-wide error type. Every public core operation returns a typed
/// failure from this set; no panic crosses a public boundary outside tests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilamentError {
    // ── Definition / input errors ────────────────────────────────────────────
    #[error("malformed chain definition: {0}")]
    MalformedDefinition(String),

    #[error("chain definition has no ranges")]
    EmptyDefinition,

    #[error("invalid range: start {start} > end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("range starting at {start} has non-positive value")]
    NonPositiveValue { start: u64 },

    #[error("ranges [{a_start}..] and [{b_start}..] overlap")]
    OverlappingRanges { a_start: u64, b_start: u64 },

    #[error("serial {0} is not covered by the chain definition")]
    SerialOutOfRange(u64),

    // ── Structural errors ────────────────────────────────────────────────────
    #[error("record id does not match its canonical form: expected {expected}, got {got}")]
    IdMismatch { expected: String, got: String },

    #[error("record {0} has no signature")]
    SignatureMissing(String),

    #[error("record {0} is already signed")]
    AlreadySigned(String),

    #[error("record {0} has no previous-record id")]
    MissingPreviousId(String),

    #[error("previous record {0} not found in chain")]
    PreviousRecordNotFound(String),

    #[error("circular reference at record {0}")]
    CircularReference(String),

    #[error("system-created record {0} is not a well-formed root")]
    InvalidSystemRecord(String),

    #[error("root record data invalid: {0}")]
    InvalidRootData(String),

    #[error("rejection records are carried by security messages only")]
    RejectionNotStorable,

    // ── Signature errors ─────────────────────────────────────────────────────
    #[error("signature invalid for record {0}")]
    SignatureInvalid(String),

    #[error("malformed public key: {0}")]
    KeyInvalid(String),

    // ── Policy errors ────────────────────────────────────────────────────────
    #[error("creator {0} is blacklisted")]
    CreatorBlacklisted(String),

    #[error("ownership violation: {0}")]
    OwnershipViolation(String),

    #[error("position conflict at prev {prev}: record {existing} already extends it")]
    PositionConflict { prev: String, existing: String },

    #[error("double-spend detected on chain {chain} by {attacker}")]
    DoubleSpendDetected { chain: String, attacker: String },

    #[error("unapproved fork: {candidate} forks at {prev}")]
    UnapprovedFork { prev: String, candidate: String },

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    // ── Chain-walk errors ────────────────────────────────────────────────────
    #[error("signature verification failed during chain walk: {0}")]
    SignatureVerificationFailed(String),

    #[error("basic validation failed during chain walk: {0}")]
    BasicValidationFailed(String),

    #[error("chain logic invalid: {0}")]
    LogicalValidationFailed(String),

    // ── Temporal errors ──────────────────────────────────────────────────────
    #[error("record arrived {delay} ticks after creation, limit {limit}; rejecting")]
    TimeValidationFailed { delay: u64, limit: u64 },

    // ── Runtime errors ───────────────────────────────────────────────────────
    #[error("verification error: {0}")]
    VerificationError(String),

    #[error("integrity verification error: {0}")]
    IntegrityVerificationError(String),

    #[error("legality validation error: {0}")]
    LegalityValidationError(String),

    #[error("security validation error: {0}")]
    SecurityValidationError(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl FilamentError {
    /// Failures that leave an audit trail in the security ledger on top of
    /// the rejection itself.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            FilamentError::DoubleSpendDetected { .. }
                | FilamentError::CreatorBlacklisted(_)
                | FilamentError::OwnershipViolation(_)
        )
    }
}
