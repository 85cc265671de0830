use filament_core::error::FilamentError;
use filament_core::record::{Payload, Record};
use filament_core::types::{ChainId, Creator, DefinitionHash, EcdsaPublicKey, RecordId, Tick};
use filament_crypto::KeyPair;
use tracing::debug;

// ── ChainState ───────────────────────────────────────────────────────────────

/// Per-chain ownership state machine.
///
/// Root —ownership→ Owned —transfer→ Transferred —transfer→ Transferred.
/// Ownership cannot be re-applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainState {
    Root,
    Owned,
    Transferred,
}

// ── ForkCheck ────────────────────────────────────────────────────────────────

/// Non-mutating verdict on a candidate extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForkCheck {
    /// The candidate is a valid extension of the current tail.
    NotFork,
    /// Another record in the log already extends the candidate's prev-id.
    PositionConflict { existing: RecordId },
    /// The candidate is a transfer by a creator who already transferred
    /// this chain to a different next owner.
    DoubleSpend {
        attacker: EcdsaPublicKey,
        conflicting: Vec<RecordId>,
    },
}

// ── ChainLog ─────────────────────────────────────────────────────────────────

/// The append-only, single-path, cryptographically linked log of one chain:
/// exactly one root, at most one ownership record, then an ordered sequence
/// of transfers. Forks are rejected, never merged.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainLog {
    root: Record,
    ownership: Option<Record>,
    transfers: Vec<Record>,
    /// Face value, fixed at provisioning from the serial number and the
    /// chain definition. Never mutated.
    value: u64,
}

impl ChainLog {
    /// Mint a new chain: a system-created root record with no signature.
    pub fn create(definition_hash: DefinitionHash, serial: u64, value: u64, tick: Tick) -> Self {
        let root = Record::new(
            Payload::Root {
                definition_hash,
                serial,
            },
            None,
            Creator::System,
            tick,
        );
        debug!(chain = %root.id, serial, value, "chain root created");
        Self {
            root,
            ownership: None,
            transfers: Vec::new(),
            value,
        }
    }

    /// Restore from parts without re-running append checks. Callers must
    /// have validated the invariants (see `dump::from_dump`).
    pub(crate) fn from_parts(
        root: Record,
        ownership: Option<Record>,
        transfers: Vec<Record>,
        value: u64,
    ) -> Self {
        Self {
            root,
            ownership,
            transfers,
            value,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn chain_id(&self) -> ChainId {
        ChainId(self.root.id)
    }

    pub fn root(&self) -> &Record {
        &self.root
    }

    pub fn ownership(&self) -> Option<&Record> {
        self.ownership.as_ref()
    }

    pub fn transfers(&self) -> &[Record] {
        &self.transfers
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn serial(&self) -> u64 {
        match self.root.payload {
            Payload::Root { serial, .. } => serial,
            _ => unreachable!("chain root is always a root record"),
        }
    }

    pub fn state(&self) -> ChainState {
        if !self.transfers.is_empty() {
            ChainState::Transferred
        } else if self.ownership.is_some() {
            ChainState::Owned
        } else {
            ChainState::Root
        }
    }

    /// Number of records in the log.
    pub fn len(&self) -> usize {
        1 + usize::from(self.ownership.is_some()) + self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The most recent record (the tail every extension must link to).
    pub fn latest(&self) -> &Record {
        self.transfers
            .last()
            .or(self.ownership.as_ref())
            .unwrap_or(&self.root)
    }

    /// The owner a transfer must currently be signed by: the most recent
    /// transfer's next-owner, else the ownership record's owner.
    pub fn current_owner(&self) -> Option<&EcdsaPublicKey> {
        if let Some(last) = self.transfers.last() {
            return last.next_owner();
        }
        match self.ownership.as_ref().map(|r| &r.payload) {
            Some(Payload::Ownership { owner }) => Some(owner),
            _ => None,
        }
    }

    /// Records in insertion order, root first.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        std::iter::once(&self.root)
            .chain(self.ownership.iter())
            .chain(self.transfers.iter())
    }

    /// Walk from the latest record back to the root.
    pub fn walk_to_root(&self) -> impl Iterator<Item = &Record> {
        self.transfers
            .iter()
            .rev()
            .chain(self.ownership.iter())
            .chain(std::iter::once(&self.root))
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records().find(|r| r.id == *id)
    }

    /// The record whose prev-id is `prev`, if any (each position has at
    /// most one successor).
    pub fn successor_of(&self, prev: &RecordId) -> Option<&Record> {
        self.records().find(|r| r.prev_id.as_ref() == Some(prev))
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Produce, sign, and append the ownership record. Only valid while the
    /// log holds exactly the root.
    pub fn create_ownership(
        &mut self,
        owner: &KeyPair,
        tick: Tick,
    ) -> Result<RecordId, FilamentError> {
        if self.state() != ChainState::Root {
            return Err(FilamentError::OwnershipViolation(format!(
                "ownership cannot be re-applied to chain {}",
                self.chain_id()
            )));
        }
        let mut record = Record::new(
            Payload::Ownership {
                owner: owner.public_key.clone(),
            },
            Some(self.root.id),
            Creator::User(owner.public_key.clone()),
            tick,
        );
        owner.sign_record(&mut record)?;
        let id = record.id;
        debug!(chain = %self.chain_id(), owner = %owner.public_key, "ownership assigned");
        self.ownership = Some(record);
        Ok(id)
    }

    /// Validate position and ownership, then append. The log is unchanged
    /// on any failure; appending the same record twice returns
    /// `PositionConflict` the second time.
    pub fn append(&mut self, record: Record) -> Result<(), FilamentError> {
        record.verify_basic()?;

        if self.contains(&record.id) {
            return Err(FilamentError::PositionConflict {
                prev: record
                    .prev_id
                    .map(|p| p.to_hex())
                    .unwrap_or_else(|| "-".into()),
                existing: record.id.to_hex(),
            });
        }

        match &record.payload {
            Payload::Root { .. } => {
                return Err(FilamentError::LogicalValidationFailed(format!(
                    "chain {} already has a root",
                    self.chain_id()
                )));
            }
            Payload::Rejection { .. } => return Err(FilamentError::RejectionNotStorable),
            Payload::Ownership { owner } => {
                if self.state() != ChainState::Root {
                    return Err(FilamentError::OwnershipViolation(format!(
                        "ownership cannot be re-applied to chain {}",
                        self.chain_id()
                    )));
                }
                self.check_position(&record)?;
                if record.creator.public_key() != Some(owner) {
                    return Err(FilamentError::OwnershipViolation(
                        "ownership record must be created by its owner".into(),
                    ));
                }
                debug!(chain = %self.chain_id(), owner = %owner, "ownership appended");
                self.ownership = Some(record);
            }
            Payload::Transfer {
                chain,
                next_owner,
                prev_record,
            } => {
                if *chain != self.chain_id() {
                    return Err(FilamentError::LogicalValidationFailed(format!(
                        "transfer addresses chain {chain}, log is {}",
                        self.chain_id()
                    )));
                }
                if record.prev_id.as_ref() != Some(prev_record) {
                    return Err(FilamentError::LogicalValidationFailed(
                        "transfer payload prev-record disagrees with the record link".into(),
                    ));
                }
                self.check_position(&record)?;
                let owner = self.current_owner().ok_or_else(|| {
                    FilamentError::OwnershipViolation(format!(
                        "chain {} has no owner to transfer from",
                        self.chain_id()
                    ))
                })?;
                if record.creator.public_key() != Some(owner) {
                    return Err(FilamentError::OwnershipViolation(format!(
                        "transfer creator {} is not the current owner {}",
                        record.creator, owner
                    )));
                }
                debug!(
                    chain = %self.chain_id(),
                    from = %owner,
                    to = %next_owner,
                    "transfer appended"
                );
                self.transfers.push(record);
            }
        }
        Ok(())
    }

    /// Position checks shared by ownership and transfer appends: a present,
    /// resolvable prev-id that is the current tail and has no successor.
    fn check_position(&self, record: &Record) -> Result<(), FilamentError> {
        let prev = record
            .prev_id
            .as_ref()
            .ok_or_else(|| FilamentError::MissingPreviousId(record.id.to_hex()))?;
        if !self.contains(prev) {
            return Err(FilamentError::PreviousRecordNotFound(prev.to_hex()));
        }
        if let Some(existing) = self.successor_of(prev) {
            return Err(FilamentError::PositionConflict {
                prev: prev.to_hex(),
                existing: existing.id.to_hex(),
            });
        }
        // prev resolves and has no successor — it is the tail.
        debug_assert_eq!(*prev, self.latest().id);
        Ok(())
    }

    // ── Fork detection ───────────────────────────────────────────────────────

    /// Without mutating state, classify a candidate record: valid
    /// extension, position conflict, or double-spend.
    pub fn detect_fork(&self, candidate: &Record) -> ForkCheck {
        // A transfer by a creator who already transferred this chain to a
        // different next owner is a double-spend regardless of position.
        if let (Payload::Transfer { next_owner, .. }, Some(creator_pk)) =
            (&candidate.payload, candidate.creator.public_key())
        {
            let conflicting: Vec<RecordId> = self
                .transfers
                .iter()
                .filter(|t| {
                    t.id != candidate.id
                        && t.creator.public_key() == Some(creator_pk)
                        && t.next_owner() != Some(next_owner)
                })
                .map(|t| t.id)
                .collect();
            if !conflicting.is_empty() {
                return ForkCheck::DoubleSpend {
                    attacker: creator_pk.clone(),
                    conflicting,
                };
            }
        }

        if let Some(prev) = candidate.prev_id.as_ref() {
            if let Some(existing) = self.successor_of(prev) {
                if existing.id != candidate.id {
                    return ForkCheck::PositionConflict {
                        existing: existing.id,
                    };
                }
            }
        }

        ForkCheck::NotFork
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_chain() -> (ChainLog, KeyPair) {
        let kp = KeyPair::generate();
        let mut chain = ChainLog::create(DefinitionHash([1u8; 32]), 1, 100, 0);
        chain.create_ownership(&kp, 0).unwrap();
        (chain, kp)
    }

    fn transfer_record(chain: &ChainLog, from: &KeyPair, to: &KeyPair, tick: Tick) -> Record {
        let prev = chain.latest().id;
        let mut record = Record::new(
            Payload::Transfer {
                chain: chain.chain_id(),
                next_owner: to.public_key.clone(),
                prev_record: prev,
            },
            Some(prev),
            Creator::User(from.public_key.clone()),
            tick,
        );
        from.sign_record(&mut record).unwrap();
        record
    }

    #[test]
    fn fresh_chain_is_in_root_state() {
        let chain = ChainLog::create(DefinitionHash([1u8; 32]), 7, 50, 0);
        assert_eq!(chain.state(), ChainState::Root);
        assert_eq!(chain.current_owner(), None);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.serial(), 7);
    }

    #[test]
    fn ownership_moves_to_owned() {
        let (chain, kp) = owned_chain();
        assert_eq!(chain.state(), ChainState::Owned);
        assert_eq!(chain.current_owner(), Some(&kp.public_key));
        assert_eq!(
            chain.ownership().unwrap().prev_id,
            Some(chain.root().id)
        );
    }

    #[test]
    fn ownership_cannot_be_reapplied() {
        let (mut chain, _kp) = owned_chain();
        let other = KeyPair::generate();
        assert!(matches!(
            chain.create_ownership(&other, 1),
            Err(FilamentError::OwnershipViolation(_))
        ));
    }

    #[test]
    fn valid_transfer_extends_the_path() {
        let (mut chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 1);
        chain.append(record).unwrap();
        assert_eq!(chain.state(), ChainState::Transferred);
        assert_eq!(chain.current_owner(), Some(&to.public_key));
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn walk_visits_each_record_once_ending_at_root() {
        let (mut chain, kp) = owned_chain();
        let to = KeyPair::generate();
        chain.append(transfer_record(&chain, &kp, &to, 1)).unwrap();

        let walked: Vec<RecordId> = chain.walk_to_root().map(|r| r.id).collect();
        assert_eq!(walked.len(), 3);
        assert_eq!(walked.last(), Some(&chain.root().id));
        let unique: std::collections::HashSet<_> = walked.iter().collect();
        assert_eq!(unique.len(), walked.len());
    }

    #[test]
    fn transfer_by_non_owner_is_rejected() {
        let (mut chain, _kp) = owned_chain();
        let stranger = KeyPair::generate();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &stranger, &to, 1);
        assert!(matches!(
            chain.append(record),
            Err(FilamentError::OwnershipViolation(_))
        ));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn double_append_returns_position_conflict_and_leaves_log_unchanged() {
        let (mut chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 1);
        chain.append(record.clone()).unwrap();
        let before = chain.clone();
        assert!(matches!(
            chain.append(record),
            Err(FilamentError::PositionConflict { .. })
        ));
        assert_eq!(chain, before);
    }

    #[test]
    fn forked_sibling_returns_position_conflict() {
        let (mut chain, kp) = owned_chain();
        let v = KeyPair::generate();
        let w = KeyPair::generate();
        // Both transfers link to the ownership record.
        let t_v = transfer_record(&chain, &kp, &v, 1);
        let t_w = transfer_record(&chain, &kp, &w, 1);
        chain.append(t_v).unwrap();
        assert!(matches!(
            chain.append(t_w),
            Err(FilamentError::PositionConflict { .. })
        ));
    }

    #[test]
    fn detect_fork_flags_double_spend() {
        let (mut chain, kp) = owned_chain();
        let v = KeyPair::generate();
        let w = KeyPair::generate();
        let t_v = transfer_record(&chain, &kp, &v, 1);
        let t_w = transfer_record(&chain, &kp, &w, 1);
        chain.append(t_v.clone()).unwrap();

        match chain.detect_fork(&t_w) {
            ForkCheck::DoubleSpend {
                attacker,
                conflicting,
            } => {
                assert_eq!(attacker, kp.public_key);
                assert_eq!(conflicting, vec![t_v.id]);
            }
            other => panic!("expected DoubleSpend, got {other:?}"),
        }
    }

    #[test]
    fn detect_fork_accepts_valid_extension() {
        let (mut chain, kp) = owned_chain();
        let v = KeyPair::generate();
        let t_v = transfer_record(&chain, &kp, &v, 1);
        assert_eq!(chain.detect_fork(&t_v), ForkCheck::NotFork);
        chain.append(t_v).unwrap();

        // Onward transfer by the new owner is no fork either.
        let w = KeyPair::generate();
        let t_w = transfer_record(&chain, &v, &w, 2);
        assert_eq!(chain.detect_fork(&t_w), ForkCheck::NotFork);
    }

    #[test]
    fn rejection_records_never_enter_the_log() {
        let (mut chain, kp) = owned_chain();
        let mut rejection = Record::new(
            Payload::Rejection {
                rejected: chain.root().id,
                reason: "test".into(),
                rejector: Creator::User(kp.public_key.clone()),
                rejected_at: 1,
            },
            Some(chain.latest().id),
            Creator::User(kp.public_key.clone()),
            1,
        );
        kp.sign_record(&mut rejection).unwrap();
        assert_eq!(
            chain.append(rejection),
            Err(FilamentError::RejectionNotStorable)
        );
    }
}
