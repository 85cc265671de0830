use std::collections::HashSet;
use std::time::Duration;

use filament_chain::{ChainLog, ChainState, ForkCheck};
use filament_core::error::FilamentError;
use filament_core::record::{Payload, Record};
use filament_core::types::{ChainId, Creator, EcdsaPublicKey, RecordId, Tick};
use filament_crypto::SignatureError;
use filament_security::{ForkInfo, ForkReason, ForkWarning, SecurityLedger, SecurityState};
use tracing::{debug, warn};

use crate::cache::ValidationCache;
use crate::params::NetworkParams;
use crate::report::{AttackType, ConfirmationStatus, DoubleSpendReport};

/// Adjudicates records and whole chains against cryptographic, structural,
/// and policy rules. Results of the expensive checks are memoized under
/// stable keys with a TTL; the first failing precondition short-circuits.
/// No method panics; every failure is a typed [`FilamentError`].
pub struct Validator {
    cache: ValidationCache,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            cache: ValidationCache::default(),
        }
    }

    pub fn with_cache_ttl(ttl: Duration) -> Self {
        Self {
            cache: ValidationCache::new(ttl),
        }
    }

    // ── Signature ────────────────────────────────────────────────────────────

    /// Verify a record's detached signature against its creator key.
    ///
    /// A system-created record is signature-valid when and only when it is
    /// a well-formed root (root payload, no prev-id); any other
    /// system-created record fails.
    pub fn verify_signature(&mut self, record: &Record) -> Result<(), FilamentError> {
        let key = format!("sig:{}", record.id);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }
        let result = self.verify_signature_uncached(record);
        self.cache.insert(key, result.clone());
        result
    }

    fn verify_signature_uncached(&self, record: &Record) -> Result<(), FilamentError> {
        let creator_key = match &record.creator {
            Creator::System => {
                if record.is_system_root() {
                    return Ok(());
                }
                return Err(FilamentError::InvalidSystemRecord(record.id.to_hex()));
            }
            Creator::User(pk) => pk,
        };
        let signature = record
            .signature
            .as_ref()
            .ok_or_else(|| FilamentError::SignatureMissing(record.id.to_hex()))?;
        filament_crypto::verify_signature(creator_key, record.id_bytes(), signature).map_err(
            |e| match e {
                SignatureError::KeyInvalid(_) => FilamentError::KeyInvalid(e.to_string()),
                SignatureError::SignatureInvalid => {
                    FilamentError::SignatureInvalid(record.id.to_hex())
                }
                SignatureError::SecretKeyInvalid => FilamentError::VerificationError(e.to_string()),
            },
        )
    }

    // ── Chain integrity ──────────────────────────────────────────────────────

    /// Walk from `from` (or the latest record) toward the root, visiting
    /// each record once: signature, structural self-check, and prev-id
    /// resolution per record, then a root-first ownership-logic pass over
    /// the walked path.
    pub fn verify_chain_integrity(
        &mut self,
        chain: &ChainLog,
        from: Option<&RecordId>,
    ) -> Result<(), FilamentError> {
        let tip = match from {
            Some(id) => chain
                .get(id)
                .ok_or_else(|| FilamentError::PreviousRecordNotFound(id.to_hex()))?,
            None => chain.latest(),
        };
        let key = format!("integrity:{}:{}", chain.chain_id(), tip.id);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }
        let result = self.integrity_walk(chain, tip);
        self.cache.insert(key, result.clone());
        result
    }

    fn integrity_walk(&mut self, chain: &ChainLog, tip: &Record) -> Result<(), FilamentError> {
        let mut visited: HashSet<RecordId> = HashSet::new();
        let mut path: Vec<&Record> = Vec::new();
        let mut current = tip;
        loop {
            if !visited.insert(current.id) {
                return Err(FilamentError::CircularReference(current.id.to_hex()));
            }
            self.verify_signature(current)
                .map_err(|e| FilamentError::SignatureVerificationFailed(e.to_string()))?;
            current
                .verify_basic()
                .map_err(|e| FilamentError::BasicValidationFailed(e.to_string()))?;
            path.push(current);
            match current.prev_id.as_ref() {
                Some(prev) => {
                    current = chain
                        .get(prev)
                        .ok_or_else(|| FilamentError::PreviousRecordNotFound(prev.to_hex()))?;
                }
                None => break,
            }
        }

        // Logic pass, root first: ownership sets the expected owner, each
        // transfer must be created by it and hands it to the next owner.
        path.reverse();
        let mut expected: Option<&EcdsaPublicKey> = None;
        for (i, record) in path.iter().enumerate() {
            match &record.payload {
                Payload::Root { .. } => {
                    if i != 0 {
                        return Err(FilamentError::LogicalValidationFailed(
                            "root record is not at the head of the walk".into(),
                        ));
                    }
                }
                Payload::Ownership { owner } => {
                    if i != 1 || expected.is_some() {
                        return Err(FilamentError::LogicalValidationFailed(
                            "ownership record must directly follow the root".into(),
                        ));
                    }
                    expected = Some(owner);
                }
                Payload::Transfer { next_owner, .. } => {
                    let owner = expected.ok_or_else(|| {
                        FilamentError::LogicalValidationFailed(
                            "transfer before any ownership assignment".into(),
                        )
                    })?;
                    if record.creator.public_key() != Some(owner) {
                        return Err(FilamentError::LogicalValidationFailed(format!(
                            "transfer {} created by {}, expected owner {}",
                            record.id, record.creator, owner
                        )));
                    }
                    expected = Some(next_owner);
                }
                Payload::Rejection { .. } => {
                    return Err(FilamentError::LogicalValidationFailed(
                        "rejection record inside a chain".into(),
                    ));
                }
            }
            if i == 0 && !record.is_root() {
                return Err(FilamentError::LogicalValidationFailed(
                    "walk did not terminate at a root".into(),
                ));
            }
        }
        Ok(())
    }

    // ── Legality ─────────────────────────────────────────────────────────────

    /// Composite policy check: blacklist, ownership-transition legality,
    /// position, and fork policy, in that order. When a sibling shares the
    /// candidate's prev-id the fork policy adjudicates: a double-spend
    /// always rejects; an unapproved sibling rejects with
    /// `PositionConflict`; an approved (prev-id, record-id) pair passes.
    pub fn validate_legality(
        &mut self,
        record: &Record,
        chain: &ChainLog,
        security: &SecurityState,
    ) -> Result<(), FilamentError> {
        let key = format!("legality:{}:{}", record.id, chain.chain_id());
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }
        let result = Self::legality_uncached(record, chain, security);
        self.cache.insert(key, result.clone());
        result
    }

    fn legality_uncached(
        record: &Record,
        chain: &ChainLog,
        security: &SecurityState,
    ) -> Result<(), FilamentError> {
        // 1. Blacklist (system records are exempt).
        if let Some(pk) = record.creator.public_key() {
            if security.is_blacklisted(pk) {
                return Err(FilamentError::CreatorBlacklisted(pk.short_b58()));
            }
        }

        // 2. Ownership-transition legality.
        match &record.payload {
            Payload::Root { .. } => {
                return Err(FilamentError::LogicalValidationFailed(
                    "a root cannot extend an existing chain".into(),
                ));
            }
            Payload::Rejection { .. } => return Err(FilamentError::RejectionNotStorable),
            Payload::Ownership { .. } => {
                if chain.state() != ChainState::Root {
                    return Err(FilamentError::OwnershipViolation(format!(
                        "chain {} already has an owner",
                        chain.chain_id()
                    )));
                }
            }
            Payload::Transfer { .. } => {
                let owner = chain.current_owner().ok_or_else(|| {
                    FilamentError::OwnershipViolation(format!(
                        "chain {} has no owner to transfer from",
                        chain.chain_id()
                    ))
                })?;
                if record.creator.public_key() != Some(owner) {
                    return Err(FilamentError::OwnershipViolation(format!(
                        "creator {} is not the current owner {}",
                        record.creator, owner
                    )));
                }
            }
        }

        // 3. Position: not already present, prev-id present and resolvable.
        if chain.contains(&record.id) {
            return Err(FilamentError::PositionConflict {
                prev: record
                    .prev_id
                    .map(|p| p.to_hex())
                    .unwrap_or_else(|| "-".into()),
                existing: record.id.to_hex(),
            });
        }
        let prev = record
            .prev_id
            .as_ref()
            .ok_or_else(|| FilamentError::MissingPreviousId(record.id.to_hex()))?;
        if !chain.contains(prev) {
            return Err(FilamentError::PreviousRecordNotFound(prev.to_hex()));
        }

        // 4. Fork policy.
        match chain.detect_fork(record) {
            ForkCheck::NotFork => Ok(()),
            ForkCheck::DoubleSpend { attacker, .. } => Err(FilamentError::DoubleSpendDetected {
                chain: chain.chain_id().to_hex(),
                attacker: attacker.short_b58(),
            }),
            ForkCheck::PositionConflict { existing } => {
                if security.is_fork_approved(prev, &record.id) {
                    debug!(record = %record.id, "approved fork admitted");
                    Ok(())
                } else {
                    Err(FilamentError::PositionConflict {
                        prev: prev.to_hex(),
                        existing: existing.to_hex(),
                    })
                }
            }
        }
    }

    // ── Double-spend ─────────────────────────────────────────────────────────

    /// Non-destructive double-spend probe: a transfer whose creator already
    /// transferred this chain is reported — to a different next owner as a
    /// `DoubleSpend`, to the same next owner as a `DuplicateTransfer`.
    pub fn detect_double_spend(&self, record: &Record, chain: &ChainLog) -> DoubleSpendReport {
        let (next_owner, creator) = match (&record.payload, record.creator.public_key()) {
            (Payload::Transfer { next_owner, .. }, Some(creator)) => (next_owner, creator),
            _ => return DoubleSpendReport::clean(),
        };

        let mut diverging = Vec::new();
        let mut duplicates = Vec::new();
        for t in chain.transfers() {
            if t.id == record.id || t.creator.public_key() != Some(creator) {
                continue;
            }
            if t.next_owner() == Some(next_owner) {
                duplicates.push(t.id);
            } else {
                diverging.push(t.id);
            }
        }

        if !diverging.is_empty() {
            DoubleSpendReport::detected(creator.clone(), diverging, AttackType::DoubleSpend)
        } else if !duplicates.is_empty() {
            DoubleSpendReport::detected(creator.clone(), duplicates, AttackType::DuplicateTransfer)
        } else {
            DoubleSpendReport::clean()
        }
    }

    // ── Temporal checks ──────────────────────────────────────────────────────

    /// Reject records that arrive more than two broadcast-times after
    /// creation.
    pub fn validate_reception_time(
        &self,
        record: &Record,
        receive_tick: Tick,
        params: &NetworkParams,
    ) -> Result<(), FilamentError> {
        let delay = receive_tick.saturating_sub(record.tick);
        let limit = params.max_reception_delay();
        if delay > limit {
            return Err(FilamentError::TimeValidationFailed { delay, limit });
        }
        Ok(())
    }

    /// Adjudicate the confirmation wait: four broadcast-times after
    /// reception. Inside the window the result is `Pending`; after it, a
    /// conflict record or a referencing fork warning whose tick falls in
    /// the inclusive window invalidates; otherwise the record confirms.
    pub fn validate_reception_confirmation(
        &self,
        record: &Record,
        receive_tick: Tick,
        now_tick: Tick,
        params: &NetworkParams,
        conflicts: &[Record],
        warnings: &[ForkWarning],
    ) -> ConfirmationStatus {
        let wait_end = receive_tick + params.confirmation_wait();
        if now_tick < wait_end {
            return ConfirmationStatus::Pending {
                remaining: wait_end - now_tick,
            };
        }

        let in_window = |tick: Tick| tick >= receive_tick && tick <= wait_end;

        if let Some(conflict) = conflicts
            .iter()
            .find(|c| c.id != record.id && in_window(c.tick))
        {
            return ConfirmationStatus::ConflictDetected {
                conflict: conflict.id,
            };
        }

        let chain_hint = record_chain_hint(record);
        if let Some(warning) = warnings.iter().find(|w| {
            in_window(w.tick)
                && (w.record == record.id
                    || w.conflicting.contains(&record.id)
                    || chain_hint.map(|c| w.chain == c).unwrap_or(false))
        }) {
            return ConfirmationStatus::WarningDetected {
                warning_tick: warning.tick,
            };
        }

        ConfirmationStatus::Confirmed
    }

    // ── Security composite ───────────────────────────────────────────────────

    /// Legality + double-spend + integrity. A detected double-spend
    /// generates a fork warning and processes it through the security
    /// ledger, which blacklists the attacker. Security-relevant rejections
    /// leave an audit trail.
    pub fn validate_security(
        &mut self,
        record: &Record,
        chain: &ChainLog,
        ledger: &mut SecurityLedger,
        now_tick: Tick,
    ) -> Result<(), FilamentError> {
        if let Err(e) = self.validate_legality(record, chain, ledger.state()) {
            match &e {
                FilamentError::DoubleSpendDetected { .. } => {
                    let report = self.detect_double_spend(record, chain);
                    let warning = ForkWarning::from_info(
                        ForkInfo {
                            reason: ForkReason::DoubleSpend,
                            chain: chain.chain_id(),
                            record: record.id,
                            attacker: report.attacker,
                            conflicting: report.conflicting,
                        },
                        now_tick,
                    );
                    ledger.record_warning(warning.clone());
                    ledger.process_fork_warning(&warning, now_tick);
                }
                FilamentError::OwnershipViolation(_) => {
                    let warning = ForkWarning::from_info(
                        ForkInfo {
                            reason: ForkReason::UnauthorizedTransfer,
                            chain: chain.chain_id(),
                            record: record.id,
                            attacker: record.creator.public_key().cloned(),
                            conflicting: Vec::new(),
                        },
                        now_tick,
                    );
                    ledger.record_warning(warning.clone());
                    ledger.process_fork_warning(&warning, now_tick);
                }
                FilamentError::CreatorBlacklisted(_) => {
                    ledger.record_rejection(
                        record.creator.public_key().cloned(),
                        Some(chain.chain_id()),
                        e.to_string(),
                        now_tick,
                    );
                }
                _ => {}
            }
            warn!(record = %record.id, error = %e, "security validation rejected record");
            return Err(e);
        }

        // A duplicate transfer can pass legality when it links elsewhere in
        // history; surface it as a warning without auto-blacklisting.
        let report = self.detect_double_spend(record, chain);
        if report.attack_type == Some(AttackType::DuplicateTransfer) {
            let warning = ForkWarning::from_info(
                ForkInfo {
                    reason: ForkReason::Other("duplicate transfer".into()),
                    chain: chain.chain_id(),
                    record: record.id,
                    attacker: report.attacker,
                    conflicting: report.conflicting,
                },
                now_tick,
            );
            ledger.record_warning(warning);
        }

        self.verify_chain_integrity(chain, None)
            .map_err(|e| FilamentError::SecurityValidationError(e.to_string()))?;
        Ok(())
    }

    // ── Cache management ─────────────────────────────────────────────────────

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Run the reaper if its wall-clock interval elapsed. Invoked by the
    /// engine once per tick; independent of the logical clock.
    pub fn maybe_sweep_cache(&mut self) -> usize {
        self.cache.maybe_sweep()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// The chain a record pertains to, when the payload names one.
fn record_chain_hint(record: &Record) -> Option<ChainId> {
    match &record.payload {
        Payload::Transfer { chain, .. } => Some(*chain),
        Payload::Root { .. } => Some(ChainId(record.id)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_core::types::{Creator, DefinitionHash, EcdsaSignature};
    use filament_crypto::KeyPair;

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

    // ── Signature ────────────────────────────────────────────────────────────

    #[test]
    fn valid_signature_verifies() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 1);
        let mut v = Validator::new();
        assert!(v.verify_signature(&record).is_ok());
    }

    #[test]
    fn forged_signature_fails() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let mut record = transfer_record(&chain, &kp, &to, 1);
        record.signature = Some(EcdsaSignature(vec![0u8; 64]));
        let mut v = Validator::new();
        assert!(matches!(
            v.verify_signature(&record),
            Err(FilamentError::SignatureInvalid(_))
        ));
    }

    #[test]
    fn system_root_is_signature_valid() {
        let chain = ChainLog::create(DefinitionHash([1u8; 32]), 1, 100, 0);
        let mut v = Validator::new();
        assert!(v.verify_signature(chain.root()).is_ok());
    }

    #[test]
    fn system_non_root_is_rejected() {
        let kp = KeyPair::generate();
        let record = Record::new(
            Payload::Ownership {
                owner: kp.public_key.clone(),
            },
            Some(RecordId::from_bytes([1u8; 32])),
            Creator::System,
            1,
        );
        let mut v = Validator::new();
        assert!(matches!(
            v.verify_signature(&record),
            Err(FilamentError::InvalidSystemRecord(_))
        ));
    }

    // ── Integrity ────────────────────────────────────────────────────────────

    #[test]
    fn integrity_walk_accepts_valid_chain() {
        let (mut chain, u) = owned_chain();
        let v_kp = KeyPair::generate();
        chain.append(transfer_record(&chain, &u, &v_kp, 1)).unwrap();
        let w_kp = KeyPair::generate();
        chain
            .append(transfer_record(&chain, &v_kp, &w_kp, 2))
            .unwrap();

        let mut v = Validator::new();
        assert!(v.verify_chain_integrity(&chain, None).is_ok());
    }

    #[test]
    fn integrity_walk_from_interior_record() {
        let (mut chain, u) = owned_chain();
        let v_kp = KeyPair::generate();
        chain.append(transfer_record(&chain, &u, &v_kp, 1)).unwrap();
        let ownership_id = chain.ownership().unwrap().id;

        let mut v = Validator::new();
        assert!(v.verify_chain_integrity(&chain, Some(&ownership_id)).is_ok());
    }

    #[test]
    fn integrity_walk_rejects_unknown_from() {
        let (chain, _u) = owned_chain();
        let mut v = Validator::new();
        let missing = RecordId::from_bytes([0xFF; 32]);
        assert!(matches!(
            v.verify_chain_integrity(&chain, Some(&missing)),
            Err(FilamentError::PreviousRecordNotFound(_))
        ));
    }

    // ── Legality ─────────────────────────────────────────────────────────────

    #[test]
    fn legality_rejects_blacklisted_creator() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 1);

        let mut ledger = SecurityLedger::new();
        ledger.add_to_blacklist(
            kp.public_key.clone(),
            filament_security::BlacklistReason::Manual("test".into()),
            0,
        );

        let mut v = Validator::new();
        assert!(matches!(
            v.validate_legality(&record, &chain, ledger.state()),
            Err(FilamentError::CreatorBlacklisted(_))
        ));
    }

    #[test]
    fn legality_accepts_valid_transfer() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 1);
        let ledger = SecurityLedger::new();
        let mut v = Validator::new();
        assert!(v.validate_legality(&record, &chain, ledger.state()).is_ok());
    }

    #[test]
    fn approved_fork_passes_legality() {
        let (mut chain, kp) = owned_chain();
        // Two self-transfers from the same prev: the creator stays the
        // current owner and the next owners agree, so the only objection is
        // positional — exactly what fork approval exists to override.
        let t1 = transfer_record(&chain, &kp, &kp, 1);
        let prev = chain.latest().id;
        let mut t2 = Record::new(
            Payload::Transfer {
                chain: chain.chain_id(),
                next_owner: kp.public_key.clone(),
                prev_record: prev,
            },
            Some(prev),
            Creator::User(kp.public_key.clone()),
            2,
        );
        kp.sign_record(&mut t2).unwrap();
        chain.append(t1).unwrap();

        let mut ledger = SecurityLedger::new();
        let mut v = Validator::new();
        assert!(matches!(
            v.validate_legality(&t2, &chain, ledger.state()),
            Err(FilamentError::PositionConflict { .. })
        ));

        ledger.approve_fork(prev, t2.id);
        v.clear_cache();
        assert!(v.validate_legality(&t2, &chain, ledger.state()).is_ok());
    }

    // ── Double-spend ─────────────────────────────────────────────────────────

    #[test]
    fn detects_double_spend_with_conflicting_records() {
        let (mut chain, kp) = owned_chain();
        let v_kp = KeyPair::generate();
        let w_kp = KeyPair::generate();
        let t_v = transfer_record(&chain, &kp, &v_kp, 1);
        let t_w = transfer_record(&chain, &kp, &w_kp, 1);
        chain.append(t_v.clone()).unwrap();

        let v = Validator::new();
        let report = v.detect_double_spend(&t_w, &chain);
        assert!(report.is_double_spend);
        assert_eq!(report.attacker, Some(kp.public_key.clone()));
        assert_eq!(report.attack_type, Some(AttackType::DoubleSpend));
        assert!(report.conflicting.contains(&t_v.id));
        assert_eq!(report.severity, filament_security::Severity::High);
    }

    #[test]
    fn detects_divergence_between_two_appended_transfers() {
        // A chain that round-trips (U→V, V→U) and moves on (U→W) holds two
        // U-created transfers with different next owners; the probe must
        // surface the earlier one.
        let (mut chain, u) = owned_chain();
        let v_kp = KeyPair::generate();
        let w_kp = KeyPair::generate();
        let t1 = transfer_record(&chain, &u, &v_kp, 1);
        chain.append(t1.clone()).unwrap();
        chain.append(transfer_record(&chain, &v_kp, &u, 2)).unwrap();
        let t2 = transfer_record(&chain, &u, &w_kp, 3);
        chain.append(t2.clone()).unwrap();

        let v = Validator::new();
        let report = v.detect_double_spend(&t2, &chain);
        assert!(report.is_double_spend);
        assert_eq!(report.attack_type, Some(AttackType::DoubleSpend));
        assert!(report.conflicting.contains(&t1.id));
    }

    #[test]
    fn duplicate_transfer_is_classified() {
        let (mut chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let t1 = transfer_record(&chain, &kp, &to, 1);
        let prev = chain.latest().id;
        let mut t2 = Record::new(
            Payload::Transfer {
                chain: chain.chain_id(),
                next_owner: to.public_key.clone(),
                prev_record: prev,
            },
            Some(prev),
            Creator::User(kp.public_key.clone()),
            2,
        );
        kp.sign_record(&mut t2).unwrap();
        chain.append(t1).unwrap();

        let v = Validator::new();
        let report = v.detect_double_spend(&t2, &chain);
        assert!(report.is_double_spend);
        assert_eq!(report.attack_type, Some(AttackType::DuplicateTransfer));
    }

    // ── Temporal ─────────────────────────────────────────────────────────────

    #[test]
    fn reception_time_rejects_stale_records() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        // broadcast_time = 27, limit = 54: arrival at 155 is 55 late.
        let params = NetworkParams::new(8, 2, 1, 9);
        let v = Validator::new();
        let record = transfer_record(&chain, &kp, &to, 100);
        assert!(v.validate_reception_time(&record, 154, &params).is_ok());
        assert_eq!(
            v.validate_reception_time(&record, 155, &params),
            Err(FilamentError::TimeValidationFailed {
                delay: 55,
                limit: 54
            })
        );
    }

    #[test]
    fn confirmation_window_progression() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 100);
        let params = NetworkParams::new(8, 2, 1, 9);
        let v = Validator::new();

        // wait = 108, wait_end = 208
        assert_eq!(
            v.validate_reception_confirmation(&record, 100, 207, &params, &[], &[]),
            ConfirmationStatus::Pending { remaining: 1 }
        );
        assert_eq!(
            v.validate_reception_confirmation(&record, 100, 208, &params, &[], &[]),
            ConfirmationStatus::Confirmed
        );
    }

    #[test]
    fn conflict_inside_window_invalidates() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 100);
        let other = KeyPair::generate();
        let conflict = transfer_record(&chain, &kp, &other, 150);
        let params = NetworkParams::new(8, 2, 1, 9);
        let v = Validator::new();

        assert_eq!(
            v.validate_reception_confirmation(
                &record,
                100,
                208,
                &params,
                std::slice::from_ref(&conflict),
                &[]
            ),
            ConfirmationStatus::ConflictDetected {
                conflict: conflict.id
            }
        );
    }

    #[test]
    fn warning_inside_window_invalidates() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 100);
        let params = NetworkParams::new(8, 2, 1, 9);
        let v = Validator::new();

        let warning = ForkWarning::from_info(
            ForkInfo {
                reason: ForkReason::DoubleSpend,
                chain: chain.chain_id(),
                record: record.id,
                attacker: Some(kp.public_key.clone()),
                conflicting: vec![],
            },
            150,
        );
        assert_eq!(
            v.validate_reception_confirmation(
                &record,
                100,
                208,
                &params,
                &[],
                std::slice::from_ref(&warning)
            ),
            ConfirmationStatus::WarningDetected { warning_tick: 150 }
        );

        // A warning outside the window does not count.
        let late = ForkWarning { tick: 300, ..warning };
        assert_eq!(
            v.validate_reception_confirmation(
                &record,
                100,
                208,
                &params,
                &[],
                std::slice::from_ref(&late)
            ),
            ConfirmationStatus::Confirmed
        );
    }

    // ── Security composite ───────────────────────────────────────────────────

    #[test]
    fn double_spend_blacklists_the_attacker() {
        let (mut chain, kp) = owned_chain();
        let v_kp = KeyPair::generate();
        let w_kp = KeyPair::generate();
        let t_v = transfer_record(&chain, &kp, &v_kp, 1);
        let t_w = transfer_record(&chain, &kp, &w_kp, 1);
        chain.append(t_v).unwrap();

        let mut ledger = SecurityLedger::new();
        let mut v = Validator::new();
        let err = v
            .validate_security(&t_w, &chain, &mut ledger, 2)
            .unwrap_err();
        assert!(matches!(err, FilamentError::DoubleSpendDetected { .. }));
        assert!(ledger.is_blacklisted(&kp.public_key));
        assert_eq!(ledger.state().warnings().len(), 1);
    }

    #[test]
    fn valid_record_passes_security() {
        let (mut chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let record = transfer_record(&chain, &kp, &to, 1);
        chain.append(record.clone()).unwrap();

        let mut ledger = SecurityLedger::new();
        let mut v = Validator::new();
        // The record is already appended; legality on a fresh extension:
        let onward = transfer_record(&chain, &to, &KeyPair::generate(), 2);
        assert!(v.validate_security(&onward, &chain, &mut ledger, 2).is_ok());
        assert!(!ledger.is_blacklisted(&kp.public_key));
    }

    // ── Cache ────────────────────────────────────────────────────────────────

    #[test]
    fn cache_returns_same_result_until_cleared() {
        let (chain, kp) = owned_chain();
        let to = KeyPair::generate();
        let mut record = transfer_record(&chain, &kp, &to, 1);
        let mut v = Validator::new();
        assert!(v.verify_signature(&record).is_ok());

        // Corrupt the signature; the memoized verdict still stands.
        record.signature = Some(EcdsaSignature(vec![0u8; 64]));
        assert!(v.verify_signature(&record).is_ok());

        v.clear_cache();
        assert!(v.verify_signature(&record).is_err());
    }

    #[test]
    fn integrity_result_is_memoized_per_tip() {
        let (mut chain, kp) = owned_chain();
        let to = KeyPair::generate();
        chain.append(transfer_record(&chain, &kp, &to, 1)).unwrap();
        let mut v = Validator::new();
        assert_eq!(v.cache_len(), 0);
        v.verify_chain_integrity(&chain, None).unwrap();
        let after_first = v.cache_len();
        v.verify_chain_integrity(&chain, None).unwrap();
        assert_eq!(v.cache_len(), after_first);
    }
}
