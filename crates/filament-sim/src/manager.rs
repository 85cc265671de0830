use std::collections::{BTreeMap, BTreeSet};

use filament_chain::ChainLog;
use filament_core::definition::ChainDefinition;
use filament_core::error::FilamentError;
use filament_core::record::Record;
use filament_core::types::{ChainId, DefinitionHash, RecordId, Tick, UserId};
use filament_validator::Validator;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{info, warn};

use crate::user::UserRegistry;

// ── Results ──────────────────────────────────────────────────────────────────

/// Outcome of provisioning a chain batch from a definition.
#[derive(Debug)]
pub struct BatchResult {
    pub created: Vec<ChainId>,
    /// Per-serial failures; the batch continues past them.
    pub errors: Vec<(u64, FilamentError)>,
    /// How many chains each user was initially assigned.
    pub distribution: BTreeMap<UserId, usize>,
    /// The validated definition the batch was minted from.
    pub definition: ChainDefinition,
    pub definition_hash: DefinitionHash,
}

/// Outcome of a full-ledger integrity audit.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub chains_checked: usize,
    pub failures: Vec<(ChainId, FilamentError)>,
    /// User↔chain index entries disagreeing with chain state. The chain
    /// log is the source of truth; these are reported, not repaired.
    pub index_warnings: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.index_warnings.is_empty()
    }
}

// ── ChainManager ─────────────────────────────────────────────────────────────

/// Owns every chain log and the user→chains index. All chain mutation in
/// the simulation funnels through here (single writer per chain).
#[derive(Default)]
pub struct ChainManager {
    chains: BTreeMap<ChainId, ChainLog>,
    index: BTreeMap<UserId, BTreeSet<ChainId>>,
}

impl ChainManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(&self, id: &ChainId) -> Option<&ChainLog> {
        self.chains.get(id)
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainLog> {
        self.chains.values()
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn total_value(&self) -> u64 {
        self.chains.values().map(ChainLog::value).sum()
    }

    pub fn chains_owned_by(&self, user: &UserId) -> impl Iterator<Item = &ChainId> {
        self.index.get(user).into_iter().flatten()
    }

    // ── Provisioning ─────────────────────────────────────────────────────────

    /// Mint one chain per serial number in the definition, assigning each
    /// to a uniformly random user via a signed ownership record. The
    /// definition is validated first; individual serial failures are
    /// collected without aborting the batch.
    pub fn provision(
        &mut self,
        definition: &ChainDefinition,
        users: &mut UserRegistry,
        rng: &mut StdRng,
        tick: Tick,
    ) -> Result<BatchResult, FilamentError> {
        definition.validate()?;
        if users.is_empty() {
            return Err(FilamentError::UnknownUser(
                "no initialized users to assign ownership to".into(),
            ));
        }

        let definition_hash = definition.hash();
        let user_ids = users.ids();
        let mut result = BatchResult {
            created: Vec::new(),
            errors: Vec::new(),
            distribution: BTreeMap::new(),
            definition: definition.clone(),
            definition_hash,
        };

        for serial in definition.serials() {
            let value = match definition.value_of(serial) {
                Some(v) => v,
                None => {
                    result.errors.push((serial, FilamentError::SerialOutOfRange(serial)));
                    continue;
                }
            };
            let mut chain = ChainLog::create(definition_hash, serial, value, tick);
            let owner_id = user_ids[rng.gen_range(0..user_ids.len())];
            let owner = users.get(&owner_id).expect("id from registry");
            if let Err(e) = chain.create_ownership(owner.keys(), tick) {
                result.errors.push((serial, e));
                continue;
            }

            let chain_id = chain.chain_id();
            self.chains.insert(chain_id, chain);
            self.index.entry(owner_id).or_default().insert(chain_id);
            users
                .get_mut(&owner_id)
                .expect("id from registry")
                .add_owned_chain(chain_id);
            *result.distribution.entry(owner_id).or_insert(0) += 1;
            result.created.push(chain_id);
        }

        info!(
            chains = result.created.len(),
            errors = result.errors.len(),
            users = users.len(),
            definition = %definition_hash,
            "chain batch provisioned"
        );
        Ok(result)
    }

    // ── Transfers ────────────────────────────────────────────────────────────

    /// Construct, append, and index a transfer on behalf of `from`. The
    /// append must pass every chain-log check; nothing changes on failure.
    pub fn transfer(
        &mut self,
        users: &mut UserRegistry,
        chain_id: ChainId,
        from: UserId,
        to: UserId,
        tick: Tick,
    ) -> Result<RecordId, FilamentError> {
        let chain = self
            .chains
            .get(&chain_id)
            .ok_or_else(|| FilamentError::UnknownChain(chain_id.to_hex()))?;
        let target_key = users
            .get(&to)
            .ok_or_else(|| FilamentError::UnknownUser(to.to_b58()))?
            .public_key()
            .clone();
        let sender = users
            .get(&from)
            .ok_or_else(|| FilamentError::UnknownUser(from.to_b58()))?;

        let record =
            sender.create_transfer_record(chain_id, &target_key, chain.latest().id, tick)?;
        self.apply_transfer(users, record)
    }

    /// Append an already-validated transfer record and update the derived
    /// ownership index on success.
    pub fn apply_transfer(
        &mut self,
        users: &mut UserRegistry,
        record: Record,
    ) -> Result<RecordId, FilamentError> {
        let chain_id = match &record.payload {
            filament_core::record::Payload::Transfer { chain, .. } => *chain,
            _ => {
                return Err(FilamentError::LogicalValidationFailed(
                    "only transfer records move ownership".into(),
                ))
            }
        };
        let chain = self
            .chains
            .get_mut(&chain_id)
            .ok_or_else(|| FilamentError::UnknownChain(chain_id.to_hex()))?;

        let from_key = record.creator.public_key().cloned();
        let to_key = record.next_owner().cloned();
        let record_id = record.id;
        chain.append(record)?;

        // Index maintenance: the chain log has already moved ownership.
        if let Some(from_id) = from_key.and_then(|k| users.find_id_by_key(&k)) {
            if let Some(user) = users.get_mut(&from_id) {
                user.remove_owned_chain(&chain_id);
            }
            if let Some(set) = self.index.get_mut(&from_id) {
                set.remove(&chain_id);
            }
        }
        if let Some(to_id) = to_key.and_then(|k| users.find_id_by_key(&k)) {
            if let Some(user) = users.get_mut(&to_id) {
                user.add_owned_chain(chain_id);
            }
            self.index.entry(to_id).or_default().insert(chain_id);
        }
        Ok(record_id)
    }

    // ── Audit ────────────────────────────────────────────────────────────────

    /// Run the integrity walk over every chain and cross-check the
    /// user→chain index against each chain's current owner.
    pub fn validate_integrity(
        &self,
        validator: &mut Validator,
        users: &UserRegistry,
    ) -> IntegrityReport {
        let mut report = IntegrityReport::default();
        for (chain_id, chain) in &self.chains {
            report.chains_checked += 1;
            if let Err(e) = validator.verify_chain_integrity(chain, None) {
                warn!(chain = %chain_id, error = %e, "integrity failure");
                report.failures.push((*chain_id, e));
                continue;
            }

            let owner_id = chain
                .current_owner()
                .and_then(|key| users.find_id_by_key(key));
            match owner_id {
                Some(owner_id) => {
                    let indexed = self
                        .index
                        .get(&owner_id)
                        .map_or(false, |set| set.contains(chain_id));
                    let user_view = users
                        .get(&owner_id)
                        .map_or(false, |u| u.owns(chain_id));
                    if !indexed || !user_view {
                        report.index_warnings.push(format!(
                            "chain {chain_id} owned by {owner_id} but index={indexed} user={user_view}"
                        ));
                    }
                }
                None => {
                    if chain.current_owner().is_some() {
                        report.index_warnings.push(format!(
                            "chain {chain_id} owner key does not belong to any registered user"
                        ));
                    }
                }
            }
        }
        report
    }
}
