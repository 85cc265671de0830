use std::collections::{BTreeMap, BTreeSet};

use filament_core::error::FilamentError;
use filament_core::record::{Payload, Record};
use filament_core::types::{ChainId, Creator, EcdsaPublicKey, RecordId, Tick, UserId};
use filament_crypto::KeyPair;

// ── User ─────────────────────────────────────────────────────────────────────

/// A participant: key pair plus the set of chains it currently owns. The
/// owned set is a derived view — the chain logs are the source of truth —
/// and is updated only after a validated append.
pub struct User {
    keys: KeyPair,
    owned: BTreeSet<ChainId>,
}

impl User {
    pub fn new() -> Self {
        Self {
            keys: KeyPair::generate(),
            owned: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> UserId {
        self.keys.user_id
    }

    pub fn public_key(&self) -> &EcdsaPublicKey {
        &self.keys.public_key
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Construct and sign a transfer record. Mutates nothing: the chain and
    /// the owned set change only once the record passes validation and is
    /// appended.
    pub fn create_transfer_record(
        &self,
        chain: ChainId,
        target: &EcdsaPublicKey,
        prev: RecordId,
        tick: Tick,
    ) -> Result<Record, FilamentError> {
        let mut record = Record::new(
            Payload::Transfer {
                chain,
                next_owner: target.clone(),
                prev_record: prev,
            },
            Some(prev),
            Creator::User(self.keys.public_key.clone()),
            tick,
        );
        self.keys.sign_record(&mut record)?;
        Ok(record)
    }

    pub fn add_owned_chain(&mut self, chain: ChainId) -> bool {
        self.owned.insert(chain)
    }

    pub fn remove_owned_chain(&mut self, chain: &ChainId) -> bool {
        self.owned.remove(chain)
    }

    pub fn owns(&self, chain: &ChainId) -> bool {
        self.owned.contains(chain)
    }

    pub fn owned(&self) -> impl Iterator<Item = &ChainId> {
        self.owned.iter()
    }

    pub fn owned_count(&self) -> usize {
        self.owned.len()
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "User {{ id: {:?}, owned: {} }}", self.id(), self.owned.len())
    }
}

// ── UserRegistry ─────────────────────────────────────────────────────────────

/// All initialized users, keyed by id. Iteration order is the id order,
/// which keeps seeded runs reproducible.
#[derive(Default)]
pub struct UserRegistry {
    users: BTreeMap<UserId, User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `n` fresh users.
    pub fn with_users(n: u32) -> Self {
        let mut registry = Self::new();
        for _ in 0..n {
            registry.insert(User::new());
        }
        registry
    }

    pub fn insert(&mut self, user: User) -> UserId {
        let id = user.id();
        self.users.insert(id, user);
        id
    }

    pub fn get(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn get_mut(&mut self, id: &UserId) -> Option<&mut User> {
        self.users.get_mut(id)
    }

    /// The user controlling a public key, if any.
    pub fn find_by_key(&self, key: &EcdsaPublicKey) -> Option<&User> {
        self.users.values().find(|u| u.public_key() == key)
    }

    pub fn find_id_by_key(&self, key: &EcdsaPublicKey) -> Option<UserId> {
        self.find_by_key(key).map(User::id)
    }

    pub fn ids(&self) -> Vec<UserId> {
        self.users.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
