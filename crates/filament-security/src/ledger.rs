use std::collections::BTreeSet;

use filament_core::types::{ChainId, EcdsaPublicKey, RecordId, Tick};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::warning::{ForkReason, ForkWarning};

// ── Events ───────────────────────────────────────────────────────────────────

/// Why a key was blacklisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlacklistReason {
    DoubleSpendAttack,
    UnauthorizedTransfer,
    Manual(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEventKind {
    Blacklisted { reason: BlacklistReason },
    Unblacklisted,
    ForkWarningIssued { reason: ForkReason },
    ForkWarningProcessed { reason: ForkReason },
    RecordRejected { reason: String },
}

/// One append-only audit entry. Retained for the process lifetime; readers
/// may window them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub subject: Option<EcdsaPublicKey>,
    pub chain: Option<ChainId>,
    pub tick: Tick,
}

/// Action taken while processing a high-priority security message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecurityAction {
    Blacklisted(EcdsaPublicKey),
    Logged,
}

// ── SecurityState ────────────────────────────────────────────────────────────

/// The read side handed to validators: blacklist membership, approved
/// forks, and the warning history, behind an immutable borrow. All
/// mutation goes through the ledger's typed write interface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SecurityState {
    blacklist: BTreeSet<EcdsaPublicKey>,
    approved_forks: BTreeSet<(RecordId, RecordId)>,
    events: Vec<SecurityEvent>,
    warnings: Vec<ForkWarning>,
}

impl SecurityState {
    pub fn is_blacklisted(&self, key: &EcdsaPublicKey) -> bool {
        self.blacklist.contains(key)
    }

    /// Whether the (prev-id, record-id) pair was explicitly approved as a
    /// permissible fork.
    pub fn is_fork_approved(&self, prev: &RecordId, record: &RecordId) -> bool {
        self.approved_forks.contains(&(*prev, *record))
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }

    pub fn events(&self) -> &[SecurityEvent] {
        &self.events
    }

    pub fn warnings(&self) -> &[ForkWarning] {
        &self.warnings
    }

    /// Warnings referencing a record or chain — confirmation adjudication
    /// reads these.
    pub fn warnings_for(&self, record: &RecordId, chain: &ChainId) -> Vec<&ForkWarning> {
        self.warnings
            .iter()
            .filter(|w| w.references(record, chain))
            .collect()
    }
}

// ── SecurityLedger ───────────────────────────────────────────────────────────

/// Owns the blacklist, the security event log, and the approved-fork set.
/// Shares the process lifetime with the simulation.
#[derive(Debug, Default)]
pub struct SecurityLedger {
    state: SecurityState,
}

impl SecurityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SecurityState {
        &self.state
    }

    /// Insert a key into the blacklist. No-op (returns false) when already
    /// present; otherwise appends a Blacklisted event.
    pub fn add_to_blacklist(
        &mut self,
        key: EcdsaPublicKey,
        reason: BlacklistReason,
        tick: Tick,
    ) -> bool {
        if !self.state.blacklist.insert(key.clone()) {
            return false;
        }
        info!(user = %key, ?reason, tick, "user blacklisted");
        self.state.events.push(SecurityEvent {
            kind: SecurityEventKind::Blacklisted { reason },
            subject: Some(key),
            chain: None,
            tick,
        });
        true
    }

    pub fn remove_from_blacklist(&mut self, key: &EcdsaPublicKey, tick: Tick) -> bool {
        if !self.state.blacklist.remove(key) {
            return false;
        }
        info!(user = %key, tick, "user removed from blacklist");
        self.state.events.push(SecurityEvent {
            kind: SecurityEventKind::Unblacklisted,
            subject: Some(key.clone()),
            chain: None,
            tick,
        });
        true
    }

    pub fn is_blacklisted(&self, key: &EcdsaPublicKey) -> bool {
        self.state.is_blacklisted(key)
    }

    /// Mark a (prev-id, record-id) fork pair as approved.
    pub fn approve_fork(&mut self, prev: RecordId, record: RecordId) {
        self.state.approved_forks.insert((prev, record));
    }

    /// Audit a security-relevant rejection that is not itself a fork
    /// warning (e.g. a blacklisted creator's record being refused).
    pub fn record_rejection(
        &mut self,
        subject: Option<EcdsaPublicKey>,
        chain: Option<ChainId>,
        reason: String,
        tick: Tick,
    ) {
        self.state.events.push(SecurityEvent {
            kind: SecurityEventKind::RecordRejected { reason },
            subject,
            chain,
            tick,
        });
    }

    /// Record an issued warning in the history and the event log.
    pub fn record_warning(&mut self, warning: ForkWarning) {
        self.state.events.push(SecurityEvent {
            kind: SecurityEventKind::ForkWarningIssued {
                reason: warning.reason.clone(),
            },
            subject: warning.attacker.clone(),
            chain: Some(warning.chain),
            tick: warning.tick,
        });
        self.state.warnings.push(warning);
    }

    /// Process a high-priority fork warning. A double-spend warning
    /// blacklists its attacker; every other reason is logged without
    /// automatic action.
    pub fn process_fork_warning(
        &mut self,
        warning: &ForkWarning,
        tick: Tick,
    ) -> Vec<SecurityAction> {
        let mut actions = Vec::new();
        match (&warning.reason, &warning.attacker) {
            (ForkReason::DoubleSpend, Some(attacker)) => {
                if self.add_to_blacklist(
                    attacker.clone(),
                    BlacklistReason::DoubleSpendAttack,
                    tick,
                ) {
                    actions.push(SecurityAction::Blacklisted(attacker.clone()));
                }
            }
            _ => {
                warn!(
                    reason = ?warning.reason,
                    action = ?warning.recommended_action,
                    chain = %warning.chain,
                    "fork warning logged without automatic action"
                );
                actions.push(SecurityAction::Logged);
            }
        }
        self.state.events.push(SecurityEvent {
            kind: SecurityEventKind::ForkWarningProcessed {
                reason: warning.reason.clone(),
            },
            subject: warning.attacker.clone(),
            chain: Some(warning.chain),
            tick,
        });
        actions
    }
}
