use filament_core::types::{EcdsaPublicKey, RecordId, Tick};
use filament_security::Severity;
use serde::{Deserialize, Serialize};

/// Sub-classification of a double-spend finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackType {
    /// Same creator, different next owners: a true double-spend.
    DoubleSpend,
    /// Same creator, same next owner: a replayed transfer. Surfaced to the
    /// caller; policy is deliberately not decided here.
    DuplicateTransfer,
}

/// Non-destructive double-spend verdict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleSpendReport {
    pub is_double_spend: bool,
    pub attacker: Option<EcdsaPublicKey>,
    pub conflicting: Vec<RecordId>,
    pub attack_type: Option<AttackType>,
    pub severity: Severity,
}

impl DoubleSpendReport {
    pub fn clean() -> Self {
        Self {
            is_double_spend: false,
            attacker: None,
            conflicting: Vec::new(),
            attack_type: None,
            severity: Severity::Low,
        }
    }

    pub fn detected(
        attacker: EcdsaPublicKey,
        conflicting: Vec<RecordId>,
        attack_type: AttackType,
    ) -> Self {
        Self {
            is_double_spend: true,
            attacker: Some(attacker),
            conflicting,
            attack_type: Some(attack_type),
            severity: Severity::High,
        }
    }
}

/// Outcome of confirmation-wait adjudication. `Pending` is progress, not
/// failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    /// The wait window is still open; `remaining` ticks to go.
    Pending { remaining: u64 },
    /// A conflicting record landed inside the wait window.
    ConflictDetected { conflict: RecordId },
    /// A fork warning referencing this record or chain landed inside the
    /// wait window.
    WarningDetected { warning_tick: Tick },
    Confirmed,
}

impl ConfirmationStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationStatus::Confirmed)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ConfirmationStatus::Pending { .. })
    }
}
