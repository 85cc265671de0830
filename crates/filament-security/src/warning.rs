use filament_core::types::{ChainId, EcdsaPublicKey, RecordId, Tick};
use serde::{Deserialize, Serialize};

// ── Classification ───────────────────────────────────────────────────────────

/// Why a fork warning was raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkReason {
    DoubleSpend,
    PositionConflict,
    UnauthorizedTransfer,
    Other(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What the receiver of a warning is advised to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendedAction {
    BlacklistUser,
    InvestigateFork,
    Monitor,
}

// ── ForkInfo / ForkWarning ───────────────────────────────────────────────────

/// Raw observation handed to the ledger when a fork is detected.
#[derive(Clone, Debug)]
pub struct ForkInfo {
    pub reason: ForkReason,
    pub chain: ChainId,
    pub record: RecordId,
    pub attacker: Option<EcdsaPublicKey>,
    pub conflicting: Vec<RecordId>,
}

/// The high-priority message body broadcast when a fork is observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkWarning {
    pub reason: ForkReason,
    pub severity: Severity,
    pub recommended_action: RecommendedAction,
    pub chain: ChainId,
    pub record: RecordId,
    pub attacker: Option<EcdsaPublicKey>,
    pub conflicting: Vec<RecordId>,
    pub tick: Tick,
}

impl ForkWarning {
    /// Severity and recommended action are keyed by the reason: a
    /// double-spend is critical and calls for blacklisting; a bare position
    /// conflict only warrants investigation.
    pub fn from_info(info: ForkInfo, tick: Tick) -> Self {
        let (severity, recommended_action) = match &info.reason {
            ForkReason::DoubleSpend => (Severity::Critical, RecommendedAction::BlacklistUser),
            ForkReason::PositionConflict => (Severity::High, RecommendedAction::InvestigateFork),
            ForkReason::UnauthorizedTransfer => (Severity::High, RecommendedAction::BlacklistUser),
            ForkReason::Other(_) => (Severity::Medium, RecommendedAction::Monitor),
        };
        Self {
            reason: info.reason,
            severity,
            recommended_action,
            chain: info.chain,
            record: info.record,
            attacker: info.attacker,
            conflicting: info.conflicting,
            tick,
        }
    }

    /// Whether this warning references the given record or chain.
    pub fn references(&self, record: &RecordId, chain: &ChainId) -> bool {
        self.record == *record
            || self.chain == *chain
            || self.conflicting.contains(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(reason: ForkReason) -> ForkInfo {
        ForkInfo {
            reason,
            chain: ChainId(RecordId::from_bytes([1u8; 32])),
            record: RecordId::from_bytes([2u8; 32]),
            attacker: None,
            conflicting: vec![],
        }
    }

    #[test]
    fn double_spend_is_critical_and_blacklists() {
        let w = ForkWarning::from_info(info(ForkReason::DoubleSpend), 5);
        assert_eq!(w.severity, Severity::Critical);
        assert_eq!(w.recommended_action, RecommendedAction::BlacklistUser);
    }

    #[test]
    fn position_conflict_is_investigated() {
        let w = ForkWarning::from_info(info(ForkReason::PositionConflict), 5);
        assert_eq!(w.severity, Severity::High);
        assert_eq!(w.recommended_action, RecommendedAction::InvestigateFork);
    }

    #[test]
    fn unauthorized_transfer_blacklists() {
        let w = ForkWarning::from_info(info(ForkReason::UnauthorizedTransfer), 5);
        assert_eq!(w.severity, Severity::High);
        assert_eq!(w.recommended_action, RecommendedAction::BlacklistUser);
    }

    #[test]
    fn unknown_reasons_are_medium() {
        let w = ForkWarning::from_info(info(ForkReason::Other("weird".into())), 5);
        assert_eq!(w.severity, Severity::Medium);
        assert_eq!(w.recommended_action, RecommendedAction::Monitor);
    }

    #[test]
    fn references_matches_record_and_chain() {
        let w = ForkWarning::from_info(info(ForkReason::DoubleSpend), 5);
        let chain = ChainId(RecordId::from_bytes([1u8; 32]));
        let other_chain = ChainId(RecordId::from_bytes([9u8; 32]));
        let record = RecordId::from_bytes([2u8; 32]);
        let other_record = RecordId::from_bytes([8u8; 32]);
        assert!(w.references(&record, &other_chain));
        assert!(w.references(&other_record, &chain));
        assert!(!w.references(&other_record, &other_chain));
    }
}
