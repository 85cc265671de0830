use filament_net::RouterMetrics;
use serde::Serialize;
use std::collections::BTreeMap;

/// Immutable views handed to external consumers. The core assembles these
/// on demand; it never exposes live references into its state.

#[derive(Clone, Debug, Serialize)]
pub struct NetworkStatus {
    pub tick: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub pending_deliveries: usize,
    pub router: RouterMetrics,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChainStats {
    pub chain_count: usize,
    pub total_value: u64,
    pub total_transfers: usize,
    pub pending_confirmations: usize,
    /// Chains per owner, keyed by user id (base-58).
    pub owners: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SecurityStats {
    pub blacklist_len: usize,
    pub event_count: usize,
    pub warning_count: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SimStats {
    pub transfers_initiated: u64,
    pub records_accepted: u64,
    pub records_rejected: u64,
    pub transfers_confirmed: u64,
    pub transfers_invalidated: u64,
    pub double_spends_detected: u64,
    pub rejections_notified: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimSnapshot {
    pub network: NetworkStatus,
    pub chains: ChainStats,
    pub security: SecurityStats,
    pub stats: SimStats,
}

/// End-of-run summary, including the closing integrity audit.
#[derive(Clone, Debug, Serialize)]
pub struct SimReport {
    pub ticks_run: u64,
    pub stats: SimStats,
    pub chain_count: usize,
    pub total_value: u64,
    pub blacklist_len: usize,
    pub integrity_failures: usize,
    pub index_warnings: usize,
}
