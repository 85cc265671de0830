use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use filament_chain::ChainLog;
use filament_core::definition::ChainDefinition;
use filament_core::error::FilamentError;
use filament_core::record::{Payload, Record};
use filament_core::types::{ChainId, Creator, NodeId, RecordId, Tick, UserId};
use filament_net::{topology, Clock, InboxEntry, MessageBody, MessageId, Router};
use filament_security::{BlacklistReason, SecurityLedger};
use filament_validator::{ConfirmationStatus, NetworkParams, Validator};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::SimParams;
use crate::manager::ChainManager;
use crate::payments::PaymentController;
use crate::snapshot::{
    ChainStats, NetworkStatus, SecurityStats, SimReport, SimSnapshot, SimStats,
};
use crate::user::UserRegistry;

/// An accepted transfer inside its confirmation window.
#[derive(Debug)]
struct PendingTransfer {
    record: Record,
    chain: ChainId,
    receive_tick: Tick,
}

/// The tick-driven simulation: clock, router, nodes, users, chains,
/// validator, and security ledger wired into the per-tick control flow —
/// deliver due messages, drain inboxes, initiate payments, adjudicate
/// confirmations, sweep the cache.
pub struct Simulation {
    params: SimParams,
    net_params: NetworkParams,
    clock: Clock,
    router: Router,
    nodes: filament_net::NodeTable,
    users: UserRegistry,
    manager: ChainManager,
    validator: Validator,
    ledger: SecurityLedger,
    payments: PaymentController,
    rng: StdRng,
    home_nodes: BTreeMap<UserId, NodeId>,
    pending: Vec<PendingTransfer>,
    /// First-wins record dedup: a record is adjudicated once no matter how
    /// many nodes deliver it.
    processed: HashSet<RecordId>,
    /// Message-level dedup for ledger-mutating traffic.
    handled_messages: HashSet<MessageId>,
    /// Rejected conflicting records, fed into confirmation adjudication.
    conflicts: Vec<Record>,
    stats: SimStats,
}

impl Simulation {
    pub fn new(params: SimParams, definition: &ChainDefinition) -> Result<Self, FilamentError> {
        params.validate()?;

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut topo_rng = StdRng::seed_from_u64(params.seed.wrapping_add(1));
        let nodes = topology::ring_with_chords(
            params.node_count,
            params.connection_count.saturating_sub(2),
            &mut topo_rng,
        );
        let router = Router::new(params.router_config(), params.seed.wrapping_add(2));

        let mut users = UserRegistry::with_users(params.user_count);
        let mut manager = ChainManager::new();
        let batch = manager.provision(definition, &mut users, &mut rng, 0)?;

        let node_ids: Vec<NodeId> = nodes.ids().collect();
        let home_nodes: BTreeMap<UserId, NodeId> = users
            .ids()
            .into_iter()
            .enumerate()
            .map(|(i, user)| (user, node_ids[i % node_ids.len()]))
            .collect();

        info!(
            nodes = params.node_count,
            users = params.user_count,
            chains = batch.created.len(),
            seed = params.seed,
            "simulation initialized"
        );

        Ok(Self {
            net_params: params.network_params(),
            clock: Clock::new(params.tick_interval_ms),
            router,
            nodes,
            users,
            manager,
            validator: Validator::with_cache_ttl(Duration::from_secs(params.cache_ttl_secs)),
            ledger: SecurityLedger::new(),
            payments: PaymentController::new(params.payment_rate),
            rng,
            home_nodes,
            pending: Vec::new(),
            processed: HashSet::new(),
            handled_messages: HashSet::new(),
            conflicts: Vec::new(),
            stats: SimStats::default(),
            params,
        })
    }

    // ── Tick loop ────────────────────────────────────────────────────────────

    /// Advance one tick through the full control flow.
    pub fn run_tick(&mut self) -> Tick {
        let now = self.clock.advance();
        self.router.process_tick(now, &mut self.nodes);
        self.process_inboxes(now);
        self.initiate_payments(now);
        self.adjudicate_pending(now);
        self.validator.maybe_sweep_cache();
        now
    }

    pub fn run(&mut self, ticks: u64) -> Tick {
        let mut now = self.clock.now();
        for _ in 0..ticks {
            now = self.run_tick();
        }
        now
    }

    // ── Inbox processing ─────────────────────────────────────────────────────

    fn process_inboxes(&mut self, now: Tick) {
        let node_ids: Vec<NodeId> = self.nodes.ids().collect();
        for node_id in node_ids {
            let entries = match self.nodes.get_mut(&node_id) {
                Some(node) => node.drain_inbox(),
                None => continue,
            };
            for entry in entries {
                self.handle_message(node_id, entry, now);
            }
        }
    }

    fn handle_message(&mut self, node_id: NodeId, entry: InboxEntry, now: Tick) {
        let message_id = entry.message.id;
        match entry.message.body {
            MessageBody::BlockBroadcast(record) => {
                self.submit_record(node_id, record, entry.arrived_at, now);
            }
            MessageBody::ForkWarning(warning) => {
                if self.handled_messages.insert(message_id) {
                    self.ledger.process_fork_warning(&warning, now);
                }
            }
            MessageBody::BlacklistUpdate { user, blacklisted } => {
                if self.handled_messages.insert(message_id) {
                    if blacklisted {
                        self.ledger.add_to_blacklist(
                            user,
                            BlacklistReason::Manual("network blacklist update".into()),
                            now,
                        );
                    } else {
                        self.ledger.remove_from_blacklist(&user, now);
                    }
                }
            }
            MessageBody::RejectionNotification(_) => {
                if self.handled_messages.insert(message_id) {
                    self.stats.rejections_notified += 1;
                }
            }
            MessageBody::TransferConfirmation { record, chain } => {
                debug!(node = %node_id, record = %record, chain = %chain, "confirmation seen");
            }
            MessageBody::NodeStatus { .. } | MessageBody::Heartbeat | MessageBody::Custom { .. } => {}
        }
    }

    // ── Record adjudication ──────────────────────────────────────────────────

    /// Validate an inbound record against the authoritative chain log and
    /// append it on success. First delivery wins; every later copy of the
    /// same record is a no-op.
    fn submit_record(&mut self, node_id: NodeId, record: Record, receive_tick: Tick, now: Tick) {
        if !self.processed.insert(record.id) {
            return;
        }
        let chain_id = match &record.payload {
            Payload::Transfer { chain, .. } => *chain,
            _ => {
                self.stats.records_rejected += 1;
                return;
            }
        };
        if self.manager.chain(&chain_id).is_none() {
            self.stats.records_rejected += 1;
            self.notify_rejection(node_id, &record, &FilamentError::UnknownChain(chain_id.to_hex()), now);
            return;
        }

        if let Err(e) = self
            .validator
            .validate_reception_time(&record, receive_tick, &self.net_params)
        {
            self.stats.records_rejected += 1;
            self.notify_rejection(node_id, &record, &e, now);
            return;
        }

        if let Err(e) = self.validator.verify_signature(&record) {
            self.stats.records_rejected += 1;
            self.notify_rejection(node_id, &record, &e, now);
            return;
        }

        let chain = self.manager.chain(&chain_id).expect("checked above");
        let verdict = self
            .validator
            .validate_security(&record, chain, &mut self.ledger, now);

        match verdict {
            Ok(()) => match self.manager.apply_transfer(&mut self.users, record.clone()) {
                Ok(_) => {
                    self.stats.records_accepted += 1;
                    self.pending.push(PendingTransfer {
                        record,
                        chain: chain_id,
                        receive_tick,
                    });
                }
                Err(e) => {
                    self.stats.records_rejected += 1;
                    self.notify_rejection(node_id, &record, &e, now);
                }
            },
            Err(e) => {
                self.stats.records_rejected += 1;
                if matches!(e, FilamentError::DoubleSpendDetected { .. }) {
                    self.stats.double_spends_detected += 1;
                    self.conflicts.push(record.clone());
                    // Alarm the network: the warning itself, then the
                    // blacklist change, both high priority.
                    if let Some(warning) = self.ledger.state().warnings().last().cloned() {
                        self.router.broadcast(
                            now,
                            node_id,
                            MessageBody::ForkWarning(warning),
                            &mut self.nodes,
                        );
                    }
                    if let Some(attacker) = record.creator.public_key() {
                        self.router.broadcast(
                            now,
                            node_id,
                            MessageBody::BlacklistUpdate {
                                user: attacker.clone(),
                                blacklisted: true,
                            },
                            &mut self.nodes,
                        );
                    }
                }
                self.notify_rejection(node_id, &record, &e, now);
            }
        }
    }

    /// Mint and flood a rejection record. Rejections ride security
    /// messages; they never enter a chain log.
    fn notify_rejection(
        &mut self,
        node_id: NodeId,
        record: &Record,
        error: &FilamentError,
        now: Tick,
    ) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };
        let rejector = Creator::User(node.keys().public_key.clone());
        let mut rejection = Record::new(
            Payload::Rejection {
                rejected: record.id,
                reason: error.to_string(),
                rejector: rejector.clone(),
                rejected_at: now,
            },
            None,
            rejector,
            now,
        );
        if node.keys().sign_record(&mut rejection).is_err() {
            return;
        }
        warn!(record = %record.id, error = %error, "record rejected");
        self.router.broadcast(
            now,
            node_id,
            MessageBody::RejectionNotification(rejection),
            &mut self.nodes,
        );
    }

    // ── Payments ─────────────────────────────────────────────────────────────

    fn initiate_payments(&mut self, now: Tick) {
        let planned = self
            .payments
            .plan_tick(&self.users, &self.manager, &mut self.rng, now);
        for transfer in planned {
            self.stats.transfers_initiated += 1;
            let origin = self
                .home_nodes
                .get(&transfer.from)
                .copied()
                .unwrap_or(NodeId(0));
            self.router.broadcast(
                now,
                origin,
                MessageBody::BlockBroadcast(transfer.record.clone()),
                &mut self.nodes,
            );
            // The originating node validates its own record immediately.
            self.submit_record(origin, transfer.record, now, now);
        }
    }

    // ── Confirmation ─────────────────────────────────────────────────────────

    fn adjudicate_pending(&mut self, now: Tick) {
        let pending = std::mem::take(&mut self.pending);
        for p in pending {
            // Only conflicts on this transfer's chain can void it.
            let chain_conflicts: Vec<Record> = self
                .conflicts
                .iter()
                .filter(|c| {
                    matches!(&c.payload, Payload::Transfer { chain, .. } if *chain == p.chain)
                })
                .cloned()
                .collect();
            let status = self.validator.validate_reception_confirmation(
                &p.record,
                p.receive_tick,
                now,
                &self.net_params,
                &chain_conflicts,
                self.ledger.state().warnings(),
            );
            match status {
                ConfirmationStatus::Pending { .. } => self.pending.push(p),
                ConfirmationStatus::Confirmed => {
                    self.stats.transfers_confirmed += 1;
                    let origin = p
                        .record
                        .creator
                        .public_key()
                        .and_then(|k| self.users.find_id_by_key(k))
                        .and_then(|id| self.home_nodes.get(&id).copied())
                        .unwrap_or(NodeId(0));
                    self.router.broadcast(
                        now,
                        origin,
                        MessageBody::TransferConfirmation {
                            record: p.record.id,
                            chain: p.chain,
                        },
                        &mut self.nodes,
                    );
                    debug!(record = %p.record.id, chain = %p.chain, "transfer confirmed");
                }
                ConfirmationStatus::ConflictDetected { conflict } => {
                    self.stats.transfers_invalidated += 1;
                    warn!(record = %p.record.id, conflict = %conflict, "confirmation voided by conflict");
                }
                ConfirmationStatus::WarningDetected { warning_tick } => {
                    self.stats.transfers_invalidated += 1;
                    warn!(record = %p.record.id, warning_tick, "confirmation voided by warning");
                }
            }
        }
    }

    // ── Views ────────────────────────────────────────────────────────────────

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn manager(&self) -> &ChainManager {
        &self.manager
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn ledger(&self) -> &SecurityLedger {
        &self.ledger
    }

    pub fn payments(&self) -> &PaymentController {
        &self.payments
    }

    pub fn snapshot(&self) -> SimSnapshot {
        let edge_count = self
            .nodes
            .iter()
            .map(|n| n.peers().len())
            .sum::<usize>()
            / 2;
        let owners: BTreeMap<String, usize> = self
            .users
            .iter()
            .map(|u| (u.id().to_b58(), u.owned_count()))
            .collect();
        SimSnapshot {
            network: NetworkStatus {
                tick: self.clock.now(),
                node_count: self.nodes.len(),
                edge_count,
                pending_deliveries: self.router.pending(),
                router: *self.router.metrics(),
            },
            chains: ChainStats {
                chain_count: self.manager.chain_count(),
                total_value: self.manager.total_value(),
                total_transfers: self
                    .manager
                    .chains()
                    .map(|c| c.transfers().len())
                    .sum(),
                pending_confirmations: self.pending.len(),
                owners,
            },
            security: SecurityStats {
                blacklist_len: self.ledger.state().blacklist_len(),
                event_count: self.ledger.state().events().len(),
                warning_count: self.ledger.state().warnings().len(),
            },
            stats: self.stats.clone(),
        }
    }

    /// Closing summary: run stats plus a full integrity audit.
    pub fn final_report(&mut self) -> SimReport {
        let audit = self.manager.validate_integrity(&mut self.validator, &self.users);
        SimReport {
            ticks_run: self.clock.now(),
            stats: self.stats.clone(),
            chain_count: self.manager.chain_count(),
            total_value: self.manager.total_value(),
            blacklist_len: self.ledger.state().blacklist_len(),
            integrity_failures: audit.failures.len(),
            index_warnings: audit.index_warnings.len(),
        }
    }

    /// Direct chain access for scenario assertions.
    pub fn chain(&self, id: &ChainId) -> Option<&ChainLog> {
        self.manager.chain(id)
    }
}
