//! ─── Filament protocol constants ────────────────────────────────────────────
//!
//! A simulated peer-to-peer value-transfer network: discrete chains, each a
//! serial-numbered unit of value, move between users as signed append-only
//! records gossiped across a tick-driven node mesh.

// ── Identities ───────────────────────────────────────────────────────────────

/// Reserved creator literal for system-minted root records. Root records
/// carry no signature; the validator accepts them iff the payload is a
/// well-formed root.
pub const SYSTEM_CREATOR: &[u8] = b"system";

// ── Network delays (ticks) ───────────────────────────────────────────────────

/// Default minimum per-message delivery delay.
pub const DEFAULT_MIN_DELAY: u64 = 1;

/// Default maximum per-message delivery delay. Also the broadcast-time
/// fallback when topology parameters are unknown.
pub const DEFAULT_MAX_DELAY: u64 = 9;

/// High-priority messages are delivered within [1, min(3, max_delay)] ticks.
pub const HIGH_PRIORITY_MAX_DELAY: u64 = 3;

/// Messages older than this many ticks are discarded by the router's reaper.
pub const MESSAGE_MAX_AGE_TICKS: u64 = 100;

// ── Message priorities ───────────────────────────────────────────────────────
// Lower number = higher priority. Types at or below the high-priority
// threshold use the shortened delay window and drain before the tick bucket.

pub const PRIORITY_FORK_WARNING: u8 = 1;
pub const PRIORITY_BLACKLIST_UPDATE: u8 = 2;
pub const PRIORITY_REJECTION_NOTIFICATION: u8 = 3;
pub const PRIORITY_BLOCK_BROADCAST: u8 = 4;
pub const PRIORITY_TRANSFER_CONFIRMATION: u8 = 5;
pub const PRIORITY_NODE_STATUS: u8 = 7;
pub const PRIORITY_HEARTBEAT: u8 = 9;
pub const PRIORITY_DEFAULT: u8 = 10;

pub const HIGH_PRIORITY_THRESHOLD: u8 = 3;

// ── Timing windows ───────────────────────────────────────────────────────────

/// A record received more than this many broadcast-times after its creation
/// tick is rejected outright.
pub const RECEPTION_DELAY_FACTOR: u64 = 2;

/// An accepted transfer stays pending for this many broadcast-times before
/// it can be confirmed.
pub const CONFIRMATION_WAIT_FACTOR: u64 = 4;

// ── Validator cache ──────────────────────────────────────────────────────────

/// Default time-to-live for memoized validation results (seconds).
pub const CACHE_TTL_SECS: u64 = 300;

/// Cadence of the cache reaper (seconds, wall clock).
pub const CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

/// Upper bound on cached entries; the least recently inserted entry is
/// evicted beyond this.
pub const CACHE_MAX_ENTRIES: usize = 4096;

// ── Payments ─────────────────────────────────────────────────────────────────

/// Default fraction of eligible users initiating a transfer each tick.
pub const DEFAULT_PAYMENT_RATE: f64 = 0.1;

/// Bounded ring capacity for the payment controller's attempt history.
pub const PAYMENT_HISTORY_CAPACITY: usize = 1000;
