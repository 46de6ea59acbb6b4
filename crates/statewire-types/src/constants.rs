//! System-wide constants for the statewire payment-channel core.

/// Fixed-point precision for on-chain amount encoding (8 decimal places).
pub const AMOUNT_PRECISION: u32 = 8;

/// Default dispute window length in ledger blocks. A unilateral close can
/// be challenged with a higher-nonce state until the window elapses.
pub const DEFAULT_DISPUTE_WINDOW_BLOCKS: u64 = 100;

/// Default extra blocks an HTLC expiration must clear *beyond* the
/// dispute window. Guarantees the sender can always reclaim on-chain
/// before an uncooperative receiver stalls past the safety margin.
pub const DEFAULT_HTLC_SAFETY_MARGIN_BLOCKS: u64 = 24;

/// Default wall-clock silence (seconds) after which the counterparty is
/// presumed gone and a unilateral close may be triggered.
pub const DEFAULT_LIVENESS_TIMEOUT_SECS: u64 = 120;

/// Default maximum number of channels a node will keep open (0 = no limit).
pub const DEFAULT_MAX_CHANNELS: usize = 100;

/// Default minimum collateral a party must commit at channel creation.
pub const DEFAULT_MIN_DEPOSIT: u64 = 1;

/// Default maximum collateral a party may commit at channel creation.
pub const DEFAULT_MAX_DEPOSIT: u64 = 5000;

/// Default gateway relay endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8077";

/// Default node alias announced to the gateway.
pub const DEFAULT_NODE_ALIAS: &str = "StatewireNode";

/// Maximum submission attempts for one ledger call before surfacing
/// `LedgerCallFailed`.
pub const LEDGER_MAX_SUBMIT_ATTEMPTS: u32 = 3;

/// Backoff between ledger submission attempts, in milliseconds.
pub const LEDGER_RETRY_BACKOFF_MS: u64 = 500;

/// Outbox cache size (number of settled call keys to remember).
pub const OUTBOX_CACHE_SIZE: usize = 10_000;

/// Inbound gateway dedup cache size (number of applied `(channel, nonce)`
/// keys to remember).
pub const INBOUND_DEDUP_CACHE_SIZE: usize = 10_000;

/// Maximum unresolved HTLC locks per channel. The settlement contract
/// resolves a single lock per close, so the off-chain record enforces
/// the same bound.
pub const MAX_OPEN_LOCKS: usize = 1;
