/// ─── veNFT Ledger Constants ─────────────────────────────────────────────────
///
/// All durations are in seconds, all amounts in base units of the asset
/// (18-decimal tokens in practice, but nothing here depends on decimals).

// ── Time ─────────────────────────────────────────────────────────────────────

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Longest lock a deposit may carry: 730 days. A lock of exactly this length
/// has voting power equal to its amount at creation.
pub const MAX_LOCK_DURATION: u64 = 730 * SECONDS_PER_DAY;

// ── Reward accounting ────────────────────────────────────────────────────────

/// Fixed-point scale of the reward accumulators.
///
/// Accumulators grow by `emission * ACC_PRECISION / power`; 10^36 keeps the
/// per-segment increments well above rounding noise even when the staked
/// power is ~10^30 base units.
pub const ACC_PRECISION: u128 = 1_000_000_000_000_000_000_000_000_000_000_000_000;

// ── Identities ───────────────────────────────────────────────────────────────

/// Label the escrow (custody) account id is derived from.
pub const ESCROW_ACCOUNT_LABEL: &str = "venft/escrow";

/// Default deposit asset symbol used when genesis does not name one.
pub const DEFAULT_DEPOSIT_ASSET: &str = "LP";

// ── Metadata ─────────────────────────────────────────────────────────────────

pub const TOKEN_NAME_PREFIX: &str = "veNFT";
pub const TOKEN_DESCRIPTION: &str = "Vote Escrowed NFT for locked LP tokens";
pub const TOKEN_URI_PREFIX: &str = "data:application/json;base64,";
