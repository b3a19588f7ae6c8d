/// Shared constants for the crash round engine and market settlement
///
/// This module centralizes the policy numbers that the engine, the backend and
/// third-party verifiers must agree on.

/// Basis points in one whole (100%)
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Default house edge in basis points (2%)
pub const DEFAULT_HOUSE_EDGE_BPS: i64 = 200;

/// Lowest crash point a round can produce
///
/// Guarantees an instant-crash outcome exists in the distribution.
pub const MIN_CRASH_POINT: f64 = 0.5;

/// Highest crash point a round can produce
///
/// Bounds the operator's maximum liability for a single round.
pub const MAX_CRASH_POINT: f64 = 50.0;

/// Growth curve: multiplier at t = 0
pub const DEFAULT_GROWTH_BASE: f64 = 0.5;

/// Growth curve: e-folding time in seconds, `base * e^(t / rate)`
pub const DEFAULT_GROWTH_RATE_SECS: f64 = 6.0;

/// Fixed-point scale of the uniform draw `u` (18 decimals)
pub const UNIFORM_SCALE: u64 = 1_000_000_000_000_000_000;

/// Fixed-point scale of multipliers used for payouts (4 decimals)
pub const MULTIPLIER_SCALE: u64 = 10_000;

/// Decimal places of the crash point shown to players
pub const CRASH_POINT_DISPLAY_DECIMALS: i32 = 2;

/// Number of settled rounds kept in the audit window
pub const HISTORY_CAPACITY: usize = 50;

/// Share of an unclaimed pot retained by the house, in basis points (50%)
///
/// The rest rolls forward as carryover.
pub const NO_WINNER_HOUSE_TAKE_BPS: u64 = 5_000;

/// Default betting window (10 seconds)
pub const DEFAULT_BETTING_WINDOW_MS: u64 = 10_000;

/// Default pause between crash and the next round (5 seconds)
pub const DEFAULT_COOLDOWN_MS: u64 = 5_000;

/// Default multiplier recompute interval
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Maximum address length accepted for a bet
pub const MAX_ADDRESS_LENGTH: usize = 128;
