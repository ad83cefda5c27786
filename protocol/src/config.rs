//! # Protocol Configuration & Constants
//!
//! Every number the control plane treats as "the default" lives here.
//! Deployments override most of them through `TreasuryConfig`, but the
//! scales are fixed: change them and every stored deviation factor quietly
//! changes meaning.

use std::time::Duration;

use crate::address::Amount;

// ---------------------------------------------------------------------------
// Price Guard Scales
// ---------------------------------------------------------------------------

/// Denominator of the deviation factor. Factors are expressed per mille,
/// so a factor of 50 tolerates a 5% gap between the oracle-implied amount
/// and the quoted one.
pub const DEVIATION_FACTOR_SCALE: u32 = 1_000;

/// Default tolerance band: 5%.
pub const DEFAULT_MAX_DEVIATION_FACTOR: u32 = 50;

/// Default age limit for oracle readings.
pub const DEFAULT_MAX_STALENESS: Duration = Duration::from_secs(60);

/// Decimal normalizer assumed for tokens nobody configured. Eighteen
/// decimals is what most fungible tokens ship with.
pub const DEFAULT_DECIMALS_NORMALIZER: Amount = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Timelock Delays
// ---------------------------------------------------------------------------

/// Wait between a governance transfer request and its execution.
pub const DEFAULT_TRANSFER_GOVERNANCE_DELAY: Duration = Duration::from_secs(60);

/// Wait between an emergency withdrawal request and the first withdrawal.
pub const DEFAULT_WITHDRAWAL_DELAY: Duration = Duration::from_secs(60);

/// Wait between an allocation request and its execution.
pub const DEFAULT_ALLOCATION_DELAY: Duration = Duration::from_secs(60);

/// Wait between a whitelisting request and its execution. Longer than
/// the rest: a whitelisted address can receive funds with no further delay.
pub const DEFAULT_WHITELIST_DELAY: Duration = Duration::from_secs(3 * 24 * 60 * 60);

// ---------------------------------------------------------------------------
// Utility
// ---------------------------------------------------------------------------

/// Returns the smallest amount still inside the tolerance band below
/// `expected`, i.e. `expected * (SCALE - factor) / SCALE`.
///
/// Factors above the scale clamp to a zero minimum.
pub fn lower_band(expected: Amount, factor: u32) -> Amount {
    let keep = DEVIATION_FACTOR_SCALE.saturating_sub(factor) as Amount;
    match expected.checked_mul(keep) {
        Some(scaled) => scaled / DEVIATION_FACTOR_SCALE as Amount,
        // Divide first when the product would overflow; the lost precision
        // is at most one unit per thousand.
        None => (expected / DEVIATION_FACTOR_SCALE as Amount).saturating_mul(keep),
    }
}
