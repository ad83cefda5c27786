//! # Treasury Errors
//!
//! One named variant per failure condition. Every treasury call either
//! succeeds completely or returns one of these with all state rolled back;
//! nothing is retried internally.

use chrono::{DateTime, Utc};
use thiserror::Error;
use treasury_protocol::{Address, Amount, CollaboratorError, PoolId, TokenId};

/// Errors returned by treasury operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreasuryError {
    // --- Roles ---
    /// The caller is not the governor.
    #[error("not authorized: caller is not the governor")]
    NotAuthorized,

    /// The caller is not the guardian (or no guardian is configured).
    #[error("not guardian")]
    NotGuardian,

    /// The caller may not assign pool managers.
    #[error("not a manager setter")]
    NotManagerSetter,

    /// The null identity was supplied where a real one is required.
    #[error("zero address")]
    ZeroAddress,

    // --- Pause gate ---
    /// The operation is blocked while paused, or `pause` was called twice.
    #[error("paused")]
    Paused,

    /// The operation requires the pause gate to be closed.
    #[error("not paused")]
    NotPaused,

    // --- Timelocks ---
    /// The request exists but its delay has not elapsed yet.
    #[error("too early: executable at {ready_at}")]
    TooEarly {
        /// Earliest time the request matures.
        ready_at: DateTime<Utc>,
    },

    /// Execute/abort was called with nothing requested.
    #[error("not requested")]
    NotRequested,

    /// A request is already outstanding and the workflow rejects re-requests.
    #[error("already requested")]
    AlreadyRequested,

    // --- Whitelist ---
    /// The address is already admitted.
    #[error("already whitelisted: {0}")]
    AlreadyWhitelisted(Address),

    /// The address has not been admitted.
    #[error("not whitelisted: {0}")]
    NotWhitelisted(Address),

    // --- Allocations ---
    /// `skip_aborted_allocation` found a head entry that is not aborted.
    #[error("head allocation is not aborted")]
    NotAborted,

    /// The queue is exhausted or its head is not pending.
    #[error("no pending allocation")]
    NoPendingAllocation,

    /// The targeted allocation does not exist or is no longer pending.
    #[error("allocation {0} is not pending")]
    AllocationNotPending(u64),

    /// The request would reserve more than the treasury holds unreserved.
    #[error("amount exceeds unallocated balance of {token}: requested {requested}, unallocated {unallocated}")]
    AmountExceedsUnallocatedBalance {
        /// Token being reserved or spent.
        token: TokenId,
        /// Amount requested.
        requested: Amount,
        /// Balance minus pending reservations.
        unallocated: Amount,
    },

    // --- Pools and price guard ---
    /// The locked-pool swap path was used on an open pool.
    #[error("cannot convert: pool {0} is open, use the guarded swap")]
    CannotConvert(PoolId),

    /// The guarded swap path was used on a managed pool.
    #[error("pool {0} is locked to its manager")]
    PoolLocked(PoolId),

    /// The router knows no pool for the pair.
    #[error("no pool for {token_a} / {token_b}")]
    PoolNotFound {
        /// First token of the pair.
        token_a: TokenId,
        /// Second token of the pair.
        token_b: TokenId,
    },

    /// The quoted amount is below the oracle-implied band.
    #[error("amount out too low: oracle implies {expected}, quoted {quoted}")]
    AmountOutTooLow {
        /// Oracle-implied amount.
        expected: Amount,
        /// Amount the pool offers.
        quoted: Amount,
    },

    /// The quoted amount is above the oracle-implied band.
    #[error("price deviation: oracle implies {expected}, quoted {quoted}")]
    PriceDeviation {
        /// Oracle-implied amount.
        expected: Amount,
        /// Amount the pool offers.
        quoted: Amount,
    },

    /// The oracle reading is older than the staleness limit.
    #[error("stale oracle for {token}: reading is {age_secs}s old, limit {max_staleness_secs}s")]
    StaleOracle {
        /// Token whose feed is stale.
        token: TokenId,
        /// Age of the reading.
        age_secs: u64,
        /// Configured limit.
        max_staleness_secs: u64,
    },

    /// No price feed is configured for the token.
    #[error("no price feed configured for {0}")]
    MissingPriceFeed(TokenId),

    /// The oracle returned a zero price.
    #[error("invalid oracle price for {0}")]
    InvalidPrice(TokenId),

    /// Deviation factor outside `0..=DEVIATION_FACTOR_SCALE`.
    #[error("invalid deviation factor {0}")]
    InvalidDeviationFactor(u32),

    /// Decimal normalizers must be non-zero.
    #[error("invalid decimals normalizer for {0}")]
    InvalidNormalizer(TokenId),

    // --- Farms ---
    /// The pool exists but has no farm.
    #[error("no farm deployed for pool {0}")]
    FarmNotDeployed(PoolId),

    /// The address is not a pool at all.
    #[error("invalid farm: {0} is not a pool")]
    InvalidFarm(PoolId),

    // --- Generic ---
    /// Parallel argument lists differ in length.
    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch {
        /// Length of the first list.
        left: usize,
        /// Length of the second list.
        right: usize,
    },

    /// The token ledger refused a transfer.
    #[error("transfer of {amount} {token} to {to} failed")]
    TransferFailed {
        /// Token being moved.
        token: TokenId,
        /// Recipient.
        to: Address,
        /// Amount.
        amount: Amount,
    },

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// A collaborator rejected the call.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Shorthand used throughout the crate.
pub type TreasuryResult<T> = Result<T, TreasuryError>;

/// Fails with [`TreasuryError::LengthMismatch`] unless both lists line up.
pub(crate) fn ensure_same_len<A, B>(left: &[A], right: &[B]) -> TreasuryResult<()> {
    if left.len() != right.len() {
        return Err(TreasuryError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_check() {
        assert!(ensure_same_len(&[1, 2], &["a", "b"]).is_ok());
        assert_eq!(
            ensure_same_len(&[1], &["a", "b"]),
            Err(TreasuryError::LengthMismatch { left: 1, right: 2 })
        );
    }

    #[test]
    fn collaborator_errors_convert() {
        let pool = Address::from_label("pool");
        let err: TreasuryError = CollaboratorError::FarmNotDeployed(pool).into();
        assert!(err.to_string().contains("no farm deployed"));
    }
}
