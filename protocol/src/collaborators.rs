//! # External Collaborators
//!
//! The control plane decides *whether and when* funds move. Moving them is
//! somebody else's job: a token ledger, a liquidity router, a farm registry
//! and a price oracle. This module defines the narrow interfaces the core
//! needs from each of them.
//!
//! Every method takes `&self`. Implementations that hold state use interior
//! mutability so one instance can be shared (via `Arc`) between the treasury
//! and whoever else observes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{Address, Amount, FeedId, PoolId, TokenId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by external collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The payer does not hold enough of the token.
    #[error("insufficient balance of {token} for {owner}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Token being moved.
        token: TokenId,
        /// Account being debited.
        owner: Address,
        /// Current balance.
        available: Amount,
        /// Amount the caller tried to move.
        requested: Amount,
    },

    /// No pool exists for the token pair or pool address.
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    /// The pool cannot serve the request (empty reserves, zero output).
    #[error("insufficient liquidity in pool {0}")]
    InsufficientLiquidity(PoolId),

    /// The router would deliver less than the caller's minimum.
    #[error("slippage: minimum {minimum}, actual {actual}")]
    Slippage {
        /// Minimum the caller accepted.
        minimum: Amount,
        /// What the pool would actually deliver.
        actual: Amount,
    },

    /// The swap path is not usable (fewer than two hops, repeated token).
    #[error("invalid swap path: {0}")]
    InvalidPath(String),

    /// No farm exists for the pool.
    #[error("no farm deployed for pool {0}")]
    FarmNotDeployed(PoolId),

    /// The staker has less staked than requested.
    #[error("insufficient stake in farm {pool}: staked {staked}, requested {requested}")]
    InsufficientStake {
        /// Farm pool.
        pool: PoolId,
        /// Currently staked.
        staked: Amount,
        /// Amount the caller tried to unstake.
        requested: Amount,
    },

    /// The oracle has no reading for the feed.
    #[error("price feed not found: {0}")]
    FeedNotFound(FeedId),

    /// Arithmetic inside the collaborator overflowed.
    #[error("collaborator arithmetic overflow")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Value Types
// ---------------------------------------------------------------------------

/// A single oracle reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    /// Price in the feed's own fixed-point units.
    pub price: Amount,
    /// When the feed last updated.
    pub updated_at: DateTime<Utc>,
}

/// Reserves of a two-token pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolReserves {
    /// Pool address (also the LP token).
    pub pool: PoolId,
    /// First token of the pair, in canonical order.
    pub token0: TokenId,
    /// Second token of the pair.
    pub token1: TokenId,
    /// Reserve of `token0`.
    pub reserve0: Amount,
    /// Reserve of `token1`.
    pub reserve1: Amount,
    /// Outstanding LP shares.
    pub lp_supply: Amount,
}

impl PoolReserves {
    /// Returns `(reserve_of(token), reserve_of(other))`, or `None` if
    /// `token` is not part of this pool.
    pub fn oriented(&self, token: &TokenId) -> Option<(Amount, Amount)> {
        if *token == self.token0 {
            Some((self.reserve0, self.reserve1))
        } else if *token == self.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }

    /// Returns the pair token that is not `token`.
    pub fn counterpart(&self, token: &TokenId) -> Option<TokenId> {
        if *token == self.token0 {
            Some(self.token1)
        } else if *token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }
}

/// Outcome of an add-liquidity call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityAdded {
    /// Amount of token A actually deposited.
    pub used_a: Amount,
    /// Amount of token B actually deposited.
    pub used_b: Amount,
    /// LP shares minted to the provider.
    pub lp_minted: Amount,
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// Balances and transfers of fungible tokens.
pub trait TokenLedger: Send + Sync {
    /// Balance of `owner` in `token`.
    fn balance_of(&self, token: &TokenId, owner: &Address) -> Amount;

    /// Moves `amount` of `token` from `from` to `to`. Returns `false` when
    /// the transfer was refused.
    fn transfer(&self, token: &TokenId, from: &Address, to: &Address, amount: Amount) -> bool;

    /// Converts `amount` of [`Address::NATIVE`] held by `owner` into the
    /// wrapped token, returning the wrapped token's id.
    fn wrap_native(&self, owner: &Address, amount: Amount) -> Result<TokenId, CollaboratorError>;
}

/// Pool factory and router.
pub trait LiquidityRouter: Send + Sync {
    /// Pool address for a token pair, in either order.
    fn get_pair(&self, token_a: &TokenId, token_b: &TokenId) -> Option<PoolId>;

    /// Current reserves of a pool.
    fn pool_reserves(&self, pool: &PoolId) -> Option<PoolReserves>;

    /// Output the router would deliver for `amount_in` along `path`.
    fn quote_exact_in(&self, amount_in: Amount, path: &[TokenId]) -> Result<Amount, CollaboratorError>;

    /// Deposits up to the desired amounts from `provider`.
    #[allow(clippy::too_many_arguments)]
    fn add_liquidity(
        &self,
        provider: &Address,
        token_a: &TokenId,
        token_b: &TokenId,
        amount_a: Amount,
        amount_b: Amount,
        min_a: Amount,
        min_b: Amount,
    ) -> Result<LiquidityAdded, CollaboratorError>;

    /// Burns `lp_amount` shares of `provider` and returns the withdrawn
    /// `(amount_a, amount_b)`.
    fn remove_liquidity(
        &self,
        provider: &Address,
        token_a: &TokenId,
        token_b: &TokenId,
        lp_amount: Amount,
        min_a: Amount,
        min_b: Amount,
    ) -> Result<(Amount, Amount), CollaboratorError>;

    /// Swaps exactly `amount_in` of `path[0]` from `trader` for at least
    /// `min_out` of the last token in `path`.
    fn swap_exact_tokens_for_tokens(
        &self,
        trader: &Address,
        amount_in: Amount,
        min_out: Amount,
        path: &[TokenId],
    ) -> Result<Amount, CollaboratorError>;
}

/// Yield farms keyed by the pool whose LP shares they accept.
pub trait FarmRegistry: Send + Sync {
    /// Whether a farm exists for `pool`.
    fn is_deployed(&self, pool: &PoolId) -> bool;

    /// Stakes LP shares of `staker`.
    fn stake(&self, staker: &Address, pool: &PoolId, amount: Amount) -> Result<(), CollaboratorError>;

    /// Returns staked LP shares to `staker`.
    fn unstake(&self, staker: &Address, pool: &PoolId, amount: Amount) -> Result<(), CollaboratorError>;

    /// Pays out accrued rewards; returns the amount paid.
    fn claim(&self, staker: &Address, pool: &PoolId) -> Result<Amount, CollaboratorError>;

    /// Unstakes everything and claims; returns `(unstaked, rewards)`.
    fn exit(&self, staker: &Address, pool: &PoolId) -> Result<(Amount, Amount), CollaboratorError>;
}

/// Reference prices.
pub trait PriceOracle: Send + Sync {
    /// Latest reading of `feed`.
    fn latest_price(&self, feed: &FeedId) -> Result<PriceReading, CollaboratorError>;
}
