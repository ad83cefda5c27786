//! # Treasury Dispatcher
//!
//! The single entry point for every treasury action. Each public method
//! runs the same pipeline:
//!
//! ```text
//!   role check -> pause gate -> timelock / queue / whitelist -> price guard -> collaborators
//! ```
//!
//! and is atomic with respect to [`TreasuryState`]: the state is
//! checkpointed before the call and restored if the call fails at any
//! stage. State changes are applied before collaborators are called;
//! balances are checked up front so a transfer that would fail is refused
//! before anything moves.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use treasury_protocol::{
    Address, Amount, Clock, CollaboratorError, FarmRegistry, FeedId, Identity, LiquidityAdded,
    LiquidityRouter, PoolId, PoolReserves, PriceOracle, TokenId, TokenLedger,
};

use crate::allocation::{token_totals, AllocationEntry, AllocationQueue};
use crate::config::{ConfigError, TreasuryConfig};
use crate::error::{ensure_same_len, TreasuryError, TreasuryResult};
use crate::pause::{PauseAuthority, PauseGate};
use crate::price_guard::PriceFeedConfig;
use crate::roles::{PoolMode, RoleRegistry};
use crate::timelock::TimelockRequest;
use crate::whitelist::{WhitelistEntry, WhitelistRegistry};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The outside world the treasury acts on.
#[derive(Clone)]
pub struct Collaborators {
    /// Token balances and transfers.
    pub ledger: Arc<dyn TokenLedger>,
    /// Pool factory and router.
    pub router: Arc<dyn LiquidityRouter>,
    /// Yield farms.
    pub farms: Arc<dyn FarmRegistry>,
    /// Reference prices.
    pub oracle: Arc<dyn PriceOracle>,
}

/// Everything the control plane owns. Cloned as a checkpoint on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryState {
    /// Roles and pool assignments.
    pub roles: RoleRegistry,
    /// Circuit breaker.
    pub pause: PauseGate,
    /// Governance transfer window.
    pub governance: TimelockRequest,
    /// Emergency withdrawal window.
    pub emergency: TimelockRequest,
    /// Recipient of emergency withdrawals.
    pub emergency_recipient: Option<Address>,
    /// Allocation queue.
    pub allocations: AllocationQueue,
    /// Whitelisted recipients.
    pub whitelist: WhitelistRegistry,
    /// Price guard settings.
    pub prices: PriceFeedConfig,
}

impl TreasuryState {
    /// Fresh state for a deployment.
    pub fn from_config(config: &TreasuryConfig) -> Self {
        let prices = PriceFeedConfig {
            max_deviation_factor: config.max_deviation_factor,
            max_staleness_secs: config.max_staleness_secs,
            ..PriceFeedConfig::default()
        };
        Self {
            roles: RoleRegistry::new(config.governor, config.guardian),
            pause: PauseGate::new(config.pause_authority),
            governance: TimelockRequest::governance(config.transfer_governance_delay_secs),
            emergency: TimelockRequest::emergency(config.withdrawal_delay_secs),
            emergency_recipient: None,
            allocations: AllocationQueue::new(config.allocation_delay_secs),
            whitelist: WhitelistRegistry::new(config.whitelist_delay_secs),
            prices,
        }
    }
}

/// Serializable view of the treasury for operators and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasurySnapshot {
    /// Address holding the funds.
    pub treasury: Address,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// Current governor.
    pub governor: Identity,
    /// Current guardian.
    pub guardian: Option<Identity>,
    /// Governor-elect.
    pub pending_governor: Option<Identity>,
    /// When the governance transfer was requested.
    pub governance_requested_at: Option<DateTime<Utc>>,
    /// Pause flag.
    pub paused: bool,
    /// Role allowed to pause.
    pub pause_authority: PauseAuthority,
    /// Recipient of emergency withdrawals.
    pub emergency_recipient: Option<Address>,
    /// When the emergency withdrawal was requested.
    pub emergency_requested_at: Option<DateTime<Utc>>,
    /// Whitelist state per address.
    pub whitelist: BTreeMap<Address, WhitelistEntry>,
    /// Every allocation ever requested.
    pub allocations: Vec<AllocationEntry>,
    /// Next allocation to consider.
    pub allocation_head: u64,
    /// Reserved amount per token.
    pub reserved: BTreeMap<TokenId, Amount>,
    /// Price guard settings.
    pub price_config: PriceFeedConfig,
    /// Main pool-manager setter.
    pub main_setter: Option<Identity>,
    /// Additional pool-manager setters.
    pub ext_setters: BTreeSet<Identity>,
    /// Managed pools.
    pub pool_managers: BTreeMap<PoolId, Identity>,
    /// Managed pools whose trades stay guarded.
    pub self_balancing: BTreeSet<PoolId>,
}

/// The treasury control plane.
pub struct Treasury {
    address: Address,
    state: TreasuryState,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Treasury {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Treasury")
            .field("address", &self.address)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Treasury {
    /// Builds a treasury from a validated configuration.
    pub fn new(
        config: &TreasuryConfig,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!(
            treasury = %config.treasury,
            governor = %config.governor,
            guardian = ?config.guardian,
            pause_authority = ?config.pause_authority,
            "treasury initialized"
        );
        Ok(Self {
            address: config.treasury,
            state: TreasuryState::from_config(config),
            collaborators,
            clock,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Address whose balances the treasury manages.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Current control-plane state.
    pub fn state(&self) -> &TreasuryState {
        &self.state
    }

    /// Treasury balance of `token`.
    pub fn balance_of(&self, token: &TokenId) -> Amount {
        self.collaborators.ledger.balance_of(token, &self.address)
    }

    /// Balance of `token` not reserved by pending allocations.
    pub fn unallocated_balance(&self, token: &TokenId) -> Amount {
        self.state
            .allocations
            .unallocated(token, self.balance_of(token))
    }

    /// Whether `addr` may receive direct transfers.
    pub fn is_whitelisted(&self, addr: &Address) -> bool {
        self.state.whitelist.is_whitelisted(addr)
    }

    /// Mode of `pool`.
    pub fn pool_mode(&self, pool: &PoolId) -> PoolMode {
        self.state.roles.pool_mode(pool)
    }

    /// Serializable view of the current state.
    pub fn snapshot(&self) -> TreasurySnapshot {
        let s = &self.state;
        TreasurySnapshot {
            treasury: self.address,
            taken_at: self.clock.now(),
            governor: s.roles.governor,
            guardian: s.roles.guardian,
            pending_governor: s.roles.pending_governor,
            governance_requested_at: s.governance.requested_at,
            paused: s.pause.paused,
            pause_authority: s.pause.authority,
            emergency_recipient: s.emergency_recipient,
            emergency_requested_at: s.emergency.requested_at,
            whitelist: s.whitelist.entries.clone(),
            allocations: s.allocations.entries.clone(),
            allocation_head: s.allocations.head,
            reserved: s.allocations.reserved.clone(),
            price_config: s.prices.clone(),
            main_setter: s.roles.main_setter,
            ext_setters: s.roles.ext_setters.clone(),
            pool_managers: s.roles.pool_managers.clone(),
            self_balancing: s.roles.self_balancing.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    /// Replaces the main pool-manager setter. Governor only.
    pub fn set_main_setter(&mut self, caller: &Address, setter: Address) -> TreasuryResult<()> {
        self.transact("set_main_setter", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.roles.set_main_setter(setter);
            tracing::info!(%setter, "main setter updated");
            Ok(())
        })
    }

    /// Enables or disables one ext-setter. Governor only.
    pub fn set_ext_setter(&mut self, caller: &Address, setter: Address, enabled: bool) -> TreasuryResult<()> {
        self.set_ext_setters(caller, &[setter], &[enabled])
    }

    /// Enables or disables ext-setters pairwise. Governor only.
    pub fn set_ext_setters(&mut self, caller: &Address, setters: &[Address], flags: &[bool]) -> TreasuryResult<()> {
        self.transact("set_ext_setters", |t| {
            t.state.roles.ensure_governor(caller)?;
            ensure_same_len(setters, flags)?;
            for (setter, enabled) in setters.iter().zip(flags) {
                t.state.roles.set_ext_setter(*setter, *enabled);
                tracing::info!(%setter, enabled, "ext setter updated");
            }
            Ok(())
        })
    }

    /// Assigns (or, with `ZERO`, removes) a pool manager.
    pub fn set_pool_manager(&mut self, caller: &Address, pool: PoolId, manager: Address) -> TreasuryResult<()> {
        self.transact("set_pool_manager", |t| {
            if !t.state.roles.is_manager_setter(caller) {
                return Err(TreasuryError::NotManagerSetter);
            }
            t.state.roles.set_pool_manager(pool, manager);
            tracing::info!(%pool, %manager, mode = %t.state.roles.pool_mode(&pool), "pool manager updated");
            Ok(())
        })
    }

    /// Marks a pool as self-balancing. Governor only.
    pub fn set_self_balancing(&mut self, caller: &Address, pool: PoolId, enabled: bool) -> TreasuryResult<()> {
        self.transact("set_self_balancing", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.roles.set_self_balancing(pool, enabled);
            tracing::info!(%pool, enabled, "self-balancing flag updated");
            Ok(())
        })
    }

    /// Names the next governor and (re)starts the governance timelock.
    pub fn set_pending_governor(&mut self, caller: &Address, pending: Identity) -> TreasuryResult<()> {
        self.transact("set_pending_governor", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.roles.set_pending_governor(pending)?;
            let now = t.clock.now();
            t.state.governance.request(now)?;
            tracing::info!(%pending, ready_at = ?t.state.governance.ready_at(), "governance transfer requested");
            Ok(())
        })
    }

    /// Hands governance to the pending governor once the delay has passed.
    /// Anyone may call it.
    pub fn transfer_governance(&mut self) -> TreasuryResult<Identity> {
        self.transact("transfer_governance", |t| {
            let now = t.clock.now();
            t.state.governance.execute(now)?;
            let governor = t.state.roles.promote_pending_governor()?;
            tracing::info!(%governor, "governance transferred");
            Ok(governor)
        })
    }

    /// Replaces the guardian. Guardian only.
    pub fn set_guardian(&mut self, caller: &Address, guardian: Identity) -> TreasuryResult<()> {
        self.transact("set_guardian", |t| {
            t.state.roles.ensure_guardian(caller)?;
            t.state.roles.set_guardian(guardian)?;
            tracing::info!(%guardian, "guardian replaced");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Pause gate
    // -----------------------------------------------------------------------

    /// Opens the circuit breaker.
    pub fn pause(&mut self, caller: &Address) -> TreasuryResult<()> {
        self.transact("pause", |t| {
            t.state.pause.ensure_authority(&t.state.roles, caller)?;
            t.state.pause.pause()?;
            tracing::warn!(%caller, "treasury paused");
            Ok(())
        })
    }

    /// Closes the circuit breaker and drops any emergency withdrawal request.
    pub fn unpause(&mut self, caller: &Address) -> TreasuryResult<()> {
        self.transact("unpause", |t| {
            t.state.pause.ensure_authority(&t.state.roles, caller)?;
            t.state.pause.unpause()?;
            t.state.emergency.clear();
            t.state.emergency_recipient = None;
            tracing::info!(%caller, "treasury unpaused");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Allocations
    // -----------------------------------------------------------------------

    /// Queues a delayed payout and reserves its amounts. Governor only.
    pub fn request_allocation(
        &mut self,
        caller: &Address,
        recipient: Address,
        tokens: Vec<TokenId>,
        amounts: Vec<Amount>,
    ) -> TreasuryResult<u64> {
        self.transact("request_allocation", |t| {
            t.state.roles.ensure_governor(caller)?;
            let now = t.clock.now();
            let ledger = Arc::clone(&t.collaborators.ledger);
            let treasury = t.address;
            let id = t.state.allocations.request(
                recipient,
                tokens,
                amounts,
                |token| ledger.balance_of(token, &treasury),
                now,
            )?;
            tracing::info!(id, %recipient, "allocation requested");
            Ok(id)
        })
    }

    /// Pays out the oldest pending allocation once mature. Guardian only.
    pub fn execute_allocation(&mut self, caller: &Address) -> TreasuryResult<AllocationEntry> {
        self.transact("execute_allocation", |t| {
            t.state.roles.ensure_guardian(caller)?;
            let now = t.clock.now();
            let entry = t.state.allocations.execute(now)?;
            t.pay(&entry.recipient, &entry.tokens, &entry.amounts)?;
            tracing::info!(id = entry.id, recipient = %entry.recipient, "allocation executed");
            Ok(entry)
        })
    }

    /// Aborts a pending allocation. Guardian only.
    pub fn abort_allocation(&mut self, caller: &Address, id: u64) -> TreasuryResult<()> {
        self.transact("abort_allocation", |t| {
            t.state.roles.ensure_guardian(caller)?;
            t.state.allocations.abort(id)?;
            tracing::info!(id, "allocation aborted");
            Ok(())
        })
    }

    /// Moves the queue head past one aborted entry. Guardian only.
    pub fn skip_aborted_allocation(&mut self, caller: &Address) -> TreasuryResult<()> {
        self.transact("skip_aborted_allocation", |t| {
            t.state.roles.ensure_guardian(caller)?;
            t.state.allocations.skip_aborted()?;
            tracing::debug!(head = t.state.allocations.head, "skipped aborted allocation");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Whitelist
    // -----------------------------------------------------------------------

    /// Starts admission timers. Guardian only.
    pub fn request_whitelisting(&mut self, caller: &Address, addrs: &[Address]) -> TreasuryResult<()> {
        self.transact("request_whitelisting", |t| {
            t.state.roles.ensure_guardian(caller)?;
            let now = t.clock.now();
            t.state.whitelist.request(addrs, now)?;
            tracing::info!(count = addrs.len(), "whitelisting requested");
            Ok(())
        })
    }

    /// Admits addresses whose requests have matured. Governor only.
    pub fn execute_whitelisting(&mut self, caller: &Address, addrs: &[Address]) -> TreasuryResult<()> {
        self.transact("execute_whitelisting", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_not_paused()?;
            let now = t.clock.now();
            t.state.whitelist.execute(addrs, now)?;
            for addr in addrs {
                tracing::info!(%addr, "address whitelisted");
            }
            Ok(())
        })
    }

    /// Cancels admission requests. Guardian only.
    pub fn abort_whitelisting(&mut self, caller: &Address, addrs: &[Address]) -> TreasuryResult<()> {
        self.transact("abort_whitelisting", |t| {
            t.state.roles.ensure_guardian(caller)?;
            t.state.whitelist.abort(addrs)?;
            tracing::info!(count = addrs.len(), "whitelisting aborted");
            Ok(())
        })
    }

    /// Revokes admission. Guardian only.
    pub fn remove_from_whitelist(&mut self, caller: &Address, addrs: &[Address]) -> TreasuryResult<()> {
        self.transact("remove_from_whitelist", |t| {
            t.state.roles.ensure_guardian(caller)?;
            t.state.whitelist.remove(addrs)?;
            for addr in addrs {
                tracing::info!(%addr, "address removed from whitelist");
            }
            Ok(())
        })
    }

    /// Pays a whitelisted address from unreserved funds. Governor only.
    pub fn transfer_to_whitelisted(
        &mut self,
        caller: &Address,
        to: &Address,
        tokens: &[TokenId],
        amounts: &[Amount],
    ) -> TreasuryResult<()> {
        self.transact("transfer_to_whitelisted", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_not_paused()?;
            t.state.whitelist.ensure_whitelisted(to)?;
            t.ensure_unreserved(tokens, amounts)?;
            t.pay(to, tokens, amounts)
        })
    }

    /// Converts native coin held by the treasury into its wrapped token.
    /// Governor only. Returns the wrapped token.
    pub fn wrap_native(&mut self, caller: &Address, amount: Amount) -> TreasuryResult<TokenId> {
        self.transact("wrap_native", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.ensure_unreserved(&[Address::NATIVE], &[amount])?;
            let wrapped = t.collaborators.ledger.wrap_native(&t.address, amount)?;
            tracing::info!(amount, %wrapped, "native coin wrapped");
            Ok(wrapped)
        })
    }

    // -----------------------------------------------------------------------
    // Trading
    // -----------------------------------------------------------------------

    /// Swaps on an open or self-balancing pool, bounded by the oracle.
    /// Returns the amount received.
    pub fn swap(
        &mut self,
        caller: &Address,
        token_in: &TokenId,
        token_out: &TokenId,
        amount_in: Amount,
    ) -> TreasuryResult<Amount> {
        self.transact("swap", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_not_paused()?;
            let pool = t.find_pool(token_in, token_out)?;
            if t.state.roles.pool_mode(&pool) == PoolMode::Managed {
                return Err(TreasuryError::PoolLocked(pool));
            }
            t.ensure_unreserved(&[*token_in], &[amount_in])?;

            let path = [*token_in, *token_out];
            let quoted = t.collaborators.router.quote_exact_in(amount_in, &path)?;
            let now = t.clock.now();
            let min_out = t.state.prices.guard(
                t.collaborators.oracle.as_ref(),
                token_in,
                token_out,
                amount_in,
                quoted,
                now,
            )?;
            let out = t
                .collaborators
                .router
                .swap_exact_tokens_for_tokens(&t.address, amount_in, min_out, &path)?;
            tracing::info!(%pool, amount_in, out, min_out, "guarded swap executed");
            Ok(out)
        })
    }

    /// Swaps on a managed pool with a caller-chosen minimum and no oracle
    /// check. Returns the amount received.
    pub fn swap_on_locked_pool(
        &mut self,
        caller: &Address,
        amount_in: Amount,
        min_out: Amount,
        token_in: &TokenId,
        token_out: &TokenId,
    ) -> TreasuryResult<Amount> {
        self.transact("swap_on_locked_pool", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_not_paused()?;
            let pool = t.find_pool(token_in, token_out)?;
            if t.state.roles.pool_mode(&pool) == PoolMode::Open {
                return Err(TreasuryError::CannotConvert(pool));
            }
            t.ensure_unreserved(&[*token_in], &[amount_in])?;
            let out = t.collaborators.router.swap_exact_tokens_for_tokens(
                &t.address,
                amount_in,
                min_out,
                &[*token_in, *token_out],
            )?;
            tracing::info!(%pool, amount_in, out, min_out, "locked-pool swap executed");
            Ok(out)
        })
    }

    /// Provides liquidity from treasury funds. The router creates the pool
    /// if it does not exist yet.
    pub fn add_liquidity(
        &mut self,
        caller: &Address,
        token_a: &TokenId,
        token_b: &TokenId,
        amount_a: Amount,
        amount_b: Amount,
    ) -> TreasuryResult<LiquidityAdded> {
        self.transact("add_liquidity", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_not_paused()?;
            t.ensure_unreserved(&[*token_a, *token_b], &[amount_a, amount_b])?;

            let router = Arc::clone(&t.collaborators.router);
            let reserves = router
                .get_pair(token_a, token_b)
                .and_then(|pool| router.pool_reserves(&pool));
            let guarded = reserves
                .as_ref()
                .map_or(true, |r| t.state.roles.pool_mode(&r.pool) != PoolMode::Managed);

            let (min_a, min_b) = if guarded {
                let ratio = reserves
                    .as_ref()
                    .and_then(|r| r.oriented(token_a))
                    .filter(|&(reserve_a, reserve_b)| reserve_a > 0 && reserve_b > 0);
                let proportional = |amount: Amount, num: Amount, den: Amount| -> TreasuryResult<Amount> {
                    Ok(amount.checked_mul(num).ok_or(TreasuryError::ArithmeticOverflow)? / den)
                };
                let implied_b = match ratio {
                    Some((reserve_a, reserve_b)) => proportional(amount_a, reserve_b, reserve_a)?,
                    None => amount_b,
                };
                let now = t.clock.now();
                let prices = &t.state.prices;
                let expected =
                    prices.expected_amount_out(t.collaborators.oracle.as_ref(), token_a, token_b, amount_a, now)?;
                prices.check_band(expected, implied_b)?;

                // The router only spends the side that matches the pool ratio.
                let (take_a, take_b) = match ratio {
                    Some((reserve_a, reserve_b)) if implied_b > amount_b => {
                        (proportional(amount_b, reserve_a, reserve_b)?, amount_b)
                    }
                    _ => (amount_a, implied_b),
                };
                (prices.min_acceptable(take_a), prices.min_acceptable(take_b))
            } else {
                (0, 0)
            };

            let added = router.add_liquidity(&t.address, token_a, token_b, amount_a, amount_b, min_a, min_b)?;
            tracing::info!(
                %token_a,
                %token_b,
                used_a = added.used_a,
                used_b = added.used_b,
                lp = added.lp_minted,
                "liquidity added"
            );
            Ok(added)
        })
    }

    /// Burns treasury LP shares of `pool`. Returns the withdrawn
    /// `(amount0, amount1)` in the pool's token order.
    pub fn remove_liquidity(&mut self, caller: &Address, pool: &PoolId, lp_amount: Amount) -> TreasuryResult<(Amount, Amount)> {
        self.transact("remove_liquidity", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_not_paused()?;
            let reserves = t.reserves_of(pool)?;
            t.ensure_unreserved(&[*pool], &[lp_amount])?;

            let (min0, min1) = if t.state.roles.pool_mode(pool) == PoolMode::Managed {
                (0, 0)
            } else {
                let now = t.clock.now();
                let prices = &t.state.prices;
                let expected = prices.expected_amount_out(
                    t.collaborators.oracle.as_ref(),
                    &reserves.token0,
                    &reserves.token1,
                    reserves.reserve0,
                    now,
                )?;
                prices.check_band(expected, reserves.reserve1)?;
                let share = |reserve: Amount| -> TreasuryResult<Amount> {
                    if reserves.lp_supply == 0 {
                        return Ok(0);
                    }
                    Ok(lp_amount
                        .checked_mul(reserve)
                        .ok_or(TreasuryError::ArithmeticOverflow)?
                        / reserves.lp_supply)
                };
                (
                    prices.min_acceptable(share(reserves.reserve0)?),
                    prices.min_acceptable(share(reserves.reserve1)?),
                )
            };

            let out = t.collaborators.router.remove_liquidity(
                &t.address,
                &reserves.token0,
                &reserves.token1,
                lp_amount,
                min0,
                min1,
            )?;
            tracing::info!(%pool, lp_amount, out0 = out.0, out1 = out.1, "liquidity removed");
            Ok(out)
        })
    }

    // -----------------------------------------------------------------------
    // Price guard configuration
    // -----------------------------------------------------------------------

    /// Sets the tolerance band, per mille. Governor only.
    pub fn set_max_deviation_factor(&mut self, caller: &Address, factor: u32) -> TreasuryResult<()> {
        self.transact("set_max_deviation_factor", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.prices.set_max_deviation_factor(factor)?;
            tracing::info!(factor, "max deviation factor updated");
            Ok(())
        })
    }

    /// Sets the oracle staleness limit. Governor only.
    pub fn set_max_staleness(&mut self, caller: &Address, secs: u64) -> TreasuryResult<()> {
        self.transact("set_max_staleness", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.prices.max_staleness_secs = secs;
            tracing::info!(secs, "max staleness updated");
            Ok(())
        })
    }

    /// Assigns oracle feeds. Governor only.
    pub fn set_price_feeds(&mut self, caller: &Address, tokens: &[TokenId], feeds: &[FeedId]) -> TreasuryResult<()> {
        self.transact("set_price_feeds", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.prices.set_price_feeds(tokens, feeds)?;
            tracing::info!(count = tokens.len(), "price feeds updated");
            Ok(())
        })
    }

    /// Assigns decimal normalizers. Governor only.
    pub fn set_token_decimals(&mut self, caller: &Address, tokens: &[TokenId], normalizers: &[Amount]) -> TreasuryResult<()> {
        self.transact("set_token_decimals", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.prices.set_token_decimals(tokens, normalizers)?;
            tracing::info!(count = tokens.len(), "token decimals updated");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Emergency withdrawal
    // -----------------------------------------------------------------------

    /// Names the emergency recipient and (re)starts the withdrawal delay.
    /// Governor only, while paused.
    pub fn request_emergency_withdrawal(&mut self, caller: &Address, recipient: Address) -> TreasuryResult<()> {
        self.transact("request_emergency_withdrawal", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_paused()?;
            if recipient.is_zero() {
                return Err(TreasuryError::ZeroAddress);
            }
            let now = t.clock.now();
            t.state.emergency.request(now)?;
            t.state.emergency_recipient = Some(recipient);
            tracing::warn!(%recipient, ready_at = ?t.state.emergency.ready_at(), "emergency withdrawal requested");
            Ok(())
        })
    }

    /// Cancels the emergency withdrawal. Governor only, while paused.
    pub fn abort_emergency_withdrawal(&mut self, caller: &Address) -> TreasuryResult<()> {
        self.transact("abort_emergency_withdrawal", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_paused()?;
            t.state.emergency.abort()?;
            t.state.emergency_recipient = None;
            tracing::info!("emergency withdrawal aborted");
            Ok(())
        })
    }

    /// Sends funds to the emergency recipient. Ignores allocation
    /// reservations and may repeat until aborted or unpaused.
    pub fn emergency_withdraw(&mut self, caller: &Address, tokens: &[TokenId], amounts: &[Amount]) -> TreasuryResult<()> {
        self.transact("emergency_withdraw", |t| {
            t.state.roles.ensure_governor(caller)?;
            t.state.pause.ensure_paused()?;
            let now = t.clock.now();
            t.state.emergency.execute(now)?;
            let recipient = t.state.emergency_recipient.ok_or(TreasuryError::NotRequested)?;
            t.pay(&recipient, tokens, amounts)?;
            tracing::warn!(%recipient, count = tokens.len(), "emergency withdrawal executed");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Staking
    // -----------------------------------------------------------------------

    /// Stakes treasury LP shares in the pool's farm.
    pub fn stake(&mut self, caller: &Address, pool: &PoolId, amount: Amount) -> TreasuryResult<()> {
        self.transact("stake", |t| {
            t.ensure_farm_action(caller, pool)?;
            t.ensure_unreserved(&[*pool], &[amount])?;
            t.collaborators.farms.stake(&t.address, pool, amount)?;
            tracing::info!(%pool, amount, "lp shares staked");
            Ok(())
        })
    }

    /// Withdraws staked LP shares.
    pub fn unstake(&mut self, caller: &Address, pool: &PoolId, amount: Amount) -> TreasuryResult<()> {
        self.transact("unstake", |t| {
            t.ensure_farm_action(caller, pool)?;
            t.collaborators.farms.unstake(&t.address, pool, amount)?;
            tracing::info!(%pool, amount, "lp shares unstaked");
            Ok(())
        })
    }

    /// Claims farm rewards. Returns the amount paid.
    pub fn claim_rewards(&mut self, caller: &Address, pool: &PoolId) -> TreasuryResult<Amount> {
        self.transact("claim_rewards", |t| {
            t.ensure_farm_action(caller, pool)?;
            let rewards = t.collaborators.farms.claim(&t.address, pool)?;
            tracing::info!(%pool, rewards, "farm rewards claimed");
            Ok(rewards)
        })
    }

    /// Unstakes everything and claims. Returns `(unstaked, rewards)`.
    pub fn exit_farm(&mut self, caller: &Address, pool: &PoolId) -> TreasuryResult<(Amount, Amount)> {
        self.transact("exit_farm", |t| {
            t.ensure_farm_action(caller, pool)?;
            let (unstaked, rewards) = t.collaborators.farms.exit(&t.address, pool)?;
            tracing::info!(%pool, unstaked, rewards, "farm exited");
            Ok((unstaked, rewards))
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Runs `op`, restoring the state checkpoint if it fails.
    fn transact<T, F>(&mut self, op: &'static str, f: F) -> TreasuryResult<T>
    where
        F: FnOnce(&mut Self) -> TreasuryResult<T>,
    {
        let checkpoint = self.state.clone();
        let result = f(self);
        if let Err(err) = &result {
            self.state = checkpoint;
            tracing::warn!(op, error = %err, "treasury call reverted");
        }
        result
    }

    fn ensure_unreserved(&self, tokens: &[TokenId], amounts: &[Amount]) -> TreasuryResult<()> {
        let ledger = &self.collaborators.ledger;
        self.state
            .allocations
            .ensure_unreserved(tokens, amounts, |token| ledger.balance_of(token, &self.address))
    }

    fn find_pool(&self, token_a: &TokenId, token_b: &TokenId) -> TreasuryResult<PoolId> {
        self.collaborators
            .router
            .get_pair(token_a, token_b)
            .ok_or(TreasuryError::PoolNotFound {
                token_a: *token_a,
                token_b: *token_b,
            })
    }

    fn reserves_of(&self, pool: &PoolId) -> TreasuryResult<PoolReserves> {
        self.collaborators
            .router
            .pool_reserves(pool)
            .ok_or_else(|| CollaboratorError::PoolNotFound(pool.to_hex()).into())
    }

    fn ensure_farm_action(&self, caller: &Address, pool: &PoolId) -> TreasuryResult<()> {
        self.state.roles.ensure_governor(caller)?;
        self.state.pause.ensure_not_paused()?;
        if self.collaborators.router.pool_reserves(pool).is_none() {
            return Err(TreasuryError::InvalidFarm(*pool));
        }
        if !self.collaborators.farms.is_deployed(pool) {
            return Err(TreasuryError::FarmNotDeployed(*pool));
        }
        Ok(())
    }

    /// Moves treasury funds to `to` after checking every balance first.
    fn pay(&self, to: &Address, tokens: &[TokenId], amounts: &[Amount]) -> TreasuryResult<()> {
        ensure_same_len(tokens, amounts)?;
        if to.is_zero() {
            return Err(TreasuryError::ZeroAddress);
        }
        let ledger = &self.collaborators.ledger;
        for (token, requested) in token_totals(tokens, amounts)? {
            let available = ledger.balance_of(&token, &self.address);
            if available < requested {
                return Err(CollaboratorError::InsufficientBalance {
                    token,
                    owner: self.address,
                    available,
                    requested,
                }
                .into());
            }
        }
        for (token, amount) in tokens.iter().zip(amounts) {
            if *amount == 0 {
                continue;
            }
            if !ledger.transfer(token, &self.address, to, *amount) {
                return Err(TreasuryError::TransferFailed {
                    token: *token,
                    to: *to,
                    amount: *amount,
                });
            }
            tracing::info!(%token, %to, amount, "treasury transfer");
        }
        Ok(())
    }
}
