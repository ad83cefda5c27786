//! Integration tests for swaps, liquidity and staking.
//!
//! Pools are constant-product with no fee, so every quoted amount below
//! can be checked by hand: `out = in * reserve_out / (reserve_in + in)`.

mod common;

use common::{addr, fixture, Fixture};
use treasury_contracts::{PoolMode, TreasuryError};
use treasury_protocol::{Amount, CollaboratorError, LiquidityRouter, PoolId, TokenId};

const PRICE: Amount = 100_000_000;
const SIX_DECIMALS: Amount = 1_000_000;

/// Open pool where swapping 1_000_000 A quotes exactly 900_000 B while
/// the oracle prices both tokens equally.
fn discounted_pool(f: &mut Fixture) -> (TokenId, TokenId, PoolId) {
    let (a, b) = (addr("token-a"), addr("token-b"));
    let pool = f
        .router
        .seed_pool(&a, &b, 1_000_000_000_000, 900_001_000_000)
        .unwrap();
    f.price(&[a, b], PRICE, SIX_DECIMALS);
    f.fund(&a, 10_000_000);
    (a, b, pool)
}

// ---------------------------------------------------------------------------
// Guarded swap
// ---------------------------------------------------------------------------

#[test]
fn swap_ten_percent_below_oracle() {
    let mut f = fixture();
    let (a, b, _) = discounted_pool(&mut f);
    assert_eq!(f.router.quote_exact_in(1_000_000, &[a, b]).unwrap(), 900_000);

    assert_eq!(
        f.treasury.swap(&f.governor, &a, &b, 1_000_000),
        Err(TreasuryError::AmountOutTooLow {
            expected: 1_000_000,
            quoted: 900_000,
        })
    );
    assert_eq!(f.treasury_balance(&a), 10_000_000);

    f.treasury.set_max_deviation_factor(&f.governor, 100).unwrap();
    let out = f.treasury.swap(&f.governor, &a, &b, 1_000_000).unwrap();
    assert_eq!(out, 900_000);
    assert_eq!(f.treasury_balance(&b), 900_000);
    assert_eq!(f.treasury_balance(&a), 9_000_000);
}

#[test]
fn swap_above_oracle_is_a_deviation() {
    let mut f = fixture();
    let (c, d) = (addr("token-c"), addr("token-d"));
    f.router
        .seed_pool(&c, &d, 1_000_000_000_000, 1_100_001_100_000)
        .unwrap();
    f.price(&[c, d], PRICE, SIX_DECIMALS);
    f.fund(&c, 1_000_000);

    assert_eq!(
        f.treasury.swap(&f.governor, &c, &d, 1_000_000),
        Err(TreasuryError::PriceDeviation {
            expected: 1_000_000,
            quoted: 1_100_000,
        })
    );
}

#[test]
fn stale_oracle_blocks_swap() {
    let mut f = fixture();
    let (a, b, _) = discounted_pool(&mut f);
    f.treasury.set_max_deviation_factor(&f.governor, 100).unwrap();
    f.advance(61);
    assert!(matches!(
        f.treasury.swap(&f.governor, &a, &b, 1_000_000),
        Err(TreasuryError::StaleOracle { age_secs: 61, .. })
    ));

    f.treasury.set_max_staleness(&f.governor, 120).unwrap();
    f.treasury.swap(&f.governor, &a, &b, 1_000_000).unwrap();
}

#[test]
fn missing_feed_and_missing_pool() {
    let mut f = fixture();
    let (x, y) = (addr("x"), addr("y"));
    assert_eq!(
        f.treasury.swap(&f.governor, &x, &y, 1),
        Err(TreasuryError::PoolNotFound { token_a: x, token_b: y })
    );

    f.router.seed_pool(&x, &y, 1_000_000, 1_000_000).unwrap();
    f.fund(&x, 1_000);
    assert_eq!(
        f.treasury.swap(&f.governor, &x, &y, 1_000),
        Err(TreasuryError::MissingPriceFeed(x))
    );
}

#[test]
fn swap_cannot_spend_reserved_funds() {
    let mut f = fixture();
    let (a, b, _) = discounted_pool(&mut f);
    f.treasury.set_max_deviation_factor(&f.governor, 100).unwrap();
    f.treasury
        .request_allocation(&f.governor, addr("grantee"), vec![a], vec![9_500_000])
        .unwrap();
    assert!(matches!(
        f.treasury.swap(&f.governor, &a, &b, 1_000_000),
        Err(TreasuryError::AmountExceedsUnallocatedBalance { unallocated: 500_000, .. })
    ));
}

// ---------------------------------------------------------------------------
// Managed pools
// ---------------------------------------------------------------------------

#[test]
fn managed_pools_use_locked_swap_only() {
    let mut f = fixture();
    let (a, b, pool) = discounted_pool(&mut f);

    assert_eq!(
        f.treasury.swap_on_locked_pool(&f.governor, 1_000, 1, &a, &b),
        Err(TreasuryError::CannotConvert(pool))
    );

    f.treasury.set_pool_manager(&f.governor, pool, addr("market-maker")).unwrap();
    assert_eq!(f.treasury.pool_mode(&pool), PoolMode::Managed);
    assert_eq!(
        f.treasury.swap(&f.governor, &a, &b, 1_000_000),
        Err(TreasuryError::PoolLocked(pool))
    );

    // No oracle check: the 10% discount goes through, bounded only by min_out.
    assert!(matches!(
        f.treasury.swap_on_locked_pool(&f.governor, 1_000_000, 900_001, &a, &b),
        Err(TreasuryError::Collaborator(CollaboratorError::Slippage { .. }))
    ));
    let out = f
        .treasury
        .swap_on_locked_pool(&f.governor, 1_000_000, 900_000, &a, &b)
        .unwrap();
    assert_eq!(out, 900_000);
}

#[test]
fn self_balancing_pools_stay_guarded() {
    let mut f = fixture();
    let (a, b, pool) = discounted_pool(&mut f);
    f.treasury.set_pool_manager(&f.governor, pool, addr("market-maker")).unwrap();
    f.treasury.set_self_balancing(&f.governor, pool, true).unwrap();

    assert!(matches!(
        f.treasury.swap(&f.governor, &a, &b, 1_000_000),
        Err(TreasuryError::AmountOutTooLow { .. })
    ));
    f.treasury.set_max_deviation_factor(&f.governor, 100).unwrap();
    f.treasury.swap(&f.governor, &a, &b, 1_000_000).unwrap();
}

// ---------------------------------------------------------------------------
// Liquidity
// ---------------------------------------------------------------------------

fn priced_pair(f: &mut Fixture) -> (TokenId, TokenId) {
    let (a, e) = (addr("token-a"), addr("token-e"));
    f.price(&[a, e], PRICE, SIX_DECIMALS);
    f.fund(&a, 2_000_000);
    f.fund(&e, 2_000_000);
    (a, e)
}

#[test]
fn add_liquidity_creates_pool_at_oracle_ratio() {
    let mut f = fixture();
    let (a, e) = priced_pair(&mut f);

    let added = f
        .treasury
        .add_liquidity(&f.governor, &a, &e, 1_000_000, 1_000_000)
        .unwrap();
    assert_eq!(added.used_a, 1_000_000);
    assert_eq!(added.used_b, 1_000_000);
    assert_eq!(added.lp_minted, 1_000_000);

    let pool = f.router.get_pair(&a, &e).unwrap();
    assert_eq!(f.treasury_balance(&pool), 1_000_000);
}

#[test]
fn add_liquidity_off_ratio_is_rejected() {
    let mut f = fixture();
    let (a, e) = priced_pair(&mut f);
    assert_eq!(
        f.treasury.add_liquidity(&f.governor, &a, &e, 1_000_000, 800_000),
        Err(TreasuryError::AmountOutTooLow {
            expected: 1_000_000,
            quoted: 800_000,
        })
    );
    assert!(f.router.get_pair(&a, &e).is_none());
}

#[test]
fn add_liquidity_spends_only_pool_ratio_of_unequal_amounts() {
    let mut f = fixture();
    let (a, e) = (addr("token-a"), addr("token-e"));
    f.router
        .seed_pool(&a, &e, 1_000_000_000, 1_000_000_000)
        .unwrap();
    f.price(&[a, e], PRICE, SIX_DECIMALS);
    f.fund(&a, 1_000_000);
    f.fund(&e, 2_000_000);

    let added = f
        .treasury
        .add_liquidity(&f.governor, &a, &e, 1_000_000, 2_000_000)
        .unwrap();
    assert_eq!((added.used_a, added.used_b), (1_000_000, 1_000_000));
    assert_eq!(f.treasury_balance(&a), 0);
    assert_eq!(f.treasury_balance(&e), 1_000_000);

    // The excess now sits on the other side.
    f.fund(&a, 2_000_000);
    let added = f
        .treasury
        .add_liquidity(&f.governor, &a, &e, 2_000_000, 500_000)
        .unwrap();
    assert_eq!((added.used_a, added.used_b), (500_000, 500_000));
    assert_eq!(f.treasury_balance(&a), 1_500_000);
    assert_eq!(f.treasury_balance(&e), 500_000);
}

#[test]
fn remove_liquidity_returns_pro_rata_share() {
    let mut f = fixture();
    let (a, e) = priced_pair(&mut f);
    f.treasury
        .add_liquidity(&f.governor, &a, &e, 1_000_000, 1_000_000)
        .unwrap();
    let pool = f.router.get_pair(&a, &e).unwrap();

    let (out0, out1) = f.treasury.remove_liquidity(&f.governor, &pool, 500_000).unwrap();
    assert_eq!((out0, out1), (500_000, 500_000));
    assert_eq!(f.treasury_balance(&pool), 500_000);
    assert_eq!(f.treasury_balance(&a), 1_500_000);
    assert_eq!(f.treasury_balance(&e), 1_500_000);
}

#[test]
fn remove_liquidity_checks_pool_ratio() {
    let mut f = fixture();
    let (a, e) = priced_pair(&mut f);
    f.treasury
        .add_liquidity(&f.governor, &a, &e, 1_000_000, 1_000_000)
        .unwrap();
    let pool = f.router.get_pair(&a, &e).unwrap();

    // Re-price token A so the pool no longer sits at the oracle ratio.
    let feed = treasury_protocol::Address::from_label(&format!("feed:{}", a.to_hex()));
    f.oracle.set_price(&feed, PRICE * 2, common::start());
    assert!(f.treasury.remove_liquidity(&f.governor, &pool, 500_000).is_err());
    assert_eq!(f.treasury_balance(&pool), 1_000_000);
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

#[test]
fn staking_requires_pool_and_farm() {
    let mut f = fixture();
    let (a, e) = priced_pair(&mut f);
    f.treasury
        .add_liquidity(&f.governor, &a, &e, 1_000_000, 1_000_000)
        .unwrap();
    let pool = f.router.get_pair(&a, &e).unwrap();

    let not_a_pool = addr("nowhere");
    assert_eq!(
        f.treasury.stake(&f.governor, &not_a_pool, 100),
        Err(TreasuryError::InvalidFarm(not_a_pool))
    );
    assert_eq!(
        f.treasury.stake(&f.governor, &pool, 100),
        Err(TreasuryError::FarmNotDeployed(pool))
    );
    assert_eq!(
        f.treasury.stake(&f.stranger, &pool, 100),
        Err(TreasuryError::NotAuthorized)
    );
}

#[test]
fn stake_claim_exit_cycle() {
    let mut f = fixture();
    let (a, e) = priced_pair(&mut f);
    let reward = addr("reward");
    f.treasury
        .add_liquidity(&f.governor, &a, &e, 1_000_000, 1_000_000)
        .unwrap();
    let pool = f.router.get_pair(&a, &e).unwrap();
    f.farms.deploy(&pool, &reward);

    f.treasury.stake(&f.governor, &pool, 600_000).unwrap();
    assert_eq!(f.treasury_balance(&pool), 400_000);
    assert_eq!(f.farms.staked(&pool, &f.treasury.address()), 600_000);

    f.treasury.unstake(&f.governor, &pool, 100_000).unwrap();
    assert!(matches!(
        f.treasury.unstake(&f.governor, &pool, 600_000),
        Err(TreasuryError::Collaborator(CollaboratorError::InsufficientStake { .. }))
    ));

    f.farms.accrue(&pool, &f.treasury.address(), 42).unwrap();
    assert_eq!(f.treasury.claim_rewards(&f.governor, &pool).unwrap(), 42);
    assert_eq!(f.treasury_balance(&reward), 42);

    f.farms.accrue(&pool, &f.treasury.address(), 8).unwrap();
    assert_eq!(f.treasury.exit_farm(&f.governor, &pool).unwrap(), (500_000, 8));
    assert_eq!(f.treasury_balance(&pool), 1_000_000);
}

// ---------------------------------------------------------------------------
// Native coin
// ---------------------------------------------------------------------------

#[test]
fn governor_wraps_unreserved_native_coin() {
    let mut f = fixture();
    let native = treasury_protocol::Address::NATIVE;
    f.fund(&native, 1_000);

    assert_eq!(
        f.treasury.wrap_native(&f.stranger, 1_000),
        Err(TreasuryError::NotAuthorized)
    );

    f.treasury
        .request_allocation(&f.governor, addr("grantee"), vec![native], vec![400])
        .unwrap();
    assert!(matches!(
        f.treasury.wrap_native(&f.governor, 700),
        Err(TreasuryError::AmountExceedsUnallocatedBalance { .. })
    ));

    let wrapped = f.treasury.wrap_native(&f.governor, 600).unwrap();
    assert_eq!(f.treasury_balance(&wrapped), 600);
    assert_eq!(f.treasury_balance(&native), 400);
}
