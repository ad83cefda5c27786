//! In-memory constant-product router.
//!
//! A deliberately plain `x * y = k` pool with no fee. It exists so the
//! treasury can be exercised end to end; it is not a pricing reference.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::address::{Address, Amount, PoolId, TokenId};
use crate::collaborators::{
    CollaboratorError, LiquidityAdded, LiquidityRouter, PoolReserves, TokenLedger,
};

use super::ledger::MemoryLedger;

#[derive(Debug, Clone)]
struct Pool {
    token0: TokenId,
    token1: TokenId,
    reserve0: Amount,
    reserve1: Amount,
    lp_supply: Amount,
}

impl Pool {
    fn new(token_a: &TokenId, token_b: &TokenId) -> Self {
        let (token0, token1) = sort_tokens(token_a, token_b);
        Self {
            token0,
            token1,
            reserve0: 0,
            reserve1: 0,
            lp_supply: 0,
        }
    }

    fn oriented(&self, token: &TokenId) -> Option<(Amount, Amount)> {
        if *token == self.token0 {
            Some((self.reserve0, self.reserve1))
        } else if *token == self.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }

    fn reserve_mut(&mut self, token: &TokenId) -> Option<&mut Amount> {
        if *token == self.token0 {
            Some(&mut self.reserve0)
        } else if *token == self.token1 {
            Some(&mut self.reserve1)
        } else {
            None
        }
    }

    fn deposit(&mut self, token: &TokenId, amount: Amount) -> Result<(), CollaboratorError> {
        let reserve = self
            .reserve_mut(token)
            .ok_or_else(|| CollaboratorError::InvalidPath(format!("{token} not in pool")))?;
        *reserve = reserve.checked_add(amount).ok_or(CollaboratorError::Overflow)?;
        Ok(())
    }

    fn withdraw(&mut self, token: &TokenId, amount: Amount) -> Result<(), CollaboratorError> {
        let reserve = self
            .reserve_mut(token)
            .ok_or_else(|| CollaboratorError::InvalidPath(format!("{token} not in pool")))?;
        *reserve = reserve.checked_sub(amount).ok_or(CollaboratorError::Overflow)?;
        Ok(())
    }
}

fn sort_tokens(a: &TokenId, b: &TokenId) -> (TokenId, TokenId) {
    match a.cmp(b) {
        Ordering::Greater => (*b, *a),
        _ => (*a, *b),
    }
}

/// Deterministic pool address for a token pair, independent of order.
pub fn pool_address(token_a: &TokenId, token_b: &TokenId) -> PoolId {
    let (token0, token1) = sort_tokens(token_a, token_b);
    Address::from_label(&format!("pool:{}:{}", token0.to_hex(), token1.to_hex()))
}

fn amount_out(
    pool: &PoolId,
    amount_in: Amount,
    reserve_in: Amount,
    reserve_out: Amount,
) -> Result<Amount, CollaboratorError> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(CollaboratorError::InsufficientLiquidity(*pool));
    }
    let numerator = amount_in
        .checked_mul(reserve_out)
        .ok_or(CollaboratorError::Overflow)?;
    let denominator = reserve_in
        .checked_add(amount_in)
        .ok_or(CollaboratorError::Overflow)?;
    Ok(numerator / denominator)
}

fn proportional(
    pool: &PoolId,
    amount: Amount,
    numerator: Amount,
    denominator: Amount,
) -> Result<Amount, CollaboratorError> {
    if denominator == 0 {
        return Err(CollaboratorError::InsufficientLiquidity(*pool));
    }
    amount
        .checked_mul(numerator)
        .map(|scaled| scaled / denominator)
        .ok_or(CollaboratorError::Overflow)
}

/// Integer square root (floor), Newton's method.
fn isqrt(n: Amount) -> Amount {
    if n < 2 {
        return n;
    }
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Two-token constant-product pools backed by a [`MemoryLedger`].
#[derive(Debug)]
pub struct MemoryRouter {
    ledger: Arc<MemoryLedger>,
    pools: RwLock<HashMap<PoolId, Pool>>,
}

impl MemoryRouter {
    /// Creates a router with no pools.
    pub fn new(ledger: Arc<MemoryLedger>) -> Self {
        Self {
            ledger,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an empty pool for the pair and returns its address.
    pub fn create_pool(&self, token_a: &TokenId, token_b: &TokenId) -> Result<PoolId, CollaboratorError> {
        if token_a == token_b {
            return Err(CollaboratorError::InvalidPath("identical tokens".into()));
        }
        let pool = pool_address(token_a, token_b);
        self.pools
            .write()
            .entry(pool)
            .or_insert_with(|| Pool::new(token_a, token_b));
        Ok(pool)
    }

    /// Creates the pool if needed and mints reserves straight into it.
    ///
    /// The bootstrap LP shares are parked at [`Address::ZERO`] so nobody can
    /// withdraw the seed liquidity.
    pub fn seed_pool(
        &self,
        token_a: &TokenId,
        token_b: &TokenId,
        reserve_a: Amount,
        reserve_b: Amount,
    ) -> Result<PoolId, CollaboratorError> {
        let pool_id = self.create_pool(token_a, token_b)?;
        let lp = isqrt(reserve_a.checked_mul(reserve_b).ok_or(CollaboratorError::Overflow)?);

        let mut pools = self.pools.write();
        let pool = pools
            .get_mut(&pool_id)
            .ok_or_else(|| CollaboratorError::PoolNotFound(pool_id.to_hex()))?;
        pool.deposit(token_a, reserve_a)?;
        pool.deposit(token_b, reserve_b)?;
        pool.lp_supply = pool.lp_supply.checked_add(lp).ok_or(CollaboratorError::Overflow)?;

        self.ledger.mint(token_a, &pool_id, reserve_a)?;
        self.ledger.mint(token_b, &pool_id, reserve_b)?;
        self.ledger.mint(&pool_id, &Address::ZERO, lp)?;
        Ok(pool_id)
    }

    fn route(
        pools: &HashMap<PoolId, Pool>,
        amount_in: Amount,
        path: &[TokenId],
    ) -> Result<Vec<(PoolId, Amount)>, CollaboratorError> {
        if path.len() < 2 {
            return Err(CollaboratorError::InvalidPath(format!(
                "path needs at least two tokens, got {}",
                path.len()
            )));
        }

        let mut amount = amount_in;
        let mut hops = Vec::with_capacity(path.len() - 1);
        for hop in path.windows(2) {
            if hop[0] == hop[1] {
                return Err(CollaboratorError::InvalidPath("repeated token".into()));
            }
            let pool_id = pool_address(&hop[0], &hop[1]);
            let pool = pools
                .get(&pool_id)
                .ok_or_else(|| CollaboratorError::PoolNotFound(pool_id.to_hex()))?;
            let (reserve_in, reserve_out) = pool
                .oriented(&hop[0])
                .ok_or_else(|| CollaboratorError::PoolNotFound(pool_id.to_hex()))?;
            amount = amount_out(&pool_id, amount, reserve_in, reserve_out)?;
            if amount == 0 {
                return Err(CollaboratorError::InsufficientLiquidity(pool_id));
            }
            hops.push((pool_id, amount));
        }
        Ok(hops)
    }
}

impl LiquidityRouter for MemoryRouter {
    fn get_pair(&self, token_a: &TokenId, token_b: &TokenId) -> Option<PoolId> {
        let pool = pool_address(token_a, token_b);
        self.pools.read().contains_key(&pool).then_some(pool)
    }

    fn pool_reserves(&self, pool: &PoolId) -> Option<PoolReserves> {
        self.pools.read().get(pool).map(|p| PoolReserves {
            pool: *pool,
            token0: p.token0,
            token1: p.token1,
            reserve0: p.reserve0,
            reserve1: p.reserve1,
            lp_supply: p.lp_supply,
        })
    }

    fn quote_exact_in(&self, amount_in: Amount, path: &[TokenId]) -> Result<Amount, CollaboratorError> {
        let pools = self.pools.read();
        let hops = Self::route(&pools, amount_in, path)?;
        Ok(hops.last().map(|(_, out)| *out).unwrap_or(amount_in))
    }

    fn add_liquidity(
        &self,
        provider: &Address,
        token_a: &TokenId,
        token_b: &TokenId,
        amount_a: Amount,
        amount_b: Amount,
        min_a: Amount,
        min_b: Amount,
    ) -> Result<LiquidityAdded, CollaboratorError> {
        if token_a == token_b {
            return Err(CollaboratorError::InvalidPath("identical tokens".into()));
        }
        let pool_id = pool_address(token_a, token_b);
        let mut pools = self.pools.write();
        let pool = pools
            .entry(pool_id)
            .or_insert_with(|| Pool::new(token_a, token_b));
        let (reserve_a, reserve_b) = pool
            .oriented(token_a)
            .ok_or_else(|| CollaboratorError::PoolNotFound(pool_id.to_hex()))?;

        let (used_a, used_b) = if reserve_a == 0 && reserve_b == 0 {
            (amount_a, amount_b)
        } else {
            let b_optimal = proportional(&pool_id, amount_a, reserve_b, reserve_a)?;
            if b_optimal <= amount_b {
                if b_optimal < min_b {
                    return Err(CollaboratorError::Slippage {
                        minimum: min_b,
                        actual: b_optimal,
                    });
                }
                (amount_a, b_optimal)
            } else {
                let a_optimal = proportional(&pool_id, amount_b, reserve_a, reserve_b)?;
                if a_optimal < min_a {
                    return Err(CollaboratorError::Slippage {
                        minimum: min_a,
                        actual: a_optimal,
                    });
                }
                (a_optimal, amount_b)
            }
        };

        for (token, used) in [(token_a, used_a), (token_b, used_b)] {
            let available = self.ledger.balance_of(token, provider);
            if available < used {
                return Err(CollaboratorError::InsufficientBalance {
                    token: *token,
                    owner: *provider,
                    available,
                    requested: used,
                });
            }
        }

        let lp_minted = if pool.lp_supply == 0 {
            isqrt(used_a.checked_mul(used_b).ok_or(CollaboratorError::Overflow)?)
        } else {
            let by_a = proportional(&pool_id, used_a, pool.lp_supply, reserve_a)?;
            let by_b = proportional(&pool_id, used_b, pool.lp_supply, reserve_b)?;
            by_a.min(by_b)
        };
        if lp_minted == 0 {
            return Err(CollaboratorError::InsufficientLiquidity(pool_id));
        }

        self.ledger.try_transfer(token_a, provider, &pool_id, used_a)?;
        self.ledger.try_transfer(token_b, provider, &pool_id, used_b)?;
        pool.deposit(token_a, used_a)?;
        pool.deposit(token_b, used_b)?;
        pool.lp_supply = pool
            .lp_supply
            .checked_add(lp_minted)
            .ok_or(CollaboratorError::Overflow)?;
        self.ledger.mint(&pool_id, provider, lp_minted)?;

        Ok(LiquidityAdded {
            used_a,
            used_b,
            lp_minted,
        })
    }

    fn remove_liquidity(
        &self,
        provider: &Address,
        token_a: &TokenId,
        token_b: &TokenId,
        lp_amount: Amount,
        min_a: Amount,
        min_b: Amount,
    ) -> Result<(Amount, Amount), CollaboratorError> {
        let pool_id = pool_address(token_a, token_b);
        let mut pools = self.pools.write();
        let pool = pools
            .get_mut(&pool_id)
            .ok_or_else(|| CollaboratorError::PoolNotFound(pool_id.to_hex()))?;
        let (reserve_a, reserve_b) = pool
            .oriented(token_a)
            .ok_or_else(|| CollaboratorError::PoolNotFound(pool_id.to_hex()))?;

        let out_a = proportional(&pool_id, lp_amount, reserve_a, pool.lp_supply)?;
        let out_b = proportional(&pool_id, lp_amount, reserve_b, pool.lp_supply)?;
        if out_a < min_a {
            return Err(CollaboratorError::Slippage {
                minimum: min_a,
                actual: out_a,
            });
        }
        if out_b < min_b {
            return Err(CollaboratorError::Slippage {
                minimum: min_b,
                actual: out_b,
            });
        }

        self.ledger.burn(&pool_id, provider, lp_amount)?;
        pool.withdraw(token_a, out_a)?;
        pool.withdraw(token_b, out_b)?;
        pool.lp_supply = pool
            .lp_supply
            .checked_sub(lp_amount)
            .ok_or(CollaboratorError::Overflow)?;
        self.ledger.try_transfer(token_a, &pool_id, provider, out_a)?;
        self.ledger.try_transfer(token_b, &pool_id, provider, out_b)?;
        Ok((out_a, out_b))
    }

    fn swap_exact_tokens_for_tokens(
        &self,
        trader: &Address,
        amount_in: Amount,
        min_out: Amount,
        path: &[TokenId],
    ) -> Result<Amount, CollaboratorError> {
        let mut pools = self.pools.write();
        let hops = Self::route(&pools, amount_in, path)?;
        let (first_pool, actual) = match (hops.first(), hops.last()) {
            (Some((first, _)), Some((_, out))) => (*first, *out),
            _ => return Err(CollaboratorError::InvalidPath("empty route".into())),
        };
        if actual < min_out {
            return Err(CollaboratorError::Slippage {
                minimum: min_out,
                actual,
            });
        }

        self.ledger.try_transfer(&path[0], trader, &first_pool, amount_in)?;
        let mut amount = amount_in;
        for (i, (pool_id, out)) in hops.iter().enumerate() {
            let pool = pools
                .get_mut(pool_id)
                .ok_or_else(|| CollaboratorError::PoolNotFound(pool_id.to_hex()))?;
            pool.deposit(&path[i], amount)?;
            pool.withdraw(&path[i + 1], *out)?;
            let recipient = hops.get(i + 1).map(|(next, _)| *next).unwrap_or(*trader);
            self.ledger.try_transfer(&path[i + 1], pool_id, &recipient, *out)?;
            amount = *out;
        }
        Ok(actual)
    }
}
