//! In-memory farm registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::address::{Address, Amount, PoolId, TokenId};
use crate::collaborators::{CollaboratorError, FarmRegistry};

use super::ledger::MemoryLedger;

#[derive(Debug, Clone)]
struct Farm {
    address: Address,
    reward_token: TokenId,
    stakes: HashMap<Address, Amount>,
    pending_rewards: HashMap<Address, Amount>,
}

/// One farm per pool. Staked LP shares sit at the farm's own address in
/// the ledger; rewards are credited explicitly through [`accrue`](Self::accrue).
#[derive(Debug)]
pub struct MemoryFarmRegistry {
    ledger: Arc<MemoryLedger>,
    farms: RwLock<HashMap<PoolId, Farm>>,
}

impl MemoryFarmRegistry {
    /// Creates a registry with no farms.
    pub fn new(ledger: Arc<MemoryLedger>) -> Self {
        Self {
            ledger,
            farms: RwLock::new(HashMap::new()),
        }
    }

    /// Deploys a farm for `pool` paying rewards in `reward_token`.
    /// Returns the farm's address.
    pub fn deploy(&self, pool: &PoolId, reward_token: &TokenId) -> Address {
        let address = Address::from_label(&format!("farm:{}", pool.to_hex()));
        self.farms.write().entry(*pool).or_insert_with(|| Farm {
            address,
            reward_token: *reward_token,
            stakes: HashMap::new(),
            pending_rewards: HashMap::new(),
        });
        address
    }

    /// Credits `amount` of rewards to `staker`, minting the reward tokens
    /// into the farm.
    pub fn accrue(&self, pool: &PoolId, staker: &Address, amount: Amount) -> Result<(), CollaboratorError> {
        let mut farms = self.farms.write();
        let farm = farms
            .get_mut(pool)
            .ok_or(CollaboratorError::FarmNotDeployed(*pool))?;
        self.ledger.mint(&farm.reward_token, &farm.address, amount)?;
        let pending = farm.pending_rewards.entry(*staker).or_insert(0);
        *pending = pending.checked_add(amount).ok_or(CollaboratorError::Overflow)?;
        Ok(())
    }

    /// LP shares `staker` currently has in the farm for `pool`.
    pub fn staked(&self, pool: &PoolId, staker: &Address) -> Amount {
        self.farms
            .read()
            .get(pool)
            .and_then(|farm| farm.stakes.get(staker).copied())
            .unwrap_or(0)
    }
}

impl FarmRegistry for MemoryFarmRegistry {
    fn is_deployed(&self, pool: &PoolId) -> bool {
        self.farms.read().contains_key(pool)
    }

    fn stake(&self, staker: &Address, pool: &PoolId, amount: Amount) -> Result<(), CollaboratorError> {
        let mut farms = self.farms.write();
        let farm = farms
            .get_mut(pool)
            .ok_or(CollaboratorError::FarmNotDeployed(*pool))?;
        let staked = farm.stakes.get(staker).copied().unwrap_or(0);
        let updated = staked.checked_add(amount).ok_or(CollaboratorError::Overflow)?;
        self.ledger.try_transfer(pool, staker, &farm.address, amount)?;
        farm.stakes.insert(*staker, updated);
        Ok(())
    }

    fn unstake(&self, staker: &Address, pool: &PoolId, amount: Amount) -> Result<(), CollaboratorError> {
        let mut farms = self.farms.write();
        let farm = farms
            .get_mut(pool)
            .ok_or(CollaboratorError::FarmNotDeployed(*pool))?;
        let staked = farm.stakes.get(staker).copied().unwrap_or(0);
        if staked < amount {
            return Err(CollaboratorError::InsufficientStake {
                pool: *pool,
                staked,
                requested: amount,
            });
        }
        self.ledger.try_transfer(pool, &farm.address, staker, amount)?;
        farm.stakes.insert(*staker, staked - amount);
        Ok(())
    }

    fn claim(&self, staker: &Address, pool: &PoolId) -> Result<Amount, CollaboratorError> {
        let mut farms = self.farms.write();
        let farm = farms
            .get_mut(pool)
            .ok_or(CollaboratorError::FarmNotDeployed(*pool))?;
        let pending = farm.pending_rewards.remove(staker).unwrap_or(0);
        if pending > 0 {
            self.ledger
                .try_transfer(&farm.reward_token, &farm.address, staker, pending)?;
        }
        Ok(pending)
    }

    fn exit(&self, staker: &Address, pool: &PoolId) -> Result<(Amount, Amount), CollaboratorError> {
        let staked = self.staked(pool, staker);
        if staked > 0 {
            self.unstake(staker, pool, staked)?;
        }
        let rewards = self.claim(staker, pool)?;
        Ok((staked, rewards))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::TokenLedger;

    #[test]
    fn stake_claim_exit_cycle() {
        let ledger = Arc::new(MemoryLedger::new());
        let farms = MemoryFarmRegistry::new(Arc::clone(&ledger));
        let pool = Address::from_label("pool");
        let reward = Address::from_label("fliq");
        let staker = Address::from_label("treasury");

        ledger.mint(&pool, &staker, 1_000).unwrap();
        assert!(!farms.is_deployed(&pool));
        assert!(matches!(
            farms.stake(&staker, &pool, 100),
            Err(CollaboratorError::FarmNotDeployed(_))
        ));

        farms.deploy(&pool, &reward);
        farms.stake(&staker, &pool, 400).unwrap();
        assert_eq!(farms.staked(&pool, &staker), 400);
        assert_eq!(ledger.balance_of(&pool, &staker), 600);

        farms.accrue(&pool, &staker, 25).unwrap();
        assert_eq!(farms.claim(&staker, &pool).unwrap(), 25);
        assert_eq!(ledger.balance_of(&reward, &staker), 25);

        farms.accrue(&pool, &staker, 5).unwrap();
        assert_eq!(farms.exit(&staker, &pool).unwrap(), (400, 5));
        assert_eq!(ledger.balance_of(&pool, &staker), 1_000);
    }

    #[test]
    fn unstake_more_than_staked_fails() {
        let ledger = Arc::new(MemoryLedger::new());
        let farms = MemoryFarmRegistry::new(Arc::clone(&ledger));
        let pool = Address::from_label("pool");
        let staker = Address::from_label("treasury");
        farms.deploy(&pool, &Address::from_label("reward"));
        assert!(matches!(
            farms.unstake(&staker, &pool, 1),
            Err(CollaboratorError::InsufficientStake { staked: 0, .. })
        ));
    }
}
