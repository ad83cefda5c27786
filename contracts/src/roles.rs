//! # Role Registry
//!
//! Who may do what. The governor runs the treasury; the optional guardian
//! holds the safety levers (queue control, whitelist requests, and on some
//! deployments the pause switch). Pool managers are assigned by a small
//! set of setters so that the governor does not need to be online to hand
//! a pool to its market maker.
//!
//! Governance itself changes hands through a timelock owned by the
//! dispatcher; this registry only remembers who is pending.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use treasury_protocol::{Address, Identity, PoolId};

use crate::error::{TreasuryError, TreasuryResult};

/// How a pool may be traded by the treasury.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolMode {
    /// No manager. Tradable through the guarded paths.
    Open,
    /// Locked to a manager. Only the unguarded locked-pool swap applies.
    Managed,
    /// Has a manager, but trades stay oracle-guarded.
    SelfBalancing,
}

impl std::fmt::Display for PoolMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolMode::Open => write!(f, "Open"),
            PoolMode::Managed => write!(f, "Managed"),
            PoolMode::SelfBalancing => write!(f, "SelfBalancing"),
        }
    }
}

/// Roles and pool assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRegistry {
    /// Primary operator.
    pub governor: Identity,
    /// Governor-elect, waiting on the governance timelock.
    pub pending_governor: Option<Identity>,
    /// Safety operator.
    pub guardian: Option<Identity>,
    /// Privileged pool-manager setter.
    pub main_setter: Option<Identity>,
    /// Additional pool-manager setters.
    pub ext_setters: BTreeSet<Identity>,
    /// Manager per pool. Absent means the pool is open.
    pub pool_managers: BTreeMap<PoolId, Identity>,
    /// Managed pools whose trades remain guarded.
    pub self_balancing: BTreeSet<PoolId>,
}

impl RoleRegistry {
    /// Creates a registry with only a governor and (optionally) a guardian.
    pub fn new(governor: Identity, guardian: Option<Identity>) -> Self {
        Self {
            governor,
            pending_governor: None,
            guardian,
            main_setter: None,
            ext_setters: BTreeSet::new(),
            pool_managers: BTreeMap::new(),
            self_balancing: BTreeSet::new(),
        }
    }

    /// `caller` is the governor.
    pub fn is_authorized(&self, caller: &Address) -> bool {
        *caller == self.governor
    }

    /// `caller` is the configured guardian.
    pub fn is_guardian(&self, caller: &Address) -> bool {
        self.guardian.as_ref() == Some(caller)
    }

    /// `caller` may assign pool managers.
    pub fn is_manager_setter(&self, caller: &Address) -> bool {
        self.is_authorized(caller)
            || self.main_setter.as_ref() == Some(caller)
            || self.ext_setters.contains(caller)
    }

    /// Fails with [`TreasuryError::NotAuthorized`] unless `caller` governs.
    pub fn ensure_governor(&self, caller: &Address) -> TreasuryResult<()> {
        if !self.is_authorized(caller) {
            return Err(TreasuryError::NotAuthorized);
        }
        Ok(())
    }

    /// Fails with [`TreasuryError::NotGuardian`] unless `caller` is guardian.
    /// Without a guardian the governor holds its duties.
    pub fn ensure_guardian(&self, caller: &Address) -> TreasuryResult<()> {
        let allowed = match self.guardian {
            Some(_) => self.is_guardian(caller),
            None => self.is_authorized(caller),
        };
        if !allowed {
            return Err(TreasuryError::NotGuardian);
        }
        Ok(())
    }

    /// Current mode of `pool`.
    pub fn pool_mode(&self, pool: &PoolId) -> PoolMode {
        if !self.pool_managers.contains_key(pool) {
            PoolMode::Open
        } else if self.self_balancing.contains(pool) {
            PoolMode::SelfBalancing
        } else {
            PoolMode::Managed
        }
    }

    // -- mutations (authorization is checked by the dispatcher) --

    /// Replaces the main setter. `ZERO` removes it.
    pub fn set_main_setter(&mut self, setter: Address) {
        self.main_setter = (!setter.is_zero()).then_some(setter);
    }

    /// Enables or disables an ext-setter.
    pub fn set_ext_setter(&mut self, setter: Address, enabled: bool) {
        if enabled {
            self.ext_setters.insert(setter);
        } else {
            self.ext_setters.remove(&setter);
        }
    }

    /// Assigns a manager. `ZERO` reopens the pool.
    pub fn set_pool_manager(&mut self, pool: PoolId, manager: Address) {
        if manager.is_zero() {
            self.pool_managers.remove(&pool);
        } else {
            self.pool_managers.insert(pool, manager);
        }
    }

    /// Marks or unmarks a pool as self-balancing.
    pub fn set_self_balancing(&mut self, pool: PoolId, enabled: bool) {
        if enabled {
            self.self_balancing.insert(pool);
        } else {
            self.self_balancing.remove(&pool);
        }
    }

    /// Records the governor-elect.
    pub fn set_pending_governor(&mut self, pending: Identity) -> TreasuryResult<()> {
        if pending.is_zero() {
            return Err(TreasuryError::ZeroAddress);
        }
        self.pending_governor = Some(pending);
        Ok(())
    }

    /// Promotes the governor-elect, returning the new governor.
    pub fn promote_pending_governor(&mut self) -> TreasuryResult<Identity> {
        let next = self.pending_governor.take().ok_or(TreasuryError::NotRequested)?;
        self.governor = next;
        Ok(next)
    }

    /// Replaces the guardian. Deployments without one cannot gain one.
    pub fn set_guardian(&mut self, guardian: Identity) -> TreasuryResult<()> {
        if self.guardian.is_none() {
            return Err(TreasuryError::NotGuardian);
        }
        if guardian.is_zero() {
            return Err(TreasuryError::ZeroAddress);
        }
        self.guardian = Some(guardian);
        Ok(())
    }
}
