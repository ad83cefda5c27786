//! # Pause Gate
//!
//! A single circuit breaker. Normal operations require it closed; the
//! emergency-withdrawal workflow requires it open. Which role may flip it
//! is a deployment choice captured by [`PauseAuthority`].

use serde::{Deserialize, Serialize};
use treasury_protocol::Address;

use crate::error::{TreasuryError, TreasuryResult};
use crate::roles::RoleRegistry;

/// Role allowed to pause and unpause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseAuthority {
    /// The governor flips the switch.
    #[default]
    Governor,
    /// The guardian flips the switch.
    Guardian,
}

/// The circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseGate {
    /// Whether the treasury is paused.
    pub paused: bool,
    /// Who may toggle `paused`.
    pub authority: PauseAuthority,
}

impl PauseGate {
    /// Creates an unpaused gate.
    pub fn new(authority: PauseAuthority) -> Self {
        Self {
            paused: false,
            authority,
        }
    }

    /// Fails unless `caller` holds the pause authority.
    pub fn ensure_authority(&self, roles: &RoleRegistry, caller: &Address) -> TreasuryResult<()> {
        match self.authority {
            PauseAuthority::Governor => roles.ensure_governor(caller),
            PauseAuthority::Guardian => roles.ensure_guardian(caller),
        }
    }

    /// Fails with [`TreasuryError::Paused`] while paused.
    pub fn ensure_not_paused(&self) -> TreasuryResult<()> {
        if self.paused {
            return Err(TreasuryError::Paused);
        }
        Ok(())
    }

    /// Fails with [`TreasuryError::NotPaused`] unless paused.
    pub fn ensure_paused(&self) -> TreasuryResult<()> {
        if !self.paused {
            return Err(TreasuryError::NotPaused);
        }
        Ok(())
    }

    /// Opens the breaker.
    pub fn pause(&mut self) -> TreasuryResult<()> {
        self.ensure_not_paused()?;
        self.paused = true;
        Ok(())
    }

    /// Closes the breaker.
    pub fn unpause(&mut self) -> TreasuryResult<()> {
        self.ensure_paused()?;
        self.paused = false;
        Ok(())
    }
}
