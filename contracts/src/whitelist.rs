//! # Whitelist Registry
//!
//! Recipients the governor may pay directly. Admission goes through a
//! per-address timelock so that a compromised governor key cannot add a
//! fresh address and drain the treasury to it in one step.
//!
//! Every batch operation is all-or-nothing: the batch is applied to a copy
//! and committed only if every address succeeds.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use treasury_protocol::Address;

use crate::error::{TreasuryError, TreasuryResult};
use crate::timelock::TimelockRequest;

/// Admission state of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Outstanding admission request.
    pub request: TimelockRequest,
    /// Whether the address is admitted.
    pub whitelisted: bool,
}

/// All addresses that were ever requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistRegistry {
    /// Per-address state.
    pub entries: BTreeMap<Address, WhitelistEntry>,
    /// Admission delay in seconds.
    pub delay_secs: u64,
}

impl WhitelistRegistry {
    /// Creates an empty registry.
    pub fn new(delay_secs: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            delay_secs,
        }
    }

    /// Whether `addr` is admitted.
    pub fn is_whitelisted(&self, addr: &Address) -> bool {
        self.entries.get(addr).map_or(false, |e| e.whitelisted)
    }

    /// Fails with [`TreasuryError::NotWhitelisted`] unless admitted.
    pub fn ensure_whitelisted(&self, addr: &Address) -> TreasuryResult<()> {
        if !self.is_whitelisted(addr) {
            return Err(TreasuryError::NotWhitelisted(*addr));
        }
        Ok(())
    }

    /// Starts the admission timer for each address.
    pub fn request(&mut self, addrs: &[Address], now: DateTime<Utc>) -> TreasuryResult<()> {
        let delay_secs = self.delay_secs;
        self.apply(addrs, |addr, entries| {
            if addr.is_zero() {
                return Err(TreasuryError::ZeroAddress);
            }
            let entry = entries.entry(*addr).or_insert_with(|| WhitelistEntry {
                request: TimelockRequest::whitelist(delay_secs),
                whitelisted: false,
            });
            if entry.whitelisted {
                return Err(TreasuryError::AlreadyWhitelisted(*addr));
            }
            entry.request.delay_secs = delay_secs;
            entry.request.request(now)
        })
    }

    /// Admits each address whose request has matured.
    pub fn execute(&mut self, addrs: &[Address], now: DateTime<Utc>) -> TreasuryResult<()> {
        self.apply(addrs, |addr, entries| {
            let entry = entries.get_mut(addr).ok_or(TreasuryError::NotRequested)?;
            entry.request.execute(now)?;
            entry.whitelisted = true;
            Ok(())
        })
    }

    /// Cancels each outstanding request.
    pub fn abort(&mut self, addrs: &[Address]) -> TreasuryResult<()> {
        self.apply(addrs, |addr, entries| {
            entries
                .get_mut(addr)
                .ok_or(TreasuryError::NotRequested)?
                .request
                .abort()
        })
    }

    /// Revokes admission of each address.
    pub fn remove(&mut self, addrs: &[Address]) -> TreasuryResult<()> {
        self.apply(addrs, |addr, entries| match entries.get_mut(addr) {
            Some(entry) if entry.whitelisted => {
                entry.whitelisted = false;
                entry.request.clear();
                Ok(())
            }
            _ => Err(TreasuryError::NotWhitelisted(*addr)),
        })
    }

    fn apply<F>(&mut self, addrs: &[Address], mut op: F) -> TreasuryResult<()>
    where
        F: FnMut(&Address, &mut BTreeMap<Address, WhitelistEntry>) -> TreasuryResult<()>,
    {
        let mut staged = self.entries.clone();
        for addr in addrs {
            op(addr, &mut staged)?;
        }
        self.entries = staged;
        Ok(())
    }
}
