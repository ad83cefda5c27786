//! In-memory token ledger.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::address::{Address, Amount, TokenId};
use crate::collaborators::{CollaboratorError, TokenLedger};

/// Balances keyed by `(token, owner)`.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: RwLock<HashMap<(TokenId, Address), Amount>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `amount` new units of `token` for `owner`.
    pub fn mint(&self, token: &TokenId, owner: &Address, amount: Amount) -> Result<(), CollaboratorError> {
        let mut balances = self.balances.write();
        let balance = balances.entry((*token, *owner)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(CollaboratorError::Overflow)?;
        Ok(())
    }

    /// Destroys `amount` units of `token` held by `owner`.
    pub fn burn(&self, token: &TokenId, owner: &Address, amount: Amount) -> Result<(), CollaboratorError> {
        let mut balances = self.balances.write();
        let balance = balances.entry((*token, *owner)).or_insert(0);
        if *balance < amount {
            return Err(CollaboratorError::InsufficientBalance {
                token: *token,
                owner: *owner,
                available: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }

    /// Token that [`TokenLedger::wrap_native`] mints.
    pub fn wrapped_native() -> TokenId {
        Address::from_label("wrapped-native")
    }

    /// Moves `amount` of `token` from `from` to `to`, reporting why a
    /// refused transfer was refused.
    pub fn try_transfer(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), CollaboratorError> {
        let mut balances = self.balances.write();
        let available = balances.get(&(*token, *from)).copied().unwrap_or(0);
        if available < amount {
            return Err(CollaboratorError::InsufficientBalance {
                token: *token,
                owner: *from,
                available,
                requested: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let receiving = balances.get(&(*token, *to)).copied().unwrap_or(0);
        let credited = receiving.checked_add(amount).ok_or(CollaboratorError::Overflow)?;
        balances.insert((*token, *from), available - amount);
        balances.insert((*token, *to), credited);
        Ok(())
    }
}

impl TokenLedger for MemoryLedger {
    fn balance_of(&self, token: &TokenId, owner: &Address) -> Amount {
        self.balances
            .read()
            .get(&(*token, *owner))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&self, token: &TokenId, from: &Address, to: &Address, amount: Amount) -> bool {
        match self.try_transfer(token, from, to, amount) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(%token, %from, %to, amount, error = %err, "ledger transfer refused");
                false
            }
        }
    }

    fn wrap_native(&self, owner: &Address, amount: Amount) -> Result<TokenId, CollaboratorError> {
        let wrapped = Self::wrapped_native();
        let mut balances = self.balances.write();
        let native = balances.get(&(Address::NATIVE, *owner)).copied().unwrap_or(0);
        if native < amount {
            return Err(CollaboratorError::InsufficientBalance {
                token: Address::NATIVE,
                owner: *owner,
                available: native,
                requested: amount,
            });
        }
        let held = balances.get(&(wrapped, *owner)).copied().unwrap_or(0);
        let credited = held.checked_add(amount).ok_or(CollaboratorError::Overflow)?;
        balances.insert((Address::NATIVE, *owner), native - amount);
        balances.insert((wrapped, *owner), credited);
        Ok(wrapped)
    }
}
