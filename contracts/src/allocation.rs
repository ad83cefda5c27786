//! # Allocation Queue
//!
//! Delayed multi-token payouts to a single recipient each. Requests are
//! appended with a sequential id and reserve their amounts immediately, so
//! the governor cannot promise the same balance twice. Execution is strictly
//! FIFO from `head`:
//!
//! ```text
//!   head
//!    v
//!  [Aborted][Aborted][Pending][Pending]...
//!             \_ auto-skipped by execute
//! ```
//!
//! The guardian can abort any pending entry (its reservation is released at
//! once) and can skip an aborted head explicitly. `execute` also skips
//! aborted heads on its own; the loop is bounded by the number of entries
//! since `head`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use treasury_protocol::{Address, Amount, TokenId};

use crate::error::{ensure_same_len, TreasuryError, TreasuryResult};
use crate::timelock::TimelockRequest;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationState {
    /// Waiting for its delay and its turn.
    Pending,
    /// Cancelled by the guardian.
    Aborted,
    /// Paid out.
    Executed,
}

impl std::fmt::Display for AllocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationState::Pending => write!(f, "Pending"),
            AllocationState::Aborted => write!(f, "Aborted"),
            AllocationState::Executed => write!(f, "Executed"),
        }
    }
}

/// One queued payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    /// Sequential id; also the entry's index in the queue.
    pub id: u64,
    /// Who receives the tokens.
    pub recipient: Address,
    /// Tokens to pay, parallel to `amounts`.
    pub tokens: Vec<TokenId>,
    /// Amounts to pay, parallel to `tokens`.
    pub amounts: Vec<Amount>,
    /// When the allocation was requested.
    pub requested_at: DateTime<Utc>,
    /// Current state.
    pub state: AllocationState,
}

/// The queue plus its per-token reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationQueue {
    /// All entries ever requested.
    pub entries: Vec<AllocationEntry>,
    /// Index of the next entry to consider.
    pub head: u64,
    /// Sum of `Pending` amounts per token.
    pub reserved: BTreeMap<TokenId, Amount>,
    /// Seconds an entry waits before it may execute.
    pub delay_secs: u64,
}

/// Sums amounts per token, so a token listed twice reserves both amounts.
pub(crate) fn token_totals(tokens: &[TokenId], amounts: &[Amount]) -> TreasuryResult<BTreeMap<TokenId, Amount>> {
    let mut totals: BTreeMap<TokenId, Amount> = BTreeMap::new();
    for (token, amount) in tokens.iter().zip(amounts) {
        let total = totals.entry(*token).or_insert(0);
        *total = total
            .checked_add(*amount)
            .ok_or(TreasuryError::ArithmeticOverflow)?;
    }
    Ok(totals)
}

impl AllocationQueue {
    /// Creates an empty queue.
    pub fn new(delay_secs: u64) -> Self {
        Self {
            entries: Vec::new(),
            head: 0,
            reserved: BTreeMap::new(),
            delay_secs,
        }
    }

    /// Amount of `token` reserved by pending entries.
    pub fn reserved_of(&self, token: &TokenId) -> Amount {
        self.reserved.get(token).copied().unwrap_or(0)
    }

    /// `balance` minus what pending entries have reserved.
    pub fn unallocated(&self, token: &TokenId, balance: Amount) -> Amount {
        balance.saturating_sub(self.reserved_of(token))
    }

    /// Fails if spending `amounts` from `balance_of` would touch reserved funds.
    pub fn ensure_unreserved<F>(&self, tokens: &[TokenId], amounts: &[Amount], balance_of: F) -> TreasuryResult<()>
    where
        F: Fn(&TokenId) -> Amount,
    {
        ensure_same_len(tokens, amounts)?;
        for (token, requested) in token_totals(tokens, amounts)? {
            let unallocated = self.unallocated(&token, balance_of(&token));
            if requested > unallocated {
                return Err(TreasuryError::AmountExceedsUnallocatedBalance {
                    token,
                    requested,
                    unallocated,
                });
            }
        }
        Ok(())
    }

    /// Appends a pending entry and reserves its amounts. Returns the new id.
    pub fn request<F>(
        &mut self,
        recipient: Address,
        tokens: Vec<TokenId>,
        amounts: Vec<Amount>,
        balance_of: F,
        now: DateTime<Utc>,
    ) -> TreasuryResult<u64>
    where
        F: Fn(&TokenId) -> Amount,
    {
        ensure_same_len(&tokens, &amounts)?;
        if recipient.is_zero() {
            return Err(TreasuryError::ZeroAddress);
        }
        self.ensure_unreserved(&tokens, &amounts, balance_of)?;
        for (token, amount) in token_totals(&tokens, &amounts)? {
            self.reserve(token, amount)?;
        }

        let id = self.entries.len() as u64;
        self.entries.push(AllocationEntry {
            id,
            recipient,
            tokens,
            amounts,
            requested_at: now,
            state: AllocationState::Pending,
        });
        Ok(id)
    }

    /// Advances past aborted entries, marks the head executed and releases
    /// its reservation. Returns the executed entry for payout.
    pub fn execute(&mut self, now: DateTime<Utc>) -> TreasuryResult<AllocationEntry> {
        let skipped = self.skip_aborted_prefix();
        if skipped > 0 {
            tracing::debug!(skipped, head = self.head, "skipped aborted allocations");
        }

        let index = self.head_index()?;
        let entry = self
            .entries
            .get(index)
            .ok_or(TreasuryError::NoPendingAllocation)?;
        if entry.state != AllocationState::Pending {
            return Err(TreasuryError::NoPendingAllocation);
        }
        let mut lock = TimelockRequest::governance(self.delay_secs);
        lock.requested_at = Some(entry.requested_at);
        lock.ensure_mature(now)?;

        let entry = entry.clone();
        self.release(&entry)?;
        self.entries[index].state = AllocationState::Executed;
        self.head += 1;
        Ok(AllocationEntry {
            state: AllocationState::Executed,
            ..entry
        })
    }

    /// Aborts a pending entry and releases its reservation.
    pub fn abort(&mut self, id: u64) -> TreasuryResult<()> {
        let entry = usize::try_from(id)
            .ok()
            .and_then(|index| self.entries.get(index))
            .filter(|entry| entry.state == AllocationState::Pending)
            .cloned()
            .ok_or(TreasuryError::AllocationNotPending(id))?;
        self.release(&entry)?;
        self.entries[entry.id as usize].state = AllocationState::Aborted;
        Ok(())
    }

    /// Moves `head` past exactly one aborted entry.
    pub fn skip_aborted(&mut self) -> TreasuryResult<()> {
        let index = self.head_index()?;
        match self.entries.get(index) {
            Some(entry) if entry.state == AllocationState::Aborted => {
                self.head += 1;
                Ok(())
            }
            _ => Err(TreasuryError::NotAborted),
        }
    }

    /// Entries not yet passed by `head`.
    pub fn outstanding(&self) -> impl Iterator<Item = &AllocationEntry> {
        self.entries.iter().skip(self.head as usize)
    }

    fn head_index(&self) -> TreasuryResult<usize> {
        usize::try_from(self.head).map_err(|_| TreasuryError::ArithmeticOverflow)
    }

    fn skip_aborted_prefix(&mut self) -> u64 {
        let mut skipped = 0;
        while let Some(entry) = self.entries.get(self.head as usize) {
            if entry.state != AllocationState::Aborted {
                break;
            }
            self.head += 1;
            skipped += 1;
        }
        skipped
    }

    fn reserve(&mut self, token: TokenId, amount: Amount) -> TreasuryResult<()> {
        let reserved = self.reserved.entry(token).or_insert(0);
        *reserved = reserved
            .checked_add(amount)
            .ok_or(TreasuryError::ArithmeticOverflow)?;
        Ok(())
    }

    fn release(&mut self, entry: &AllocationEntry) -> TreasuryResult<()> {
        for (token, amount) in token_totals(&entry.tokens, &entry.amounts)? {
            let remaining = self
                .reserved_of(&token)
                .checked_sub(amount)
                .ok_or(TreasuryError::ArithmeticOverflow)?;
            if remaining == 0 {
                self.reserved.remove(&token);
            } else {
                self.reserved.insert(token, remaining);
            }
        }
        Ok(())
    }
}
