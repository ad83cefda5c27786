//! # Timelock
//!
//! A request that becomes executable once its delay has elapsed. The same
//! primitive backs governance transfer, emergency withdrawal and every
//! per-address whitelist entry; what differs between them is spelled out
//! by two policies instead of by copy-pasted state machines:
//!
//! - [`ReRequestPolicy`] decides what a second `request` does while one is
//!   outstanding (restart the timer, or refuse).
//! - [`ExecutePolicy`] decides whether a successful `execute` closes the
//!   request or leaves the window open until it is aborted.
//!
//! Maturity is never stored. It is computed from the supplied `now`, so a
//! timelock has exactly three observable states: idle, requested and
//! matured.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TreasuryError, TreasuryResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Behavior of `request` while a request is already outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReRequestPolicy {
    /// Restart the timer from the new request time.
    Reset,
    /// Fail with [`TreasuryError::AlreadyRequested`].
    Reject,
}

/// Behavior of a successful `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutePolicy {
    /// Clear the request; the next execution needs a new request.
    Consume,
    /// Keep the request; execution may repeat until aborted.
    Standing,
}

/// Derived state of a timelock at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelockStatus {
    /// Nothing requested.
    Idle,
    /// Requested, delay still running.
    Requested,
    /// Requested and the delay has elapsed.
    Matured,
}

impl std::fmt::Display for TimelockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimelockStatus::Idle => write!(f, "Idle"),
            TimelockStatus::Requested => write!(f, "Requested"),
            TimelockStatus::Matured => write!(f, "Matured"),
        }
    }
}

/// A single request/delay/execute-or-abort window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelockRequest {
    /// When the outstanding request was made, if any.
    pub requested_at: Option<DateTime<Utc>>,
    /// Seconds between request and maturity.
    pub delay_secs: u64,
    /// What a repeated request does.
    pub re_request: ReRequestPolicy,
    /// What a successful execution does.
    pub on_execute: ExecutePolicy,
}

impl TimelockRequest {
    /// Creates an idle timelock.
    pub fn new(delay_secs: u64, re_request: ReRequestPolicy, on_execute: ExecutePolicy) -> Self {
        Self {
            requested_at: None,
            delay_secs,
            re_request,
            on_execute,
        }
    }

    /// Governance transfer: re-requests restart the timer, execution consumes.
    pub fn governance(delay_secs: u64) -> Self {
        Self::new(delay_secs, ReRequestPolicy::Reset, ExecutePolicy::Consume)
    }

    /// Emergency withdrawal: re-requests restart the timer, execution repeats.
    pub fn emergency(delay_secs: u64) -> Self {
        Self::new(delay_secs, ReRequestPolicy::Reset, ExecutePolicy::Standing)
    }

    /// Whitelist entry: re-requests are refused, execution consumes.
    pub fn whitelist(delay_secs: u64) -> Self {
        Self::new(delay_secs, ReRequestPolicy::Reject, ExecutePolicy::Consume)
    }

    /// Whether a request is outstanding.
    pub fn is_requested(&self) -> bool {
        self.requested_at.is_some()
    }

    /// Earliest instant the outstanding request matures.
    ///
    /// A delay too large to represent never matures.
    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        let requested_at = self.requested_at?;
        let ready = i64::try_from(self.delay_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|delay| requested_at.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(ready)
    }

    /// Derived state at `now`.
    pub fn status(&self, now: DateTime<Utc>) -> TimelockStatus {
        match self.ready_at() {
            None => TimelockStatus::Idle,
            Some(ready) if now >= ready => TimelockStatus::Matured,
            Some(_) => TimelockStatus::Requested,
        }
    }

    /// Opens (or, under [`ReRequestPolicy::Reset`], restarts) the request.
    pub fn request(&mut self, now: DateTime<Utc>) -> TreasuryResult<()> {
        if self.is_requested() && self.re_request == ReRequestPolicy::Reject {
            return Err(TreasuryError::AlreadyRequested);
        }
        self.requested_at = Some(now);
        Ok(())
    }

    /// Checks that the request has matured and applies the execute policy.
    pub fn execute(&mut self, now: DateTime<Utc>) -> TreasuryResult<()> {
        self.ensure_mature(now)?;
        if self.on_execute == ExecutePolicy::Consume {
            self.requested_at = None;
        }
        Ok(())
    }

    /// Fails unless a request is outstanding and mature, without changing
    /// anything.
    pub fn ensure_mature(&self, now: DateTime<Utc>) -> TreasuryResult<()> {
        let ready_at = self.ready_at().ok_or(TreasuryError::NotRequested)?;
        if now < ready_at {
            return Err(TreasuryError::TooEarly { ready_at });
        }
        Ok(())
    }

    /// Cancels the outstanding request.
    pub fn abort(&mut self) -> TreasuryResult<()> {
        if !self.is_requested() {
            return Err(TreasuryError::NotRequested);
        }
        self.requested_at = None;
        Ok(())
    }

    /// Drops any outstanding request. Idle timelocks are left alone.
    pub fn clear(&mut self) {
        self.requested_at = None;
    }
}
