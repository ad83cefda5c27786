// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Treasury Protocol: Shared Primitives
//!
//! Everything the treasury control plane needs that is not itself a
//! control-plane decision: addresses and amounts, protocol constants, the
//! injected clock, and the interfaces of the outside world it talks to.
//!
//! ## Modules
//!
//! - **address**: 20-byte identities, hex encoding, the `Amount` type.
//! - **config**: Scales, default delays and thresholds.
//! - **clock**: `Clock` trait; wall-clock and manual implementations.
//! - **collaborators**: Token ledger, router, farm registry and oracle
//!   traits, plus the errors they report.
//! - **memory**: In-memory collaborators for tests and benches.
//! - **logging**: `tracing` subscriber setup.
//!
//! ## Design Philosophy
//!
//! 1. Amounts are `u128` and every operation on them is checked.
//! 2. Time is a parameter, never an ambient read.
//! 3. Collaborators are traits so the host decides what actually moves funds.

pub mod address;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod logging;
pub mod memory;

pub use address::{Address, Amount, FeedId, Identity, PoolId, TokenId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    CollaboratorError, FarmRegistry, LiquidityAdded, LiquidityRouter, PoolReserves, PriceOracle,
    PriceReading, TokenLedger,
};
