//! # In-Memory Collaborators
//!
//! Reference implementations of the collaborator traits, backed by plain
//! hash maps behind `parking_lot` locks. They share one [`MemoryLedger`]
//! so that a swap, a stake and a treasury transfer all move the same
//! balances. Tests and benches wire them into the treasury; nothing here is
//! meant to price real assets.

pub mod farm;
pub mod ledger;
pub mod oracle;
pub mod router;

pub use farm::MemoryFarmRegistry;
pub use ledger::MemoryLedger;
pub use oracle::MemoryOracle;
pub use router::{pool_address, MemoryRouter};
