//! # Treasury Control Plane
//!
//! Decides who may move treasury funds, after what delay, and within what
//! price bounds. Moving the funds is delegated to the collaborators defined
//! in `treasury_protocol`:
//!
//! - **Roles**: governor, guardian, pool-manager setters, pool modes.
//! - **Timelock**: request/delay/execute-or-abort with explicit policies
//!   for re-requests and repeated execution.
//! - **Pause Gate**: circuit breaker that blocks normal operations and
//!   unlocks the emergency-withdrawal path.
//! - **Allocation Queue**: delayed multi-token payouts with balance
//!   reservations and FIFO execution.
//! - **Whitelist**: timelocked admission of direct-transfer recipients.
//! - **Price Guard**: oracle-derived bounds on swaps and liquidity moves.
//! - **Treasury**: the dispatcher tying all of the above together.
//!
//! ## Design Principles
//!
//! 1. All amount arithmetic is checked. Overflow is an error, never a wrap.
//! 2. Every dispatcher call is atomic over the control-plane state.
//! 3. Checks run in a fixed order: role, then pause gate, then state.
//! 4. Every public state type is serializable (serde) so the treasury can
//!    be snapshotted and inspected.

pub mod allocation;
pub mod config;
pub mod error;
pub mod pause;
pub mod price_guard;
pub mod roles;
pub mod timelock;
pub mod treasury;
pub mod whitelist;

pub use allocation::{AllocationEntry, AllocationQueue, AllocationState};
pub use config::{ConfigError, TreasuryConfig};
pub use error::{TreasuryError, TreasuryResult};
pub use pause::{PauseAuthority, PauseGate};
pub use price_guard::PriceFeedConfig;
pub use roles::{PoolMode, RoleRegistry};
pub use timelock::{ExecutePolicy, ReRequestPolicy, TimelockRequest, TimelockStatus};
pub use treasury::{Collaborators, Treasury, TreasurySnapshot, TreasuryState};
pub use whitelist::{WhitelistEntry, WhitelistRegistry};
