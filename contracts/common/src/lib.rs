//! flashvault Common Library
//!
//! Flash-loan liquidity aggregation engine.
//!
//! A caller borrows an asset from one or more liquidity reserves, control
//! passes to a borrower callback, and the callback must return principal
//! plus a deterministic fee before the operation completes. Otherwise every
//! effect of the operation is undone as if it never started.
//!
//! ## Components
//!
//! - **Reserve Pool**: single-asset vault issuing proportional shares and
//!   lending its balance with exact-repayment settlement
//! - **Lending Pool**: external multi-asset money-market pool with pull
//!   settlement and a flat premium
//! - **Liquidity Adapter**: closed set of backend kinds behind one
//!   capacity / fee / draw surface
//! - **Aggregator**: routes a request across adapters in registration order,
//!   invokes the target once, settles every backend atomically
//! - **Fee Policy**: basis-point schedules with floor rounding
//! - **Reentrancy Guard**: single-flight state machine per pool and aggregator
//! - **Runtime**: ledger, event log and mutation journal giving each
//!   operation an all-or-nothing boundary

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod fees;
pub mod events;
pub mod journal;
pub mod guard;
pub mod access_control;
pub mod runtime;
pub mod reserve_pool;
pub mod lending_pool;
pub mod adapter;
pub mod router;
pub mod aggregator;


// Re-exports for convenience
pub use constants::{domains, limits};
pub use errors::*;
pub use types::*;
pub use math::*;
pub use fees::{FeeSchedule, RewardSplit};
pub use events::{EventLog, EventRecord, EventType, FlashEvent};
pub use guard::{GuardPhase, ReentrancyGuard};
pub use access_control::Owned;
pub use runtime::{CallContext, FlashBorrower, FlashLoan, FlashReceipt, Runtime, Settlement};
pub use reserve_pool::{ReservePool, ReservePoolState};
pub use lending_pool::{LendingPool, LendingPoolState};
pub use adapter::LiquidityAdapter;
pub use router::{RouteLeg, RoutePlan};
pub use aggregator::{AdapterRegistry, Aggregator, InvokeReceipt, InvokeRequest};
