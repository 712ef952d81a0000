//! NFTLend Common Library
//!
//! Core state machines for a pooled lending protocol that accepts NFTs as
//! collateral. Lenders supply fungible assets into reserves and earn
//! interest; borrowers lock an NFT and draw against its appraised value.
//!
//! ## Layout
//!
//! - **Reserve ledger**: scaled balances, ray indices and the two-slope rate model
//! - **Collateral registry**: per-collection and per-token risk parameters
//! - **Health engine**: collateral and debt valuation, health factor
//! - **Loan lifecycle**: borrow, repay and delegation
//! - **Auction engine**: bid, redeem, liquidate and venue liquidation
//! - **Debt market**: transfer of loan ownership by fixed price or auction
//!
//! Operations never move value themselves. They mutate a [`LendingStore`]
//! and record the resulting [`Transfer`]s and events into [`Effects`],
//! which the host applies once the operation has succeeded.
//!
//! Disable the default `std` feature to build for `no_std` targets such as
//! WASM; collections come from `alloc`.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod access_control;
pub mod emergency;
pub mod oracle;
pub mod config;
pub mod reserve;
pub mod vault;
pub mod collateral;
pub mod health;
pub mod wrapper;
pub mod store;
pub mod loan;
pub mod auction;
pub mod debt_market;
pub mod supply;
pub mod views;


// Re-exports for convenience
pub use config::PoolConfig;
pub use errors::{ErrorCategory, LendError, LendResult};
pub use events::{EventLog, EventType, LendEvent};
pub use oracle::{PriceData, PriceOracle};
pub use store::{Effects, LendingStore, Transfer};
pub use types::*;
pub use vault::{NoVault, SimulatedVault, YieldVault};
