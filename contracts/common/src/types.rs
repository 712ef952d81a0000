//! Core Types for the lending pool
//!
//! Identifiers and small value types shared by every module.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Type alias for account addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for fungible reserve asset identifiers
pub type AssetId = [u8; 32];

/// Type alias for NFT collection identifiers
pub type CollectionId = [u8; 32];

/// Type alias for loan identifiers (monotonic, never reused)
pub type LoanId = u64;

/// Type alias for debt listing identifiers
pub type ListingId = [u8; 32];

/// The zero address, never a valid account
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// A single collateral item: collection plus token id
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct NftKey {
    /// Collection the token belongs to
    pub collection: CollectionId,
    /// Token id within the collection
    pub token_id: u64,
}

impl NftKey {
    /// Creates a new collateral key
    pub fn new(collection: CollectionId, token_id: u64) -> Self {
        Self { collection, token_id }
    }
}

// ============ Loan Types ============

/// Lifecycle state of a loan
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum LoanState {
    /// Debt outstanding, collateral in custody
    #[default]
    Active,
    /// A bid is locked against the collateral
    Auction,
    /// Debt fully covered, collateral released
    Repaid,
    /// Settled with residual debt written off
    Defaulted,
}

impl LoanState {
    /// Whether the loan still blocks its collateral item
    pub fn is_open(&self) -> bool {
        matches!(self, LoanState::Active | LoanState::Auction)
    }
}

/// Locked bid on a loan under auction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Bid {
    /// Account that will receive the collateral
    pub bidder: Address,
    /// Account whose funds are escrowed (refund target)
    pub payer: Address,
    /// Locked bid amount in reserve units
    pub bid_price: u128,
    /// Debt at the time of the bid
    pub bid_borrow_amount: u128,
    /// Fine owed to the bidder on redeem
    pub bid_fine: u128,
    /// Timestamp of the first bid, anchors both windows
    pub bid_start_timestamp: u64,
}

// ============ Debt Market Types ============

/// How a debt listing is sold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum SellType {
    /// Single fixed price, first buyer wins
    FixedPrice,
    /// Ascending auction until `auction_end`
    Auction,
}

/// Debt listing lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum ListingState {
    Active,
    Sold,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nft_key_ordering() {
        let a = NftKey::new([1u8; 32], 5);
        let b = NftKey::new([1u8; 32], 6);
        let c = NftKey::new([2u8; 32], 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_open_states() {
        assert!(LoanState::Active.is_open());
        assert!(LoanState::Auction.is_open());
        assert!(!LoanState::Repaid.is_open());
        assert!(!LoanState::Defaulted.is_open());
    }
}
