//! Protocol Events
//!
//! Events are emitted by committed actions and can be indexed off-chain
//! for analytics, liquidation bots and notifications. A reverted action
//! emits nothing.

use alloc::vec::Vec;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::access_control::Role;
use crate::types::{Address, AssetId, CollectionId, ListingId, LoanId, NftKey, SellType};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Reserve Events (0x01 - 0x1F)
    Deposit = 0x01,
    Withdraw = 0x02,
    ReserveDataUpdated = 0x03,
    ReserveInitialized = 0x04,
    ReserveConfigured = 0x05,
    VaultRebalanced = 0x06,

    // Loan Events (0x20 - 0x3F)
    Borrow = 0x20,
    Repay = 0x21,
    Auction = 0x22,
    Redeem = 0x23,
    Liquidate = 0x24,
    LiquidateNftx = 0x25,
    DelegationApproved = 0x26,

    // Collateral Events (0x40 - 0x5F)
    NftConfigured = 0x40,
    CollateralStatusChanged = 0x41,

    // Debt Market Events (0x60 - 0x7F)
    DebtListingCreated = 0x60,
    DebtSold = 0x61,
    DebtBid = 0x62,
    DebtClaimed = 0x63,
    DebtListingCancelled = 0x64,

    // Protocol Events (0x80 - 0x9F)
    ProtocolPaused = 0x80,
    ProtocolUnpaused = 0x81,
    RoleGranted = 0x82,
    RoleRevoked = 0x83,
    PriceUpdated = 0x84,
}

/// Main event enum containing all possible protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LendEvent {
    // ============ Reserve Events ============

    /// Liquidity supplied to a reserve
    Deposit {
        asset: AssetId,
        user: Address,
        on_behalf_of: Address,
        amount: u128,
        referral: u16,
        timestamp: u64,
    },

    /// Liquidity withdrawn from a reserve
    Withdraw {
        asset: AssetId,
        user: Address,
        to: Address,
        amount: u128,
        timestamp: u64,
    },

    /// Indices or rates changed
    ReserveDataUpdated {
        asset: AssetId,
        liquidity_rate: u128,
        variable_borrow_rate: u128,
        liquidity_index: u128,
        variable_borrow_index: u128,
        timestamp: u64,
    },

    ReserveInitialized {
        asset: AssetId,
        decimals: u8,
        timestamp: u64,
    },

    ReserveConfigured {
        asset: AssetId,
        is_active: bool,
        is_frozen: bool,
        borrowing_enabled: bool,
        reserve_factor_bps: u64,
        timestamp: u64,
    },

    /// Idle liquidity moved to or from the yield vault
    VaultRebalanced {
        asset: AssetId,
        invested: u128,
        divested: u128,
        loss: u128,
        timestamp: u64,
    },

    // ============ Loan Events ============

    Borrow {
        asset: AssetId,
        user: Address,
        on_behalf_of: Address,
        amount: u128,
        nft: NftKey,
        loan_id: LoanId,
        borrow_rate: u128,
        referral: u16,
        timestamp: u64,
    },

    Repay {
        asset: AssetId,
        user: Address,
        borrower: Address,
        amount: u128,
        nft: NftKey,
        loan_id: LoanId,
        closed: bool,
        timestamp: u64,
    },

    /// Bid placed on an unhealthy loan
    Auction {
        asset: AssetId,
        user: Address,
        bid_price: u128,
        on_behalf_of: Address,
        nft: NftKey,
        borrower: Address,
        loan_id: LoanId,
        timestamp: u64,
    },

    /// Borrower reclaimed the loan from auction
    Redeem {
        asset: AssetId,
        user: Address,
        repay_amount: u128,
        fine_amount: u128,
        nft: NftKey,
        borrower: Address,
        loan_id: LoanId,
        timestamp: u64,
    },

    /// Auction settled to the highest bidder
    Liquidate {
        asset: AssetId,
        user: Address,
        repay_amount: u128,
        remain_amount: u128,
        loss_amount: u128,
        nft: NftKey,
        borrower: Address,
        loan_id: LoanId,
        timestamp: u64,
    },

    /// Collateral sold through the external venue
    LiquidateNftx {
        asset: AssetId,
        user: Address,
        sale_price: u128,
        repay_amount: u128,
        remain_amount: u128,
        loss_amount: u128,
        nft: NftKey,
        borrower: Address,
        loan_id: LoanId,
        timestamp: u64,
    },

    DelegationApproved {
        delegator: Address,
        delegatee: Address,
        approved: bool,
        timestamp: u64,
    },

    // ============ Collateral Events ============

    NftConfigured {
        collection: CollectionId,
        token_id: Option<u64>,
        ltv_bps: u64,
        liquidation_threshold_bps: u64,
        liquidation_bonus_bps: u64,
        timestamp: u64,
    },

    CollateralStatusChanged {
        collection: CollectionId,
        active: bool,
        frozen: bool,
        timestamp: u64,
    },

    // ============ Debt Market Events ============

    DebtListingCreated {
        listing_id: ListingId,
        nft: NftKey,
        seller: Address,
        sell_type: SellType,
        price: u128,
        auction_end: u64,
        timestamp: u64,
    },

    DebtSold {
        listing_id: ListingId,
        nft: NftKey,
        seller: Address,
        buyer: Address,
        price: u128,
        timestamp: u64,
    },

    DebtBid {
        listing_id: ListingId,
        nft: NftKey,
        bidder: Address,
        amount: u128,
        timestamp: u64,
    },

    DebtClaimed {
        listing_id: ListingId,
        nft: NftKey,
        seller: Address,
        buyer: Address,
        price: u128,
        timestamp: u64,
    },

    DebtListingCancelled {
        listing_id: ListingId,
        nft: NftKey,
        refunded: u128,
        timestamp: u64,
    },

    // ============ Protocol Events ============

    ProtocolPaused {
        by: Address,
        timestamp: u64,
    },

    ProtocolUnpaused {
        by: Address,
        timestamp: u64,
    },

    RoleGranted {
        account: Address,
        role: Role,
        by: Address,
        timestamp: u64,
    },

    RoleRevoked {
        account: Address,
        role: Role,
        by: Address,
        timestamp: u64,
    },

    /// Oracle feed moved
    PriceUpdated {
        feed: [u8; 32],
        token_id: Option<u64>,
        old_price: u128,
        new_price: u128,
        timestamp: u64,
    },
}

impl LendEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Deposit { .. } => EventType::Deposit,
            Self::Withdraw { .. } => EventType::Withdraw,
            Self::ReserveDataUpdated { .. } => EventType::ReserveDataUpdated,
            Self::ReserveInitialized { .. } => EventType::ReserveInitialized,
            Self::ReserveConfigured { .. } => EventType::ReserveConfigured,
            Self::VaultRebalanced { .. } => EventType::VaultRebalanced,
            Self::Borrow { .. } => EventType::Borrow,
            Self::Repay { .. } => EventType::Repay,
            Self::Auction { .. } => EventType::Auction,
            Self::Redeem { .. } => EventType::Redeem,
            Self::Liquidate { .. } => EventType::Liquidate,
            Self::LiquidateNftx { .. } => EventType::LiquidateNftx,
            Self::DelegationApproved { .. } => EventType::DelegationApproved,
            Self::NftConfigured { .. } => EventType::NftConfigured,
            Self::CollateralStatusChanged { .. } => EventType::CollateralStatusChanged,
            Self::DebtListingCreated { .. } => EventType::DebtListingCreated,
            Self::DebtSold { .. } => EventType::DebtSold,
            Self::DebtBid { .. } => EventType::DebtBid,
            Self::DebtClaimed { .. } => EventType::DebtClaimed,
            Self::DebtListingCancelled { .. } => EventType::DebtListingCancelled,
            Self::ProtocolPaused { .. } => EventType::ProtocolPaused,
            Self::ProtocolUnpaused { .. } => EventType::ProtocolUnpaused,
            Self::RoleGranted { .. } => EventType::RoleGranted,
            Self::RoleRevoked { .. } => EventType::RoleRevoked,
            Self::PriceUpdated { .. } => EventType::PriceUpdated,
        }
    }

    /// Get the timestamp when the event occurred
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Deposit { timestamp, .. }
            | Self::Withdraw { timestamp, .. }
            | Self::ReserveDataUpdated { timestamp, .. }
            | Self::ReserveInitialized { timestamp, .. }
            | Self::ReserveConfigured { timestamp, .. }
            | Self::VaultRebalanced { timestamp, .. }
            | Self::Borrow { timestamp, .. }
            | Self::Repay { timestamp, .. }
            | Self::Auction { timestamp, .. }
            | Self::Redeem { timestamp, .. }
            | Self::Liquidate { timestamp, .. }
            | Self::LiquidateNftx { timestamp, .. }
            | Self::DelegationApproved { timestamp, .. }
            | Self::NftConfigured { timestamp, .. }
            | Self::CollateralStatusChanged { timestamp, .. }
            | Self::DebtListingCreated { timestamp, .. }
            | Self::DebtSold { timestamp, .. }
            | Self::DebtBid { timestamp, .. }
            | Self::DebtClaimed { timestamp, .. }
            | Self::DebtListingCancelled { timestamp, .. }
            | Self::ProtocolPaused { timestamp, .. }
            | Self::ProtocolUnpaused { timestamp, .. }
            | Self::RoleGranted { timestamp, .. }
            | Self::RoleRevoked { timestamp, .. }
            | Self::PriceUpdated { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<LendEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: LendEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[LendEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<LendEvent> {
        self.events
    }

    /// Move every event of `other` onto the end of this log
    pub fn append(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&LendEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nft() -> NftKey {
        NftKey::new([7u8; 32], 42)
    }

    #[test]
    fn test_event_type() {
        let event = LendEvent::Borrow {
            asset: [1u8; 32],
            user: [2u8; 32],
            on_behalf_of: [2u8; 32],
            amount: 1_000,
            nft: nft(),
            loan_id: 1,
            borrow_rate: 0,
            referral: 0,
            timestamp: 100,
        };

        assert_eq!(event.event_type(), EventType::Borrow);
        assert_eq!(event.timestamp(), 100);
    }

    #[test]
    fn test_event_serialization() {
        let event = LendEvent::DebtSold {
            listing_id: [9u8; 32],
            nft: nft(),
            seller: [1u8; 32],
            buyer: [2u8; 32],
            price: 5_000,
            timestamp: 200,
        };

        let bytes = event.to_bytes();
        let restored = LendEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();

        log.emit(LendEvent::ProtocolPaused { by: [3u8; 32], timestamp: 10 });
        log.emit(LendEvent::ProtocolUnpaused { by: [3u8; 32], timestamp: 20 });

        let mut other = EventLog::new();
        other.emit(LendEvent::ProtocolPaused { by: [3u8; 32], timestamp: 30 });
        log.append(other);

        assert_eq!(log.len(), 3);
        assert!(log.has_events());
        assert_eq!(log.filter_by_type(EventType::ProtocolPaused).len(), 2);
    }
}
