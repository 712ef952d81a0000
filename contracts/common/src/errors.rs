//! Error Types for the lending pool
//!
//! Every failure aborts the whole action and carries a labeled reason.
//! Variants are grouped into categories so callers can tell a paused
//! protocol apart from a permanent solvency problem.

use thiserror::Error;

use crate::types::{Address, AssetId, CollectionId, ListingId, LoanId, LoanState};

/// Result type alias for lending operations
pub type LendResult<T> = Result<T, LendError>;

/// Coarse classification of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller lacks a role or ownership
    Authorization,
    /// Entity is in the wrong lifecycle state
    State,
    /// Position or protocol would become unsafe
    Solvency,
    /// Liquidity or service temporarily unavailable (includes pause)
    Availability,
    /// Bad input or configuration
    Parameter,
    /// A window has not opened or has already closed
    Timing,
    /// Price feed problem
    Oracle,
    /// Arithmetic fault
    Math,
}

/// Main error enum for all lending errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LendError {
    // ============ Authorization Errors ============
    /// Caller is not authorized for this operation
    #[error("caller {caller:?} is not authorized: {reason}")]
    Unauthorized { caller: Address, reason: &'static str },

    /// Caller is missing a role capability
    #[error("caller {caller:?} lacks permission {permission}")]
    MissingPermission { caller: Address, permission: &'static str },

    /// Caller does not hold the asset or position
    #[error("caller {caller:?} does not own {what}")]
    NotOwner { caller: Address, what: &'static str },

    // ============ State Errors ============
    /// Reserve does not exist
    #[error("reserve {asset:?} not found")]
    ReserveNotFound { asset: AssetId },

    /// Reserve already initialized
    #[error("reserve {asset:?} already exists")]
    ReserveAlreadyExists { asset: AssetId },

    /// Reserve is inactive
    #[error("reserve {asset:?} is not active")]
    ReserveInactive { asset: AssetId },

    /// Reserve is frozen for new deposits and borrows
    #[error("reserve {asset:?} is frozen")]
    ReserveFrozen { asset: AssetId },

    /// Borrowing is disabled on the reserve
    #[error("borrowing disabled on reserve {asset:?}")]
    BorrowingDisabled { asset: AssetId },

    /// Reserve still holds supply or debt
    #[error("reserve {asset:?} still has open balances")]
    ReserveInUse { asset: AssetId },

    /// Collection is not configured as collateral
    #[error("collection {collection:?} is not configured as collateral")]
    CollateralNotConfigured { collection: CollectionId },

    /// Collateral is inactive
    #[error("collateral {collection:?} is not active")]
    CollateralInactive { collection: CollectionId },

    /// Collateral is frozen
    #[error("collateral {collection:?} is frozen")]
    CollateralFrozen { collection: CollectionId },

    /// Change would strand open loans on the collection
    #[error("collection {collection:?} has {open_loans} open loans")]
    CollateralInUse { collection: CollectionId, open_loans: u64 },

    /// Collection has no registered wrapper
    #[error("collection {collection:?} has no wrapper")]
    WrapperNotRegistered { collection: CollectionId },

    /// No open loan on the collateral item
    #[error("no open loan for token {token_id} of {collection:?}")]
    LoanNotFound { collection: CollectionId, token_id: u64 },

    /// Collateral item already backs an open loan
    #[error("loan {loan_id} already open on this collateral")]
    LoanAlreadyExists { loan_id: LoanId },

    /// Loan is in the wrong state for the operation
    #[error("loan {loan_id} is {actual:?}, expected {expected:?}")]
    InvalidLoanState {
        loan_id: LoanId,
        expected: LoanState,
        actual: LoanState,
    },

    /// No active debt listing on the collateral item
    #[error("no active debt listing for token {token_id} of {collection:?}")]
    ListingNotFound { collection: CollectionId, token_id: u64 },

    /// Collateral item already has an active debt listing
    #[error("debt listing {listing_id:?} already active")]
    ListingAlreadyExists { listing_id: ListingId },

    /// Listing is of the wrong sell type or no longer active
    #[error("debt listing {listing_id:?}: {reason}")]
    InvalidListing { listing_id: ListingId, reason: &'static str },

    /// Listing is stale (loan moved on or changed hands)
    #[error("debt listing {listing_id:?} no longer matches its loan")]
    ListingStale { listing_id: ListingId },

    /// Auction listing has no bids to claim
    #[error("debt listing {listing_id:?} has no bids")]
    NoBids { listing_id: ListingId },

    /// Another action is in progress
    #[error("reentrant call rejected")]
    Reentrancy,

    // ============ Solvency Errors ============
    /// Borrow would leave the loan below health factor 1
    #[error("health factor {health_factor} below 1")]
    HealthFactorTooLow { health_factor: u128 },

    /// Amount exceeds what the collateral supports
    #[error("requested {requested} exceeds available borrows {available}")]
    CollateralCannotCover { requested: u128, available: u128 },

    /// Loan is healthy and cannot be auctioned
    #[error("loan {loan_id} is healthy (health factor {health_factor})")]
    NotLiquidatable { loan_id: LoanId, health_factor: u128 },

    /// Bid below the required floor
    #[error("bid {bid} below required {required}")]
    BidTooLow { bid: u128, required: u128 },

    /// Bid fine paid is less than the computed fine
    #[error("bid fine {paid} below required {required}")]
    BidFineTooLow { paid: u128, required: u128 },

    /// Redeem leaves too much debt against the collateral
    #[error("remaining debt {remaining_debt} not below redeem limit {limit}")]
    RedeemInsufficient { remaining_debt: u128, limit: u128 },

    /// Settlement price lower than the caller's floor
    #[error("settlement price {price} below minimum {min_price}")]
    PriceBelowMinimum { price: u128, min_price: u128 },

    /// Account lacks funds
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u128, requested: u128 },

    // ============ Availability Errors ============
    /// Protocol is paused
    #[error("pool is paused")]
    ProtocolPaused,

    /// Reserve lacks liquidity
    #[error("insufficient liquidity: available {available}, requested {requested}")]
    InsufficientLiquidity { available: u128, requested: u128 },

    /// External venue refused or failed
    #[error("external venue failed: {reason}")]
    VenueUnavailable { reason: &'static str },

    // ============ Parameter Errors ============
    /// Zero amount not allowed
    #[error("amount must be positive")]
    ZeroAmount,

    /// Invalid amount provided
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: u128, reason: &'static str },

    /// Invalid input parameter
    #[error("invalid {param}: {reason}")]
    InvalidInput { param: &'static str, reason: &'static str },

    /// Risk configuration out of bounds
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },

    /// Token id outside the configured collection range
    #[error("token id {token_id} exceeds max {max_token_id}")]
    TokenIdOutOfRange { token_id: u64, max_token_id: u64 },

    // ============ Timing Errors ============
    /// Window has closed
    #[error("{window} ended at {deadline}, now {now}")]
    WindowClosed { window: &'static str, deadline: u64, now: u64 },

    /// Window has not opened yet
    #[error("{window} opens after {opens_at}, now {now}")]
    WindowNotOpen { window: &'static str, opens_at: u64, now: u64 },

    /// Time moved backwards
    #[error("timestamp {now} precedes last update {last}")]
    TimeWentBackwards { last: u64, now: u64 },

    // ============ Oracle Errors ============
    /// No price available for the asset or token
    #[error("price unavailable: {what}")]
    PriceUnavailable { what: &'static str },

    /// Price is zero
    #[error("price is zero: {what}")]
    PriceZero { what: &'static str },

    /// Price is stale
    #[error("price stale: updated {updated_at}, now {now}, max age {max_age}")]
    PriceStale { updated_at: u64, now: u64, max_age: u64 },

    /// Price update deviates too far from the last value
    #[error("price deviation {deviation_bps} bps exceeds {max_deviation_bps}")]
    PriceDeviation { deviation_bps: u64, max_deviation_bps: u64 },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    #[error("arithmetic overflow")]
    Overflow,

    /// Arithmetic underflow occurred
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by zero
    #[error("division by zero")]
    DivisionByZero,
}

impl LendError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "E001_UNAUTHORIZED",
            Self::MissingPermission { .. } => "E002_MISSING_PERMISSION",
            Self::NotOwner { .. } => "E003_NOT_OWNER",
            Self::ReserveNotFound { .. } => "E010_RESERVE_NOT_FOUND",
            Self::ReserveAlreadyExists { .. } => "E011_RESERVE_EXISTS",
            Self::ReserveInactive { .. } => "E012_RESERVE_INACTIVE",
            Self::ReserveFrozen { .. } => "E013_RESERVE_FROZEN",
            Self::BorrowingDisabled { .. } => "E014_BORROWING_DISABLED",
            Self::ReserveInUse { .. } => "E015_RESERVE_IN_USE",
            Self::CollateralNotConfigured { .. } => "E020_COLLATERAL_NOT_CONFIGURED",
            Self::CollateralInactive { .. } => "E021_COLLATERAL_INACTIVE",
            Self::CollateralFrozen { .. } => "E022_COLLATERAL_FROZEN",
            Self::CollateralInUse { .. } => "E023_COLLATERAL_IN_USE",
            Self::WrapperNotRegistered { .. } => "E024_NO_WRAPPER",
            Self::LoanNotFound { .. } => "E030_LOAN_NOT_FOUND",
            Self::LoanAlreadyExists { .. } => "E031_LOAN_EXISTS",
            Self::InvalidLoanState { .. } => "E032_INVALID_LOAN_STATE",
            Self::ListingNotFound { .. } => "E040_LISTING_NOT_FOUND",
            Self::ListingAlreadyExists { .. } => "E041_LISTING_EXISTS",
            Self::InvalidListing { .. } => "E042_INVALID_LISTING",
            Self::ListingStale { .. } => "E043_LISTING_STALE",
            Self::NoBids { .. } => "E044_NO_BIDS",
            Self::Reentrancy => "E050_REENTRANCY",
            Self::HealthFactorTooLow { .. } => "E060_HEALTH_FACTOR_LOW",
            Self::CollateralCannotCover { .. } => "E061_COLLATERAL_CANNOT_COVER",
            Self::NotLiquidatable { .. } => "E062_NOT_LIQUIDATABLE",
            Self::BidTooLow { .. } => "E063_BID_TOO_LOW",
            Self::BidFineTooLow { .. } => "E064_BID_FINE_TOO_LOW",
            Self::RedeemInsufficient { .. } => "E065_REDEEM_INSUFFICIENT",
            Self::PriceBelowMinimum { .. } => "E066_PRICE_BELOW_MIN",
            Self::InsufficientBalance { .. } => "E067_INSUFFICIENT_BALANCE",
            Self::ProtocolPaused => "E070_PAUSED",
            Self::InsufficientLiquidity { .. } => "E071_INSUFFICIENT_LIQUIDITY",
            Self::VenueUnavailable { .. } => "E072_VENUE_UNAVAILABLE",
            Self::ZeroAmount => "E080_ZERO_AMOUNT",
            Self::InvalidAmount { .. } => "E081_INVALID_AMOUNT",
            Self::InvalidInput { .. } => "E082_INVALID_INPUT",
            Self::InvalidConfig { .. } => "E083_INVALID_CONFIG",
            Self::TokenIdOutOfRange { .. } => "E084_TOKEN_ID_RANGE",
            Self::WindowClosed { .. } => "E090_WINDOW_CLOSED",
            Self::WindowNotOpen { .. } => "E091_WINDOW_NOT_OPEN",
            Self::TimeWentBackwards { .. } => "E092_TIME_BACKWARDS",
            Self::PriceUnavailable { .. } => "E100_PRICE_UNAVAILABLE",
            Self::PriceZero { .. } => "E101_PRICE_ZERO",
            Self::PriceStale { .. } => "E102_PRICE_STALE",
            Self::PriceDeviation { .. } => "E103_PRICE_DEVIATION",
            Self::Overflow => "E110_OVERFLOW",
            Self::Underflow => "E111_UNDERFLOW",
            Self::DivisionByZero => "E112_DIV_ZERO",
        }
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } | Self::MissingPermission { .. } | Self::NotOwner { .. } => {
                ErrorCategory::Authorization
            }
            Self::ReserveNotFound { .. }
            | Self::ReserveAlreadyExists { .. }
            | Self::ReserveInactive { .. }
            | Self::ReserveFrozen { .. }
            | Self::BorrowingDisabled { .. }
            | Self::ReserveInUse { .. }
            | Self::CollateralNotConfigured { .. }
            | Self::CollateralInactive { .. }
            | Self::CollateralFrozen { .. }
            | Self::CollateralInUse { .. }
            | Self::WrapperNotRegistered { .. }
            | Self::LoanNotFound { .. }
            | Self::LoanAlreadyExists { .. }
            | Self::InvalidLoanState { .. }
            | Self::ListingNotFound { .. }
            | Self::ListingAlreadyExists { .. }
            | Self::InvalidListing { .. }
            | Self::ListingStale { .. }
            | Self::NoBids { .. }
            | Self::Reentrancy => ErrorCategory::State,
            Self::HealthFactorTooLow { .. }
            | Self::CollateralCannotCover { .. }
            | Self::NotLiquidatable { .. }
            | Self::BidTooLow { .. }
            | Self::BidFineTooLow { .. }
            | Self::RedeemInsufficient { .. }
            | Self::PriceBelowMinimum { .. }
            | Self::InsufficientBalance { .. } => ErrorCategory::Solvency,
            Self::ProtocolPaused
            | Self::InsufficientLiquidity { .. }
            | Self::VenueUnavailable { .. } => ErrorCategory::Availability,
            Self::ZeroAmount
            | Self::InvalidAmount { .. }
            | Self::InvalidInput { .. }
            | Self::InvalidConfig { .. }
            | Self::TokenIdOutOfRange { .. } => ErrorCategory::Parameter,
            Self::WindowClosed { .. }
            | Self::WindowNotOpen { .. }
            | Self::TimeWentBackwards { .. } => ErrorCategory::Timing,
            Self::PriceUnavailable { .. }
            | Self::PriceZero { .. }
            | Self::PriceStale { .. }
            | Self::PriceDeviation { .. } => ErrorCategory::Oracle,
            Self::Overflow | Self::Underflow | Self::DivisionByZero => ErrorCategory::Math,
        }
    }

    /// Returns true if retrying the same request later may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ProtocolPaused
                | Self::InsufficientLiquidity { .. }
                | Self::VenueUnavailable { .. }
                | Self::WindowNotOpen { .. }
                | Self::PriceStale { .. }
                | Self::Reentrancy
        )
    }

    /// Returns true for the pause error
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::ProtocolPaused)
    }
}
