//! Protocol Constants
//!
//! Fixed-point scales, timing windows and default risk parameters for the
//! lending pool.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (long auction windows, real dust floor)
//! - Default (no feature) - Testnet values (short windows for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! nftlend-common = { path = "...", features = ["mainnet"] }
//! ```

/// Fixed-point scales
pub mod precision {
    /// Ray scale (27 decimals), used for indices and rates
    pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;

    /// Wad scale (18 decimals), used for health factors and prices
    pub const WAD: u128 = 1_000_000_000_000_000_000;

    /// Basis points denominator (10000 = 100%)
    pub const PERCENTAGE_FACTOR: u64 = 10_000;
}

/// Time
pub mod time {
    /// Seconds in a (365 day) year, used for linear interest
    pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

    /// One hour in seconds
    pub const HOUR: u64 = 60 * 60;

    /// One day in seconds
    pub const DAY: u64 = 24 * HOUR;
}

/// Reserve defaults
pub mod reserve {
    use super::precision::RAY;

    /// Default optimal utilization (80%)
    pub const DEFAULT_OPTIMAL_UTILIZATION: u128 = RAY / 100 * 80;

    /// Default base variable borrow rate (0%)
    pub const DEFAULT_BASE_RATE: u128 = 0;

    /// Default slope below optimal utilization (8%)
    pub const DEFAULT_SLOPE1: u128 = RAY / 100 * 8;

    /// Default slope above optimal utilization (100%)
    pub const DEFAULT_SLOPE2: u128 = RAY;

    /// Default reserve factor (10%)
    pub const DEFAULT_RESERVE_FACTOR_BPS: u64 = 1_000;

    /// Default share of idle liquidity a yield vault may hold (0 = disabled)
    pub const DEFAULT_VAULT_DEBT_RATIO_BPS: u64 = 0;

    /// Upper bound for any single rate parameter (1000% APR)
    pub const MAX_RATE: u128 = RAY * 10;
}

/// Collateral defaults and bounds
pub mod collateral {
    /// Default loan-to-value (40%)
    pub const DEFAULT_LTV_BPS: u64 = 4_000;

    /// Default liquidation threshold (80%)
    pub const DEFAULT_LIQUIDATION_THRESHOLD_BPS: u64 = 8_000;

    /// Default liquidation bonus (5%)
    pub const DEFAULT_LIQUIDATION_BONUS_BPS: u64 = 500;

    /// Default redeem fine (5% of debt)
    pub const DEFAULT_REDEEM_FINE_BPS: u64 = 500;

    /// Default redeem threshold (50% of collateral value)
    pub const DEFAULT_REDEEM_THRESHOLD_BPS: u64 = 5_000;

    /// Default minimum bid fine, in oracle base units (0.2 ETH)
    pub const DEFAULT_MIN_BID_FINE: u128 = 200_000_000_000_000_000;

    /// Largest liquidation bonus a collection may carry (50%)
    pub const MAX_LIQUIDATION_BONUS_BPS: u64 = 5_000;

    /// Largest redeem fine a collection may carry (20%)
    pub const MAX_REDEEM_FINE_BPS: u64 = 2_000;
}

/// Auction windows
///
/// Values differ between mainnet and testnet to allow easier testing.
pub mod auction {
    use super::time::{DAY, HOUR};

    /// Redeem window after the first bid
    /// - Mainnet: 2 days
    /// - Testnet: 1 hour
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_REDEEM_DURATION: u64 = 2 * DAY;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_REDEEM_DURATION: u64 = HOUR;

    /// Bidding window after the first bid
    /// - Mainnet: 2 days
    /// - Testnet: 2 hours
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_AUCTION_DURATION: u64 = 2 * DAY;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_AUCTION_DURATION: u64 = 2 * HOUR;

    /// Minimum bid increment over the previous bid (1%)
    pub const MIN_BID_INCREMENT_BPS: u64 = 100;

    /// Largest share of debt a partial redeem may repay (90%)
    pub const MAX_REDEEM_BPS: u64 = 9_000;

    /// Longest window a collection may configure (30 days)
    pub const MAX_DURATION: u64 = 30 * DAY;
}

/// Debt market
pub mod market {
    /// Minimum increment between debt auction bids (1%)
    pub const MIN_BID_INCREMENT_BPS: u64 = 100;

    /// Longest debt auction a seller may open (14 days)
    pub const MAX_AUCTION_LENGTH: u64 = 14 * super::time::DAY;
}

/// Oracle
pub mod oracle {
    /// Oracle price precision (18 decimals, 1e18 = one base unit such as 1 ETH)
    pub const PRICE_DECIMALS: u8 = 18;

    /// Maximum price age in seconds before a feed is considered stale
    pub const MAX_PRICE_AGE: u64 = 60 * 60;

    /// Maximum price change per update (50%), NFT floors move fast
    pub const MAX_PRICE_DEVIATION_BPS: u64 = 5_000;
}

/// Debt limits
pub mod limits {
    /// Remaining debt at or below this is swept into the repay
    /// - Mainnet: 1e12 wei (0.000001 ETH)
    /// - Testnet: 1000 wei
    #[cfg(feature = "mainnet")]
    pub const DEBT_DUST: u128 = 1_000_000_000_000;
    #[cfg(not(feature = "mainnet"))]
    pub const DEBT_DUST: u128 = 1_000;

    /// Largest decimals a reserve asset may declare
    pub const MAX_ASSET_DECIMALS: u8 = 24;
}
