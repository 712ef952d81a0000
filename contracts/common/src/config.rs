//! Pool Configuration
//!
//! Runtime knobs that a deployment may override. Defaults come from
//! `constants`; a host can load the struct from any serde format.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::{auction, limits, market, oracle, precision::PERCENTAGE_FACTOR};
use crate::errors::{LendError, LendResult};
use crate::types::{Address, ZERO_ADDRESS};

/// Account the pool uses for custody and liquidity
pub const DEFAULT_POOL_ACCOUNT: Address = [0xEE; 32];

/// Default treasury account
pub const DEFAULT_TREASURY: Address = [0xDD; 32];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Holds reserve liquidity, escrowed bids and collateral
    pub pool_account: Address,
    /// Receives the reserve-factor share of interest
    pub treasury: Address,
    /// Seconds before a price is stale
    pub max_price_age: u64,
    /// Remaining debt at or below this is swept into the repay
    pub debt_dust: u128,
    /// Minimum increment between loan auction bids (bps)
    pub min_bid_increment_bps: u64,
    /// Largest share of debt a partial redeem may repay (bps)
    pub max_redeem_bps: u64,
    /// Minimum increment between debt listing bids (bps)
    pub debt_market_min_increment_bps: u64,
    /// Longest debt auction a seller may open (seconds)
    pub debt_market_max_auction: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_account: DEFAULT_POOL_ACCOUNT,
            treasury: DEFAULT_TREASURY,
            max_price_age: oracle::MAX_PRICE_AGE,
            debt_dust: limits::DEBT_DUST,
            min_bid_increment_bps: auction::MIN_BID_INCREMENT_BPS,
            max_redeem_bps: auction::MAX_REDEEM_BPS,
            debt_market_min_increment_bps: market::MIN_BID_INCREMENT_BPS,
            debt_market_max_auction: market::MAX_AUCTION_LENGTH,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> LendResult<()> {
        if self.pool_account == ZERO_ADDRESS || self.treasury == ZERO_ADDRESS {
            return Err(LendError::InvalidConfig { reason: "zero pool or treasury account" });
        }
        if self.pool_account == self.treasury {
            return Err(LendError::InvalidConfig { reason: "treasury must differ from pool account" });
        }
        if self.max_price_age == 0 {
            return Err(LendError::InvalidConfig { reason: "max price age must be positive" });
        }
        if self.max_redeem_bps == 0 || self.max_redeem_bps > PERCENTAGE_FACTOR {
            return Err(LendError::InvalidConfig { reason: "max redeem share out of range" });
        }
        if self.min_bid_increment_bps > PERCENTAGE_FACTOR
            || self.debt_market_min_increment_bps > PERCENTAGE_FACTOR
        {
            return Err(LendError::InvalidConfig { reason: "bid increment above 100%" });
        }
        Ok(())
    }
}
