//! Oracle Module
//!
//! Price interface consumed by the pool. Prices are quoted in oracle base
//! units with 18 decimals (1e18 = one unit of the base currency, e.g. ETH).
//!
//! Prices are read fresh on every action. A missing, zero or stale price
//! fails the action; nothing ever defaults to zero.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{LendError, LendResult};
use crate::types::{AssetId, CollectionId};

// ============================================================================
// Types
// ============================================================================

/// A single published price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceData {
    /// Price in oracle base units (18 decimals)
    pub price: u128,
    /// Publication timestamp
    pub updated_at: u64,
}

impl PriceData {
    /// Creates new price data
    pub fn new(price: u128, updated_at: u64) -> Self {
        Self { price, updated_at }
    }

    /// Check if the price is older than `max_age`
    pub fn is_stale(&self, now: u64, max_age: u64) -> bool {
        now.saturating_sub(self.updated_at) > max_age
    }
}

/// Source of reserve-asset and NFT prices
pub trait PriceOracle {
    /// Latest price of a fungible reserve asset
    fn reserve_price(&self, asset: &AssetId) -> Option<PriceData>;

    /// Latest price of an NFT (token-level or collection floor)
    fn nft_price(&self, collection: &CollectionId, token_id: u64) -> Option<PriceData>;
}

// ============================================================================
// Validated reads
// ============================================================================

fn validate(data: Option<PriceData>, what: &'static str, now: u64, max_age: u64) -> LendResult<u128> {
    let data = data.ok_or(LendError::PriceUnavailable { what })?;

    if data.price == 0 {
        return Err(LendError::PriceZero { what });
    }

    if data.is_stale(now, max_age) {
        return Err(LendError::PriceStale {
            updated_at: data.updated_at,
            now,
            max_age,
        });
    }

    Ok(data.price)
}

/// Fresh, non-zero price of a reserve asset
pub fn fresh_reserve_price<O: PriceOracle + ?Sized>(
    oracle: &O,
    asset: &AssetId,
    now: u64,
    max_age: u64,
) -> LendResult<u128> {
    validate(oracle.reserve_price(asset), "reserve asset", now, max_age)
}

/// Fresh, non-zero price of an NFT
pub fn fresh_nft_price<O: PriceOracle + ?Sized>(
    oracle: &O,
    collection: &CollectionId,
    token_id: u64,
    now: u64,
    max_age: u64,
) -> LendResult<u128> {
    validate(oracle.nft_price(collection, token_id), "nft", now, max_age)
}

/// In-memory prices for unit tests
#[cfg(test)]
pub(crate) mod fixed {
    use super::*;
    use alloc::collections::BTreeMap;

    #[derive(Debug, Clone, Default)]
    pub struct FixedPrices {
        pub reserves: BTreeMap<AssetId, PriceData>,
        pub nfts: BTreeMap<CollectionId, PriceData>,
    }

    impl FixedPrices {
        pub fn set_reserve(&mut self, asset: AssetId, price: u128, at: u64) {
            self.reserves.insert(asset, PriceData::new(price, at));
        }

        pub fn set_nft(&mut self, collection: CollectionId, price: u128, at: u64) {
            self.nfts.insert(collection, PriceData::new(price, at));
        }
    }

    impl PriceOracle for FixedPrices {
        fn reserve_price(&self, asset: &AssetId) -> Option<PriceData> {
            self.reserves.get(asset).copied()
        }

        fn nft_price(&self, collection: &CollectionId, _token_id: u64) -> Option<PriceData> {
            self.nfts.get(collection).copied()
        }
    }
}
