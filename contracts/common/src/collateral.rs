//! Collateral Registry
//!
//! Risk parameters per NFT collection, with optional per-token overrides.
//! Collection-level `active`/`frozen` switches apply to every token of the
//! collection, overridden or not.

use alloc::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::auction::{DEFAULT_AUCTION_DURATION, DEFAULT_REDEEM_DURATION, MAX_DURATION};
use crate::constants::collateral as defaults;
use crate::constants::precision::PERCENTAGE_FACTOR;
use crate::errors::{LendError, LendResult};
use crate::types::{CollectionId, NftKey};

// ============================================================================
// Types
// ============================================================================

/// Risk parameters for a collection or token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct NftConfigParams {
    /// Max borrow as a share of collateral value (bps)
    pub ltv_bps: u64,
    /// Health factor threshold weight (bps)
    pub liquidation_threshold_bps: u64,
    /// Discount a bidder may buy at (bps)
    pub liquidation_bonus_bps: u64,
    /// Seconds after the first bid during which the borrower may redeem
    pub redeem_duration: u64,
    /// Seconds after the first bid during which bidding stays open
    pub auction_duration: u64,
    /// Fine paid to the bidder on redeem, as a share of debt (bps)
    pub redeem_fine_bps: u64,
    /// Remaining debt after redeem must stay below this share of collateral value (bps)
    pub redeem_threshold_bps: u64,
    /// Floor on the bid fine, in oracle base units
    pub min_bid_fine: u128,
    /// Max concurrent open loans on the collection (0 = unlimited)
    pub max_supply: u64,
    /// Highest accepted token id (0 = unlimited)
    pub max_token_id: u64,
}

impl Default for NftConfigParams {
    fn default() -> Self {
        Self {
            ltv_bps: defaults::DEFAULT_LTV_BPS,
            liquidation_threshold_bps: defaults::DEFAULT_LIQUIDATION_THRESHOLD_BPS,
            liquidation_bonus_bps: defaults::DEFAULT_LIQUIDATION_BONUS_BPS,
            redeem_duration: DEFAULT_REDEEM_DURATION,
            auction_duration: DEFAULT_AUCTION_DURATION,
            redeem_fine_bps: defaults::DEFAULT_REDEEM_FINE_BPS,
            redeem_threshold_bps: defaults::DEFAULT_REDEEM_THRESHOLD_BPS,
            min_bid_fine: defaults::DEFAULT_MIN_BID_FINE,
            max_supply: 0,
            max_token_id: 0,
        }
    }
}

impl NftConfigParams {
    /// Validate parameter bounds and combinations
    pub fn validate(&self) -> LendResult<()> {
        // 1. ltv <= threshold < 100%
        if self.liquidation_threshold_bps >= PERCENTAGE_FACTOR {
            return Err(LendError::InvalidConfig {
                reason: "liquidation threshold must be below 100%",
            });
        }
        if self.ltv_bps > self.liquidation_threshold_bps {
            return Err(LendError::InvalidConfig {
                reason: "ltv above liquidation threshold",
            });
        }

        // 2. Bonus and fine bounds
        if self.liquidation_bonus_bps > defaults::MAX_LIQUIDATION_BONUS_BPS {
            return Err(LendError::InvalidConfig { reason: "liquidation bonus too large" });
        }
        if self.redeem_fine_bps > defaults::MAX_REDEEM_FINE_BPS {
            return Err(LendError::InvalidConfig { reason: "redeem fine too large" });
        }

        // 3. Redeem threshold must leave the loan healthy after a redeem
        if self.redeem_threshold_bps == 0 || self.redeem_threshold_bps > self.liquidation_threshold_bps {
            return Err(LendError::InvalidConfig {
                reason: "redeem threshold must be in (0, liquidation threshold]",
            });
        }

        // 4. Windows
        if self.redeem_duration == 0 || self.auction_duration == 0 {
            return Err(LendError::InvalidConfig { reason: "durations must be positive" });
        }
        if self.auction_duration > MAX_DURATION {
            return Err(LendError::InvalidConfig { reason: "auction duration too long" });
        }
        if self.redeem_duration > self.auction_duration {
            return Err(LendError::InvalidConfig {
                reason: "redeem window longer than auction",
            });
        }

        Ok(())
    }

    /// Whether moving from `self` to `next` worsens terms for open loans:
    /// closer to liquidation, shorter windows, a harder redeem or a cheaper
    /// sale of the collateral
    fn strands(&self, next: &NftConfigParams) -> bool {
        next.liquidation_threshold_bps < self.liquidation_threshold_bps
            || next.redeem_duration < self.redeem_duration
            || next.auction_duration < self.auction_duration
            || next.redeem_threshold_bps < self.redeem_threshold_bps
            || next.redeem_fine_bps > self.redeem_fine_bps
            || next.min_bid_fine > self.min_bid_fine
            || next.liquidation_bonus_bps > self.liquidation_bonus_bps
    }
}

/// Effective configuration for a collateral item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct NftConfig {
    pub params: NftConfigParams,
    pub active: bool,
    pub frozen: bool,
    /// When the parameters last changed
    pub config_timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
struct TokenOverride {
    params: NftConfigParams,
    config_timestamp: u64,
}

/// Registry of collateral configurations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CollateralRegistry {
    collections: BTreeMap<CollectionId, NftConfig>,
    token_overrides: BTreeMap<NftKey, TokenOverride>,
}

// ============================================================================
// Registry operations
// ============================================================================

impl CollateralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a collection, or a single token when `token_id` is set
    ///
    /// `open_loans` counts open loans the change would affect.
    pub fn configure(
        &mut self,
        collection: CollectionId,
        token_id: Option<u64>,
        params: NftConfigParams,
        open_loans: u64,
        now: u64,
    ) -> LendResult<()> {
        params.validate()?;

        match token_id {
            None => {
                if let Some(existing) = self.collections.get(&collection) {
                    if open_loans > 0 && existing.params.strands(&params) {
                        return Err(LendError::CollateralInUse { collection, open_loans });
                    }
                }
                let entry = self.collections.entry(collection).or_insert(NftConfig {
                    params,
                    active: true,
                    frozen: false,
                    config_timestamp: now,
                });
                entry.params = params;
                entry.config_timestamp = now;
            }
            Some(token_id) => {
                let current = self.config(&collection, token_id)?;
                if open_loans > 0 && current.params.strands(&params) {
                    return Err(LendError::CollateralInUse { collection, open_loans });
                }
                self.token_overrides.insert(
                    NftKey::new(collection, token_id),
                    TokenOverride { params, config_timestamp: now },
                );
            }
        }

        Ok(())
    }

    /// Enable or disable a collection; disabling requires no open loans
    pub fn set_active(
        &mut self,
        collection: &CollectionId,
        active: bool,
        open_loans: u64,
        now: u64,
    ) -> LendResult<()> {
        if !active && open_loans > 0 {
            return Err(LendError::CollateralInUse {
                collection: *collection,
                open_loans,
            });
        }
        let config = self.collection_mut(collection)?;
        config.active = active;
        config.config_timestamp = now;
        Ok(())
    }

    /// Freeze or unfreeze new borrows against a collection
    pub fn set_frozen(&mut self, collection: &CollectionId, frozen: bool, now: u64) -> LendResult<()> {
        let config = self.collection_mut(collection)?;
        config.frozen = frozen;
        config.config_timestamp = now;
        Ok(())
    }

    /// Effective configuration for a token
    pub fn config(&self, collection: &CollectionId, token_id: u64) -> LendResult<NftConfig> {
        let base = self
            .collections
            .get(collection)
            .ok_or(LendError::CollateralNotConfigured { collection: *collection })?;

        match self.token_overrides.get(&NftKey::new(*collection, token_id)) {
            Some(token) => Ok(NftConfig {
                params: token.params,
                active: base.active,
                frozen: base.frozen,
                config_timestamp: token.config_timestamp.max(base.config_timestamp),
            }),
            None => Ok(*base),
        }
    }

    /// Whether the collection is registered
    pub fn is_configured(&self, collection: &CollectionId) -> bool {
        self.collections.contains_key(collection)
    }

    /// Check a token can back a new loan
    ///
    /// `open_loans` is the current number of open loans on the collection.
    pub fn ensure_borrowable(
        &self,
        collection: &CollectionId,
        token_id: u64,
        open_loans: u64,
    ) -> LendResult<NftConfig> {
        let config = self.config(collection, token_id)?;

        if !config.active {
            return Err(LendError::CollateralInactive { collection: *collection });
        }
        if config.frozen {
            return Err(LendError::CollateralFrozen { collection: *collection });
        }
        if config.params.max_token_id > 0 && token_id > config.params.max_token_id {
            return Err(LendError::TokenIdOutOfRange {
                token_id,
                max_token_id: config.params.max_token_id,
            });
        }
        if config.params.max_supply > 0 && open_loans >= config.params.max_supply {
            return Err(LendError::InvalidInput {
                param: "collection",
                reason: "max supply of open loans reached",
            });
        }

        Ok(config)
    }

    fn collection_mut(&mut self, collection: &CollectionId) -> LendResult<&mut NftConfig> {
        self.collections
            .get_mut(collection)
            .ok_or(LendError::CollateralNotConfigured { collection: *collection })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUNKS: CollectionId = [3u8; 32];

    fn registry() -> CollateralRegistry {
        let mut registry = CollateralRegistry::new();
        registry.configure(PUNKS, None, NftConfigParams::default(), 0, 100).unwrap();
        registry
    }

    #[test]
    fn test_configure_collection() {
        let registry = registry();
        let config = registry.config(&PUNKS, 1).unwrap();
        assert!(config.active);
        assert!(!config.frozen);
        assert_eq!(config.config_timestamp, 100);
        assert_eq!(config.params, NftConfigParams::default());
    }

    #[test]
    fn test_ltv_above_threshold_rejected() {
        let mut registry = CollateralRegistry::new();
        let params = NftConfigParams {
            ltv_bps: 8_500,
            liquidation_threshold_bps: 8_000,
            ..Default::default()
        };
        assert!(matches!(
            registry.configure(PUNKS, None, params, 0, 0),
            Err(LendError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_threshold_at_100_percent_rejected() {
        let params = NftConfigParams {
            liquidation_threshold_bps: 10_000,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_redeem_threshold_above_liquidation_threshold_rejected() {
        let params = NftConfigParams {
            redeem_threshold_bps: 9_000,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_token_override() {
        let mut registry = registry();
        let params = NftConfigParams { ltv_bps: 6_000, ..Default::default() };
        registry.configure(PUNKS, Some(7), params, 0, 200).unwrap();

        assert_eq!(registry.config(&PUNKS, 7).unwrap().params.ltv_bps, 6_000);
        assert_eq!(registry.config(&PUNKS, 8).unwrap().params.ltv_bps, 4_000);

        // Collection switch applies to overridden tokens too
        registry.set_frozen(&PUNKS, true, 300).unwrap();
        assert!(registry.config(&PUNKS, 7).unwrap().frozen);
    }

    #[test]
    fn test_override_requires_collection() {
        let mut registry = CollateralRegistry::new();
        assert!(matches!(
            registry.configure(PUNKS, Some(1), NftConfigParams::default(), 0, 0),
            Err(LendError::CollateralNotConfigured { .. })
        ));
    }

    #[test]
    fn test_stranding_change_rejected_with_open_loans() {
        let mut registry = registry();
        let tighter = NftConfigParams {
            liquidation_threshold_bps: 7_000,
            ..Default::default()
        };

        assert!(matches!(
            registry.configure(PUNKS, None, tighter, 2, 200),
            Err(LendError::CollateralInUse { open_loans: 2, .. })
        ));

        // Same change is fine once loans are closed
        registry.configure(PUNKS, None, tighter, 0, 200).unwrap();

        // Loosening is fine with loans open
        registry.configure(PUNKS, None, NftConfigParams::default(), 2, 300).unwrap();
    }

    #[test]
    fn test_auction_terms_locked_with_open_loans() {
        let mut registry = registry();
        let harsher = [
            NftConfigParams { redeem_threshold_bps: 100, ..Default::default() },
            NftConfigParams { redeem_fine_bps: 2_000, ..Default::default() },
            NftConfigParams { min_bid_fine: 2 * NftConfigParams::default().min_bid_fine, ..Default::default() },
            NftConfigParams { liquidation_bonus_bps: 1_000, ..Default::default() },
        ];
        for params in harsher {
            assert!(matches!(
                registry.configure(PUNKS, None, params, 1, 200),
                Err(LendError::CollateralInUse { open_loans: 1, .. })
            ));
        }
        assert_eq!(registry.config(&PUNKS, 1).unwrap().params, NftConfigParams::default());

        // Softer auction terms go through
        let softer = NftConfigParams {
            redeem_fine_bps: 100,
            liquidation_bonus_bps: 100,
            ..Default::default()
        };
        registry.configure(PUNKS, None, softer, 1, 200).unwrap();
    }

    #[test]
    fn test_deactivate_with_open_loans_rejected() {
        let mut registry = registry();
        assert!(registry.set_active(&PUNKS, false, 1, 200).is_err());
        registry.set_active(&PUNKS, false, 0, 200).unwrap();
        assert!(matches!(
            registry.ensure_borrowable(&PUNKS, 1, 0),
            Err(LendError::CollateralInactive { .. })
        ));
    }

    #[test]
    fn test_max_token_id_and_supply() {
        let mut registry = CollateralRegistry::new();
        let params = NftConfigParams { max_token_id: 9_999, max_supply: 2, ..Default::default() };
        registry.configure(PUNKS, None, params, 0, 0).unwrap();

        assert!(registry.ensure_borrowable(&PUNKS, 9_999, 0).is_ok());
        assert!(matches!(
            registry.ensure_borrowable(&PUNKS, 10_000, 0),
            Err(LendError::TokenIdOutOfRange { .. })
        ));
        assert!(registry.ensure_borrowable(&PUNKS, 5, 2).is_err());
    }
}
