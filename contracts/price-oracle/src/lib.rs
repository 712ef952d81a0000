//! Price Oracle Contract
//!
//! Operator-managed price feeds for NFTLend. Holds one feed per reserve
//! asset, a floor feed per NFT collection and optional per-token
//! appraisals that take precedence over the floor.
//!
//! Publishing requires the `UpdatePrice` permission (the `PriceManager`
//! role). A single update may not move an existing feed by more than the
//! configured deviation, so a compromised operator cannot crash a floor in
//! one step.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use nftlend_common::{
    access_control::{self, AccessControlState, Permission, Role},
    constants::{oracle::MAX_PRICE_DEVIATION_BPS, precision::PERCENTAGE_FACTOR},
    errors::{LendError, LendResult},
    events::{EventLog, LendEvent},
    oracle::{PriceData, PriceOracle},
    types::{Address, AssetId, CollectionId, NftKey},
};

// ============ Oracle State ============

/// Oracle contract state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct OracleState {
    /// Who may publish and who may manage publishers
    pub access: AccessControlState,
    /// Whether feeds are served
    pub is_active: bool,
    /// Largest move a single update may make
    pub max_deviation_bps: u64,
    /// Reserve asset feeds
    pub reserves: BTreeMap<AssetId, PriceData>,
    /// Collection floor feeds
    pub collections: BTreeMap<CollectionId, PriceData>,
    /// Per-token appraisals
    pub tokens: BTreeMap<NftKey, PriceData>,
}

impl OracleState {
    /// Create an oracle administered by `admin`; the admin also publishes
    pub fn new(admin: Address, now: u64) -> Self {
        let mut access = AccessControlState::new(admin, now);
        access.assignments.push(access_control::RoleAssignment {
            address: admin,
            role: Role::PriceManager,
            granted_at: now,
            granted_by: admin,
        });

        Self {
            access,
            is_active: true,
            max_deviation_bps: MAX_PRICE_DEVIATION_BPS,
            reserves: BTreeMap::new(),
            collections: BTreeMap::new(),
            tokens: BTreeMap::new(),
        }
    }

    // ============ Operator Management ============

    /// Grant the publisher role
    pub fn add_operator(&mut self, admin: Address, operator: Address, now: u64) -> LendResult<()> {
        access_control::grant_role(&mut self.access, admin, operator, Role::PriceManager, now)
    }

    /// Revoke the publisher role
    pub fn remove_operator(&mut self, admin: Address, operator: Address, now: u64) -> LendResult<()> {
        access_control::revoke_role(&mut self.access, admin, operator, Role::PriceManager, now)
    }

    /// Switch the oracle on or off; an inactive oracle serves no prices
    pub fn set_active(&mut self, admin: Address, active: bool) -> LendResult<()> {
        access_control::require_permission(&self.access, &admin, Permission::GrantRole)?;
        self.is_active = active;
        log::info!("oracle active set to {}", active);
        Ok(())
    }

    /// Change the per-update deviation bound
    pub fn set_max_deviation(&mut self, admin: Address, bps: u64) -> LendResult<()> {
        access_control::require_permission(&self.access, &admin, Permission::GrantRole)?;
        if bps == 0 || bps > PERCENTAGE_FACTOR {
            return Err(LendError::InvalidConfig {
                reason: "deviation bound outside (0, 100%]",
            });
        }
        self.max_deviation_bps = bps;
        Ok(())
    }

    // ============ Publishing ============

    /// Publish a reserve asset price
    pub fn update_reserve_price(
        &mut self,
        signer: Address,
        asset: AssetId,
        price: u128,
        now: u64,
        events: &mut EventLog,
    ) -> LendResult<()> {
        let max_deviation_bps = self.max_deviation_bps;
        self.ensure_publisher(&signer)?;
        let old_price = publish(&mut self.reserves, asset, price, now, max_deviation_bps)?;
        events.emit(LendEvent::PriceUpdated {
            feed: asset,
            token_id: None,
            old_price,
            new_price: price,
            timestamp: now,
        });
        Ok(())
    }

    /// Publish a collection floor price
    pub fn update_collection_price(
        &mut self,
        signer: Address,
        collection: CollectionId,
        price: u128,
        now: u64,
        events: &mut EventLog,
    ) -> LendResult<()> {
        let max_deviation_bps = self.max_deviation_bps;
        self.ensure_publisher(&signer)?;
        let old_price = publish(&mut self.collections, collection, price, now, max_deviation_bps)?;
        events.emit(LendEvent::PriceUpdated {
            feed: collection,
            token_id: None,
            old_price,
            new_price: price,
            timestamp: now,
        });
        Ok(())
    }

    /// Publish an appraisal for a single token
    pub fn update_token_price(
        &mut self,
        signer: Address,
        nft: NftKey,
        price: u128,
        now: u64,
        events: &mut EventLog,
    ) -> LendResult<()> {
        let max_deviation_bps = self.max_deviation_bps;
        self.ensure_publisher(&signer)?;
        let old_price = publish(&mut self.tokens, nft, price, now, max_deviation_bps)?;
        events.emit(LendEvent::PriceUpdated {
            feed: nft.collection,
            token_id: Some(nft.token_id),
            old_price,
            new_price: price,
            timestamp: now,
        });
        Ok(())
    }

    /// Drop a token appraisal so the collection floor applies again
    pub fn clear_token_price(&mut self, signer: Address, nft: &NftKey) -> LendResult<()> {
        self.ensure_publisher(&signer)?;
        self.tokens.remove(nft).ok_or(LendError::PriceUnavailable { what: "token appraisal" })?;
        Ok(())
    }

    fn ensure_publisher(&self, signer: &Address) -> LendResult<()> {
        access_control::require_permission(&self.access, signer, Permission::UpdatePrice)?;
        if !self.is_active {
            return Err(LendError::PriceUnavailable { what: "oracle inactive" });
        }
        Ok(())
    }
}

impl PriceOracle for OracleState {
    fn reserve_price(&self, asset: &AssetId) -> Option<PriceData> {
        if !self.is_active {
            return None;
        }
        self.reserves.get(asset).copied()
    }

    fn nft_price(&self, collection: &CollectionId, token_id: u64) -> Option<PriceData> {
        if !self.is_active {
            return None;
        }
        self.tokens
            .get(&NftKey::new(*collection, token_id))
            .or_else(|| self.collections.get(collection))
            .copied()
    }
}

// ============ Query Functions ============

/// Price for display only, with a staleness flag
///
/// Never use this for validation; the pool reads through `PriceOracle`
/// and rejects stale feeds.
pub fn nft_price_for_display(
    state: &OracleState,
    collection: &CollectionId,
    token_id: u64,
    now: u64,
    max_age: u64,
) -> Option<(u128, bool)> {
    let data = state
        .tokens
        .get(&NftKey::new(*collection, token_id))
        .or_else(|| state.collections.get(collection))?;
    Some((data.price, data.is_stale(now, max_age)))
}

/// Check whether a reserve feed is fresh
pub fn is_reserve_price_fresh(state: &OracleState, asset: &AssetId, now: u64, max_age: u64) -> bool {
    state
        .reserve_price(asset)
        .map(|data| !data.is_stale(now, max_age))
        .unwrap_or(false)
}

// ============ Helper Functions ============

/// Write a feed after the zero and deviation checks, returning the old price
fn publish<K: Ord>(
    feeds: &mut BTreeMap<K, PriceData>,
    key: K,
    price: u128,
    now: u64,
    max_deviation_bps: u64,
) -> LendResult<u128> {
    if price == 0 {
        return Err(LendError::PriceZero { what: "published price" });
    }

    let old_price = feeds.get(&key).map(|data| data.price).unwrap_or(0);
    if old_price > 0 {
        let deviation_bps = calculate_price_deviation(old_price, price);
        if deviation_bps > max_deviation_bps {
            return Err(LendError::PriceDeviation {
                deviation_bps,
                max_deviation_bps,
            });
        }
    }

    feeds.insert(key, PriceData::new(price, now));
    log::debug!("feed updated: {} -> {}", old_price, price);
    Ok(old_price)
}

/// Price deviation in basis points (100 bps = 1%)
fn calculate_price_deviation(old_price: u128, new_price: u128) -> u64 {
    if old_price == 0 {
        return PERCENTAGE_FACTOR;
    }

    let diff = old_price.abs_diff(new_price);
    let deviation = diff
        .checked_mul(PERCENTAGE_FACTOR as u128)
        .map(|scaled| scaled / old_price)
        .unwrap_or(u128::MAX);
    deviation.min(u64::MAX as u128) as u64
}

// ============ Tests ============
