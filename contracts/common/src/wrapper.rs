//! Collateral wrapper registry
//!
//! Each collateral collection is represented to borrowers by a wrapped
//! collection; the pool mints the wrapped token while the original sits in
//! custody. The registry only maps identities.

use alloc::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{LendError, LendResult};
use crate::types::{CollectionId, NftKey};

/// Read-only lookup of wrapped representations
pub trait CollateralWrapper {
    fn wrapped_of(&self, collection: &CollectionId) -> Option<CollectionId>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct WrapperRegistry {
    wrappers: BTreeMap<CollectionId, CollectionId>,
}

impl WrapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a collection to its wrapped collection
    pub fn register(&mut self, collection: CollectionId, wrapped: CollectionId) -> LendResult<()> {
        if collection == wrapped {
            return Err(LendError::InvalidInput {
                param: "wrapped",
                reason: "wrapper must differ from collection",
            });
        }
        if self.wrappers.contains_key(&collection) {
            return Err(LendError::InvalidInput {
                param: "collection",
                reason: "wrapper already registered",
            });
        }
        self.wrappers.insert(collection, wrapped);
        Ok(())
    }

    /// Wrapped key for a collateral item
    pub fn wrapped_key(&self, nft: &NftKey) -> LendResult<NftKey> {
        self.wrapped_of(&nft.collection)
            .map(|wrapped| NftKey::new(wrapped, nft.token_id))
            .ok_or(LendError::WrapperNotRegistered { collection: nft.collection })
    }
}

impl CollateralWrapper for WrapperRegistry {
    fn wrapped_of(&self, collection: &CollectionId) -> Option<CollectionId> {
        self.wrappers.get(collection).copied()
    }
}
