//! Custody ledger
//!
//! Fungible balances and token ownership as the pool sees them. Every
//! `Transfer` an operation records is applied here after the operation has
//! succeeded; a transfer that cannot be honored reverts the whole action.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use nftlend_common::{
    errors::{LendError, LendResult},
    math::{safe_add, safe_sub},
    store::Transfer,
    types::{Address, AssetId, NftKey},
};

/// Balances and token owners
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Wallets {
    balances: BTreeMap<AssetId, BTreeMap<Address, u128>>,
    /// Owner per token, covering both collateral and wrapped tokens
    owners: BTreeMap<NftKey, Address>,
}

impl Wallets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, asset: &AssetId, account: &Address) -> u128 {
        self.balances
            .get(asset)
            .and_then(|m| m.get(account))
            .copied()
            .unwrap_or(0)
    }

    pub fn owner_of(&self, nft: &NftKey) -> Option<Address> {
        self.owners.get(nft).copied()
    }

    /// Credit an account from outside the pool
    pub fn fund(&mut self, asset: AssetId, account: Address, amount: u128) -> LendResult<()> {
        let entry = self.balances.entry(asset).or_default().entry(account).or_insert(0);
        *entry = safe_add(*entry, amount)?;
        Ok(())
    }

    /// Record an externally minted token
    pub fn set_owner(&mut self, nft: NftKey, owner: Address) {
        self.owners.insert(nft, owner);
    }

    /// Apply one recorded transfer
    pub fn apply(&mut self, transfer: &Transfer) -> LendResult<()> {
        match transfer {
            Transfer::Token { asset, from, to, amount } => {
                let available = self.balance_of(asset, from);
                if available < *amount {
                    return Err(LendError::InsufficientBalance {
                        available,
                        requested: *amount,
                    });
                }
                let accounts = self.balances.entry(*asset).or_default();
                accounts.insert(*from, safe_sub(available, *amount)?);
                let credit = accounts.entry(*to).or_insert(0);
                *credit = safe_add(*credit, *amount)?;
            }
            Transfer::Nft { nft, from, to } => {
                if self.owner_of(nft) != Some(*from) {
                    return Err(LendError::NotOwner {
                        caller: *from,
                        what: "token",
                    });
                }
                self.owners.insert(*nft, *to);
            }
            Transfer::MintWrapped { nft, to } => {
                if self.owners.contains_key(nft) {
                    return Err(LendError::InvalidInput {
                        param: "wrapped",
                        reason: "already minted",
                    });
                }
                self.owners.insert(*nft, *to);
            }
            Transfer::BurnWrapped { nft } => {
                self.owners.remove(nft).ok_or(LendError::InvalidInput {
                    param: "wrapped",
                    reason: "not minted",
                })?;
            }
        }
        Ok(())
    }
}
