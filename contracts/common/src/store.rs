//! Lending Store and Effects
//!
//! `LendingStore` is the whole ledger, keyed by stable ids and passed into
//! every operation. Operations never move value themselves: they record
//! `Transfer`s into an `Effects` buffer which the host applies after the
//! state transition has completed.

use alloc::vec::Vec;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::collateral::CollateralRegistry;
use crate::config::PoolConfig;
use crate::debt_market::DebtMarket;
use crate::errors::LendResult;
use crate::events::{EventLog, LendEvent};
use crate::loan::LoanBook;
use crate::reserve::ReserveLedger;
use crate::types::{Address, AssetId, NftKey};
use crate::wrapper::WrapperRegistry;

// ============ Store ============

/// All protocol state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LendingStore {
    pub config: PoolConfig,
    pub reserves: ReserveLedger,
    pub collateral: CollateralRegistry,
    pub loans: LoanBook,
    pub debt_market: DebtMarket,
    pub wrappers: WrapperRegistry,
}

impl LendingStore {
    /// Create an empty store
    pub fn new(config: PoolConfig) -> LendResult<Self> {
        config.validate()?;
        Ok(Self {
            reserves: ReserveLedger::new(config.treasury),
            config,
            collateral: CollateralRegistry::new(),
            loans: LoanBook::new(),
            debt_market: DebtMarket::new(),
            wrappers: WrapperRegistry::new(),
        })
    }

    /// Custody account
    pub fn pool_account(&self) -> Address {
        self.config.pool_account
    }

    /// Snapshot of a reserve's indices and rates as an event
    pub fn reserve_data_event(&self, asset: &AssetId, now: u64) -> LendResult<LendEvent> {
        let reserve = self.reserves.reserve(asset)?;
        Ok(LendEvent::ReserveDataUpdated {
            asset: *asset,
            liquidity_rate: reserve.current_liquidity_rate,
            variable_borrow_rate: reserve.current_variable_borrow_rate,
            liquidity_index: reserve.liquidity_index,
            variable_borrow_index: reserve.variable_borrow_index,
            timestamp: now,
        })
    }
}

// ============ Effects ============

/// Value movement requested by an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum Transfer {
    /// Fungible reserve asset
    Token {
        asset: AssetId,
        from: Address,
        to: Address,
        amount: u128,
    },
    /// Collateral or wrapped token custody change
    Nft { nft: NftKey, from: Address, to: Address },
    /// Mint a wrapped collateral token
    MintWrapped { nft: NftKey, to: Address },
    /// Burn a wrapped collateral token wherever it is held
    BurnWrapped { nft: NftKey },
}

/// Transfers and events produced by one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    pub transfers: Vec<Transfer>,
    pub events: EventLog,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fungible transfer; zero amounts and self-transfers are skipped
    pub fn token(&mut self, asset: AssetId, from: Address, to: Address, amount: u128) {
        if amount == 0 || from == to {
            return;
        }
        self.transfers.push(Transfer::Token { asset, from, to, amount });
    }

    pub fn nft(&mut self, nft: NftKey, from: Address, to: Address) {
        if from == to {
            return;
        }
        self.transfers.push(Transfer::Nft { nft, from, to });
    }

    pub fn mint_wrapped(&mut self, nft: NftKey, to: Address) {
        self.transfers.push(Transfer::MintWrapped { nft, to });
    }

    pub fn burn_wrapped(&mut self, nft: NftKey) {
        self.transfers.push(Transfer::BurnWrapped { nft });
    }

    pub fn emit(&mut self, event: LendEvent) {
        self.events.emit(event);
    }

    /// Net flow of `asset` into `account` (credits minus debits)
    pub fn net_flow(&self, asset: &AssetId, account: &Address) -> i128 {
        self.transfers.iter().fold(0i128, |acc, t| match t {
            Transfer::Token { asset: a, from, to, amount } if a == asset => {
                let amount = *amount as i128;
                match (from == account, to == account) {
                    (true, false) => acc - amount,
                    (false, true) => acc + amount,
                    _ => acc,
                }
            }
            _ => acc,
        })
    }
}
