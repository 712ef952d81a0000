//! Lend Pool - stateful host for NFTLend
//!
//! Wraps the pure engines from `nftlend-common` into a single pool with
//! custody wallets, role checks and the pause switch.
//!
//! ## Atomic actions
//!
//! Every action runs against a working copy of the pool:
//! 1. reject entry while the busy flag is set
//! 2. reject user actions while paused
//! 3. run the engine operation, which records transfers and events
//! 4. apply the recorded transfers to the custody wallets
//! 5. commit the working copy and append the events
//!
//! Any error along the way drops the working copy, so a failed action
//! leaves no trace.
//!
//! `&mut self` already serializes callers that own the pool. The busy flag
//! guards the host around it: a host that shares the pool behind a handle
//! and calls back in from a vault or venue hook is rejected, and an action
//! that unwinds out of a collaborator leaves the flag set, so the pool
//! refuses further actions until it is rebuilt from a snapshot.
//!
//! ## Core Operations
//!
//! - **Supply**: deposit, withdraw
//! - **Loans**: borrow, repay, approve_delegation
//! - **Auctions**: auction, redeem, liquidate, liquidate_nftx
//! - **Debt market**: create, buy, bid, claim and cancel debt listings
//! - **Administration**: pause, roles, reserves, collateral, wrappers, vault

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

pub mod wallet;

pub use wallet::Wallets;

use nftlend_common::{
    access_control::{self, AccessControlState, Permission, Role},
    auction::{self, FixedPriceVenue, NftVenue, RedeemOutcome, Settlement},
    collateral::{NftConfig, NftConfigParams},
    config::PoolConfig,
    debt_market::{self, DebtListing},
    emergency::{self, EmergencyState},
    errors::{LendError, LendResult},
    events::{EventLog, LendEvent},
    loan::{self, BorrowParams, Loan, RepayOutcome},
    oracle::PriceOracle,
    reserve::{InterestRateStrategy, Reserve, ReserveInit},
    store::{Effects, LendingStore},
    supply,
    types::{Address, AssetId, CollectionId, ListingId, LoanId, NftKey, SellType},
    vault::{self, RebalanceOutcome, YieldVault},
    views::{self, NftAuctionData, NftCollateralData, NftDebtData},
};

// ============ Pool State ============

/// Everything an action may change, committed as one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolState {
    /// Reserves, collateral, loans, listings
    pub store: LendingStore,
    /// Role assignments
    pub access: AccessControlState,
    /// Pause switch and history
    pub emergency: EmergencyState,
    /// Custody balances and token owners
    pub wallets: Wallets,
}

/// Pool with its external collaborators
pub struct LendPool<O, V, N = FixedPriceVenue> {
    oracle: O,
    state: PoolState,
    vault: V,
    venue: N,
    /// Set while an action runs; stays set if the action unwinds
    busy: bool,
    events: EventLog,
}

/// Working copy an action runs against
struct Working<V, N> {
    state: PoolState,
    vault: V,
    venue: N,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Blocked while paused
    User,
    /// Privileged; stays available while paused
    Admin,
}

impl<O, V, N> LendPool<O, V, N>
where
    O: PriceOracle,
    V: YieldVault + Clone,
    N: NftVenue + Clone,
{
    /// Create a pool; `admin` becomes the super admin
    pub fn new(oracle: O, vault: V, venue: N, admin: Address, config: PoolConfig, now: u64) -> LendResult<Self> {
        if venue.account() == config.pool_account {
            return Err(LendError::InvalidConfig {
                reason: "venue account is the pool account",
            });
        }

        Ok(Self {
            oracle,
            state: PoolState {
                store: LendingStore::new(config)?,
                access: AccessControlState::new(admin, now),
                emergency: EmergencyState::new(),
                wallets: Wallets::new(),
            },
            vault,
            venue,
            busy: false,
            events: EventLog::new(),
        })
    }

    // ============ Atomic Execution ============

    fn atomic<T, F>(&mut self, action: &'static str, mode: Mode, op: F) -> LendResult<T>
    where
        F: FnOnce(&O, &mut Working<V, N>, &mut Effects) -> LendResult<T>,
    {
        if self.busy {
            log::warn!("{} rejected: {}", action, LendError::Reentrancy.code());
            return Err(LendError::Reentrancy);
        }
        if mode == Mode::User {
            if let Err(err) = emergency::ensure_not_paused(&self.state.emergency) {
                log::warn!("{} rejected: {}", action, err.code());
                return Err(err);
            }
        }

        log::debug!("{}: begin", action);
        self.busy = true;

        let mut working = Working {
            state: self.state.clone(),
            vault: self.vault.clone(),
            venue: self.venue.clone(),
        };
        let mut fx = Effects::new();

        let result = op(&self.oracle, &mut working, &mut fx).and_then(|value| {
            for transfer in &fx.transfers {
                working.state.wallets.apply(transfer)?;
            }
            Ok(value)
        });

        self.busy = false;

        match result {
            Ok(value) => {
                log::info!(
                    "{} committed: {} transfers, {} events",
                    action,
                    fx.transfers.len(),
                    fx.events.len()
                );
                self.state = working.state;
                self.vault = working.vault;
                self.venue = working.venue;
                self.events.append(fx.events);
                Ok(value)
            }
            Err(err) => {
                log::warn!("{} reverted: {} ({})", action, err.code(), err);
                Err(err)
            }
        }
    }

    // ============ Supply ============

    /// Supply liquidity, credited to `on_behalf_of`
    pub fn deposit(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        amount: u128,
        on_behalf_of: &Address,
        referral: u16,
        now: u64,
    ) -> LendResult<u128> {
        self.atomic("deposit", Mode::User, |_, w, fx| {
            supply::deposit(&mut w.state.store, caller, asset, amount, on_behalf_of, referral, now, fx)
        })
    }

    /// Withdraw supplied liquidity; `u128::MAX` withdraws everything
    pub fn withdraw(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        amount: u128,
        to: &Address,
        now: u64,
    ) -> LendResult<u128> {
        self.atomic("withdraw", Mode::User, |_, w, fx| {
            supply::withdraw(&mut w.state.store, &mut w.vault, caller, asset, amount, to, now, fx)
        })
    }

    // ============ Loans ============

    pub fn borrow(&mut self, caller: &Address, params: &BorrowParams, now: u64) -> LendResult<LoanId> {
        self.atomic("borrow", Mode::User, |oracle, w, fx| {
            loan::borrow(&mut w.state.store, oracle, &mut w.vault, caller, params, now, fx)
        })
    }

    pub fn repay(&mut self, caller: &Address, nft: &NftKey, amount: u128, now: u64) -> LendResult<RepayOutcome> {
        self.atomic("repay", Mode::User, |_, w, fx| {
            loan::repay(&mut w.state.store, caller, nft, amount, now, fx)
        })
    }

    /// Allow `delegatee` to borrow with the caller as debt owner
    pub fn approve_delegation(
        &mut self,
        caller: &Address,
        delegatee: &Address,
        approved: bool,
        now: u64,
    ) -> LendResult<()> {
        self.atomic("approve_delegation", Mode::User, |_, w, fx| {
            loan::approve_delegation(&mut w.state.store, caller, delegatee, approved, now, fx)
        })
    }

    // ============ Auctions ============

    pub fn auction(
        &mut self,
        caller: &Address,
        nft: &NftKey,
        bid_price: u128,
        on_behalf_of: &Address,
        now: u64,
    ) -> LendResult<()> {
        self.atomic("auction", Mode::User, |oracle, w, fx| {
            auction::auction(&mut w.state.store, oracle, caller, nft, bid_price, on_behalf_of, now, fx)
        })
    }

    pub fn redeem(
        &mut self,
        caller: &Address,
        nft: &NftKey,
        amount: u128,
        bid_fine: u128,
        now: u64,
    ) -> LendResult<RedeemOutcome> {
        self.atomic("redeem", Mode::User, |oracle, w, fx| {
            auction::redeem(&mut w.state.store, oracle, caller, nft, amount, bid_fine, now, fx)
        })
    }

    pub fn liquidate(&mut self, caller: &Address, nft: &NftKey, min_price: u128, now: u64) -> LendResult<Settlement> {
        self.atomic("liquidate", Mode::User, |_, w, fx| {
            auction::liquidate(&mut w.state.store, caller, nft, min_price, now, fx)
        })
    }

    /// Sell the collateral through the external venue
    pub fn liquidate_nftx(&mut self, caller: &Address, nft: &NftKey, now: u64) -> LendResult<Settlement> {
        self.atomic("liquidate_nftx", Mode::User, |oracle, w, fx| {
            auction::liquidate_nftx(&mut w.state.store, oracle, &mut w.venue, caller, nft, now, fx)
        })
    }

    // ============ Debt Market ============

    pub fn create_debt_listing(
        &mut self,
        caller: &Address,
        nft: &NftKey,
        sell_type: SellType,
        price: u128,
        auction_end: u64,
        now: u64,
    ) -> LendResult<ListingId> {
        self.atomic("create_debt_listing", Mode::User, |_, w, fx| {
            debt_market::create_listing(&mut w.state.store, caller, nft, sell_type, price, auction_end, now, fx)
        })
    }

    pub fn buy_debt(&mut self, caller: &Address, nft: &NftKey, now: u64) -> LendResult<()> {
        self.atomic("buy_debt", Mode::User, |_, w, fx| {
            debt_market::buy_debt(&mut w.state.store, caller, nft, now, fx)
        })
    }

    pub fn bid_debt(&mut self, caller: &Address, nft: &NftKey, amount: u128, now: u64) -> LendResult<()> {
        self.atomic("bid_debt", Mode::User, |_, w, fx| {
            debt_market::bid_debt(&mut w.state.store, caller, nft, amount, now, fx)
        })
    }

    /// Settle an ended debt auction; returns the new debt owner
    pub fn claim_debt(&mut self, nft: &NftKey, now: u64) -> LendResult<Address> {
        self.atomic("claim_debt", Mode::User, |_, w, fx| {
            debt_market::claim_debt(&mut w.state.store, nft, now, fx)
        })
    }

    /// Cancel a listing; returns the refunded bid
    pub fn cancel_debt_listing(&mut self, caller: &Address, nft: &NftKey, now: u64) -> LendResult<u128> {
        self.atomic("cancel_debt_listing", Mode::User, |_, w, fx| {
            debt_market::cancel_listing(&mut w.state.store, caller, nft, now, fx)
        })
    }

    // ============ Emergency and Roles ============

    /// Pause or unpause every user action
    pub fn set_pool_pause(&mut self, caller: &Address, paused: bool, now: u64) -> LendResult<()> {
        self.atomic("set_pool_pause", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::Pause)?;

            if paused {
                emergency::pause(&mut w.state.emergency, *caller, now)?;
                fx.emit(LendEvent::ProtocolPaused { by: *caller, timestamp: now });
            } else {
                emergency::unpause(&mut w.state.emergency, *caller, now)?;
                fx.emit(LendEvent::ProtocolUnpaused { by: *caller, timestamp: now });
            }
            log::info!("pool paused: {}", paused);
            Ok(())
        })
    }

    pub fn grant_role(&mut self, caller: &Address, account: &Address, role: Role, now: u64) -> LendResult<()> {
        self.atomic("grant_role", Mode::Admin, |_, w, fx| {
            access_control::grant_role(&mut w.state.access, *caller, *account, role, now)?;
            fx.emit(LendEvent::RoleGranted {
                account: *account,
                role,
                by: *caller,
                timestamp: now,
            });
            log::info!("role {:?} granted", role);
            Ok(())
        })
    }

    pub fn revoke_role(&mut self, caller: &Address, account: &Address, role: Role, now: u64) -> LendResult<()> {
        self.atomic("revoke_role", Mode::Admin, |_, w, fx| {
            access_control::revoke_role(&mut w.state.access, *caller, *account, role, now)?;
            fx.emit(LendEvent::RoleRevoked {
                account: *account,
                role,
                by: *caller,
                timestamp: now,
            });
            log::info!("role {:?} revoked", role);
            Ok(())
        })
    }

    // ============ Collateral Configuration ============

    /// Configure a collection, or one token when `token_id` is set
    pub fn configure_nft_as_collateral(
        &mut self,
        caller: &Address,
        collection: &CollectionId,
        token_id: Option<u64>,
        params: NftConfigParams,
        now: u64,
    ) -> LendResult<()> {
        self.atomic("configure_nft_as_collateral", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::ConfigureCollateral)?;

            let store = &mut w.state.store;
            let open_loans = store.loans.open_count(collection);
            store.collateral.configure(*collection, token_id, params, open_loans, now)?;

            fx.emit(LendEvent::NftConfigured {
                collection: *collection,
                token_id,
                ltv_bps: params.ltv_bps,
                liquidation_threshold_bps: params.liquidation_threshold_bps,
                liquidation_bonus_bps: params.liquidation_bonus_bps,
                timestamp: now,
            });
            log::info!("collateral configured, ltv {} bps", params.ltv_bps);
            Ok(())
        })
    }

    pub fn set_collateral_active(
        &mut self,
        caller: &Address,
        collection: &CollectionId,
        active: bool,
        now: u64,
    ) -> LendResult<()> {
        self.atomic("set_collateral_active", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::ConfigureCollateral)?;

            let store = &mut w.state.store;
            let open_loans = store.loans.open_count(collection);
            store.collateral.set_active(collection, active, open_loans, now)?;
            fx.emit(collateral_status(store, collection, now)?);
            Ok(())
        })
    }

    pub fn set_collateral_frozen(
        &mut self,
        caller: &Address,
        collection: &CollectionId,
        frozen: bool,
        now: u64,
    ) -> LendResult<()> {
        self.atomic("set_collateral_frozen", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::ConfigureCollateral)?;

            let store = &mut w.state.store;
            store.collateral.set_frozen(collection, frozen, now)?;
            fx.emit(collateral_status(store, collection, now)?);
            Ok(())
        })
    }

    /// Map a collection to the wrapped token minted to borrowers
    pub fn register_wrapper(
        &mut self,
        caller: &Address,
        collection: &CollectionId,
        wrapped: &CollectionId,
        _now: u64,
    ) -> LendResult<()> {
        self.atomic("register_wrapper", Mode::Admin, |_, w, _| {
            access_control::require_permission(&w.state.access, caller, Permission::ConfigureCollateral)?;
            w.state.store.wrappers.register(*collection, *wrapped)
        })
    }

    // ============ Reserve Configuration ============

    pub fn init_reserve(&mut self, caller: &Address, asset: &AssetId, init: &ReserveInit, now: u64) -> LendResult<()> {
        self.atomic("init_reserve", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::ConfigureReserve)?;

            let store = &mut w.state.store;
            store.reserves.init_reserve(*asset, init, now)?;
            fx.emit(LendEvent::ReserveInitialized {
                asset: *asset,
                decimals: init.decimals,
                timestamp: now,
            });
            fx.emit(store.reserve_data_event(asset, now)?);
            log::info!("reserve initialized with {} decimals", init.decimals);
            Ok(())
        })
    }

    pub fn set_reserve_flags(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        is_active: bool,
        is_frozen: bool,
        borrowing_enabled: bool,
        now: u64,
    ) -> LendResult<()> {
        self.atomic("set_reserve_flags", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::ConfigureReserve)?;

            let store = &mut w.state.store;
            store.reserves.set_flags(asset, is_active, is_frozen, borrowing_enabled)?;
            fx.emit(reserve_configured(store, asset, now)?);
            Ok(())
        })
    }

    pub fn set_reserve_factor(&mut self, caller: &Address, asset: &AssetId, bps: u64, now: u64) -> LendResult<()> {
        self.atomic("set_reserve_factor", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::ConfigureReserve)?;

            let store = &mut w.state.store;
            store.reserves.set_reserve_factor(asset, bps, now)?;
            fx.emit(reserve_configured(store, asset, now)?);
            fx.emit(store.reserve_data_event(asset, now)?);
            Ok(())
        })
    }

    pub fn set_rate_strategy(
        &mut self,
        caller: &Address,
        asset: &AssetId,
        strategy: InterestRateStrategy,
        now: u64,
    ) -> LendResult<()> {
        self.atomic("set_rate_strategy", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::ConfigureReserve)?;

            let store = &mut w.state.store;
            store.reserves.set_rate_strategy(asset, strategy, now)?;
            fx.emit(store.reserve_data_event(asset, now)?);
            Ok(())
        })
    }

    // ============ Yield Vault ============

    pub fn set_vault_debt_ratio(&mut self, caller: &Address, asset: &AssetId, bps: u64, _now: u64) -> LendResult<()> {
        self.atomic("set_vault_debt_ratio", Mode::Admin, |_, w, _| {
            access_control::require_permission(&w.state.access, caller, Permission::ManageVault)?;
            w.state.store.reserves.set_vault_debt_ratio(asset, bps)?;
            log::info!("vault debt ratio set to {} bps", bps);
            Ok(())
        })
    }

    /// Move idle liquidity toward the vault target
    pub fn rebalance_vault(&mut self, caller: &Address, asset: &AssetId, now: u64) -> LendResult<RebalanceOutcome> {
        self.atomic("rebalance_vault", Mode::Admin, |_, w, fx| {
            access_control::require_permission(&w.state.access, caller, Permission::ManageVault)?;

            w.state.store.reserves.accrue(asset, now)?;
            let reserve = w.state.store.reserves.reserve_mut(asset)?;
            let outcome = vault::rebalance(reserve, &mut w.vault)?;

            if !outcome.is_empty() {
                fx.emit(LendEvent::VaultRebalanced {
                    asset: *asset,
                    invested: outcome.invested,
                    divested: outcome.divested,
                    loss: outcome.loss,
                    timestamp: now,
                });
            }
            fx.emit(w.state.store.reserve_data_event(asset, now)?);
            Ok(outcome)
        })
    }

    // ============ External Balances ============

    /// Credit a balance arriving from outside the pool
    pub fn fund(&mut self, asset: AssetId, account: Address, amount: u128) -> LendResult<()> {
        self.state.wallets.fund(asset, account, amount)
    }

    /// Record a token minted outside the pool
    pub fn mint_nft(&mut self, nft: NftKey, owner: Address) {
        self.state.wallets.set_owner(nft, owner);
    }

    // ============ Read Views ============

    pub fn nft_collateral_data(&self, nft: &NftKey, asset: &AssetId, now: u64) -> LendResult<NftCollateralData> {
        views::nft_collateral_data(&self.state.store, &self.oracle, nft, asset, now)
    }

    pub fn nft_debt_data(&self, nft: &NftKey, now: u64) -> LendResult<NftDebtData> {
        views::nft_debt_data(&self.state.store, &self.oracle, nft, now)
    }

    pub fn nft_auction_data(&self, nft: &NftKey, now: u64) -> LendResult<NftAuctionData> {
        views::nft_auction_data(&self.state.store, &self.oracle, nft, now)
    }

    pub fn health_factor(&self, nft: &NftKey, now: u64) -> LendResult<u128> {
        views::health_factor_of(&self.state.store, &self.oracle, nft, now)
    }

    pub fn reserve_normalized_income(&self, asset: &AssetId, now: u64) -> LendResult<u128> {
        views::reserve_normalized_income(&self.state.store, asset, now)
    }

    pub fn reserve_normalized_variable_debt(&self, asset: &AssetId, now: u64) -> LendResult<u128> {
        views::reserve_normalized_variable_debt(&self.state.store, asset, now)
    }

    pub fn nft_config(&self, collection: &CollectionId, token_id: u64) -> LendResult<NftConfig> {
        self.state.store.collateral.config(collection, token_id)
    }

    pub fn reserve_data(&self, asset: &AssetId) -> LendResult<&Reserve> {
        self.state.store.reserves.reserve(asset)
    }

    pub fn loan(&self, loan_id: LoanId) -> Option<&Loan> {
        self.state.store.loans.get(loan_id)
    }

    /// Active debt listing on a collateral item
    pub fn listing(&self, nft: &NftKey) -> Option<&DebtListing> {
        self.state.store.debt_market.active_listing(nft)
    }

    /// Supplied balance including accrued interest
    pub fn supplied_balance(&self, asset: &AssetId, account: &Address, now: u64) -> LendResult<u128> {
        self.state.store.reserves.balance_of(asset, account, now)
    }

    /// Custody wallet balance
    pub fn balance_of(&self, asset: &AssetId, account: &Address) -> u128 {
        self.state.wallets.balance_of(asset, account)
    }

    pub fn owner_of(&self, nft: &NftKey) -> Option<Address> {
        self.state.wallets.owner_of(nft)
    }

    pub fn is_paused(&self) -> bool {
        emergency::is_paused(&self.state.emergency)
    }

    /// Committed events, oldest first
    pub fn events(&self) -> &[LendEvent] {
        self.events.events()
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    /// Borsh snapshot of the committed state
    pub fn snapshot(&self) -> borsh::io::Result<Vec<u8>> {
        borsh::to_vec(&self.state)
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn venue_mut(&mut self) -> &mut N {
        &mut self.venue
    }
}

// ============ Helper Functions ============

fn collateral_status(store: &LendingStore, collection: &CollectionId, now: u64) -> LendResult<LendEvent> {
    let config = store.collateral.config(collection, 0)?;
    Ok(LendEvent::CollateralStatusChanged {
        collection: *collection,
        active: config.active,
        frozen: config.frozen,
        timestamp: now,
    })
}

fn reserve_configured(store: &LendingStore, asset: &AssetId, now: u64) -> LendResult<LendEvent> {
    let reserve = store.reserves.reserve(asset)?;
    Ok(LendEvent::ReserveConfigured {
        asset: *asset,
        is_active: reserve.is_active,
        is_frozen: reserve.is_frozen,
        borrowing_enabled: reserve.borrowing_enabled,
        reserve_factor_bps: reserve.reserve_factor_bps,
        timestamp: now,
    })
}

// ============ Tests ============
