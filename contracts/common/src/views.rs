//! Read views
//!
//! Aggregated position data for front ends and keepers. Views project
//! interest to `now` and never mutate the store.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::auction::{calculate_bid_fine, liquidation_price};
use crate::errors::LendResult;
use crate::health::{snapshot, HEALTH_FACTOR_MAX};
use crate::math::{percent_mul, Rounding};
use crate::oracle::PriceOracle;
use crate::store::LendingStore;
use crate::types::{Address, AssetId, LoanId, LoanState, NftKey};

/// Collateral terms and capacity for a token against a reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct NftCollateralData {
    pub total_collateral: u128,
    pub available_borrows: u128,
    pub ltv_bps: u64,
    pub liquidation_threshold_bps: u64,
    pub liquidation_bonus_bps: u64,
}

/// Debt position on a collateral item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct NftDebtData {
    pub loan_id: LoanId,
    pub reserve_asset: AssetId,
    pub borrower: Address,
    pub state: LoanState,
    pub total_collateral: u128,
    pub total_debt: u128,
    pub available_borrows: u128,
    pub health_factor: u128,
}

/// Auction state of a collateral item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct NftAuctionData {
    pub loan_id: LoanId,
    pub bidder: Option<Address>,
    pub bid_price: u128,
    pub bid_borrow_amount: u128,
    /// Fine a redeem would pay right now
    pub bid_fine: u128,
    pub bid_start_timestamp: u64,
    /// Minimum next bid
    pub min_bid: u128,
}

/// Collateral value (reserve units) and remaining capacity of a token
pub fn nft_collateral_data<O: PriceOracle + ?Sized>(
    store: &LendingStore,
    oracle: &O,
    nft: &NftKey,
    asset: &AssetId,
    now: u64,
) -> LendResult<NftCollateralData> {
    let config = store.collateral.config(&nft.collection, nft.token_id)?;
    let reserve = store.reserves.reserve(asset)?;
    let max_age = store.config.max_price_age;

    let scaled = store
        .loans
        .open_loan(nft)
        .filter(|loan| loan.reserve_asset == *asset)
        .map(|loan| loan.scaled_amount)
        .unwrap_or(0);
    let snap = snapshot(oracle, reserve, &config, nft, scaled, now, max_age)?;

    Ok(NftCollateralData {
        total_collateral: snap.collateral_in_reserve,
        available_borrows: snap.available_borrows,
        ltv_bps: config.params.ltv_bps,
        liquidation_threshold_bps: config.params.liquidation_threshold_bps,
        liquidation_bonus_bps: config.params.liquidation_bonus_bps,
    })
}

/// Current debt and health of the open loan on a token
pub fn nft_debt_data<O: PriceOracle + ?Sized>(
    store: &LendingStore,
    oracle: &O,
    nft: &NftKey,
    now: u64,
) -> LendResult<NftDebtData> {
    let loan = store.loans.require_open(nft)?;
    let config = store.collateral.config(&nft.collection, nft.token_id)?;
    let reserve = store.reserves.reserve(&loan.reserve_asset)?;
    let snap = snapshot(
        oracle,
        reserve,
        &config,
        nft,
        loan.scaled_amount,
        now,
        store.config.max_price_age,
    )?;

    Ok(NftDebtData {
        loan_id: loan.id,
        reserve_asset: loan.reserve_asset,
        borrower: loan.borrower,
        state: loan.state,
        total_collateral: snap.collateral_in_reserve,
        total_debt: snap.debt,
        available_borrows: snap.available_borrows,
        health_factor: snap.health_factor,
    })
}

/// Bid and redeem terms of the open loan on a token
pub fn nft_auction_data<O: PriceOracle + ?Sized>(
    store: &LendingStore,
    oracle: &O,
    nft: &NftKey,
    now: u64,
) -> LendResult<NftAuctionData> {
    let loan = store.loans.require_open(nft)?;
    let config = store.collateral.config(&nft.collection, nft.token_id)?;
    let reserve = store.reserves.reserve(&loan.reserve_asset)?;
    let snap = snapshot(
        oracle,
        reserve,
        &config,
        nft,
        loan.scaled_amount,
        now,
        store.config.max_price_age,
    )?;
    let data = match &loan.bid {
        Some(bid) => {
            let step = percent_mul(bid.bid_price, store.config.min_bid_increment_bps, Rounding::Up)?.max(1);
            NftAuctionData {
                loan_id: loan.id,
                bidder: Some(bid.bidder),
                bid_price: bid.bid_price,
                bid_borrow_amount: bid.bid_borrow_amount,
                bid_fine: bid.bid_fine,
                bid_start_timestamp: bid.bid_start_timestamp,
                min_bid: bid.bid_price.saturating_add(step).max(snap.debt),
            }
        }
        None => NftAuctionData {
            loan_id: loan.id,
            bidder: None,
            bid_price: 0,
            bid_borrow_amount: snap.debt,
            bid_fine: calculate_bid_fine(snap.debt, &config, snap.reserve_price, reserve.decimals)?,
            bid_start_timestamp: 0,
            min_bid: liquidation_price(&snap, &config)?,
        },
    };
    Ok(data)
}

/// Health factor of a token's loan, or the maximum when there is none
pub fn health_factor_of<O: PriceOracle + ?Sized>(
    store: &LendingStore,
    oracle: &O,
    nft: &NftKey,
    now: u64,
) -> LendResult<u128> {
    if store.loans.open_loan(nft).is_none() {
        return Ok(HEALTH_FACTOR_MAX);
    }
    Ok(nft_debt_data(store, oracle, nft, now)?.health_factor)
}

/// Liquidity index projected to `now`
pub fn reserve_normalized_income(store: &LendingStore, asset: &AssetId, now: u64) -> LendResult<u128> {
    store.reserves.reserve(asset)?.normalized_income(now)
}

/// Variable borrow index projected to `now`
pub fn reserve_normalized_variable_debt(store: &LendingStore, asset: &AssetId, now: u64) -> LendResult<u128> {
    store.reserves.reserve(asset)?.normalized_variable_debt(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collateral::NftConfigParams;
    use crate::config::PoolConfig;
    use crate::errors::LendError;
    use crate::constants::precision::{RAY, WAD};
    use crate::constants::time::SECONDS_PER_YEAR;
    use crate::loan::{borrow, BorrowParams};
    use crate::oracle::fixed::FixedPrices;
    use crate::reserve::ReserveInit;
    use crate::store::Effects;
    use crate::types::CollectionId;
    use crate::vault::NoVault;

    const WETH: AssetId = [1u8; 32];
    const PUNKS: CollectionId = [3u8; 32];

    fn setup() -> (LendingStore, FixedPrices) {
        let mut store = LendingStore::new(PoolConfig::default()).unwrap();
        store.reserves.init_reserve(WETH, &ReserveInit::default(), 0).unwrap();
        store.reserves.deposit(&WETH, &[0xA1; 32], 1_000 * WAD, 0).unwrap();
        store.collateral.configure(PUNKS, None, NftConfigParams::default(), 0, 0).unwrap();
        store.wrappers.register(PUNKS, [4u8; 32]).unwrap();

        let mut prices = FixedPrices::default();
        prices.set_reserve(WETH, WAD, 0);
        prices.set_nft(PUNKS, 1_000 * WAD, 0);
        (store, prices)
    }

    #[test]
    fn test_views_after_borrow() {
        let (mut store, prices) = setup();
        let nft = NftKey::new(PUNKS, 1);

        let before = nft_collateral_data(&store, &prices, &nft, &WETH, 0).unwrap();
        assert_eq!(before.total_collateral, 1_000 * WAD);
        assert_eq!(before.available_borrows, 400 * WAD);

        let params = BorrowParams {
            asset: WETH,
            amount: WAD,
            nft,
            on_behalf_of: [0xB0; 32],
            referral: 0,
        };
        borrow(&mut store, &prices, &mut NoVault, &[0xB0; 32], &params, 0, &mut Effects::new()).unwrap();

        let debt = nft_debt_data(&store, &prices, &nft, 0).unwrap();
        assert_eq!(debt.total_debt, WAD);
        assert_eq!(debt.health_factor, 800 * WAD);
        assert_eq!(debt.available_borrows, 399 * WAD);
        assert_eq!(health_factor_of(&store, &prices, &nft, 0).unwrap(), 800 * WAD);

        let auction = nft_auction_data(&store, &prices, &nft, 0).unwrap();
        assert!(auction.bidder.is_none());
        // 1000 * 0.8 * 0.95
        assert_eq!(auction.min_bid, 760 * WAD);
    }

    #[test]
    fn test_no_loan_views() {
        let (store, prices) = setup();
        let nft = NftKey::new(PUNKS, 1);
        assert!(matches!(
            nft_debt_data(&store, &prices, &nft, 0),
            Err(LendError::LoanNotFound { .. })
        ));
        assert_eq!(health_factor_of(&store, &prices, &nft, 0).unwrap(), HEALTH_FACTOR_MAX);
    }

    #[test]
    fn test_normalized_indices_project_without_mutation() {
        let (mut store, prices) = setup();
        let params = BorrowParams {
            asset: WETH,
            amount: 100 * WAD,
            nft: NftKey::new(PUNKS, 1),
            on_behalf_of: [0xB0; 32],
            referral: 0,
        };
        borrow(&mut store, &prices, &mut NoVault, &[0xB0; 32], &params, 0, &mut Effects::new()).unwrap();

        assert!(reserve_normalized_variable_debt(&store, &WETH, SECONDS_PER_YEAR).unwrap() > RAY);
        assert!(reserve_normalized_income(&store, &WETH, SECONDS_PER_YEAR).unwrap() > RAY);
        assert_eq!(store.reserves.reserve(&WETH).unwrap().liquidity_index, RAY);
    }
}
