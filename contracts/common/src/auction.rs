//! Auction Engine
//!
//! Resolution of unhealthy loans. A first bid at or above the liquidation
//! price moves the loan to `Auction` and starts two timers:
//!
//! - until `start + redeem_duration` the debt owner may redeem, repaying
//!   part of the debt plus a fine that goes to the bidder;
//! - until `start + auction_duration` anyone may outbid;
//! - after the auction window the highest bid settles the loan.
//!
//! Loans nobody bids on, or whose bid no longer covers the venue floor,
//! can be sold straight into an external `NftVenue`.

use alloc::collections::BTreeMap;

use crate::collateral::NftConfig;
use crate::constants::precision::PERCENTAGE_FACTOR;
use crate::errors::{LendError, LendResult};
use crate::events::LendEvent;
use crate::health::{snapshot, HealthSnapshot};
use crate::loan::Loan;
use crate::math::{from_base_value, percent_mul, safe_add, safe_sub, to_base_value, Rounding};
use crate::oracle::PriceOracle;
use crate::store::{Effects, LendingStore};
use crate::types::{Address, AssetId, Bid, CollectionId, LoanId, LoanState, NftKey};

// ============================================================================
// Pricing
// ============================================================================

/// Fine owed to the bidder if the loan is redeemed
///
/// `max(debt * redeem_fine, min_bid_fine)`, with the floor converted from
/// base units into reserve units. Both legs round down.
pub fn calculate_bid_fine(debt: u128, config: &NftConfig, reserve_price: u128, decimals: u8) -> LendResult<u128> {
    let scaled_fine = percent_mul(debt, config.params.redeem_fine_bps, Rounding::Down)?;
    let floor = from_base_value(config.params.min_bid_fine, reserve_price, decimals, Rounding::Down)?;
    Ok(scaled_fine.max(floor))
}

/// Lowest acceptable first bid
///
/// `max(debt, collateral * threshold * (1 - bonus))` in reserve units.
pub fn liquidation_price(snap: &HealthSnapshot, config: &NftConfig) -> LendResult<u128> {
    let weighted = percent_mul(
        snap.collateral_in_reserve,
        config.params.liquidation_threshold_bps,
        Rounding::Down,
    )?;
    let discounted = percent_mul(
        weighted,
        PERCENTAGE_FACTOR - config.params.liquidation_bonus_bps,
        Rounding::Down,
    )?;
    Ok(discounted.max(snap.debt))
}

/// Floor for a venue sale: collateral minus the liquidation bonus
pub fn venue_min_out(snap: &HealthSnapshot, config: &NftConfig) -> LendResult<u128> {
    percent_mul(
        snap.collateral_in_reserve,
        PERCENTAGE_FACTOR - config.params.liquidation_bonus_bps,
        Rounding::Down,
    )
}

fn bid_deadline(bid: &Bid, duration: u64) -> LendResult<u64> {
    bid.bid_start_timestamp.checked_add(duration).ok_or(LendError::Overflow)
}

fn loan_snapshot<O: PriceOracle + ?Sized>(
    store: &LendingStore,
    oracle: &O,
    loan: &Loan,
    now: u64,
) -> LendResult<(NftConfig, HealthSnapshot)> {
    let config = store.collateral.config(&loan.nft.collection, loan.nft.token_id)?;
    let reserve = store.reserves.reserve(&loan.reserve_asset)?;
    let snap = snapshot(
        oracle,
        reserve,
        &config,
        &loan.nft,
        loan.scaled_amount,
        now,
        store.config.max_price_age,
    )?;
    Ok((config, snap))
}

fn current_bid(loan: &Loan) -> LendResult<&Bid> {
    loan.bid.as_ref().ok_or(LendError::InvalidLoanState {
        loan_id: loan.id,
        expected: LoanState::Auction,
        actual: loan.state,
    })
}

// ============================================================================
// External venue
// ============================================================================

/// External liquidity venue for collateral sales
pub trait NftVenue {
    /// Sell `nft` for `asset`, returning the proceeds; must return at least `min_out`
    fn sell(&mut self, nft: &NftKey, asset: &AssetId, min_out: u128) -> LendResult<u128>;

    /// Account that takes the collateral and pays the proceeds
    fn account(&self) -> Address;
}

/// Venue quoting a fixed price per collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPriceVenue {
    account: Address,
    quotes: BTreeMap<(CollectionId, AssetId), u128>,
    pub available: bool,
}

impl FixedPriceVenue {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            quotes: BTreeMap::new(),
            available: true,
        }
    }

    pub fn set_quote(&mut self, collection: CollectionId, asset: AssetId, price: u128) {
        self.quotes.insert((collection, asset), price);
    }
}

impl NftVenue for FixedPriceVenue {
    fn sell(&mut self, nft: &NftKey, asset: &AssetId, min_out: u128) -> LendResult<u128> {
        if !self.available {
            return Err(LendError::VenueUnavailable { reason: "venue offline" });
        }
        let quote = self
            .quotes
            .get(&(nft.collection, *asset))
            .copied()
            .ok_or(LendError::VenueUnavailable { reason: "no market for collection" })?;
        if quote < min_out {
            return Err(LendError::PriceBelowMinimum { price: quote, min_price: min_out });
        }
        Ok(quote)
    }

    fn account(&self) -> Address {
        self.account
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Result of a settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub loan_id: LoanId,
    /// Applied to the debt
    pub repay_amount: u128,
    /// Surplus paid to the debt owner
    pub remain_amount: u128,
    /// Debt written off
    pub loss_amount: u128,
    pub state: LoanState,
}

/// Place a bid on an unhealthy loan, or outbid the current bidder
///
/// The caller pays; `on_behalf_of` receives the collateral if the bid wins.
#[allow(clippy::too_many_arguments)]
pub fn auction<O: PriceOracle + ?Sized>(
    store: &mut LendingStore,
    oracle: &O,
    caller: &Address,
    nft: &NftKey,
    bid_price: u128,
    on_behalf_of: &Address,
    now: u64,
    fx: &mut Effects,
) -> LendResult<()> {
    if bid_price == 0 {
        return Err(LendError::ZeroAmount);
    }

    let loan = store.loans.require_open(nft)?.clone();
    store.reserves.accrue(&loan.reserve_asset, now)?;
    let (config, snap) = loan_snapshot(store, oracle, &loan, now)?;
    let reserve = store.reserves.reserve(&loan.reserve_asset)?;
    let pool = store.pool_account();

    let (start, bid_fine) = match loan.state {
        LoanState::Active => {
            // 1. First bid needs an unhealthy loan and a fair price
            if !snap.is_liquidatable() {
                return Err(LendError::NotLiquidatable {
                    loan_id: loan.id,
                    health_factor: snap.health_factor,
                });
            }
            let required = liquidation_price(&snap, &config)?;
            if bid_price < required {
                return Err(LendError::BidTooLow { bid: bid_price, required });
            }
            let fine = calculate_bid_fine(snap.debt, &config, snap.reserve_price, reserve.decimals)?;
            (now, fine)
        }
        LoanState::Auction => {
            // 2. Outbids must land inside the auction window
            let prev = current_bid(&loan)?;
            let deadline = bid_deadline(prev, config.params.auction_duration)?;
            if now > deadline {
                return Err(LendError::WindowClosed { window: "auction", deadline, now });
            }

            let step = percent_mul(prev.bid_price, store.config.min_bid_increment_bps, Rounding::Up)?.max(1);
            let required = safe_add(prev.bid_price, step)?.max(snap.debt);
            if bid_price < required {
                return Err(LendError::BidTooLow { bid: bid_price, required });
            }

            // 3. Prior bidder gets the full lock back in this commit
            fx.token(loan.reserve_asset, pool, prev.payer, prev.bid_price);
            // Window anchor and fine stay fixed at the first bid
            (prev.bid_start_timestamp, prev.bid_fine)
        }
        actual => {
            return Err(LendError::InvalidLoanState {
                loan_id: loan.id,
                expected: LoanState::Active,
                actual,
            })
        }
    };

    {
        let entry = store.loans.open_loan_mut(nft)?;
        entry.state = LoanState::Auction;
        entry.bid = Some(Bid {
            bidder: *on_behalf_of,
            payer: *caller,
            bid_price,
            bid_borrow_amount: snap.debt,
            bid_fine,
            bid_start_timestamp: start,
        });
        entry.updated_at = now;
    }

    fx.token(loan.reserve_asset, *caller, pool, bid_price);
    fx.emit(LendEvent::Auction {
        asset: loan.reserve_asset,
        user: *caller,
        bid_price,
        on_behalf_of: *on_behalf_of,
        nft: loan.nft,
        borrower: loan.borrower,
        loan_id: loan.id,
        timestamp: now,
    });
    fx.emit(store.reserve_data_event(&loan.reserve_asset, now)?);

    log::debug!("loan {} bid {} (start {})", loan.id, bid_price, start);
    Ok(())
}

/// Result of a redeem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemOutcome {
    pub repaid: u128,
    pub fine: u128,
    pub closed: bool,
}

/// Reclaim a loan from auction inside the redeem window
///
/// `max_fine` is the largest fine the caller accepts; the fine recorded at
/// the first bid is charged. The bidder receives the locked bid back plus
/// that fine.
#[allow(clippy::too_many_arguments)]
pub fn redeem<O: PriceOracle + ?Sized>(
    store: &mut LendingStore,
    oracle: &O,
    caller: &Address,
    nft: &NftKey,
    amount: u128,
    max_fine: u128,
    now: u64,
    fx: &mut Effects,
) -> LendResult<RedeemOutcome> {
    if amount == 0 {
        return Err(LendError::ZeroAmount);
    }

    // 1. Loan must be under auction
    let loan = store.loans.require_open(nft)?.clone();
    loan.expect_state(LoanState::Auction)?;
    let bid = current_bid(&loan)?.clone();

    // 2. Redeem window
    let config = store.collateral.config(&loan.nft.collection, loan.nft.token_id)?;
    let deadline = bid_deadline(&bid, config.params.redeem_duration)?;
    if now > deadline {
        return Err(LendError::WindowClosed { window: "redeem", deadline, now });
    }

    // 3. Fine
    store.reserves.accrue(&loan.reserve_asset, now)?;
    let (config, snap) = loan_snapshot(store, oracle, &loan, now)?;
    let decimals = store.reserves.reserve(&loan.reserve_asset)?.decimals;
    let fine = bid.bid_fine;
    if max_fine < fine {
        return Err(LendError::BidFineTooLow { paid: max_fine, required: fine });
    }

    // 4. Repay amount: capped share unless it clears the debt
    let debt = snap.debt;
    let mut pay = amount.min(debt);
    if safe_sub(debt, pay)? <= store.config.debt_dust {
        pay = debt;
    }
    if pay < debt {
        let max_pay = percent_mul(debt, store.config.max_redeem_bps, Rounding::Down)?;
        if pay > max_pay {
            return Err(LendError::InvalidAmount {
                amount: pay,
                reason: "redeem above max share of debt",
            });
        }
        let remaining_value = to_base_value(debt - pay, snap.reserve_price, decimals, Rounding::Up)?;
        let limit = percent_mul(snap.collateral_value, config.params.redeem_threshold_bps, Rounding::Down)?;
        if remaining_value >= limit {
            return Err(LendError::RedeemInsufficient {
                remaining_debt: remaining_value,
                limit,
            });
        }
    }

    let repayment = store.reserves.repay(&loan.reserve_asset, loan.scaled_amount, pay)?;
    let closed = repayment.scaled_remaining == 0;

    // 5. Value movement
    let pool = store.pool_account();
    fx.token(loan.reserve_asset, *caller, pool, safe_add(repayment.paid, fine)?);
    fx.token(loan.reserve_asset, pool, bid.payer, bid.bid_price);
    fx.token(loan.reserve_asset, pool, bid.bidder, fine);

    if closed {
        store.loans.close(loan.id, LoanState::Repaid, now)?;
        fx.nft(loan.nft, pool, loan.borrower);
        fx.burn_wrapped(loan.wrapped);
    } else {
        let entry = store.loans.open_loan_mut(nft)?;
        entry.state = LoanState::Active;
        entry.bid = None;
        entry.scaled_amount = repayment.scaled_remaining;
        entry.updated_at = now;
    }

    fx.emit(LendEvent::Redeem {
        asset: loan.reserve_asset,
        user: *caller,
        repay_amount: repayment.paid,
        fine_amount: fine,
        nft: loan.nft,
        borrower: loan.borrower,
        loan_id: loan.id,
        timestamp: now,
    });
    fx.emit(store.reserve_data_event(&loan.reserve_asset, now)?);

    Ok(RedeemOutcome {
        repaid: repayment.paid,
        fine,
        closed,
    })
}

/// Settle an auction after its window closed
///
/// The escrowed bid pays down the debt; anything short is written off and
/// anything over goes to the debt owner. `min_price` guards the caller
/// against a settlement below what they expect.
pub fn liquidate(
    store: &mut LendingStore,
    caller: &Address,
    nft: &NftKey,
    min_price: u128,
    now: u64,
    fx: &mut Effects,
) -> LendResult<Settlement> {
    let loan = store.loans.require_open(nft)?.clone();
    loan.expect_state(LoanState::Auction)?;
    let bid = current_bid(&loan)?.clone();

    let config = store.collateral.config(&loan.nft.collection, loan.nft.token_id)?;
    let end = bid_deadline(&bid, config.params.auction_duration)?;
    if now <= end {
        return Err(LendError::WindowNotOpen {
            window: "liquidate",
            opens_at: end + 1,
            now,
        });
    }
    if bid.bid_price < min_price {
        return Err(LendError::PriceBelowMinimum {
            price: bid.bid_price,
            min_price,
        });
    }

    store.reserves.accrue(&loan.reserve_asset, now)?;
    let settlement = settle(store, &loan, bid.bid_price, Some(bid.bidder), now, fx)?;

    fx.emit(LendEvent::Liquidate {
        asset: loan.reserve_asset,
        user: *caller,
        repay_amount: settlement.repay_amount,
        remain_amount: settlement.remain_amount,
        loss_amount: settlement.loss_amount,
        nft: loan.nft,
        borrower: loan.borrower,
        loan_id: loan.id,
        timestamp: now,
    });
    fx.emit(store.reserve_data_event(&loan.reserve_asset, now)?);
    Ok(settlement)
}

/// Sell collateral into the external venue
///
/// Eligible when an active loan is unhealthy and nobody has bid, or when
/// an expired auction's bid is below the venue floor (the bid is refunded).
pub fn liquidate_nftx<O, N>(
    store: &mut LendingStore,
    oracle: &O,
    venue: &mut N,
    caller: &Address,
    nft: &NftKey,
    now: u64,
    fx: &mut Effects,
) -> LendResult<Settlement>
where
    O: PriceOracle + ?Sized,
    N: NftVenue + ?Sized,
{
    let loan = store.loans.require_open(nft)?.clone();
    store.reserves.accrue(&loan.reserve_asset, now)?;
    let (config, snap) = loan_snapshot(store, oracle, &loan, now)?;
    let min_out = venue_min_out(&snap, &config)?;
    let pool = store.pool_account();

    // 1. Eligibility
    match loan.state {
        LoanState::Active => {
            if !snap.is_liquidatable() {
                return Err(LendError::NotLiquidatable {
                    loan_id: loan.id,
                    health_factor: snap.health_factor,
                });
            }
        }
        LoanState::Auction => {
            let bid = current_bid(&loan)?;
            let end = bid_deadline(bid, config.params.auction_duration)?;
            if now <= end {
                return Err(LendError::WindowNotOpen {
                    window: "liquidate",
                    opens_at: end + 1,
                    now,
                });
            }
            if bid.bid_price >= min_out {
                return Err(LendError::InvalidInput {
                    param: "nft",
                    reason: "auction bid covers the venue floor",
                });
            }
            fx.token(loan.reserve_asset, pool, bid.payer, bid.bid_price);
        }
        actual => {
            return Err(LendError::InvalidLoanState {
                loan_id: loan.id,
                expected: LoanState::Active,
                actual,
            })
        }
    }

    // 2. Sale
    let proceeds = venue.sell(&loan.nft, &loan.reserve_asset, min_out)?;
    if proceeds < min_out {
        return Err(LendError::PriceBelowMinimum { price: proceeds, min_price: min_out });
    }
    let venue_account = venue.account();
    fx.nft(loan.nft, pool, venue_account);
    fx.token(loan.reserve_asset, venue_account, pool, proceeds);

    // 3. Settlement
    let settlement = settle(store, &loan, proceeds, None, now, fx)?;

    fx.emit(LendEvent::LiquidateNftx {
        asset: loan.reserve_asset,
        user: *caller,
        sale_price: proceeds,
        repay_amount: settlement.repay_amount,
        remain_amount: settlement.remain_amount,
        loss_amount: settlement.loss_amount,
        nft: loan.nft,
        borrower: loan.borrower,
        loan_id: loan.id,
        timestamp: now,
    });
    fx.emit(store.reserve_data_event(&loan.reserve_asset, now)?);
    Ok(settlement)
}

/// Apply `proceeds` (already held by the pool) to a loan and close it
///
/// The reserve must be accrued to `now`.
fn settle(
    store: &mut LendingStore,
    loan: &Loan,
    proceeds: u128,
    winner: Option<Address>,
    now: u64,
    fx: &mut Effects,
) -> LendResult<Settlement> {
    let debt = store.reserves.reserve(&loan.reserve_asset)?.debt_of(loan.scaled_amount)?;
    let repay_amount = proceeds.min(debt);

    let scaled_remaining = if repay_amount > 0 {
        store
            .reserves
            .repay(&loan.reserve_asset, loan.scaled_amount, repay_amount)?
            .scaled_remaining
    } else {
        loan.scaled_amount
    };

    let loss_amount = if scaled_remaining > 0 {
        store.reserves.write_off(&loan.reserve_asset, scaled_remaining)?
    } else {
        0
    };
    let remain_amount = proceeds - repay_amount;
    let state = if loss_amount > 0 { LoanState::Defaulted } else { LoanState::Repaid };

    store.loans.close(loan.id, state, now)?;

    let pool = store.pool_account();
    fx.token(loan.reserve_asset, pool, loan.borrower, remain_amount);
    if let Some(winner) = winner {
        fx.nft(loan.nft, pool, winner);
    }
    fx.burn_wrapped(loan.wrapped);

    if loss_amount > 0 {
        log::warn!("loan {} settled with {} written off", loan.id, loss_amount);
    }

    Ok(Settlement {
        loan_id: loan.id,
        repay_amount,
        remain_amount,
        loss_amount,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collateral::NftConfigParams;
    use crate::config::PoolConfig;
    use crate::constants::precision::WAD;
    use crate::loan::{borrow, BorrowParams};
    use crate::oracle::fixed::FixedPrices;
    use crate::reserve::ReserveInit;
    use crate::store::Transfer;
    use crate::vault::NoVault;

    const WETH: AssetId = [1u8; 32];
    const PUNKS: CollectionId = [3u8; 32];
    const WPUNKS: CollectionId = [4u8; 32];

    fn supplier() -> Address {
        [0xA1; 32]
    }

    fn borrower() -> Address {
        [0xB0; 32]
    }

    fn bidder() -> Address {
        [0xC0; 32]
    }

    fn rival() -> Address {
        [0xC1; 32]
    }

    fn nft() -> NftKey {
        NftKey::new(PUNKS, 1)
    }

    fn params() -> NftConfigParams {
        NftConfigParams {
            redeem_duration: 100,
            auction_duration: 200,
            min_bid_fine: WAD / 10,
            ..Default::default()
        }
    }

    /// 10 ETH punk, 4 ETH borrowed at t=0, then the floor drops to 4.5 ETH
    fn unhealthy() -> (LendingStore, FixedPrices) {
        let mut store = LendingStore::new(PoolConfig::default()).unwrap();
        store.reserves.init_reserve(WETH, &ReserveInit::default(), 0).unwrap();
        store.reserves.deposit(&WETH, &supplier(), 100 * WAD, 0).unwrap();
        store.collateral.configure(PUNKS, None, params(), 0, 0).unwrap();
        store.wrappers.register(PUNKS, WPUNKS).unwrap();

        let mut prices = FixedPrices::default();
        prices.set_reserve(WETH, WAD, 0);
        prices.set_nft(PUNKS, 10 * WAD, 0);

        let borrow_params = BorrowParams {
            asset: WETH,
            amount: 4 * WAD,
            nft: nft(),
            on_behalf_of: borrower(),
            referral: 0,
        };
        borrow(&mut store, &prices, &mut NoVault, &borrower(), &borrow_params, 0, &mut Effects::new()).unwrap();

        // 4.5 * 0.8 / 4 = 0.9
        prices.set_nft(PUNKS, 45 * WAD / 10, 0);
        (store, prices)
    }

    #[test]
    fn test_bid_fine_floor() {
        let config = NftConfig {
            params: params(),
            active: true,
            frozen: false,
            config_timestamp: 0,
        };
        // 5% of 4 ETH = 0.2 ETH beats the 0.1 floor
        assert_eq!(calculate_bid_fine(4 * WAD, &config, WAD, 18).unwrap(), WAD / 5);
        // 5% of 1 ETH = 0.05 ETH, floor wins
        assert_eq!(calculate_bid_fine(WAD, &config, WAD, 18).unwrap(), WAD / 10);
    }

    #[test]
    fn test_first_bid_moves_loan_to_auction() {
        let (mut store, prices) = unhealthy();
        let mut fx = Effects::new();

        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut fx).unwrap();

        let loan = store.loans.open_loan(&nft()).unwrap();
        assert_eq!(loan.state, LoanState::Auction);
        let bid = loan.bid.as_ref().unwrap();
        assert_eq!(bid.bid_price, 4 * WAD);
        assert_eq!(bid.bid_start_timestamp, 0);
        assert_eq!(fx.net_flow(&WETH, &bidder()), -((4 * WAD) as i128));
    }

    #[test]
    fn test_bid_on_healthy_loan_rejected() {
        let (mut store, mut prices) = unhealthy();
        prices.set_nft(PUNKS, 10 * WAD, 0);
        let result = auction(&mut store, &prices, &bidder(), &nft(), 5 * WAD, &bidder(), 0, &mut Effects::new());
        assert!(matches!(result, Err(LendError::NotLiquidatable { .. })));
    }

    #[test]
    fn test_first_bid_below_liquidation_price_rejected() {
        let (mut store, prices) = unhealthy();
        let result = auction(&mut store, &prices, &bidder(), &nft(), 3 * WAD, &bidder(), 0, &mut Effects::new());
        assert!(matches!(result, Err(LendError::BidTooLow { .. })));
    }

    #[test]
    fn test_outbid_refunds_prior_bidder() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();

        // Needs at least +1%
        let too_low = auction(&mut store, &prices, &rival(), &nft(), 4 * WAD + 1, &rival(), 20, &mut Effects::new());
        assert!(matches!(too_low, Err(LendError::BidTooLow { .. })));

        let mut fx = Effects::new();
        let higher = 4 * WAD + 4 * WAD / 100;
        auction(&mut store, &prices, &rival(), &nft(), higher, &rival(), 20, &mut fx).unwrap();

        assert_eq!(fx.net_flow(&WETH, &bidder()), (4 * WAD) as i128);
        let bid = store.loans.open_loan(&nft()).unwrap().bid.clone().unwrap();
        assert_eq!(bid.bidder, rival());
        // Window anchor is the first bid
        assert_eq!(bid.bid_start_timestamp, 0);
    }

    #[test]
    fn test_redeem_window_boundaries() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();

        let mut late = store.clone();
        let result = redeem(&mut late, &prices, &borrower(), &nft(), 2 * WAD, WAD, 100 + 1, &mut Effects::new());
        assert!(matches!(result, Err(LendError::WindowClosed { window: "redeem", .. })));

        let mut fx = Effects::new();
        let outcome = redeem(&mut store, &prices, &borrower(), &nft(), 2 * WAD, WAD, 100 - 1, &mut fx).unwrap();
        assert!(!outcome.closed);

        let loan = store.loans.open_loan(&nft()).unwrap();
        assert_eq!(loan.state, LoanState::Active);
        assert!(loan.bid.is_none());
        // Bidder gets the lock back plus the fine
        assert_eq!(fx.net_flow(&WETH, &bidder()), (4 * WAD + outcome.fine) as i128);
    }

    #[test]
    fn test_redeem_charges_fine_recorded_at_first_bid() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();
        let recorded = store.loans.open_loan(&nft()).unwrap().bid.clone().unwrap().bid_fine;

        // Outbid later, after interest has grown the debt
        let higher = 4 * WAD + 4 * WAD / 50;
        auction(&mut store, &prices, &rival(), &nft(), higher, &rival(), 60, &mut Effects::new()).unwrap();
        let bid = store.loans.open_loan(&nft()).unwrap().bid.clone().unwrap();
        assert_eq!(bid.bid_fine, recorded);
        assert!(bid.bid_borrow_amount >= 4 * WAD);

        let mut fx = Effects::new();
        let outcome = redeem(&mut store, &prices, &borrower(), &nft(), 2 * WAD, recorded, 99, &mut fx).unwrap();
        assert_eq!(outcome.fine, recorded);
        assert_eq!(fx.net_flow(&WETH, &rival()), (higher + recorded) as i128);
    }

    #[test]
    fn test_redeem_requires_enough_repayment() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();

        // 3.9 left vs 4.5 * 0.5 = 2.25 limit
        let result = redeem(&mut store, &prices, &borrower(), &nft(), WAD / 10, WAD, 20, &mut Effects::new());
        assert!(matches!(result, Err(LendError::RedeemInsufficient { .. })));
    }

    #[test]
    fn test_redeem_fine_guard() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();

        let result = redeem(&mut store, &prices, &borrower(), &nft(), 2 * WAD, 1, 20, &mut Effects::new());
        assert!(matches!(result, Err(LendError::BidFineTooLow { .. })));
    }

    #[test]
    fn test_full_redeem_closes_loan() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();

        let mut fx = Effects::new();
        let outcome = redeem(&mut store, &prices, &borrower(), &nft(), u128::MAX, WAD, 20, &mut fx).unwrap();
        assert!(outcome.closed);
        assert_eq!(store.loans.get(1).unwrap().state, LoanState::Repaid);
        assert!(fx.transfers.contains(&Transfer::Nft {
            nft: nft(),
            from: store.pool_account(),
            to: borrower(),
        }));
    }

    #[test]
    fn test_liquidate_only_after_auction_window() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();

        let early = liquidate(&mut store, &bidder(), &nft(), 0, 200, &mut Effects::new());
        assert!(matches!(early, Err(LendError::WindowNotOpen { .. })));

        let mut fx = Effects::new();
        let settlement = liquidate(&mut store, &bidder(), &nft(), 0, 201, &mut fx).unwrap();
        assert!(fx.transfers.contains(&Transfer::Nft {
            nft: nft(),
            from: store.pool_account(),
            to: bidder(),
        }));
        assert!(fx.transfers.contains(&Transfer::BurnWrapped { nft: NftKey::new(WPUNKS, 1) }));
        assert!(store.loans.open_loan(&nft()).is_none());

        // Debt grew during the auction, so the 4 ETH bid falls short
        assert_eq!(settlement.state, LoanState::Defaulted);
        assert!(settlement.loss_amount > 0);
        assert_eq!(settlement.repay_amount, 4 * WAD);
        assert_eq!(store.reserves.reserve(&WETH).unwrap().total_scaled_variable_debt, 0);
    }

    #[test]
    fn test_liquidate_surplus_goes_to_debt_owner() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 5 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();

        let mut fx = Effects::new();
        let settlement = liquidate(&mut store, &bidder(), &nft(), 5 * WAD, 300, &mut fx).unwrap();
        assert_eq!(settlement.state, LoanState::Repaid);
        assert_eq!(settlement.loss_amount, 0);
        assert_eq!(settlement.repay_amount + settlement.remain_amount, 5 * WAD);
        assert_eq!(fx.net_flow(&WETH, &borrower()), settlement.remain_amount as i128);
    }

    #[test]
    fn test_liquidate_min_price_guard() {
        let (mut store, prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();
        let result = liquidate(&mut store, &bidder(), &nft(), 5 * WAD, 300, &mut Effects::new());
        assert!(matches!(result, Err(LendError::PriceBelowMinimum { .. })));
    }

    #[test]
    fn test_liquidate_nftx_without_bids() {
        let (mut store, prices) = unhealthy();
        let mut venue = FixedPriceVenue::new([0xFE; 32]);
        venue.set_quote(PUNKS, WETH, 45 * WAD / 10);

        let mut fx = Effects::new();
        let settlement = liquidate_nftx(&mut store, &prices, &mut venue, &bidder(), &nft(), 10, &mut fx).unwrap();

        assert_eq!(settlement.state, LoanState::Repaid);
        assert_eq!(settlement.repay_amount + settlement.remain_amount, 45 * WAD / 10);
        assert!(fx.transfers.contains(&Transfer::Nft {
            nft: nft(),
            from: store.pool_account(),
            to: [0xFE; 32],
        }));
    }

    #[test]
    fn test_liquidate_nftx_venue_below_floor() {
        let (mut store, prices) = unhealthy();
        let mut venue = FixedPriceVenue::new([0xFE; 32]);
        // floor = 4.5 * 0.95
        venue.set_quote(PUNKS, WETH, 4 * WAD);
        let result = liquidate_nftx(&mut store, &prices, &mut venue, &bidder(), &nft(), 10, &mut Effects::new());
        assert!(matches!(result, Err(LendError::PriceBelowMinimum { .. })));
    }

    #[test]
    fn test_liquidate_nftx_refunds_stale_bid() {
        let (mut store, mut prices) = unhealthy();
        auction(&mut store, &prices, &bidder(), &nft(), 4 * WAD, &bidder(), 0, &mut Effects::new()).unwrap();

        // Collateral recovers; the 4 ETH bid no longer covers 6 * 0.95
        prices.set_nft(PUNKS, 6 * WAD, 300);
        prices.set_reserve(WETH, WAD, 300);
        let mut venue = FixedPriceVenue::new([0xFE; 32]);
        venue.set_quote(PUNKS, WETH, 6 * WAD);

        let mut fx = Effects::new();
        liquidate_nftx(&mut store, &prices, &mut venue, &rival(), &nft(), 300, &mut fx).unwrap();
        assert_eq!(fx.net_flow(&WETH, &bidder()), (4 * WAD) as i128);
    }
}
