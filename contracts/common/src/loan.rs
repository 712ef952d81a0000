//! Loan Lifecycle
//!
//! A loan binds one collateral item to scaled debt in one reserve.
//!
//! ```text
//! Active --bid--> Auction --redeem--> Active
//!   |                |
//!   +--repay--> Repaid <--liquidate--+ (or Defaulted when debt is written off)
//! ```
//!
//! `borrower` is the debt owner: the account that receives the collateral
//! back on repayment and any auction surplus. The debt market rewrites it
//! on a sale; nothing here looks at listings.

use alloc::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::precision::WAD;
use crate::errors::{LendError, LendResult};
use crate::events::LendEvent;
use crate::health::snapshot;
use crate::math::safe_sub;
use crate::oracle::PriceOracle;
use crate::store::{Effects, LendingStore};
use crate::types::{Address, AssetId, Bid, CollectionId, LoanId, LoanState, NftKey};
use crate::vault::YieldVault;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Loan {
    pub id: LoanId,
    /// Debt owner
    pub borrower: Address,
    /// Account that opened the loan and received the funds
    pub initiator: Address,
    pub nft: NftKey,
    /// Wrapped token minted against the collateral
    pub wrapped: NftKey,
    pub reserve_asset: AssetId,
    pub scaled_amount: u128,
    pub state: LoanState,
    pub bid: Option<Bid>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Loan {
    /// Fail unless the loan is in `expected`
    pub fn expect_state(&self, expected: LoanState) -> LendResult<()> {
        if self.state != expected {
            return Err(LendError::InvalidLoanState {
                loan_id: self.id,
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}

/// Every loan ever opened plus open-loan indexes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LoanBook {
    next_loan_id: LoanId,
    loans: BTreeMap<LoanId, Loan>,
    open_by_nft: BTreeMap<NftKey, LoanId>,
    open_by_collection: BTreeMap<CollectionId, u64>,
    /// (delegator, delegatee) pairs allowed to borrow on the delegator's behalf
    delegations: BTreeSet<(Address, Address)>,
}

impl Default for LoanBook {
    fn default() -> Self {
        Self {
            next_loan_id: 1,
            loans: BTreeMap::new(),
            open_by_nft: BTreeMap::new(),
            open_by_collection: BTreeMap::new(),
            delegations: BTreeSet::new(),
        }
    }
}

impl LoanBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, loan_id: LoanId) -> Option<&Loan> {
        self.loans.get(&loan_id)
    }

    /// Open loan on a collateral item, if any
    pub fn open_loan(&self, nft: &NftKey) -> Option<&Loan> {
        self.open_by_nft.get(nft).and_then(|id| self.loans.get(id))
    }

    /// Open loan on a collateral item or `LoanNotFound`
    pub fn require_open(&self, nft: &NftKey) -> LendResult<&Loan> {
        self.open_loan(nft).ok_or(LendError::LoanNotFound {
            collection: nft.collection,
            token_id: nft.token_id,
        })
    }

    pub fn open_loan_mut(&mut self, nft: &NftKey) -> LendResult<&mut Loan> {
        let id = *self.open_by_nft.get(nft).ok_or(LendError::LoanNotFound {
            collection: nft.collection,
            token_id: nft.token_id,
        })?;
        self.loans.get_mut(&id).ok_or(LendError::LoanNotFound {
            collection: nft.collection,
            token_id: nft.token_id,
        })
    }

    /// Number of open loans against a collection
    pub fn open_count(&self, collection: &CollectionId) -> u64 {
        self.open_by_collection.get(collection).copied().unwrap_or(0)
    }

    /// Iterate all loans in id order
    pub fn loans(&self) -> impl Iterator<Item = &Loan> {
        self.loans.values()
    }

    #[allow(clippy::too_many_arguments)]
    fn open(
        &mut self,
        borrower: Address,
        initiator: Address,
        nft: NftKey,
        wrapped: NftKey,
        reserve_asset: AssetId,
        scaled_amount: u128,
        now: u64,
    ) -> LendResult<LoanId> {
        if let Some(existing) = self.open_by_nft.get(&nft) {
            return Err(LendError::LoanAlreadyExists { loan_id: *existing });
        }

        let id = self.next_loan_id;
        self.next_loan_id = id.checked_add(1).ok_or(LendError::Overflow)?;

        self.loans.insert(
            id,
            Loan {
                id,
                borrower,
                initiator,
                nft,
                wrapped,
                reserve_asset,
                scaled_amount,
                state: LoanState::Active,
                bid: None,
                created_at: now,
                updated_at: now,
            },
        );
        self.open_by_nft.insert(nft, id);
        *self.open_by_collection.entry(nft.collection).or_insert(0) += 1;
        Ok(id)
    }

    /// Move an open loan to a terminal state and release its indexes
    pub fn close(&mut self, loan_id: LoanId, state: LoanState, now: u64) -> LendResult<()> {
        let loan = self.loans.get_mut(&loan_id).ok_or(LendError::InvalidInput {
            param: "loan_id",
            reason: "unknown loan",
        })?;
        if !loan.state.is_open() || state.is_open() {
            return Err(LendError::InvalidLoanState {
                loan_id,
                expected: LoanState::Active,
                actual: loan.state,
            });
        }

        loan.state = state;
        loan.bid = None;
        loan.scaled_amount = 0;
        loan.updated_at = now;

        let nft = loan.nft;
        self.open_by_nft.remove(&nft);
        if let Some(count) = self.open_by_collection.get_mut(&nft.collection) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.open_by_collection.remove(&nft.collection);
            }
        }
        Ok(())
    }

    /// Allow or revoke `delegatee` borrowing on behalf of `delegator`
    pub fn approve_delegation(&mut self, delegator: Address, delegatee: Address, approved: bool) {
        if approved {
            self.delegations.insert((delegator, delegatee));
        } else {
            self.delegations.remove(&(delegator, delegatee));
        }
    }

    pub fn is_delegated(&self, delegator: &Address, delegatee: &Address) -> bool {
        self.delegations.contains(&(*delegator, *delegatee))
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Arguments of a borrow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowParams {
    pub asset: AssetId,
    pub amount: u128,
    pub nft: NftKey,
    pub on_behalf_of: Address,
    pub referral: u16,
}

/// Result of a repay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepayOutcome {
    pub paid: u128,
    pub closed: bool,
}

/// Open a loan against a collateral item
///
/// The collateral moves from `caller` into custody, the wrapped token is
/// minted to `on_behalf_of` and the borrowed funds go to `caller`.
pub fn borrow<O, V>(
    store: &mut LendingStore,
    oracle: &O,
    vault: &mut V,
    caller: &Address,
    params: &BorrowParams,
    now: u64,
    fx: &mut Effects,
) -> LendResult<LoanId>
where
    O: PriceOracle + ?Sized,
    V: YieldVault + ?Sized,
{
    // 1. Amount must be positive
    if params.amount == 0 {
        return Err(LendError::ZeroAmount);
    }

    // 2. Borrowing for someone else needs their delegation
    if params.on_behalf_of != *caller && !store.loans.is_delegated(&params.on_behalf_of, caller) {
        return Err(LendError::Unauthorized {
            caller: *caller,
            reason: "no credit delegation from on_behalf_of",
        });
    }

    // 3. Collateral must accept new loans
    let nft = params.nft;
    let open_on_collection = store.loans.open_count(&nft.collection);
    let config = store
        .collateral
        .ensure_borrowable(&nft.collection, nft.token_id, open_on_collection)?;
    let wrapped = store.wrappers.wrapped_key(&nft)?;

    // 4. One open loan per collateral item
    if let Some(existing) = store.loans.open_loan(&nft) {
        return Err(LendError::LoanAlreadyExists { loan_id: existing.id });
    }

    // 5. Capacity check on a fresh valuation
    store.reserves.reserve(&params.asset)?.ensure_borrowable()?;
    store.reserves.accrue(&params.asset, now)?;
    let max_age = store.config.max_price_age;
    let before = snapshot(oracle, store.reserves.reserve(&params.asset)?, &config, &nft, 0, now, max_age)?;
    if params.amount > before.available_borrows {
        return Err(LendError::CollateralCannotCover {
            requested: params.amount,
            available: before.available_borrows,
        });
    }

    // 6. Move liquidity out against new debt
    let scaled = store
        .reserves
        .borrow_against(vault, &params.asset, params.amount, now)?;

    // 7. Resulting position must be healthy
    let after = snapshot(oracle, store.reserves.reserve(&params.asset)?, &config, &nft, scaled, now, max_age)?;
    if after.health_factor < WAD {
        return Err(LendError::HealthFactorTooLow {
            health_factor: after.health_factor,
        });
    }

    let loan_id = store
        .loans
        .open(params.on_behalf_of, *caller, nft, wrapped, params.asset, scaled, now)?;

    // 8. Effects
    let pool = store.pool_account();
    fx.nft(nft, *caller, pool);
    fx.mint_wrapped(wrapped, params.on_behalf_of);
    fx.token(params.asset, pool, *caller, params.amount);

    let borrow_rate = store.reserves.reserve(&params.asset)?.current_variable_borrow_rate;
    fx.emit(LendEvent::Borrow {
        asset: params.asset,
        user: *caller,
        on_behalf_of: params.on_behalf_of,
        amount: params.amount,
        nft,
        loan_id,
        borrow_rate,
        referral: params.referral,
        timestamp: now,
    });
    fx.emit(store.reserve_data_event(&params.asset, now)?);

    log::debug!("loan {} opened: {} borrowed against token {}", loan_id, params.amount, nft.token_id);
    Ok(loan_id)
}

/// Repay debt on an active loan; `u128::MAX` repays everything
///
/// Remaining debt at or below the dust threshold is swept into the payment.
/// Closing returns the collateral to the debt owner.
pub fn repay(
    store: &mut LendingStore,
    caller: &Address,
    nft: &NftKey,
    amount: u128,
    now: u64,
    fx: &mut Effects,
) -> LendResult<RepayOutcome> {
    if amount == 0 {
        return Err(LendError::ZeroAmount);
    }

    let loan = store.loans.require_open(nft)?.clone();
    loan.expect_state(LoanState::Active)?;
    store.reserves.reserve(&loan.reserve_asset)?.ensure_active()?;

    store.reserves.accrue(&loan.reserve_asset, now)?;
    let debt = store.reserves.reserve(&loan.reserve_asset)?.debt_of(loan.scaled_amount)?;

    let mut pay = amount.min(debt);
    if safe_sub(debt, pay)? <= store.config.debt_dust {
        pay = debt;
    }

    let repayment = store.reserves.repay(&loan.reserve_asset, loan.scaled_amount, pay)?;
    let closed = repayment.scaled_remaining == 0;

    let pool = store.pool_account();
    fx.token(loan.reserve_asset, *caller, pool, repayment.paid);

    if closed {
        store.loans.close(loan.id, LoanState::Repaid, now)?;
        fx.nft(loan.nft, pool, loan.borrower);
        fx.burn_wrapped(loan.wrapped);
    } else {
        let entry = store.loans.open_loan_mut(nft)?;
        entry.scaled_amount = repayment.scaled_remaining;
        entry.updated_at = now;
    }

    fx.emit(LendEvent::Repay {
        asset: loan.reserve_asset,
        user: *caller,
        borrower: loan.borrower,
        amount: repayment.paid,
        nft: loan.nft,
        loan_id: loan.id,
        closed,
        timestamp: now,
    });
    fx.emit(store.reserve_data_event(&loan.reserve_asset, now)?);

    Ok(RepayOutcome {
        paid: repayment.paid,
        closed,
    })
}

/// Record a credit delegation
pub fn approve_delegation(
    store: &mut LendingStore,
    delegator: &Address,
    delegatee: &Address,
    approved: bool,
    now: u64,
    fx: &mut Effects,
) -> LendResult<()> {
    if delegator == delegatee {
        return Err(LendError::InvalidInput {
            param: "delegatee",
            reason: "cannot delegate to self",
        });
    }
    store.loans.approve_delegation(*delegator, *delegatee, approved);
    fx.emit(LendEvent::DelegationApproved {
        delegator: *delegator,
        delegatee: *delegatee,
        approved,
        timestamp: now,
    });
    Ok(())
}
