//! Debt Market
//!
//! Secondary market for loan debt ownership. A sale only rewrites the
//! loan's `borrower` (and hands over the wrapped collateral token); the
//! scaled debt, the collateral and every health property stay as they are.
//!
//! Listings are either fixed price (first buyer wins) or an ascending
//! auction settled by `claim_debt` after `auction_end`.

use alloc::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{LendError, LendResult};
use crate::events::LendEvent;
use crate::math::{percent_mul, safe_add, Rounding};
use crate::store::{Effects, LendingStore};
use crate::types::{Address, AssetId, ListingId, ListingState, LoanId, LoanState, NftKey, SellType};

// ============ Types ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DebtListing {
    pub id: ListingId,
    pub nft: NftKey,
    pub loan_id: LoanId,
    pub sell_type: SellType,
    pub seller: Address,
    /// Fixed price, or the starting bid of an auction
    pub price: u128,
    /// Zero for fixed-price listings
    pub auction_end: u64,
    pub current_bidder: Option<Address>,
    pub current_bid: u128,
    pub state: ListingState,
    pub created_at: u64,
}

/// Listings by id, with one active listing per collateral item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DebtMarket {
    listings: BTreeMap<ListingId, DebtListing>,
    active: BTreeMap<NftKey, ListingId>,
    nonce: u64,
}

impl DebtMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listing(&self, listing_id: &ListingId) -> Option<&DebtListing> {
        self.listings.get(listing_id)
    }

    /// Active listing on a collateral item
    pub fn active_listing(&self, nft: &NftKey) -> Option<&DebtListing> {
        self.active.get(nft).and_then(|id| self.listings.get(id))
    }

    fn require_active(&self, nft: &NftKey) -> LendResult<DebtListing> {
        self.active_listing(nft)
            .cloned()
            .ok_or(LendError::ListingNotFound {
                collection: nft.collection,
                token_id: nft.token_id,
            })
    }

    fn finish(&mut self, listing: &DebtListing, state: ListingState) {
        let mut listing = listing.clone();
        listing.state = state;
        self.active.remove(&listing.nft);
        self.update(listing);
    }

    fn update(&mut self, listing: DebtListing) {
        self.listings.insert(listing.id, listing);
    }
}

/// Deterministic listing id
pub fn generate_listing_id(nft: &NftKey, loan_id: LoanId, nonce: u64) -> ListingId {
    let mut hasher = Sha256::new();
    hasher.update(nft.collection);
    hasher.update(nft.token_id.to_le_bytes());
    hasher.update(loan_id.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

/// Whether the loan behind a listing still matches what was listed
fn is_stale(store: &LendingStore, listing: &DebtListing) -> bool {
    match store.loans.open_loan(&listing.nft) {
        Some(loan) => {
            loan.id != listing.loan_id || loan.state != LoanState::Active || loan.borrower != listing.seller
        }
        None => true,
    }
}

// ============ Operations ============

/// List the caller's debt position for sale
#[allow(clippy::too_many_arguments)]
pub fn create_listing(
    store: &mut LendingStore,
    caller: &Address,
    nft: &NftKey,
    sell_type: SellType,
    price: u128,
    auction_end: u64,
    now: u64,
    fx: &mut Effects,
) -> LendResult<ListingId> {
    // 1. Caller owns an active loan on the item
    let loan = store.loans.require_open(nft)?;
    if loan.borrower != *caller {
        return Err(LendError::NotOwner { caller: *caller, what: "loan debt" });
    }
    loan.expect_state(LoanState::Active)?;
    let loan_id = loan.id;

    // 2. One active listing per item
    if let Some(existing) = store.debt_market.active_listing(nft) {
        return Err(LendError::ListingAlreadyExists { listing_id: existing.id });
    }

    // 3. Price and timing
    if price == 0 {
        return Err(LendError::ZeroAmount);
    }
    let auction_end = match sell_type {
        SellType::FixedPrice => 0,
        SellType::Auction => {
            if auction_end <= now {
                return Err(LendError::InvalidInput {
                    param: "auction_end",
                    reason: "must be in the future",
                });
            }
            if auction_end - now > store.config.debt_market_max_auction {
                return Err(LendError::InvalidInput {
                    param: "auction_end",
                    reason: "auction too long",
                });
            }
            auction_end
        }
    };

    let market = &mut store.debt_market;
    let id = generate_listing_id(nft, loan_id, market.nonce);
    market.nonce = market.nonce.checked_add(1).ok_or(LendError::Overflow)?;
    market.update(DebtListing {
        id,
        nft: *nft,
        loan_id,
        sell_type,
        seller: *caller,
        price,
        auction_end,
        current_bidder: None,
        current_bid: 0,
        state: ListingState::Active,
        created_at: now,
    });
    market.active.insert(*nft, id);

    fx.emit(LendEvent::DebtListingCreated {
        listing_id: id,
        nft: *nft,
        seller: *caller,
        sell_type,
        price,
        auction_end,
        timestamp: now,
    });
    Ok(id)
}

/// Buy a fixed-price listing
pub fn buy_debt(
    store: &mut LendingStore,
    caller: &Address,
    nft: &NftKey,
    now: u64,
    fx: &mut Effects,
) -> LendResult<()> {
    let listing = store.debt_market.require_active(nft)?;
    if listing.sell_type != SellType::FixedPrice {
        return Err(LendError::InvalidListing {
            listing_id: listing.id,
            reason: "not a fixed-price listing",
        });
    }
    if listing.seller == *caller {
        return Err(LendError::InvalidListing {
            listing_id: listing.id,
            reason: "seller cannot buy own listing",
        });
    }
    if is_stale(store, &listing) {
        return Err(LendError::ListingStale { listing_id: listing.id });
    }

    let asset = transfer_debt(store, &listing, caller)?;
    store.debt_market.finish(&listing, ListingState::Sold);

    fx.token(asset, *caller, listing.seller, listing.price);
    fx.nft(wrapped_of(store, &listing)?, listing.seller, *caller);
    fx.emit(LendEvent::DebtSold {
        listing_id: listing.id,
        nft: listing.nft,
        seller: listing.seller,
        buyer: *caller,
        price: listing.price,
        timestamp: now,
    });
    Ok(())
}

/// Bid on an auction listing; funds are escrowed by the pool
pub fn bid_debt(
    store: &mut LendingStore,
    caller: &Address,
    nft: &NftKey,
    amount: u128,
    now: u64,
    fx: &mut Effects,
) -> LendResult<()> {
    let mut listing = store.debt_market.require_active(nft)?;
    if listing.sell_type != SellType::Auction {
        return Err(LendError::InvalidListing {
            listing_id: listing.id,
            reason: "not an auction listing",
        });
    }
    if listing.seller == *caller {
        return Err(LendError::InvalidListing {
            listing_id: listing.id,
            reason: "seller cannot bid",
        });
    }
    if now >= listing.auction_end {
        return Err(LendError::WindowClosed {
            window: "debt auction",
            deadline: listing.auction_end,
            now,
        });
    }
    if is_stale(store, &listing) {
        return Err(LendError::ListingStale { listing_id: listing.id });
    }

    let required = match listing.current_bidder {
        None => listing.price,
        Some(_) => {
            let step = percent_mul(
                listing.current_bid,
                store.config.debt_market_min_increment_bps,
                Rounding::Up,
            )?
            .max(1);
            safe_add(listing.current_bid, step)?
        }
    };
    if amount < required {
        return Err(LendError::BidTooLow { bid: amount, required });
    }

    let asset = loan_asset(store, &listing)?;
    let pool = store.pool_account();
    if let Some(prev) = listing.current_bidder {
        fx.token(asset, pool, prev, listing.current_bid);
    }
    fx.token(asset, *caller, pool, amount);

    listing.current_bidder = Some(*caller);
    listing.current_bid = amount;
    let listing_id = listing.id;
    store.debt_market.update(listing);

    fx.emit(LendEvent::DebtBid {
        listing_id,
        nft: *nft,
        bidder: *caller,
        amount,
        timestamp: now,
    });
    Ok(())
}

/// Settle an auction listing after it ends; callable by anyone
pub fn claim_debt(
    store: &mut LendingStore,
    nft: &NftKey,
    now: u64,
    fx: &mut Effects,
) -> LendResult<Address> {
    let listing = store.debt_market.require_active(nft)?;
    if listing.sell_type != SellType::Auction {
        return Err(LendError::InvalidListing {
            listing_id: listing.id,
            reason: "not an auction listing",
        });
    }
    if now < listing.auction_end {
        return Err(LendError::WindowNotOpen {
            window: "debt claim",
            opens_at: listing.auction_end,
            now,
        });
    }
    let buyer = listing
        .current_bidder
        .ok_or(LendError::NoBids { listing_id: listing.id })?;
    if is_stale(store, &listing) {
        return Err(LendError::ListingStale { listing_id: listing.id });
    }

    let asset = transfer_debt(store, &listing, &buyer)?;
    store.debt_market.finish(&listing, ListingState::Sold);

    let pool = store.pool_account();
    fx.token(asset, pool, listing.seller, listing.current_bid);
    fx.nft(wrapped_of(store, &listing)?, listing.seller, buyer);
    fx.emit(LendEvent::DebtClaimed {
        listing_id: listing.id,
        nft: listing.nft,
        seller: listing.seller,
        buyer,
        price: listing.current_bid,
        timestamp: now,
    });
    Ok(buyer)
}

/// Withdraw a listing and refund any escrowed bid
///
/// The seller may cancel at any time; anyone may cancel a stale listing.
pub fn cancel_listing(
    store: &mut LendingStore,
    caller: &Address,
    nft: &NftKey,
    now: u64,
    fx: &mut Effects,
) -> LendResult<u128> {
    let listing = store.debt_market.require_active(nft)?;
    if listing.seller != *caller && !is_stale(store, &listing) {
        return Err(LendError::NotOwner { caller: *caller, what: "debt listing" });
    }

    let refunded = match listing.current_bidder {
        Some(bidder) => {
            let asset = loan_asset(store, &listing)?;
            fx.token(asset, store.pool_account(), bidder, listing.current_bid);
            listing.current_bid
        }
        None => 0,
    };
    store.debt_market.finish(&listing, ListingState::Cancelled);

    fx.emit(LendEvent::DebtListingCancelled {
        listing_id: listing.id,
        nft: listing.nft,
        refunded,
        timestamp: now,
    });
    Ok(refunded)
}

fn loan_asset(store: &LendingStore, listing: &DebtListing) -> LendResult<AssetId> {
    store
        .loans
        .get(listing.loan_id)
        .map(|loan| loan.reserve_asset)
        .ok_or(LendError::ListingStale { listing_id: listing.id })
}

fn wrapped_of(store: &LendingStore, listing: &DebtListing) -> LendResult<NftKey> {
    store
        .loans
        .get(listing.loan_id)
        .map(|loan| loan.wrapped)
        .ok_or(LendError::ListingStale { listing_id: listing.id })
}

/// Rewrite the debt owner; returns the loan's reserve asset
fn transfer_debt(store: &mut LendingStore, listing: &DebtListing, buyer: &Address) -> LendResult<AssetId> {
    let loan = store.loans.open_loan_mut(&listing.nft)?;
    loan.borrower = *buyer;
    Ok(loan.reserve_asset)
}
