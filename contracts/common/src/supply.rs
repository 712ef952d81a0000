//! Supply operations
//!
//! Deposit and withdraw wrapped around the reserve ledger, recording the
//! value movement and events for the host to apply.

use crate::errors::LendResult;
use crate::events::LendEvent;
use crate::store::{Effects, LendingStore};
use crate::types::{Address, AssetId};
use crate::vault::YieldVault;

/// Supply `amount` of `asset` from `caller`, credited to `on_behalf_of`
#[allow(clippy::too_many_arguments)]
pub fn deposit(
    store: &mut LendingStore,
    caller: &Address,
    asset: &AssetId,
    amount: u128,
    on_behalf_of: &Address,
    referral: u16,
    now: u64,
    fx: &mut Effects,
) -> LendResult<u128> {
    let scaled = store.reserves.deposit(asset, on_behalf_of, amount, now)?;

    fx.token(*asset, *caller, store.pool_account(), amount);
    fx.emit(LendEvent::Deposit {
        asset: *asset,
        user: *caller,
        on_behalf_of: *on_behalf_of,
        amount,
        referral,
        timestamp: now,
    });
    fx.emit(store.reserve_data_event(asset, now)?);
    Ok(scaled)
}

/// Withdraw the caller's supply to `to`; `u128::MAX` withdraws everything
#[allow(clippy::too_many_arguments)]
pub fn withdraw<V: YieldVault + ?Sized>(
    store: &mut LendingStore,
    vault: &mut V,
    caller: &Address,
    asset: &AssetId,
    amount: u128,
    to: &Address,
    now: u64,
    fx: &mut Effects,
) -> LendResult<u128> {
    let (withdrawn, pulled) = store.reserves.withdraw(vault, asset, caller, amount, now)?;

    fx.token(*asset, store.pool_account(), *to, withdrawn);
    if !pulled.is_empty() {
        fx.emit(LendEvent::VaultRebalanced {
            asset: *asset,
            invested: pulled.invested,
            divested: pulled.divested,
            loss: pulled.loss,
            timestamp: now,
        });
    }
    fx.emit(LendEvent::Withdraw {
        asset: *asset,
        user: *caller,
        to: *to,
        amount: withdrawn,
        timestamp: now,
    });
    fx.emit(store.reserve_data_event(asset, now)?);
    Ok(withdrawn)
}
