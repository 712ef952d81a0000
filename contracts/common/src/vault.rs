//! Yield Vault Module
//!
//! Idle reserve liquidity may be placed into an external yield vault,
//! bounded per reserve by a debt ratio. The vault is an opaque liquidity
//! source/sink: withdrawals can return less than requested and report a
//! realized loss, so the ledger never assumes synchronous full liquidity.

use alloc::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{LendError, LendResult};
use crate::math::{percent_mul, safe_add, Rounding};
use crate::reserve::Reserve;
use crate::types::AssetId;

// ============================================================================
// Types
// ============================================================================

/// Result of a vault withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VaultWithdrawal {
    /// Liquidity actually returned
    pub actual: u128,
    /// Principal lost and not coming back
    pub loss: u128,
}

/// Vault-side view of a reserve's allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VaultReport {
    /// Value the vault currently holds for the reserve
    pub total_debt: u128,
    /// Cumulative realized loss
    pub total_loss: u128,
}

/// External yield strategy
pub trait YieldVault {
    /// Place liquidity into the vault
    fn deposit(&mut self, asset: &AssetId, amount: u128) -> LendResult<()>;

    /// Request liquidity back; may return less than asked
    fn withdraw(&mut self, asset: &AssetId, amount: u128) -> LendResult<VaultWithdrawal>;

    /// Current allocation and losses
    fn report(&self, asset: &AssetId) -> VaultReport;
}

/// Movement produced by a rebalance or pull
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebalanceOutcome {
    pub invested: u128,
    pub divested: u128,
    pub loss: u128,
}

impl RebalanceOutcome {
    pub fn is_empty(&self) -> bool {
        self.invested == 0 && self.divested == 0 && self.loss == 0
    }
}

// ============================================================================
// Ledger integration
// ============================================================================

fn apply_withdrawal(reserve: &mut Reserve, withdrawal: VaultWithdrawal) -> LendResult<RebalanceOutcome> {
    let released = safe_add(withdrawal.actual, withdrawal.loss)?.min(reserve.invested_liquidity);

    reserve.invested_liquidity -= released;
    reserve.available_liquidity = safe_add(reserve.available_liquidity, withdrawal.actual)?;
    reserve.total_protocol_loss = safe_add(reserve.total_protocol_loss, withdrawal.loss)?;

    Ok(RebalanceOutcome {
        invested: 0,
        divested: withdrawal.actual,
        loss: withdrawal.loss,
    })
}

/// Pull liquidity back so `needed` is available, accepting partial returns
pub fn pull_liquidity<V: YieldVault + ?Sized>(
    reserve: &mut Reserve,
    vault: &mut V,
    needed: u128,
) -> LendResult<RebalanceOutcome> {
    if reserve.available_liquidity >= needed || reserve.invested_liquidity == 0 {
        return Ok(RebalanceOutcome::default());
    }

    let request = (needed - reserve.available_liquidity).min(reserve.invested_liquidity);
    let withdrawal = vault.withdraw(&reserve.asset, request)?;
    log::debug!(
        "vault pull: requested {} got {} loss {}",
        request,
        withdrawal.actual,
        withdrawal.loss
    );

    let outcome = apply_withdrawal(reserve, withdrawal)?;
    reserve.update_interest_rates()?;
    Ok(outcome)
}

/// Move the vault allocation toward `debt_ratio * total liquidity`
///
/// Losses the vault reports since the last sync are recognized first.
pub fn rebalance<V: YieldVault + ?Sized>(reserve: &mut Reserve, vault: &mut V) -> LendResult<RebalanceOutcome> {
    let mut outcome = RebalanceOutcome::default();

    // 1. Recognize reported impairment
    let report = vault.report(&reserve.asset);
    if report.total_debt < reserve.invested_liquidity {
        let loss = reserve.invested_liquidity - report.total_debt;
        reserve.invested_liquidity = report.total_debt;
        reserve.total_protocol_loss = safe_add(reserve.total_protocol_loss, loss)?;
        outcome.loss = loss;
    }

    // 2. Move toward target
    let target = percent_mul(reserve.total_liquidity()?, reserve.vault_debt_ratio_bps, Rounding::Down)?;

    if reserve.invested_liquidity < target {
        let amount = (target - reserve.invested_liquidity).min(reserve.available_liquidity);
        if amount > 0 {
            vault.deposit(&reserve.asset, amount)?;
            reserve.available_liquidity -= amount;
            reserve.invested_liquidity = safe_add(reserve.invested_liquidity, amount)?;
            outcome.invested = amount;
        }
    } else if reserve.invested_liquidity > target {
        let excess = reserve.invested_liquidity - target;
        let withdrawal = vault.withdraw(&reserve.asset, excess)?;
        let pulled = apply_withdrawal(reserve, withdrawal)?;
        outcome.divested = pulled.divested;
        outcome.loss = safe_add(outcome.loss, pulled.loss)?;
    }

    reserve.update_interest_rates()?;
    Ok(outcome)
}

// ============================================================================
// Implementations
// ============================================================================

/// No vault configured; rejects deposits, returns nothing on withdraw
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoVault;

impl YieldVault for NoVault {
    fn deposit(&mut self, _asset: &AssetId, _amount: u128) -> LendResult<()> {
        Err(LendError::VenueUnavailable { reason: "no yield vault configured" })
    }

    fn withdraw(&mut self, _asset: &AssetId, _amount: u128) -> LendResult<VaultWithdrawal> {
        Ok(VaultWithdrawal::default())
    }

    fn report(&self, _asset: &AssetId) -> VaultReport {
        VaultReport::default()
    }
}

/// Position held by the simulated vault
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SimulatedPosition {
    pub balance: u128,
    /// Impairment not yet realized through a withdrawal
    pub pending_loss: u128,
    pub total_loss: u128,
    /// Cap on what a single withdrawal can return
    pub liquid_limit: Option<u128>,
}

/// In-memory vault for simulations and dry runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SimulatedVault {
    pub positions: BTreeMap<AssetId, SimulatedPosition>,
}

impl SimulatedVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write down a position by `loss`
    pub fn impair(&mut self, asset: &AssetId, loss: u128) {
        let position = self.positions.entry(*asset).or_default();
        let loss = loss.min(position.balance);
        position.balance -= loss;
        position.pending_loss += loss;
    }

    /// Limit how much one withdrawal can return
    pub fn set_liquid_limit(&mut self, asset: &AssetId, limit: Option<u128>) {
        self.positions.entry(*asset).or_default().liquid_limit = limit;
    }
}

impl YieldVault for SimulatedVault {
    fn deposit(&mut self, asset: &AssetId, amount: u128) -> LendResult<()> {
        let position = self.positions.entry(*asset).or_default();
        position.balance = safe_add(position.balance, amount)?;
        Ok(())
    }

    fn withdraw(&mut self, asset: &AssetId, amount: u128) -> LendResult<VaultWithdrawal> {
        let position = self.positions.entry(*asset).or_default();

        let liquid = position.balance.min(position.liquid_limit.unwrap_or(u128::MAX));
        let actual = amount.min(liquid);
        let loss = (amount - actual).min(position.pending_loss);

        position.balance -= actual;
        position.pending_loss -= loss;
        position.total_loss = safe_add(position.total_loss, loss)?;

        Ok(VaultWithdrawal { actual, loss })
    }

    fn report(&self, asset: &AssetId) -> VaultReport {
        self.positions
            .get(asset)
            .map(|p| VaultReport {
                total_debt: p.balance,
                total_loss: p.total_loss,
            })
            .unwrap_or_default()
    }
}
