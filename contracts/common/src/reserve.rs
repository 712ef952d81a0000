//! Reserve Ledger
//!
//! One interest-bearing pool per fungible asset. Suppliers hold scaled
//! balances against the liquidity index, borrowers owe scaled debt against
//! the variable-borrow index. Both indices start at one ray and only grow.
//!
//! ## Rounding
//!
//! Every rounding favors the pool: minted supply and the liquidity index
//! round down, burned supply, debt owed and the borrow index round up.

use alloc::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::limits::MAX_ASSET_DECIMALS;
use crate::constants::precision::{PERCENTAGE_FACTOR, RAY};
use crate::constants::reserve as defaults;
use crate::errors::{LendError, LendResult};
use crate::math::{linear_interest, mul_div, percent_mul, ray_div, ray_mul, safe_add, safe_sub, Rounding};
use crate::types::{Address, AssetId};
use crate::vault::{pull_liquidity, RebalanceOutcome, YieldVault};

// ============================================================================
// Interest rate model
// ============================================================================

/// Two-slope variable rate model (all values in ray)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct InterestRateStrategy {
    /// Utilization where the second slope kicks in
    pub optimal_utilization: u128,
    /// Rate at zero utilization
    pub base_rate: u128,
    /// Slope up to optimal utilization
    pub slope1: u128,
    /// Slope above optimal utilization
    pub slope2: u128,
}

impl Default for InterestRateStrategy {
    fn default() -> Self {
        Self {
            optimal_utilization: defaults::DEFAULT_OPTIMAL_UTILIZATION,
            base_rate: defaults::DEFAULT_BASE_RATE,
            slope1: defaults::DEFAULT_SLOPE1,
            slope2: defaults::DEFAULT_SLOPE2,
        }
    }
}

impl InterestRateStrategy {
    /// Validate model bounds
    pub fn validate(&self) -> LendResult<()> {
        if self.optimal_utilization == 0 || self.optimal_utilization > RAY {
            return Err(LendError::InvalidConfig {
                reason: "optimal utilization must be in (0, 1]",
            });
        }
        if self.base_rate > defaults::MAX_RATE
            || self.slope1 > defaults::MAX_RATE
            || self.slope2 > defaults::MAX_RATE
        {
            return Err(LendError::InvalidConfig {
                reason: "rate parameter too large",
            });
        }
        Ok(())
    }

    /// Variable borrow rate at a given utilization
    pub fn borrow_rate(&self, utilization: u128) -> LendResult<u128> {
        if utilization <= self.optimal_utilization {
            let slope = mul_div(self.slope1, utilization, self.optimal_utilization, Rounding::Down)?;
            return safe_add(self.base_rate, slope);
        }

        // Above optimal: base + slope1 + slope2 * excess / (1 - optimal)
        let excess = mul_div(
            utilization - self.optimal_utilization,
            RAY,
            RAY - self.optimal_utilization,
            Rounding::Down,
        )?;
        let steep = ray_mul(self.slope2, excess, Rounding::Down)?;
        safe_add(safe_add(self.base_rate, self.slope1)?, steep)
    }

    /// Returns `(liquidity_rate, variable_borrow_rate)`
    pub fn calculate_rates(
        &self,
        liquidity: u128,
        total_debt: u128,
        reserve_factor_bps: u64,
    ) -> LendResult<(u128, u128)> {
        let util = utilization(liquidity, total_debt)?;
        let borrow_rate = self.borrow_rate(util)?;

        let gross = ray_mul(borrow_rate, util, Rounding::Down)?;
        let liquidity_rate = percent_mul(
            gross,
            PERCENTAGE_FACTOR - reserve_factor_bps,
            Rounding::Down,
        )?;

        Ok((liquidity_rate, borrow_rate))
    }
}

/// Utilization in ray: `debt / (liquidity + debt)`
pub fn utilization(liquidity: u128, total_debt: u128) -> LendResult<u128> {
    if total_debt == 0 {
        return Ok(0);
    }
    let total = safe_add(liquidity, total_debt)?;
    mul_div(total_debt, RAY, total, Rounding::Down)
}

// ============================================================================
// Reserve
// ============================================================================

/// Parameters for a new reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInit {
    pub decimals: u8,
    pub reserve_factor_bps: u64,
    pub rate_strategy: InterestRateStrategy,
    pub vault_debt_ratio_bps: u64,
}

impl Default for ReserveInit {
    fn default() -> Self {
        Self {
            decimals: 18,
            reserve_factor_bps: defaults::DEFAULT_RESERVE_FACTOR_BPS,
            rate_strategy: InterestRateStrategy::default(),
            vault_debt_ratio_bps: defaults::DEFAULT_VAULT_DEBT_RATIO_BPS,
        }
    }
}

impl ReserveInit {
    fn validate(&self) -> LendResult<()> {
        if self.decimals > MAX_ASSET_DECIMALS {
            return Err(LendError::InvalidConfig { reason: "decimals too large" });
        }
        if self.reserve_factor_bps > PERCENTAGE_FACTOR {
            return Err(LendError::InvalidConfig { reason: "reserve factor above 100%" });
        }
        if self.vault_debt_ratio_bps > PERCENTAGE_FACTOR {
            return Err(LendError::InvalidConfig { reason: "vault debt ratio above 100%" });
        }
        self.rate_strategy.validate()
    }
}

/// Interest-bearing pool for one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Reserve {
    pub asset: AssetId,
    pub decimals: u8,
    /// Cumulated supplier income (ray)
    pub liquidity_index: u128,
    /// Cumulated borrower interest (ray)
    pub variable_borrow_index: u128,
    pub current_liquidity_rate: u128,
    pub current_variable_borrow_rate: u128,
    pub total_scaled_supply: u128,
    pub total_scaled_variable_debt: u128,
    /// Liquidity held by the pool
    pub available_liquidity: u128,
    /// Liquidity placed in the yield vault
    pub invested_liquidity: u128,
    /// Share of liquidity the vault may hold
    pub vault_debt_ratio_bps: u64,
    /// Written-off debt plus reported vault losses
    pub total_protocol_loss: u128,
    pub last_update_timestamp: u64,
    pub reserve_factor_bps: u64,
    pub is_active: bool,
    pub is_frozen: bool,
    pub borrowing_enabled: bool,
    pub rate_strategy: InterestRateStrategy,
}

/// Result of a single accrual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Accrual {
    /// Interest added to total debt
    pub interest: u128,
    /// Scaled supply owed to the treasury
    pub treasury_scaled: u128,
}

impl Reserve {
    fn new(asset: AssetId, init: &ReserveInit, now: u64) -> LendResult<Self> {
        let mut reserve = Self {
            asset,
            decimals: init.decimals,
            liquidity_index: RAY,
            variable_borrow_index: RAY,
            current_liquidity_rate: 0,
            current_variable_borrow_rate: 0,
            total_scaled_supply: 0,
            total_scaled_variable_debt: 0,
            available_liquidity: 0,
            invested_liquidity: 0,
            vault_debt_ratio_bps: init.vault_debt_ratio_bps,
            total_protocol_loss: 0,
            last_update_timestamp: now,
            reserve_factor_bps: init.reserve_factor_bps,
            is_active: true,
            is_frozen: false,
            borrowing_enabled: true,
            rate_strategy: init.rate_strategy,
        };
        reserve.update_interest_rates()?;
        Ok(reserve)
    }

    /// Liquidity backing supply (idle plus invested)
    pub fn total_liquidity(&self) -> LendResult<u128> {
        safe_add(self.available_liquidity, self.invested_liquidity)
    }

    /// Total variable debt at the stored index
    pub fn total_debt(&self) -> LendResult<u128> {
        ray_mul(self.total_scaled_variable_debt, self.variable_borrow_index, Rounding::Up)
    }

    /// Real debt for a scaled amount at the stored index
    pub fn debt_of(&self, scaled: u128) -> LendResult<u128> {
        ray_mul(scaled, self.variable_borrow_index, Rounding::Up)
    }

    /// Liquidity index projected to `now` without mutating
    pub fn normalized_income(&self, now: u64) -> LendResult<u128> {
        if now <= self.last_update_timestamp || self.current_liquidity_rate == 0 {
            return Ok(self.liquidity_index);
        }
        let factor = linear_interest(self.current_liquidity_rate, self.last_update_timestamp, now)?;
        ray_mul(factor, self.liquidity_index, Rounding::Down)
    }

    /// Variable borrow index projected to `now` without mutating
    pub fn normalized_variable_debt(&self, now: u64) -> LendResult<u128> {
        if now <= self.last_update_timestamp || self.total_scaled_variable_debt == 0 {
            return Ok(self.variable_borrow_index);
        }
        let factor = linear_interest(self.current_variable_borrow_rate, self.last_update_timestamp, now)?;
        ray_mul(factor, self.variable_borrow_index, Rounding::Up)
    }

    /// Grow both indices to `now` and refresh rates
    ///
    /// A second call at the same timestamp is a no-op.
    pub fn accrue(&mut self, now: u64) -> LendResult<Accrual> {
        if now < self.last_update_timestamp {
            return Err(LendError::TimeWentBackwards {
                last: self.last_update_timestamp,
                now,
            });
        }
        if now == self.last_update_timestamp {
            return Ok(Accrual::default());
        }

        let new_liquidity_index = self.normalized_income(now)?;
        let new_borrow_index = self.normalized_variable_debt(now)?;

        let prev_debt = self.total_debt()?;
        let new_debt = ray_mul(self.total_scaled_variable_debt, new_borrow_index, Rounding::Up)?;
        let interest = safe_sub(new_debt, prev_debt)?;

        let to_treasury = percent_mul(interest, self.reserve_factor_bps, Rounding::Down)?;
        let treasury_scaled = ray_div(to_treasury, new_liquidity_index, Rounding::Down)?;

        self.liquidity_index = new_liquidity_index;
        self.variable_borrow_index = new_borrow_index;
        self.total_scaled_supply = safe_add(self.total_scaled_supply, treasury_scaled)?;
        self.last_update_timestamp = now;
        self.update_interest_rates()?;

        Ok(Accrual { interest, treasury_scaled })
    }

    /// Recompute rates from current utilization
    pub fn update_interest_rates(&mut self) -> LendResult<()> {
        let (liquidity_rate, borrow_rate) = self.rate_strategy.calculate_rates(
            self.total_liquidity()?,
            self.total_debt()?,
            self.reserve_factor_bps,
        )?;
        self.current_liquidity_rate = liquidity_rate;
        self.current_variable_borrow_rate = borrow_rate;
        Ok(())
    }

    pub fn ensure_active(&self) -> LendResult<()> {
        if !self.is_active {
            return Err(LendError::ReserveInactive { asset: self.asset });
        }
        Ok(())
    }

    pub fn ensure_not_frozen(&self) -> LendResult<()> {
        if self.is_frozen {
            return Err(LendError::ReserveFrozen { asset: self.asset });
        }
        Ok(())
    }

    /// Active, not frozen, borrowing enabled
    pub fn ensure_borrowable(&self) -> LendResult<()> {
        self.ensure_active()?;
        self.ensure_not_frozen()?;
        if !self.borrowing_enabled {
            return Err(LendError::BorrowingDisabled { asset: self.asset });
        }
        Ok(())
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Outcome of a repayment against a loan's scaled debt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repayment {
    /// Amount taken from the payer
    pub paid: u128,
    /// Scaled debt removed
    pub scaled_burned: u128,
    /// Scaled debt left on the loan
    pub scaled_remaining: u128,
}

/// All reserves plus supplier balances
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ReserveLedger {
    reserves: BTreeMap<AssetId, Reserve>,
    scaled_balances: BTreeMap<AssetId, BTreeMap<Address, u128>>,
    /// Receives the reserve-factor share of interest
    pub treasury: Address,
}

impl ReserveLedger {
    /// Create an empty ledger
    pub fn new(treasury: Address) -> Self {
        Self {
            reserves: BTreeMap::new(),
            scaled_balances: BTreeMap::new(),
            treasury,
        }
    }

    /// Register a new reserve
    pub fn init_reserve(&mut self, asset: AssetId, init: &ReserveInit, now: u64) -> LendResult<()> {
        if self.reserves.contains_key(&asset) {
            return Err(LendError::ReserveAlreadyExists { asset });
        }
        init.validate()?;
        self.reserves.insert(asset, Reserve::new(asset, init, now)?);
        Ok(())
    }

    pub fn reserve(&self, asset: &AssetId) -> LendResult<&Reserve> {
        self.reserves
            .get(asset)
            .ok_or(LendError::ReserveNotFound { asset: *asset })
    }

    pub fn reserve_mut(&mut self, asset: &AssetId) -> LendResult<&mut Reserve> {
        self.reserves
            .get_mut(asset)
            .ok_or(LendError::ReserveNotFound { asset: *asset })
    }

    /// Iterate reserves in asset order
    pub fn reserves(&self) -> impl Iterator<Item = &Reserve> {
        self.reserves.values()
    }

    /// Accrue interest on a reserve and credit the treasury
    pub fn accrue(&mut self, asset: &AssetId, now: u64) -> LendResult<Accrual> {
        let accrual = self.reserve_mut(asset)?.accrue(now)?;
        if accrual.treasury_scaled > 0 {
            let treasury = self.treasury;
            self.credit(asset, &treasury, accrual.treasury_scaled)?;
        }
        Ok(accrual)
    }

    /// Supply liquidity; returns the scaled amount minted
    pub fn deposit(
        &mut self,
        asset: &AssetId,
        on_behalf_of: &Address,
        amount: u128,
        now: u64,
    ) -> LendResult<u128> {
        // 1. Amount must be positive
        if amount == 0 {
            return Err(LendError::ZeroAmount);
        }

        // 2. Reserve must accept deposits
        {
            let reserve = self.reserve(asset)?;
            reserve.ensure_active()?;
            reserve.ensure_not_frozen()?;
        }

        // 3. Accrue before touching balances
        self.accrue(asset, now)?;

        let reserve = self.reserve_mut(asset)?;
        let scaled = ray_div(amount, reserve.liquidity_index, Rounding::Down)?;
        if scaled == 0 {
            return Err(LendError::InvalidAmount {
                amount,
                reason: "rounds to zero supply",
            });
        }

        reserve.available_liquidity = safe_add(reserve.available_liquidity, amount)?;
        reserve.total_scaled_supply = safe_add(reserve.total_scaled_supply, scaled)?;
        reserve.update_interest_rates()?;

        self.credit(asset, on_behalf_of, scaled)?;
        Ok(scaled)
    }

    /// Withdraw supplied liquidity; `u128::MAX` withdraws the full balance
    ///
    /// Pulls from the yield vault when idle liquidity is short. Returns the
    /// amount withdrawn and what the vault pull did.
    pub fn withdraw<V: YieldVault + ?Sized>(
        &mut self,
        vault: &mut V,
        asset: &AssetId,
        owner: &Address,
        amount: u128,
        now: u64,
    ) -> LendResult<(u128, RebalanceOutcome)> {
        if amount == 0 {
            return Err(LendError::ZeroAmount);
        }
        self.reserve(asset)?.ensure_active()?;

        self.accrue(asset, now)?;

        let user_scaled = self.scaled_balance_of(asset, owner);
        let index = self.reserve(asset)?.liquidity_index;
        let balance = ray_mul(user_scaled, index, Rounding::Down)?;

        let amount = if amount == u128::MAX { balance } else { amount };
        if amount == 0 || amount > balance {
            return Err(LendError::InsufficientBalance {
                available: balance,
                requested: amount,
            });
        }

        let scaled_burn = if amount == balance {
            user_scaled
        } else {
            ray_div(amount, index, Rounding::Up)?.min(user_scaled)
        };

        let reserve = self.reserve_mut(asset)?;
        let pulled = pull_liquidity(reserve, vault, amount)?;
        if reserve.available_liquidity < amount {
            return Err(LendError::InsufficientLiquidity {
                available: reserve.available_liquidity,
                requested: amount,
            });
        }

        reserve.available_liquidity -= amount;
        reserve.total_scaled_supply = safe_sub(reserve.total_scaled_supply, scaled_burn)?;
        reserve.update_interest_rates()?;

        self.debit(asset, owner, scaled_burn)?;
        Ok((amount, pulled))
    }

    /// Move liquidity out against new debt; returns the scaled debt
    pub fn borrow_against<V: YieldVault + ?Sized>(
        &mut self,
        vault: &mut V,
        asset: &AssetId,
        amount: u128,
        now: u64,
    ) -> LendResult<u128> {
        if amount == 0 {
            return Err(LendError::ZeroAmount);
        }
        self.reserve(asset)?.ensure_borrowable()?;

        self.accrue(asset, now)?;

        let reserve = self.reserve_mut(asset)?;
        pull_liquidity(reserve, vault, amount)?;
        if reserve.available_liquidity < amount {
            return Err(LendError::InsufficientLiquidity {
                available: reserve.available_liquidity,
                requested: amount,
            });
        }

        let scaled = ray_div(amount, reserve.variable_borrow_index, Rounding::Up)?;
        reserve.available_liquidity -= amount;
        reserve.total_scaled_variable_debt = safe_add(reserve.total_scaled_variable_debt, scaled)?;
        reserve.update_interest_rates()?;

        Ok(scaled)
    }

    /// Repay up to `amount` of a loan's scaled debt
    ///
    /// Callers accrue first; the amount is capped at the current debt.
    pub fn repay(&mut self, asset: &AssetId, loan_scaled: u128, amount: u128) -> LendResult<Repayment> {
        if amount == 0 {
            return Err(LendError::ZeroAmount);
        }

        let reserve = self.reserve_mut(asset)?;
        let debt = reserve.debt_of(loan_scaled)?;
        let paid = amount.min(debt);

        let scaled_burned = if paid == debt {
            loan_scaled
        } else {
            ray_div(paid, reserve.variable_borrow_index, Rounding::Down)?
        };

        reserve.available_liquidity = safe_add(reserve.available_liquidity, paid)?;
        reserve.total_scaled_variable_debt =
            safe_sub(reserve.total_scaled_variable_debt, scaled_burned)?;
        reserve.update_interest_rates()?;

        Ok(Repayment {
            paid,
            scaled_burned,
            scaled_remaining: loan_scaled - scaled_burned,
        })
    }

    /// Remove unrecoverable scaled debt; returns the loss amount
    pub fn write_off(&mut self, asset: &AssetId, scaled: u128) -> LendResult<u128> {
        let reserve = self.reserve_mut(asset)?;
        let loss = reserve.debt_of(scaled)?;

        reserve.total_scaled_variable_debt = safe_sub(reserve.total_scaled_variable_debt, scaled)?;
        reserve.total_protocol_loss = safe_add(reserve.total_protocol_loss, loss)?;
        reserve.update_interest_rates()?;

        Ok(loss)
    }

    // ============ Configuration ============

    /// Set reserve flags; deactivation requires an empty reserve
    pub fn set_flags(
        &mut self,
        asset: &AssetId,
        is_active: bool,
        is_frozen: bool,
        borrowing_enabled: bool,
    ) -> LendResult<()> {
        let reserve = self.reserve_mut(asset)?;
        if !is_active && (reserve.total_scaled_supply > 0 || reserve.total_scaled_variable_debt > 0) {
            return Err(LendError::ReserveInUse { asset: *asset });
        }
        reserve.is_active = is_active;
        reserve.is_frozen = is_frozen;
        reserve.borrowing_enabled = borrowing_enabled;
        Ok(())
    }

    /// Update the reserve factor (accrues at the old factor first)
    pub fn set_reserve_factor(&mut self, asset: &AssetId, bps: u64, now: u64) -> LendResult<()> {
        if bps > PERCENTAGE_FACTOR {
            return Err(LendError::InvalidConfig { reason: "reserve factor above 100%" });
        }
        self.accrue(asset, now)?;
        let reserve = self.reserve_mut(asset)?;
        reserve.reserve_factor_bps = bps;
        reserve.update_interest_rates()
    }

    /// Swap the rate model (accrues at the old rates first)
    pub fn set_rate_strategy(
        &mut self,
        asset: &AssetId,
        strategy: InterestRateStrategy,
        now: u64,
    ) -> LendResult<()> {
        strategy.validate()?;
        self.accrue(asset, now)?;
        let reserve = self.reserve_mut(asset)?;
        reserve.rate_strategy = strategy;
        reserve.update_interest_rates()
    }

    /// Set the share of liquidity the yield vault may hold
    pub fn set_vault_debt_ratio(&mut self, asset: &AssetId, bps: u64) -> LendResult<()> {
        if bps > PERCENTAGE_FACTOR {
            return Err(LendError::InvalidConfig { reason: "vault debt ratio above 100%" });
        }
        self.reserve_mut(asset)?.vault_debt_ratio_bps = bps;
        Ok(())
    }

    // ============ Balances ============

    pub fn scaled_balance_of(&self, asset: &AssetId, account: &Address) -> u128 {
        self.scaled_balances
            .get(asset)
            .and_then(|m| m.get(account))
            .copied()
            .unwrap_or(0)
    }

    /// Real supplied balance projected to `now`
    pub fn balance_of(&self, asset: &AssetId, account: &Address, now: u64) -> LendResult<u128> {
        let index = self.reserve(asset)?.normalized_income(now)?;
        ray_mul(self.scaled_balance_of(asset, account), index, Rounding::Down)
    }

    fn credit(&mut self, asset: &AssetId, account: &Address, scaled: u128) -> LendResult<()> {
        let entry = self
            .scaled_balances
            .entry(*asset)
            .or_default()
            .entry(*account)
            .or_insert(0);
        *entry = safe_add(*entry, scaled)?;
        Ok(())
    }

    fn debit(&mut self, asset: &AssetId, account: &Address, scaled: u128) -> LendResult<()> {
        let balances = self.scaled_balances.entry(*asset).or_default();
        let current = balances.get(account).copied().unwrap_or(0);
        let remaining = safe_sub(current, scaled)?;
        if remaining == 0 {
            balances.remove(account);
        } else {
            balances.insert(*account, remaining);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::precision::WAD;
    use crate::constants::time::SECONDS_PER_YEAR;
    use crate::vault::NoVault;
    use proptest::prelude::*;

    const WETH: AssetId = [1u8; 32];

    fn treasury() -> Address {
        [9u8; 32]
    }

    fn alice() -> Address {
        [2u8; 32]
    }

    fn ledger_with_weth() -> ReserveLedger {
        let mut ledger = ReserveLedger::new(treasury());
        ledger.init_reserve(WETH, &ReserveInit::default(), 0).unwrap();
        ledger
    }

    #[test]
    fn test_init_reserve() {
        let mut ledger = ledger_with_weth();
        let reserve = ledger.reserve(&WETH).unwrap();
        assert_eq!(reserve.liquidity_index, RAY);
        assert_eq!(reserve.variable_borrow_index, RAY);
        assert!(reserve.is_active);

        let dup = ledger.init_reserve(WETH, &ReserveInit::default(), 0);
        assert!(matches!(dup, Err(LendError::ReserveAlreadyExists { .. })));
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let mut ledger = ReserveLedger::new(treasury());
        let init = ReserveInit {
            rate_strategy: InterestRateStrategy { optimal_utilization: 0, ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(
            ledger.init_reserve(WETH, &init, 0),
            Err(LendError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_two_slope_rates() {
        let strategy = InterestRateStrategy {
            optimal_utilization: RAY / 100 * 80,
            base_rate: RAY / 100,
            slope1: RAY / 100 * 4,
            slope2: RAY,
        };

        assert_eq!(strategy.borrow_rate(0).unwrap(), RAY / 100);
        // 40% util: 1% + 4% * 0.5
        assert_eq!(strategy.borrow_rate(RAY / 100 * 40).unwrap(), RAY / 100 * 3);
        // at optimal: 1% + 4%
        assert_eq!(strategy.borrow_rate(RAY / 100 * 80).unwrap(), RAY / 100 * 5);
        // 90% util: 5% + 100% * 0.5
        assert_eq!(strategy.borrow_rate(RAY / 100 * 90).unwrap(), RAY / 100 * 55);
    }

    #[test]
    fn test_utilization() {
        assert_eq!(utilization(100, 0).unwrap(), 0);
        assert_eq!(utilization(75, 25).unwrap(), RAY / 4);
        assert_eq!(utilization(0, 10).unwrap(), RAY);
    }

    #[test]
    fn test_deposit_withdraw_round_trip() {
        let mut ledger = ledger_with_weth();
        let amount = 1_000 * WAD;

        let scaled = ledger.deposit(&WETH, &alice(), amount, 10).unwrap();
        assert_eq!(scaled, amount);
        assert_eq!(ledger.balance_of(&WETH, &alice(), 10).unwrap(), amount);

        let (withdrawn, _) = ledger.withdraw(&mut NoVault, &WETH, &alice(), amount, 10).unwrap();
        assert_eq!(withdrawn, amount);
        assert_eq!(ledger.scaled_balance_of(&WETH, &alice()), 0);
        assert_eq!(ledger.reserve(&WETH).unwrap().available_liquidity, 0);
    }

    #[test]
    fn test_withdraw_more_than_balance_fails() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 100, 10).unwrap();
        let result = ledger.withdraw(&mut NoVault, &WETH, &alice(), 101, 10);
        assert!(matches!(result, Err(LendError::InsufficientBalance { .. })));
    }

    #[test]
    fn test_borrow_limited_by_liquidity() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 100, 10).unwrap();

        let result = ledger.borrow_against(&mut NoVault, &WETH, 101, 10);
        assert!(matches!(result, Err(LendError::InsufficientLiquidity { .. })));

        let scaled = ledger.borrow_against(&mut NoVault, &WETH, 40, 10).unwrap();
        assert_eq!(scaled, 40);
        assert_eq!(ledger.reserve(&WETH).unwrap().available_liquidity, 60);
    }

    #[test]
    fn test_frozen_reserve_blocks_deposit_and_borrow() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 100, 0).unwrap();
        ledger.set_flags(&WETH, true, true, true).unwrap();

        assert!(matches!(
            ledger.deposit(&WETH, &alice(), 1, 0),
            Err(LendError::ReserveFrozen { .. })
        ));
        assert!(matches!(
            ledger.borrow_against(&mut NoVault, &WETH, 1, 0),
            Err(LendError::ReserveFrozen { .. })
        ));
        // Withdrawals stay open on a frozen reserve
        assert!(ledger.withdraw(&mut NoVault, &WETH, &alice(), 100, 0).is_ok());
    }

    #[test]
    fn test_cannot_deactivate_reserve_in_use() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 100, 0).unwrap();
        assert!(matches!(
            ledger.set_flags(&WETH, false, false, false),
            Err(LendError::ReserveInUse { .. })
        ));
    }

    #[test]
    fn test_interest_accrues_to_suppliers_and_treasury() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 1_000 * WAD, 0).unwrap();
        let scaled_debt = ledger.borrow_against(&mut NoVault, &WETH, 500 * WAD, 0).unwrap();

        ledger.accrue(&WETH, SECONDS_PER_YEAR).unwrap();
        let reserve = ledger.reserve(&WETH).unwrap();

        assert!(reserve.variable_borrow_index > RAY);
        assert!(reserve.liquidity_index > RAY);
        assert!(reserve.debt_of(scaled_debt).unwrap() > 500 * WAD);
        assert!(ledger.scaled_balance_of(&WETH, &treasury()) > 0);
        assert!(ledger.balance_of(&WETH, &alice(), SECONDS_PER_YEAR).unwrap() > 1_000 * WAD);
    }

    #[test]
    fn test_accrue_same_timestamp_is_noop() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 1_000 * WAD, 0).unwrap();
        ledger.borrow_against(&mut NoVault, &WETH, 300 * WAD, 0).unwrap();

        ledger.accrue(&WETH, 5_000).unwrap();
        let before = ledger.reserve(&WETH).unwrap().clone();
        let accrual = ledger.accrue(&WETH, 5_000).unwrap();

        assert_eq!(accrual, Accrual::default());
        assert_eq!(ledger.reserve(&WETH).unwrap(), &before);
    }

    #[test]
    fn test_accrue_backwards_rejected() {
        let mut ledger = ledger_with_weth();
        ledger.accrue(&WETH, 100).unwrap();
        assert!(matches!(
            ledger.accrue(&WETH, 99),
            Err(LendError::TimeWentBackwards { .. })
        ));
    }

    #[test]
    fn test_repay_partial_and_full() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 1_000 * WAD, 0).unwrap();
        let scaled = ledger.borrow_against(&mut NoVault, &WETH, 100 * WAD, 0).unwrap();

        let partial = ledger.repay(&WETH, scaled, 40 * WAD).unwrap();
        assert_eq!(partial.paid, 40 * WAD);
        assert_eq!(partial.scaled_remaining, 60 * WAD);

        let full = ledger.repay(&WETH, partial.scaled_remaining, u128::MAX).unwrap();
        assert_eq!(full.paid, 60 * WAD);
        assert_eq!(full.scaled_remaining, 0);
        assert_eq!(ledger.reserve(&WETH).unwrap().total_scaled_variable_debt, 0);
        assert_eq!(ledger.reserve(&WETH).unwrap().available_liquidity, 1_000 * WAD);
    }

    #[test]
    fn test_write_off_records_loss() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 1_000 * WAD, 0).unwrap();
        let scaled = ledger.borrow_against(&mut NoVault, &WETH, 100 * WAD, 0).unwrap();

        let loss = ledger.write_off(&WETH, scaled).unwrap();
        let reserve = ledger.reserve(&WETH).unwrap();
        assert_eq!(loss, 100 * WAD);
        assert_eq!(reserve.total_protocol_loss, 100 * WAD);
        assert_eq!(reserve.total_scaled_variable_debt, 0);
    }

    #[test]
    fn test_normalized_views_do_not_mutate() {
        let mut ledger = ledger_with_weth();
        ledger.deposit(&WETH, &alice(), 1_000 * WAD, 0).unwrap();
        ledger.borrow_against(&mut NoVault, &WETH, 800 * WAD, 0).unwrap();

        let reserve = ledger.reserve(&WETH).unwrap();
        let projected = reserve.normalized_variable_debt(SECONDS_PER_YEAR).unwrap();
        assert!(projected > RAY);
        assert_eq!(reserve.variable_borrow_index, RAY);

        ledger.accrue(&WETH, SECONDS_PER_YEAR).unwrap();
        assert_eq!(ledger.reserve(&WETH).unwrap().variable_borrow_index, projected);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(u128),
        Borrow(u128),
        Repay(u128),
        Advance(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u128..1_000_000 * WAD).prop_map(Op::Deposit),
            (1u128..1_000_000 * WAD).prop_map(Op::Borrow),
            (1u128..1_000_000 * WAD).prop_map(Op::Repay),
            (0u64..SECONDS_PER_YEAR).prop_map(Op::Advance),
        ]
    }

    proptest! {
        #[test]
        fn prop_indices_never_decrease(ops in proptest::collection::vec(op_strategy(), 1..40)) {
            let mut ledger = ledger_with_weth();
            let mut now = 0u64;
            let mut open_scaled = 0u128;

            for op in ops {
                let before = ledger.reserve(&WETH).unwrap().clone();
                match op {
                    Op::Deposit(amount) => {
                        let _ = ledger.deposit(&WETH, &alice(), amount, now);
                    }
                    Op::Borrow(amount) => {
                        if let Ok(scaled) = ledger.borrow_against(&mut NoVault, &WETH, amount, now) {
                            open_scaled += scaled;
                        }
                    }
                    Op::Repay(amount) => {
                        if open_scaled > 0 {
                            ledger.accrue(&WETH, now).unwrap();
                            let r = ledger.repay(&WETH, open_scaled, amount).unwrap();
                            open_scaled = r.scaled_remaining;
                        }
                    }
                    Op::Advance(dt) => {
                        now += dt;
                        ledger.accrue(&WETH, now).unwrap();
                    }
                }
                let after = ledger.reserve(&WETH).unwrap();
                prop_assert!(after.liquidity_index >= before.liquidity_index);
                prop_assert!(after.variable_borrow_index >= before.variable_borrow_index);
            }
        }

        #[test]
        fn prop_double_accrue_idempotent(dt in 1u64..(5 * SECONDS_PER_YEAR), borrow in 1u128..900u128) {
            let mut ledger = ledger_with_weth();
            ledger.deposit(&WETH, &alice(), 1_000 * WAD, 0).unwrap();
            ledger.borrow_against(&mut NoVault, &WETH, borrow * WAD, 0).unwrap();

            ledger.accrue(&WETH, dt).unwrap();
            let once = ledger.clone();
            ledger.accrue(&WETH, dt).unwrap();
            prop_assert_eq!(ledger, once);
        }
    }
}
