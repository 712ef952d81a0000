//! Health Engine
//!
//! Values a loan in oracle base units and derives loan-to-value and the
//! health factor:
//!
//! ```text
//! debt_value      = scaled_debt * borrow_index * price(reserve)
//! collateral_value = price(nft, token_id)
//! health_factor   = collateral_value * liquidation_threshold / debt_value
//! ```
//!
//! Ratios round down and debt rounds up, so the pool never reads a loan as
//! healthier than it is.

use crate::constants::precision::{PERCENTAGE_FACTOR, WAD};
use crate::errors::LendResult;
use crate::math::{from_base_value, mul_div, percent_mul, ray_mul, to_base_value, Rounding};
use crate::oracle::{fresh_nft_price, fresh_reserve_price, PriceOracle};
use crate::collateral::NftConfig;
use crate::reserve::Reserve;
use crate::types::NftKey;

/// Health factor of a loan without debt
pub const HEALTH_FACTOR_MAX: u128 = u128::MAX;

/// Point-in-time valuation of a collateral item and its debt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    /// NFT price in base units
    pub collateral_value: u128,
    /// Collateral expressed in reserve units
    pub collateral_in_reserve: u128,
    /// Debt in reserve units
    pub debt: u128,
    /// Debt in base units
    pub debt_value: u128,
    pub reserve_price: u128,
    pub ltv_bps: u64,
    /// Wad; below 1e18 the loan can be auctioned
    pub health_factor: u128,
    /// Further borrowing capacity in reserve units
    pub available_borrows: u128,
}

impl HealthSnapshot {
    pub fn is_liquidatable(&self) -> bool {
        is_liquidatable(self.health_factor)
    }
}

/// Health factor in wad
pub fn calculate_health_factor(
    collateral_value: u128,
    debt_value: u128,
    liquidation_threshold_bps: u64,
) -> LendResult<u128> {
    if debt_value == 0 {
        return Ok(HEALTH_FACTOR_MAX);
    }
    let weighted = percent_mul(collateral_value, liquidation_threshold_bps, Rounding::Down)?;
    mul_div(weighted, WAD, debt_value, Rounding::Down)
}

/// Loan-to-value in basis points
pub fn calculate_ltv_bps(debt_value: u128, collateral_value: u128) -> LendResult<u64> {
    if debt_value == 0 {
        return Ok(0);
    }
    if collateral_value == 0 {
        return Ok(u64::MAX);
    }
    let ltv = mul_div(debt_value, PERCENTAGE_FACTOR as u128, collateral_value, Rounding::Down)?;
    Ok(ltv.min(u64::MAX as u128) as u64)
}

/// Remaining borrow capacity in base units
pub fn available_borrows_value(collateral_value: u128, debt_value: u128, ltv_bps: u64) -> LendResult<u128> {
    let max = percent_mul(collateral_value, ltv_bps, Rounding::Down)?;
    Ok(max.saturating_sub(debt_value))
}

/// Below health factor 1
pub fn is_liquidatable(health_factor: u128) -> bool {
    health_factor < WAD
}

/// Value a collateral item against `scaled_debt` in `reserve`
///
/// Debt is projected to `now` so the reading is exact without accruing.
pub fn snapshot<O: PriceOracle + ?Sized>(
    oracle: &O,
    reserve: &Reserve,
    config: &NftConfig,
    nft: &NftKey,
    scaled_debt: u128,
    now: u64,
    max_price_age: u64,
) -> LendResult<HealthSnapshot> {
    let collateral_value = fresh_nft_price(oracle, &nft.collection, nft.token_id, now, max_price_age)?;
    let reserve_price = fresh_reserve_price(oracle, &reserve.asset, now, max_price_age)?;

    let index = reserve.normalized_variable_debt(now)?;
    let debt = ray_mul(scaled_debt, index, Rounding::Up)?;
    let debt_value = to_base_value(debt, reserve_price, reserve.decimals, Rounding::Up)?;

    let collateral_in_reserve = from_base_value(collateral_value, reserve_price, reserve.decimals, Rounding::Down)?;
    let available_value = available_borrows_value(collateral_value, debt_value, config.params.ltv_bps)?;
    let available_borrows = from_base_value(available_value, reserve_price, reserve.decimals, Rounding::Down)?;

    Ok(HealthSnapshot {
        collateral_value,
        collateral_in_reserve,
        debt,
        debt_value,
        reserve_price,
        ltv_bps: calculate_ltv_bps(debt_value, collateral_value)?,
        health_factor: calculate_health_factor(
            collateral_value,
            debt_value,
            config.params.liquidation_threshold_bps,
        )?,
        available_borrows,
    })
}
