//! Dust Recommendation
//!
//! Minimum vault debt for which liquidating the vault is still worth a
//! keeper's gas. The keeper is paid a flat `tip` plus `chip` of the debt, so
//! the smallest profitable debt follows from the liquidation cost in USD.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RiskError, Result};
use crate::price_path::percentile;

pub const DUST_ROUNDING_UNIT: Decimal = dec!(500);

const GWEI: Decimal = dec!(0.000000001);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DustParams {
    pub gas_price_gwei: Decimal,
    pub eth_price: Decimal,
    /// Gas used by a bark plus a take.
    pub liquidation_gas: Decimal,
    /// Flat keeper incentive in DAI.
    pub tip: Decimal,
    /// Keeper incentive as a fraction of the debt.
    pub chip: Decimal,
    pub keeper_margin: Decimal,
}

impl Default for DustParams {
    fn default() -> Self {
        Self {
            gas_price_gwei: dec!(100),
            eth_price: dec!(2000),
            liquidation_gas: dec!(500000),
            tip: dec!(300),
            chip: dec!(0.001),
            keeper_margin: dec!(0.5),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DustRecommendation {
    pub gas_price_gwei: Decimal,
    pub liquidation_cost: Decimal,
    pub dust: Decimal,
}

impl DustParams {
    /// Liquidation cost in USD.
    pub fn liquidation_cost(&self) -> Decimal {
        self.liquidation_gas * self.gas_price_gwei * GWEI * self.eth_price
    }

    pub fn recommend(&self) -> Result<DustRecommendation> {
        let cost = self.liquidation_cost();
        let shortfall = cost * (Decimal::ONE + self.keeper_margin) - self.tip;

        let dust = if shortfall <= Decimal::ZERO {
            Decimal::ZERO
        } else if self.chip <= Decimal::ZERO {
            return Err(RiskError::DegenerateScenario(format!(
                "liquidation cost {} exceeds tip {} and chip is zero",
                cost.round_dp(2),
                self.tip
            )));
        } else {
            ((shortfall / self.chip) / DUST_ROUNDING_UNIT).ceil() * DUST_ROUNDING_UNIT
        };

        debug!(cost = %cost.round_dp(2), dust = %dust, "Dust recommendation");

        Ok(DustRecommendation {
            gas_price_gwei: self.gas_price_gwei,
            liquidation_cost: cost,
            dust,
        })
    }
}

/// Recommendation at the gas price found at percentile `p` of `gas_prices`.
pub fn dust_from_gas_history(gas_prices: &[f64], p: f64, params: &DustParams) -> Result<DustRecommendation> {
    if gas_prices.is_empty() {
        return Err(RiskError::MissingData("gas price history".into()));
    }

    let mut sorted = gas_prices.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let gas = percentile(&sorted, p);

    let gas_price_gwei = Decimal::from_f64(gas)
        .ok_or_else(|| RiskError::InvalidParameter(format!("gas price {}", gas)))?
        .round_dp(2);

    DustParams {
        gas_price_gwei,
        ..params.clone()
    }
    .recommend()
}
