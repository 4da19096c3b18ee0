//! Liquidation/Auction Loss Model
//!
//! Models one adverse price jump against one collateral class. Buckets whose
//! post-drop CR falls under the liquidation ratio are auctioned; auctions
//! under-recover because of slippage on the combined liquidated size of the
//! asset and the keeper's cut. The shortfall, scaled by the jump frequency,
//! is the expected loss.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, Result};
use crate::market::{CrDistribution, SlippageCurve};

/// Inputs for one (class, debt level, scenario) evaluation.
#[derive(Clone, Debug)]
pub struct LossInput<'a> {
    pub distribution: &'a CrDistribution,
    pub liquidation_ratio: Decimal,
    pub simulated_debt: Decimal,
    pub jump_frequency: u32,
    pub jump_severity: Decimal,
    pub keeper_profit: Decimal,
    pub share_protected: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiquidatedBucket {
    pub cr: Decimal,
    pub liquidated_debt: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BucketLoss {
    pub cr: Decimal,
    pub liquidated_debt: Decimal,
    pub liquidated_collateral: Decimal,
    pub debt_repaid: Decimal,
    /// Non-positive.
    pub bad_debt: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossOutcome {
    pub simulated_debt: Decimal,
    pub liquidated_debt: Decimal,
    pub slippage: Decimal,
    /// Non-positive sum over buckets for a single jump.
    pub bad_debt: Decimal,
    /// `bad_debt` scaled by the jump frequency.
    pub expected_loss: Decimal,
    pub buckets: Vec<BucketLoss>,
}

impl LossOutcome {
    /// Expected loss as whole percent points of the simulated debt.
    pub fn risk_premium(&self) -> Decimal {
        (self.expected_loss / self.simulated_debt).abs() * dec!(100)
    }
}

/// A bucket is liquidated when its post-drop CR is strictly below the
/// liquidation ratio. A bucket landing exactly on the ratio survives.
pub fn is_liquidated(cr: Decimal, liquidation_ratio: Decimal, jump_severity: Decimal) -> bool {
    cr * (Decimal::ONE + jump_severity) < liquidation_ratio
}

pub fn liquidated_buckets(input: &LossInput) -> Vec<LiquidatedBucket> {
    let unprotected = Decimal::ONE - input.share_protected;

    input
        .distribution
        .buckets()
        .iter()
        .filter(|b| is_liquidated(b.cr, input.liquidation_ratio, input.jump_severity))
        .map(|b| LiquidatedBucket {
            cr: b.cr,
            liquidated_debt: b.total_debt_pdf * input.simulated_debt * unprotected,
        })
        .filter(|b| b.liquidated_debt > Decimal::ZERO)
        .collect()
}

pub fn liquidated_debt(input: &LossInput) -> Decimal {
    liquidated_buckets(input)
        .iter()
        .map(|b| b.liquidated_debt)
        .sum()
}

/// Evaluates the loss of one class given the debt liquidated across every
/// class backed by the same asset.
pub fn evaluate(
    input: &LossInput,
    total_asset_liquidated: Decimal,
    curve: &SlippageCurve,
    max_slippage: Decimal,
) -> Result<LossOutcome> {
    if input.simulated_debt <= Decimal::ZERO {
        return Err(RiskError::DegenerateScenario(
            "simulated debt must be positive".into(),
        ));
    }

    let liquidated = liquidated_buckets(input);
    let own_liquidated: Decimal = liquidated.iter().map(|b| b.liquidated_debt).sum();

    if liquidated.is_empty() {
        return Ok(LossOutcome {
            simulated_debt: input.simulated_debt,
            liquidated_debt: Decimal::ZERO,
            slippage: Decimal::ZERO,
            bad_debt: Decimal::ZERO,
            expected_loss: Decimal::ZERO,
            buckets: Vec::new(),
        });
    }

    let total = total_asset_liquidated.max(own_liquidated);
    let slippage = curve.lookup(total, max_slippage)?;
    let recovery = (Decimal::ONE - slippage - input.keeper_profit).max(Decimal::ZERO);
    let price_factor = Decimal::ONE + input.jump_severity;

    let buckets: Vec<BucketLoss> = liquidated
        .into_iter()
        .map(|b| {
            let liquidated_collateral = b.liquidated_debt * b.cr * price_factor;
            let debt_repaid = (liquidated_collateral * recovery).min(b.liquidated_debt);
            debug_assert!(debt_repaid <= b.liquidated_debt);

            BucketLoss {
                cr: b.cr,
                liquidated_debt: b.liquidated_debt,
                liquidated_collateral,
                debt_repaid,
                bad_debt: debt_repaid - b.liquidated_debt,
            }
        })
        .collect();

    let bad_debt: Decimal = buckets.iter().map(|b| b.bad_debt).sum();

    Ok(LossOutcome {
        simulated_debt: input.simulated_debt,
        liquidated_debt: own_liquidated,
        slippage,
        bad_debt,
        expected_loss: bad_debt * Decimal::from(input.jump_frequency),
        buckets,
    })
}
