//! Share-Protected Estimator
//!
//! Estimates how much of a class's debt would not reach liquidation under a
//! given price drop. The precomputed vault liquidation aggregates give the
//! at-risk debt per protection tier; each tier is weighted by the fraction
//! assumed to actually be liquidated.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::ProtectionWeights;
use crate::error::{RiskError, Result};
use crate::market::{MarketDataProvider, ProtectionExposure};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShareProtected {
    /// Fraction in [0, 1] of the class debt that is not liquidated.
    pub share: Decimal,
    pub high: Decimal,
    pub medium: Decimal,
    pub low: Decimal,
}

impl ShareProtected {
    /// Used for classes without debt, whose liquidated debt is zero anyway.
    pub fn unprotected() -> Self {
        Self {
            share: Decimal::ZERO,
            high: Decimal::ZERO,
            medium: Decimal::ZERO,
            low: Decimal::ZERO,
        }
    }
}

/// Whole-percent drop for a negative severity, e.g. -0.55 -> 55.
pub fn drop_percent(price_drop: Decimal) -> Result<u32> {
    (-price_drop * dec!(100))
        .round()
        .to_u32()
        .ok_or_else(|| RiskError::InvalidParameter(format!("price drop {} is not a drop", price_drop)))
}

/// share = 1 - weighted_exposure / total_debt, rounded to 2 dp and clamped to [0, 1].
pub fn share_protected(
    exposure: &ProtectionExposure,
    total_debt: Decimal,
    weights: &ProtectionWeights,
) -> Result<ShareProtected> {
    if total_debt <= Decimal::ZERO {
        return Err(RiskError::DegenerateScenario(
            "share protected needs positive total debt".into(),
        ));
    }

    let weighted = exposure.high * weights.high
        + exposure.medium * weights.medium
        + exposure.low * weights.low;

    let share = (Decimal::ONE - weighted / total_debt)
        .round_dp(2)
        .clamp(Decimal::ZERO, Decimal::ONE);

    Ok(ShareProtected {
        share,
        high: exposure.high,
        medium: exposure.medium,
        low: exposure.low,
    })
}

pub fn estimate_share_protected(
    provider: &impl MarketDataProvider,
    ilk: &str,
    price_drop: Decimal,
    weights: &ProtectionWeights,
) -> Result<ShareProtected> {
    let drop = drop_percent(price_drop)?;
    let exposure = provider.protection_exposure(ilk, drop)?;
    let total_debt = provider.active_debt(ilk)?;

    share_protected(&exposure, total_debt, weights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{CollateralClass, MarketSnapshot};

    fn exposure(high: Decimal, medium: Decimal, low: Decimal) -> ProtectionExposure {
        ProtectionExposure { high, medium, low }
    }

    #[test]
    fn test_drop_percent() {
        assert_eq!(drop_percent(dec!(-0.5)).unwrap(), 50);
        assert_eq!(drop_percent(dec!(-0.55)).unwrap(), 55);
        assert!(drop_percent(dec!(0.1)).is_err());
    }

    #[test]
    fn test_weighted_share() {
        let weights = ProtectionWeights::default();
        // 400*0.5 + 200*0.25 + 1000*0.05 = 300
        let result = share_protected(
            &exposure(dec!(400), dec!(200), dec!(1000)),
            dec!(1000),
            &weights,
        )
        .unwrap();

        assert_eq!(result.share, dec!(0.70));
        assert_eq!(result.high, dec!(400));
    }

    #[test]
    fn test_share_rounded_and_clamped() {
        let weights = ProtectionWeights::default();

        let rounded = share_protected(&exposure(dec!(1), dec!(0), dec!(0)), dec!(300), &weights).unwrap();
        assert_eq!(rounded.share, dec!(1.00));

        let clamped = share_protected(&exposure(dec!(5000), dec!(0), dec!(0)), dec!(1000), &weights).unwrap();
        assert_eq!(clamped.share, Decimal::ZERO);
    }

    #[test]
    fn test_zero_total_debt_is_degenerate() {
        let result = share_protected(&exposure(dec!(1), dec!(1), dec!(1)), Decimal::ZERO, &ProtectionWeights::default());
        assert!(matches!(result, Err(RiskError::DegenerateScenario(_))));
    }

    #[test]
    fn test_estimate_reads_exact_drop() {
        let snapshot = MarketSnapshot::default()
            .with_class(CollateralClass {
                ilk: "ETH-A".into(),
                asset: "ETH".into(),
                liquidation_ratio: dec!(1.45),
                debt: dec!(1000),
                debt_ceiling: dec!(2000),
            })
            .with_protection("ETH-A", 50, exposure(dec!(1000), dec!(0), dec!(0)));

        let weights = ProtectionWeights::default();
        let share = estimate_share_protected(&snapshot, "ETH-A", dec!(-0.5), &weights).unwrap();
        assert_eq!(share.share, dec!(0.50));

        assert!(matches!(
            estimate_share_protected(&snapshot, "ETH-A", dec!(-0.45), &weights),
            Err(RiskError::MissingData(_))
        ));
    }
}
