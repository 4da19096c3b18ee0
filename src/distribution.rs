//! CR Distribution Builder
//!
//! Buckets active vaults by collateralization relative to the liquidation
//! ratio. The resulting mass per bucket is the base case input of the loss
//! model; the downside and upside scenarios replace it with the hand-authored
//! overrides below.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::market::{CrBucket, CrDistribution, VaultPosition};

/// Buffers above the liquidation ratio at which buckets are placed.
pub const BUFFER_GRID: [Decimal; 12] = [
    dec!(0.15),
    dec!(0.25),
    dec!(0.5),
    dec!(0.75),
    dec!(1.0),
    dec!(1.25),
    dec!(1.5),
    dec!(1.75),
    dec!(2.0),
    dec!(2.5),
    dec!(3.0),
    dec!(3.75),
];

/// Buckets above this multiple are never realistically liquidated.
pub const MAX_BUCKET_CR: Decimal = dec!(5.0);

/// Vaults above this collateralization (percent) are left out of the buckets.
pub const MAX_POSITION_CR_PERCENT: Decimal = dec!(500);

/// Downside case: debt skewed toward buckets just above the liquidation ratio.
const DOWNSIDE_BUFFERS: [(Decimal, Decimal); 8] = [
    (dec!(0.15), dec!(0.20)),
    (dec!(0.25), dec!(0.20)),
    (dec!(0.5), dec!(0.20)),
    (dec!(0.75), dec!(0.15)),
    (dec!(1.0), dec!(0.10)),
    (dec!(1.25), dec!(0.05)),
    (dec!(1.5), dec!(0.05)),
    (dec!(2.0), dec!(0.05)),
];

/// Upside case: debt skewed toward well collateralized buckets.
const UPSIDE_BUFFERS: [(Decimal, Decimal); 10] = [
    (dec!(0.25), dec!(0.02)),
    (dec!(0.5), dec!(0.05)),
    (dec!(0.75), dec!(0.08)),
    (dec!(1.0), dec!(0.15)),
    (dec!(1.25), dec!(0.15)),
    (dec!(1.5), dec!(0.15)),
    (dec!(2.0), dec!(0.15)),
    (dec!(2.5), dec!(0.10)),
    (dec!(3.0), dec!(0.10)),
    (dec!(3.75), dec!(0.05)),
];

/// Bucket CRs for a liquidation ratio, ascending.
pub fn bucket_grid(liquidation_ratio: Decimal) -> Vec<Decimal> {
    BUFFER_GRID
        .iter()
        .map(|buffer| (buffer + liquidation_ratio).round_dp(2))
        .filter(|cr| *cr <= MAX_BUCKET_CR)
        .collect()
}

/// Builds the debt distribution over CR buckets.
///
/// Each vault lands in the smallest bucket strictly above its own CR. An
/// optional `price_drop` (negative fraction) moves every vault's CR before
/// bucketing. Fractions are relative to the debt of all active vaults, so
/// vaults filtered out or above the top bucket are missing mass.
pub fn build(
    liquidation_ratio: Decimal,
    positions: &[VaultPosition],
    price_drop: Option<Decimal>,
) -> CrDistribution {
    let grid = bucket_grid(liquidation_ratio);
    let price_factor = Decimal::ONE + price_drop.unwrap_or(Decimal::ZERO);

    let mut bucket_debt = vec![Decimal::ZERO; grid.len()];
    let mut total_debt = Decimal::ZERO;

    for position in positions.iter().filter(|p| p.debt > Decimal::ZERO) {
        total_debt += position.debt;
        if position.collateralization > MAX_POSITION_CR_PERCENT {
            continue;
        }

        let cr = position.collateralization / dec!(100) * price_factor;
        let idx = grid.partition_point(|bucket| *bucket <= cr);
        if let Some(debt) = bucket_debt.get_mut(idx) {
            *debt += position.debt;
        }
    }

    let buckets = grid
        .into_iter()
        .zip(bucket_debt)
        .map(|(cr, debt)| CrBucket {
            cr,
            total_debt_pdf: if total_debt.is_zero() {
                Decimal::ZERO
            } else {
                debt / total_debt
            },
        })
        .collect();

    CrDistribution::new(buckets)
}

/// Hand-authored distributions used instead of the observed one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionOverride {
    Downside,
    Upside,
}

impl DistributionOverride {
    pub fn buffers(&self) -> &'static [(Decimal, Decimal)] {
        match self {
            Self::Downside => &DOWNSIDE_BUFFERS,
            Self::Upside => &UPSIDE_BUFFERS,
        }
    }

    pub fn materialize(&self, liquidation_ratio: Decimal) -> CrDistribution {
        let buckets = self
            .buffers()
            .iter()
            .map(|(buffer, pdf)| CrBucket {
                cr: (buffer + liquidation_ratio).round_dp(2),
                total_debt_pdf: *pdf,
            })
            .filter(|bucket| bucket.cr <= MAX_BUCKET_CR)
            .collect();

        CrDistribution::new(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(collateralization: Decimal, debt: Decimal) -> VaultPosition {
        VaultPosition { collateralization, debt }
    }

    #[test]
    fn test_bucket_grid_caps_at_five() {
        let grid = bucket_grid(dec!(1.45));
        assert_eq!(grid.first(), Some(&dec!(1.60)));
        // 1.45 + 3.75 = 5.20 is dropped
        assert_eq!(grid.last(), Some(&dec!(4.45)));
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_vault_lands_in_smallest_strictly_greater_bucket() {
        let positions = vec![
            position(dec!(150), dec!(100)),
            // exactly on a bucket moves to the next one
            position(dec!(160), dec!(300)),
        ];

        let dist = build(dec!(1.45), &positions, None);
        assert_eq!(dist.pdf_at(dec!(1.60)), dec!(0.25));
        assert_eq!(dist.pdf_at(dec!(1.70)), dec!(0.75));
        assert_eq!(dist.total_mass(), Decimal::ONE);
    }

    #[test]
    fn test_filtered_debt_is_missing_mass() {
        let positions = vec![
            position(dec!(180), dec!(100)),
            position(dec!(650), dec!(100)),
            // above the top bucket (4.45) but under 500%
            position(dec!(480), dec!(200)),
            position(dec!(200), dec!(0)),
        ];

        let dist = build(dec!(1.45), &positions, None);
        assert_eq!(dist.pdf_at(dec!(1.95)), dec!(0.25));
        assert_eq!(dist.total_mass(), dec!(0.25));
    }

    #[test]
    fn test_zero_debt_gives_zero_fractions() {
        let dist = build(dec!(1.5), &[], None);
        assert!(!dist.is_empty());
        assert!(dist.buckets().iter().all(|b| b.total_debt_pdf.is_zero()));
    }

    #[test]
    fn test_price_drop_moves_vaults_down() {
        let positions = vec![position(dec!(300), dec!(100))];

        let before = build(dec!(1.5), &positions, None);
        let after = build(dec!(1.5), &positions, Some(dec!(-0.5)));

        assert_eq!(before.pdf_at(dec!(3.25)), Decimal::ONE);
        assert_eq!(after.pdf_at(dec!(1.65)), Decimal::ONE);
    }

    #[test]
    fn test_build_is_idempotent() {
        let positions: Vec<VaultPosition> = (0..50)
            .map(|i| position(Decimal::from(150 + i * 7), Decimal::from(1000 + i * 31)))
            .collect();

        assert_eq!(
            build(dec!(1.45), &positions, None),
            build(dec!(1.45), &positions, None)
        );
    }

    #[test]
    fn test_overrides_carry_full_mass() {
        for over in [DistributionOverride::Downside, DistributionOverride::Upside] {
            let total: Decimal = over.buffers().iter().map(|(_, pdf)| *pdf).sum();
            assert_eq!(total, Decimal::ONE);
        }

        // 1.75 + 3.75 exceeds the cap, its mass is dropped
        let upside = DistributionOverride::Upside.materialize(dec!(1.75));
        assert_eq!(upside.total_mass(), dec!(0.95));
    }
}
