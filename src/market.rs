//! Market Data
//!
//! Data model consumed by the risk simulation and the provider interface
//! through which the surrounding system hands it over. Every input is read
//! from a frozen snapshot before a run starts; nothing here performs I/O.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::distribution;
use crate::error::{RiskError, Result};

/// A vault type backed by one collateral asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollateralClass {
    pub ilk: String,
    /// Price-feed symbol of the underlying asset, e.g. "ETH".
    pub asset: String,
    /// Multiple, e.g. 1.45 for 145%.
    pub liquidation_ratio: Decimal,
    /// Current total debt in DAI.
    pub debt: Decimal,
    pub debt_ceiling: Decimal,
}

/// One active vault as reported by the vault indexer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaultPosition {
    /// Collateralization in percent, e.g. 175.3.
    pub collateralization: Decimal,
    pub debt: Decimal,
}

/// Fraction of a class's debt sitting at collateralization `cr`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrBucket {
    pub cr: Decimal,
    pub total_debt_pdf: Decimal,
}

/// Probability mass over CR buckets, sorted by bucket CR.
///
/// The mass does not have to sum to one; missing mass is debt that is never
/// liquidated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CrDistribution {
    buckets: Vec<CrBucket>,
}

impl CrDistribution {
    pub fn new(mut buckets: Vec<CrBucket>) -> Self {
        buckets.sort_by(|a, b| a.cr.cmp(&b.cr));
        Self { buckets }
    }

    pub fn buckets(&self) -> &[CrBucket] {
        &self.buckets
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total_mass(&self) -> Decimal {
        self.buckets.iter().map(|b| b.total_debt_pdf).sum()
    }

    pub fn pdf_at(&self, cr: Decimal) -> Decimal {
        self.buckets
            .iter()
            .find(|b| b.cr == cr)
            .map(|b| b.total_debt_pdf)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Quoted slippage for selling `usd_amount` worth of the asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlippagePoint {
    pub usd_amount: u64,
    /// Fraction, 0.05 = 5%.
    pub slippage: Decimal,
}

/// Step function of slippage by trade size, ascending by `usd_amount`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SlippageCurve {
    points: Vec<SlippagePoint>,
}

impl SlippageCurve {
    pub fn new(mut points: Vec<SlippagePoint>) -> Self {
        points.sort_by_key(|p| p.usd_amount);
        Self { points }
    }

    pub fn points(&self) -> &[SlippagePoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Slippage of the smallest quote whose size is at least `amount`.
    ///
    /// Sizes past the largest quote get `max_slippage`.
    pub fn lookup(&self, amount: Decimal, max_slippage: Decimal) -> Result<Decimal> {
        if self.points.is_empty() {
            return Err(RiskError::MissingData("empty slippage curve".into()));
        }

        let idx = self
            .points
            .partition_point(|p| Decimal::from(p.usd_amount) < amount);

        Ok(self
            .points
            .get(idx)
            .map(|p| p.slippage)
            .unwrap_or(max_slippage))
    }
}

/// Debt at risk per protection tier for one price drop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionExposure {
    pub high: Decimal,
    pub medium: Decimal,
    pub low: Decimal,
}

/// Collateral classes grouped by underlying asset.
///
/// A price drop in an asset liquidates every class in its group at once.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetGroups {
    groups: BTreeMap<String, Vec<String>>,
}

impl AssetGroups {
    pub fn new(groups: BTreeMap<String, Vec<String>>) -> Self {
        Self { groups }
    }

    pub fn from_classes<'a>(classes: impl IntoIterator<Item = &'a CollateralClass>) -> Self {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for class in classes {
            groups
                .entry(class.asset.clone())
                .or_default()
                .push(class.ilk.clone());
        }
        Self { groups }
    }

    pub fn related(&self, asset: &str) -> Result<&[String]> {
        self.groups
            .get(asset)
            .map(Vec::as_slice)
            .ok_or_else(|| RiskError::MissingData(format!("no collateral classes for asset {}", asset)))
    }
}

/// Source of market inputs for the simulation.
pub trait MarketDataProvider {
    fn ilks(&self) -> Vec<String>;

    fn collateral_class(&self, ilk: &str) -> Result<CollateralClass>;

    fn active_debt(&self, ilk: &str) -> Result<Decimal> {
        Ok(self.collateral_class(ilk)?.debt)
    }

    fn liquidation_ratio(&self, ilk: &str) -> Result<Decimal> {
        Ok(self.collateral_class(ilk)?.liquidation_ratio)
    }

    fn cr_distribution(&self, ilk: &str) -> Result<CrDistribution>;

    fn slippage_curve(&self, asset: &str) -> Result<SlippageCurve>;

    /// Precomputed at-risk debt per tier for a whole-percent price drop.
    fn protection_exposure(&self, ilk: &str, drop_percent: u32) -> Result<ProtectionExposure>;
}

/// Frozen in-memory market snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSnapshot {
    pub classes: BTreeMap<String, CollateralClass>,
    pub positions: BTreeMap<String, Vec<VaultPosition>>,
    pub slippage: BTreeMap<String, Vec<SlippagePoint>>,
    pub protection: BTreeMap<String, BTreeMap<u32, ProtectionExposure>>,
}

impl MarketSnapshot {
    pub fn with_class(mut self, class: CollateralClass) -> Self {
        self.classes.insert(class.ilk.clone(), class);
        self
    }

    pub fn with_positions(mut self, ilk: &str, positions: Vec<VaultPosition>) -> Self {
        self.positions.insert(ilk.to_string(), positions);
        self
    }

    pub fn with_slippage_curve(mut self, asset: &str, points: Vec<SlippagePoint>) -> Self {
        self.slippage.insert(asset.to_string(), points);
        self
    }

    pub fn with_protection(mut self, ilk: &str, drop_percent: u32, exposure: ProtectionExposure) -> Self {
        self.protection
            .entry(ilk.to_string())
            .or_default()
            .insert(drop_percent, exposure);
        self
    }

    pub fn asset_groups(&self) -> AssetGroups {
        AssetGroups::from_classes(self.classes.values())
    }
}

impl MarketDataProvider for MarketSnapshot {
    fn ilks(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }

    fn collateral_class(&self, ilk: &str) -> Result<CollateralClass> {
        self.classes
            .get(ilk)
            .cloned()
            .ok_or_else(|| RiskError::MissingData(format!("collateral class {}", ilk)))
    }

    fn cr_distribution(&self, ilk: &str) -> Result<CrDistribution> {
        let class = self.collateral_class(ilk)?;
        // a class with outstanding debt must have indexed vaults
        let positions: &[VaultPosition] = match self.positions.get(ilk) {
            Some(positions) if !positions.is_empty() => positions.as_slice(),
            _ if class.debt > Decimal::ZERO => {
                return Err(RiskError::MissingData(format!("vault positions for {}", ilk)))
            }
            _ => &[],
        };
        Ok(distribution::build(class.liquidation_ratio, positions, None))
    }

    fn slippage_curve(&self, asset: &str) -> Result<SlippageCurve> {
        self.slippage
            .get(asset)
            .map(|points| SlippageCurve::new(points.clone()))
            .ok_or_else(|| RiskError::MissingData(format!("slippage curve for {}", asset)))
    }

    fn protection_exposure(&self, ilk: &str, drop_percent: u32) -> Result<ProtectionExposure> {
        self.protection
            .get(ilk)
            .and_then(|table| table.get(&drop_percent))
            .copied()
            .ok_or_else(|| {
                RiskError::MissingData(format!(
                    "protection exposure for {} at {}% drop",
                    ilk, drop_percent
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_SLIPPAGE;
    use crate::error::{JsonDeserialization, JsonSerialization};
    use rand::prelude::*;
    use rust_decimal_macros::dec;

    fn curve() -> SlippageCurve {
        SlippageCurve::new(vec![
            SlippagePoint { usd_amount: 10_000_000, slippage: dec!(0.08) },
            SlippagePoint { usd_amount: 1_000_000, slippage: dec!(0.02) },
            SlippagePoint { usd_amount: 5_000_000, slippage: dec!(0.05) },
        ])
    }

    #[test]
    fn test_slippage_ceiling_lookup() {
        let curve = curve();
        assert_eq!(curve.lookup(dec!(0), MAX_SLIPPAGE).unwrap(), dec!(0.02));
        assert_eq!(curve.lookup(dec!(1000000), MAX_SLIPPAGE).unwrap(), dec!(0.02));
        assert_eq!(curve.lookup(dec!(1000001), MAX_SLIPPAGE).unwrap(), dec!(0.05));
        assert_eq!(curve.lookup(dec!(10000000), MAX_SLIPPAGE).unwrap(), dec!(0.08));
        assert_eq!(curve.lookup(dec!(10000001), MAX_SLIPPAGE).unwrap(), MAX_SLIPPAGE);
    }

    #[test]
    fn test_slippage_lookup_matches_linear_scan() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let points: Vec<SlippagePoint> = (0..rng.gen_range(1..12))
                .map(|i| SlippagePoint {
                    usd_amount: rng.gen_range(1..1_000) * 10_000 + i,
                    slippage: Decimal::new(rng.gen_range(0..500), 3),
                })
                .collect();
            let curve = SlippageCurve::new(points);
            let amount = Decimal::from(rng.gen_range(0..11_000_000u64));

            let expected = curve
                .points()
                .iter()
                .find(|p| Decimal::from(p.usd_amount) >= amount)
                .map(|p| p.slippage)
                .unwrap_or(MAX_SLIPPAGE);

            assert_eq!(curve.lookup(amount, MAX_SLIPPAGE).unwrap(), expected);
        }
    }

    #[test]
    fn test_empty_curve_is_missing_data() {
        let curve = SlippageCurve::default();
        assert!(matches!(
            curve.lookup(dec!(1), MAX_SLIPPAGE),
            Err(RiskError::MissingData(_))
        ));
    }

    #[test]
    fn test_asset_groups_from_classes() {
        let snapshot = MarketSnapshot::default()
            .with_class(class("ETH-A", "ETH"))
            .with_class(class("ETH-B", "ETH"))
            .with_class(class("WBTC-A", "WBTC"));

        let groups = snapshot.asset_groups();
        assert_eq!(groups.related("ETH").unwrap(), &["ETH-A".to_string(), "ETH-B".to_string()]);
        assert_eq!(groups.related("WBTC").unwrap().len(), 1);
        assert!(groups.related("LINK").is_err());
    }

    #[test]
    fn test_indebted_class_without_positions_is_missing_data() {
        let mut idle = class("LINK-A", "LINK");
        idle.debt = Decimal::ZERO;
        let snapshot = MarketSnapshot::default()
            .with_class(class("ETH-A", "ETH"))
            .with_class(class("ETH-B", "ETH"))
            .with_class(idle)
            .with_positions("ETH-B", Vec::new());

        assert!(matches!(snapshot.cr_distribution("ETH-A"), Err(RiskError::MissingData(_))));
        assert!(matches!(snapshot.cr_distribution("ETH-B"), Err(RiskError::MissingData(_))));

        let empty = snapshot.cr_distribution("LINK-A").unwrap();
        assert_eq!(empty.total_mass(), Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_json_roundtrip_keeps_protection_table() {
        let snapshot = MarketSnapshot::default()
            .with_class(class("ETH-A", "ETH"))
            .with_protection(
                "ETH-A",
                50,
                ProtectionExposure { high: dec!(100), medium: dec!(50), low: dec!(10) },
            );

        let json = snapshot.to_json().unwrap();
        let restored = MarketSnapshot::from_json(&json).unwrap();

        assert_eq!(
            restored.protection_exposure("ETH-A", 50).unwrap().medium,
            dec!(50)
        );
        assert!(restored.protection_exposure("ETH-A", 40).is_err());
    }

    fn class(ilk: &str, asset: &str) -> CollateralClass {
        CollateralClass {
            ilk: ilk.into(),
            asset: asset.into(),
            liquidation_ratio: dec!(1.45),
            debt: dec!(1000000),
            debt_ceiling: dec!(2000000),
        }
    }
}
