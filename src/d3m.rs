//! Direct Deposit Module (D3M) Metrics
//!
//! A D3M mints DAI straight into a lending market to pull its borrow rate
//! toward a target. For each protocol we build the utilization/rate curve
//! from its interest rate model, find the utilization that yields the target
//! borrow rate, and size the deposit needed to get there within the module's
//! debt ceiling.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RiskError, Result};

/// Utilization resolution of generated rate curves.
const CURVE_STEPS: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LendingProtocol {
    Aave,
    Compound,
    Spark,
    Maker,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub utilization: Decimal,
    pub borrow_rate: Decimal,
    pub supply_rate: Decimal,
}

/// Rate points sorted by utilization. Borrow rates never decrease with it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateCurve {
    points: Vec<RatePoint>,
}

impl RateCurve {
    pub fn new(mut points: Vec<RatePoint>) -> Self {
        points.sort_by(|a, b| a.utilization.cmp(&b.utilization));
        Self { points }
    }

    pub fn points(&self) -> &[RatePoint] {
        &self.points
    }

    /// Point whose `key` is nearest `target`. On a tie the higher point wins.
    fn nearest(&self, target: Decimal, key: impl Fn(&RatePoint) -> Decimal) -> Option<&RatePoint> {
        let idx = self.points.partition_point(|p| key(p) < target);
        let above = self.points.get(idx);
        let below = idx.checked_sub(1).and_then(|i| self.points.get(i));

        match (below, above) {
            (Some(b), Some(a)) => {
                if (target - key(b)).abs() < (key(a) - target).abs() {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => a.or(b),
        }
    }

    /// Point whose borrow rate is nearest `borrow_rate`.
    pub fn utilization_rate_gte(&self, borrow_rate: Decimal) -> Option<&RatePoint> {
        self.nearest(borrow_rate, |p| p.borrow_rate)
    }

    /// Point whose utilization is nearest `utilization`.
    pub fn borrow_rate_gte(&self, utilization: Decimal) -> Option<&RatePoint> {
        self.nearest(utilization, |p| p.utilization)
    }
}

/// Two-slope interest rate model with a kink at the optimal utilization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterestRateModel {
    pub base_rate: Decimal,
    pub slope1: Decimal,
    pub slope2: Decimal,
    pub optimal_utilization: Decimal,
    pub reserve_factor: Decimal,
}

impl Default for InterestRateModel {
    fn default() -> Self {
        Self {
            base_rate: Decimal::ZERO,
            slope1: dec!(0.04),
            slope2: dec!(0.75),
            optimal_utilization: dec!(0.8),
            reserve_factor: dec!(0.1),
        }
    }
}

impl InterestRateModel {
    pub fn borrow_rate(&self, utilization: Decimal) -> Decimal {
        if utilization <= self.optimal_utilization {
            self.base_rate + self.slope1 * utilization / self.optimal_utilization
        } else {
            let excess = (utilization - self.optimal_utilization) / (Decimal::ONE - self.optimal_utilization);
            self.base_rate + self.slope1 + self.slope2 * excess
        }
    }

    pub fn supply_rate(&self, utilization: Decimal) -> Decimal {
        self.borrow_rate(utilization) * utilization * (Decimal::ONE - self.reserve_factor)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LendingMarket {
    pub protocol: LendingProtocol,
    pub total_supply: Decimal,
    pub total_borrow: Decimal,
    pub model: InterestRateModel,
    /// DAI currently deposited by the module.
    pub d3m_debt: Decimal,
    pub d3m_debt_ceiling: Decimal,
    pub target_borrow_rate: Decimal,
}

impl LendingMarket {
    pub fn utilization(&self) -> Decimal {
        if self.total_supply.is_zero() {
            Decimal::ZERO
        } else {
            self.total_borrow / self.total_supply
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct D3mInfo {
    pub debt: Decimal,
    pub debt_ceiling: Decimal,
    pub headroom: Decimal,
    /// Module deposit over total market supply.
    pub share_of_supply: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct D3mMetrics {
    pub protocol: LendingProtocol,
    pub current_utilization: Decimal,
    pub current_borrow_rate: Decimal,
    pub target_borrow_rate: Decimal,
    pub target_utilization: Decimal,
    /// Deposit needed to reach the target rate, capped by the headroom.
    pub dai_needed: Decimal,
    pub resulting_supply: Decimal,
    pub resulting_utilization: Decimal,
}

impl LendingProtocol {
    pub fn all() -> Vec<Self> {
        vec![Self::Aave, Self::Compound, Self::Spark, Self::Maker]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aave => "Aave",
            Self::Compound => "Compound",
            Self::Spark => "Spark",
            Self::Maker => "Maker",
        }
    }

    pub fn rates(&self, market: &LendingMarket) -> RateCurve {
        let utilizations = (0..=CURVE_STEPS).map(|i| Decimal::from(i) / Decimal::from(CURVE_STEPS));

        let points: Vec<RatePoint> = match self {
            Self::Aave | Self::Compound | Self::Spark => utilizations
                .map(|u| RatePoint {
                    utilization: u,
                    borrow_rate: market.model.borrow_rate(u),
                    supply_rate: market.model.supply_rate(u),
                })
                .collect(),
            // stability fee does not depend on utilization
            Self::Maker => utilizations
                .map(|u| RatePoint {
                    utilization: u,
                    borrow_rate: market.model.base_rate,
                    supply_rate: Decimal::ZERO,
                })
                .collect(),
        };

        RateCurve::new(points)
    }

    pub fn d3m_info(&self, market: &LendingMarket) -> Option<D3mInfo> {
        match self {
            Self::Maker => None,
            Self::Aave | Self::Compound | Self::Spark => Some(D3mInfo {
                debt: market.d3m_debt,
                debt_ceiling: market.d3m_debt_ceiling,
                headroom: (market.d3m_debt_ceiling - market.d3m_debt).max(Decimal::ZERO),
                share_of_supply: if market.total_supply.is_zero() {
                    Decimal::ZERO
                } else {
                    market.d3m_debt / market.total_supply
                },
            }),
        }
    }

    pub fn compute_metrics(&self, market: &LendingMarket) -> Result<D3mMetrics> {
        let info = self.d3m_info(market).ok_or_else(|| {
            RiskError::InvalidParameter(format!("{} has no direct deposit module", self.name()))
        })?;

        let curve = self.rates(market);
        let target = curve
            .utilization_rate_gte(market.target_borrow_rate)
            .ok_or_else(|| RiskError::MissingData(format!("{} rate curve", self.name())))?;

        if target.utilization.is_zero() {
            return Err(RiskError::DegenerateScenario(format!(
                "target borrow rate {} maps to zero utilization",
                market.target_borrow_rate
            )));
        }

        let supply_needed = market.total_borrow / target.utilization;
        let dai_needed = (supply_needed - market.total_supply)
            .max(Decimal::ZERO)
            .min(info.headroom);
        let resulting_supply = market.total_supply + dai_needed;
        let resulting_utilization = if resulting_supply.is_zero() {
            Decimal::ZERO
        } else {
            market.total_borrow / resulting_supply
        };

        debug!(
            protocol = self.name(),
            target_utilization = %target.utilization,
            dai_needed = %dai_needed,
            "D3M metrics"
        );

        Ok(D3mMetrics {
            protocol: *self,
            current_utilization: market.utilization(),
            current_borrow_rate: market.model.borrow_rate(market.utilization()),
            target_borrow_rate: market.target_borrow_rate,
            target_utilization: target.utilization,
            dai_needed,
            resulting_supply,
            resulting_utilization,
        })
    }
}
