//! Risk Premium Sweep Engine
//!
//! Sweeps candidate debt ceilings for one collateral class against the
//! base, downside and upside scenarios and reports the resulting risk premium
//! curve. Only the target class's debt is perturbed; every other class backed
//! by the same asset keeps its current debt but still contributes to the
//! liquidated size that drives slippage.
//!
//! ## Outputs
//! - Risk premium (whole percent points) per candidate debt level
//! - Recommended max debt ceiling: first candidate at or above the threshold
//! - Risk premium at the current debt level

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ProtectionWeights, RiskPremiumConfig, SimulationConfig};
use crate::error::{RiskError, Result};
use crate::loss::{self, LossInput};
use crate::market::{AssetGroups, CollateralClass, CrDistribution, MarketDataProvider, SlippageCurve};
use crate::protection::{estimate_share_protected, ShareProtected};
use crate::scenario::{ScenarioKind, ScenarioSet};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskPremiumPoint {
    pub simulated_debt: Decimal,
    /// Mean of the scenario risk premiums, whole percent points.
    pub risk_premium: Decimal,
    pub scenarios: BTreeMap<ScenarioKind, Decimal>,
}

/// Immutable snapshot of one sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskPremiumResult {
    pub ilk: String,
    pub asset: String,
    pub timestamp: DateTime<Utc>,
    pub current_debt: Decimal,
    pub debt_ceiling: Decimal,
    pub curve: Vec<RiskPremiumPoint>,
    /// `None` when no simulated level reaches the threshold.
    pub max_debt_ceiling: Option<Decimal>,
    pub current_risk_premium: Option<Decimal>,
    pub share_protected: Decimal,
    pub high_risk_debt: Decimal,
    pub medium_risk_debt: Decimal,
    pub low_risk_debt: Decimal,
}

fn round_up_to(value: Decimal, unit: Decimal) -> Decimal {
    ((value / unit).ceil() * unit).normalize()
}

/// Debt levels to simulate, ascending and deduplicated.
///
/// The current debt and the current ceiling, rounded up to the rounding unit,
/// are always present. The rest is a linear grid starting at
/// `candidate_start` of the current debt in steps of `candidate_step`,
/// rounded to a few significant figures.
pub fn debt_ceiling_candidates(
    current_debt: Decimal,
    debt_ceiling: Decimal,
    config: &RiskPremiumConfig,
) -> Result<Vec<Decimal>> {
    if current_debt <= Decimal::ZERO {
        return Err(RiskError::DegenerateScenario(
            "debt ceiling candidates need positive current debt".into(),
        ));
    }

    let mut candidates = BTreeSet::new();
    candidates.insert(round_up_to(current_debt, config.rounding_unit));
    if debt_ceiling > Decimal::ZERO {
        candidates.insert(round_up_to(debt_ceiling, config.rounding_unit));
    }

    for i in 0..config.candidate_count {
        let fraction = config.candidate_start + config.candidate_step * Decimal::from(i);
        let rounded = (current_debt * fraction)
            .round_sf_with_strategy(
                config.significant_figures,
                RoundingStrategy::MidpointAwayFromZero,
            )
            .ok_or_else(|| {
                RiskError::InvalidParameter(format!("cannot round candidate {} of {}", i, current_debt))
            })?;
        if rounded > Decimal::ZERO {
            candidates.insert(rounded.normalize());
        }
    }

    Ok(candidates.into_iter().collect())
}

struct ScenarioInputs {
    distribution: CrDistribution,
    share: ShareProtected,
}

struct RelatedClass {
    class: CollateralClass,
    inputs: BTreeMap<ScenarioKind, ScenarioInputs>,
}

/// Per-run inputs shared by every candidate debt level.
pub struct SweepContext {
    target: CollateralClass,
    related: Vec<RelatedClass>,
    curve: SlippageCurve,
    scenarios: ScenarioSet,
}

impl SweepContext {
    pub fn build(
        provider: &impl MarketDataProvider,
        groups: &AssetGroups,
        ilk: &str,
        scenarios: &ScenarioSet,
        weights: &ProtectionWeights,
    ) -> Result<Self> {
        let target = provider.collateral_class(ilk)?;
        if target.debt <= Decimal::ZERO {
            return Err(RiskError::EmptyVaultSet(ilk.to_string()));
        }

        let mut ilks: Vec<String> = groups.related(&target.asset)?.to_vec();
        if !ilks.iter().any(|r| r == ilk) {
            ilks.push(ilk.to_string());
        }

        let mut related = Vec::with_capacity(ilks.len());
        for related_ilk in &ilks {
            let class = provider.collateral_class(related_ilk)?;
            let observed = provider.cr_distribution(related_ilk)?;

            let mut inputs = BTreeMap::new();
            for scenario in scenarios.scenarios() {
                let distribution = match scenario.cr_override {
                    Some(over) => over.materialize(class.liquidation_ratio),
                    None => observed.clone(),
                };
                let share = if class.debt > Decimal::ZERO {
                    estimate_share_protected(
                        provider,
                        related_ilk,
                        scenario.share_vaults_protected_drop,
                        weights,
                    )?
                } else {
                    ShareProtected::unprotected()
                };
                inputs.insert(scenario.kind, ScenarioInputs { distribution, share });
            }

            related.push(RelatedClass { class, inputs });
        }

        let curve = provider.slippage_curve(&target.asset)?;

        Ok(Self {
            target,
            related,
            curve,
            scenarios: scenarios.clone(),
        })
    }

    pub fn target(&self) -> &CollateralClass {
        &self.target
    }

    /// Share protected of the target class under the given scenario.
    pub fn share_protected(&self, kind: ScenarioKind) -> Option<ShareProtected> {
        self.related
            .iter()
            .find(|r| r.class.ilk == self.target.ilk)
            .and_then(|r| r.inputs.get(&kind))
            .map(|i| i.share)
    }

    /// Mean risk premium over all scenarios with the target at `simulated_debt`.
    pub fn risk_premium_at(&self, simulated_debt: Decimal, max_slippage: Decimal) -> Result<RiskPremiumPoint> {
        let mut scenarios = BTreeMap::new();

        for scenario in self.scenarios.scenarios() {
            let mut total_liquidated = Decimal::ZERO;
            let mut target_input = None;

            for related in &self.related {
                let inputs = related.inputs.get(&scenario.kind).ok_or_else(|| {
                    RiskError::MissingData(format!(
                        "{} inputs for {}",
                        scenario.kind.name(),
                        related.class.ilk
                    ))
                })?;
                let is_target = related.class.ilk == self.target.ilk;

                let input = LossInput {
                    distribution: &inputs.distribution,
                    liquidation_ratio: related.class.liquidation_ratio,
                    simulated_debt: if is_target { simulated_debt } else { related.class.debt },
                    jump_frequency: scenario.jump_frequency,
                    jump_severity: scenario.jump_severity,
                    keeper_profit: scenario.keeper_profit,
                    share_protected: inputs.share.share,
                };
                total_liquidated += loss::liquidated_debt(&input);

                if is_target {
                    target_input = Some(input);
                }
            }

            let input = target_input.ok_or_else(|| {
                RiskError::MissingData(format!("target {} not in its asset group", self.target.ilk))
            })?;
            let outcome = loss::evaluate(&input, total_liquidated, &self.curve, max_slippage)?;
            scenarios.insert(scenario.kind, outcome.risk_premium());
        }

        if scenarios.is_empty() {
            return Err(RiskError::DegenerateScenario("no scenarios to average".into()));
        }

        let sum: Decimal = scenarios.values().copied().sum();
        let risk_premium = sum / Decimal::from(scenarios.len());

        debug!(
            ilk = %self.target.ilk,
            simulated_debt = %simulated_debt,
            risk_premium = %risk_premium,
            "Evaluated debt level"
        );

        Ok(RiskPremiumPoint {
            simulated_debt,
            risk_premium,
            scenarios,
        })
    }
}

pub fn compute_risk_premium(
    provider: &impl MarketDataProvider,
    groups: &AssetGroups,
    ilk: &str,
    scenarios: &ScenarioSet,
    config: &SimulationConfig,
    now: DateTime<Utc>,
) -> Result<RiskPremiumResult> {
    let context = SweepContext::build(provider, groups, ilk, scenarios, &config.protection)?;
    let target = context.target().clone();
    let rp_config = &config.risk_premium;

    let candidates = debt_ceiling_candidates(target.debt, target.debt_ceiling, rp_config)?;
    let curve = candidates
        .into_iter()
        .map(|debt| context.risk_premium_at(debt, rp_config.max_slippage))
        .collect::<Result<Vec<_>>>()?;

    let max_debt_ceiling = curve
        .iter()
        .find(|p| p.risk_premium >= rp_config.threshold)
        .map(|p| p.simulated_debt);

    let current_risk_premium = curve
        .iter()
        .find(|p| p.simulated_debt >= target.debt)
        .map(|p| p.risk_premium);

    let share = context
        .share_protected(ScenarioKind::BaseCase)
        .unwrap_or_else(ShareProtected::unprotected);

    info!(
        ilk = %target.ilk,
        points = curve.len(),
        max_debt_ceiling = ?max_debt_ceiling,
        current_risk_premium = ?current_risk_premium,
        "Risk premium sweep finished"
    );

    Ok(RiskPremiumResult {
        ilk: target.ilk,
        asset: target.asset,
        timestamp: now,
        current_debt: target.debt,
        debt_ceiling: target.debt_ceiling,
        curve,
        max_debt_ceiling,
        current_risk_premium,
        share_protected: share.share,
        high_risk_debt: share.high,
        medium_risk_debt: share.medium,
        low_risk_debt: share.low,
    })
}

/// Sweeps every class of the provider. A failing class is logged and
/// skipped; it never aborts its siblings.
pub fn run_batch(
    provider: &impl MarketDataProvider,
    groups: &AssetGroups,
    scenarios: &ScenarioSet,
    config: &SimulationConfig,
    now: DateTime<Utc>,
) -> Vec<RiskPremiumResult> {
    let mut results = Vec::new();

    for ilk in provider.ilks() {
        match compute_risk_premium(provider, groups, &ilk, scenarios, config, now) {
            Ok(result) => results.push(result),
            Err(e) if e.is_informational() => info!(ilk = %ilk, "Skipping: {}", e),
            Err(e) => warn!(ilk = %ilk, "Risk premium failed: {}", e),
        }
    }

    results
}
