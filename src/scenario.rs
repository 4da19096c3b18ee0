//! Scenario Generator
//!
//! Derives the base, downside and upside stress scenarios from one base
//! triple. Each parameter lives on an ordered grid; the downside and upside
//! cases are index shifts on those grids, clamped at the ends.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::distribution::DistributionOverride;
use crate::error::{RiskError, Result};

/// Expected number of independent adverse jumps per year. Worse with index.
pub const JUMP_FREQUENCY_LIST: [u32; 5] = [1, 2, 3, 4, 5];

/// Fractional price drop per jump. Worse with index.
pub const JUMP_SEVERITY_LIST: [Decimal; 11] = [
    dec!(-0.30),
    dec!(-0.35),
    dec!(-0.40),
    dec!(-0.45),
    dec!(-0.50),
    dec!(-0.55),
    dec!(-0.60),
    dec!(-0.65),
    dec!(-0.70),
    dec!(-0.75),
    dec!(-0.80),
];

/// Share of liquidated collateral value kept by keepers. Worse toward index 0.
pub const KEEPER_PROFIT_LIST: [Decimal; 8] = [
    dec!(0.20),
    dec!(0.15),
    dec!(0.125),
    dec!(0.10),
    dec!(0.075),
    dec!(0.05),
    dec!(0.025),
    dec!(0.01),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    BaseCase,
    DownsideCase,
    UpsideCase,
}

impl ScenarioKind {
    pub fn all() -> Vec<Self> {
        vec![Self::BaseCase, Self::DownsideCase, Self::UpsideCase]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BaseCase => "base_case",
            Self::DownsideCase => "downside_case",
            Self::UpsideCase => "upside_case",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub kind: ScenarioKind,
    pub jump_frequency: u32,
    pub jump_severity: Decimal,
    pub keeper_profit: Decimal,
    /// Price drop used to look up the share of vaults protected.
    pub share_vaults_protected_drop: Decimal,
    /// Replaces the observed CR distribution when set.
    pub cr_override: Option<DistributionOverride>,
}

/// The three scenarios evaluated for every debt level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSet {
    scenarios: Vec<ScenarioParams>,
}

impl ScenarioSet {
    /// Builds the scenario set from base case values, each of which must be
    /// on its grid.
    ///
    /// The values are located by exact match on their grids, and the downside
    /// and upside cases are picked by shifting those indices.
    pub fn from_base(
        jump_frequency: u32,
        jump_severity: Decimal,
        keeper_profit: Decimal,
    ) -> Result<Self> {
        let jf = index_of(&JUMP_FREQUENCY_LIST, &jump_frequency, "jump_frequency")?;
        let js = index_of(&JUMP_SEVERITY_LIST, &jump_severity, "jump_severity")?;
        let kp = index_of(&KEEPER_PROFIT_LIST, &keeper_profit, "keeper_profit")?;

        let base = ScenarioParams {
            kind: ScenarioKind::BaseCase,
            jump_frequency,
            jump_severity,
            keeper_profit,
            share_vaults_protected_drop: jump_severity,
            cr_override: None,
        };

        let downside = ScenarioParams {
            kind: ScenarioKind::DownsideCase,
            jump_frequency: shifted(&JUMP_FREQUENCY_LIST, jf, 1),
            jump_severity: shifted(&JUMP_SEVERITY_LIST, js, 2),
            keeper_profit: shifted(&KEEPER_PROFIT_LIST, kp, -1),
            share_vaults_protected_drop: shifted(&JUMP_SEVERITY_LIST, js, 1),
            cr_override: Some(DistributionOverride::Downside),
        };

        let upside = ScenarioParams {
            kind: ScenarioKind::UpsideCase,
            jump_frequency: shifted(&JUMP_FREQUENCY_LIST, jf, -1),
            jump_severity: shifted(&JUMP_SEVERITY_LIST, js, -2),
            keeper_profit: shifted(&KEEPER_PROFIT_LIST, kp, 1),
            share_vaults_protected_drop: shifted(&JUMP_SEVERITY_LIST, js, -1),
            cr_override: Some(DistributionOverride::Upside),
        };

        Ok(Self {
            scenarios: vec![base, downside, upside],
        })
    }

    pub fn scenarios(&self) -> &[ScenarioParams] {
        &self.scenarios
    }

    pub fn get(&self, kind: ScenarioKind) -> Option<&ScenarioParams> {
        self.scenarios.iter().find(|s| s.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

fn index_of<T: PartialEq + std::fmt::Display>(list: &[T], value: &T, name: &str) -> Result<usize> {
    list.iter().position(|v| v == value).ok_or_else(|| {
        RiskError::InvalidParameter(format!("{} {} is not on the scenario grid", name, value))
    })
}

fn shifted<T: Copy>(list: &[T], idx: usize, shift: isize) -> T {
    let last = list.len() as isize - 1;
    let target = (idx as isize + shift).clamp(0, last);
    list[target as usize]
}
