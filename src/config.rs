//! Simulation Configuration
//!
//! Model constants and the run configuration. The constants are the values
//! the risk model is calibrated with; `SimulationConfig::default()` reproduces
//! them and a JSON config can override any section.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, Result};

/// Risk premium (whole percent points) at which a debt ceiling is considered too high.
pub const RISK_PREMIUM_THRESHOLD: Decimal = dec!(10);

/// Slippage applied when a liquidation exceeds the largest quoted trade size.
pub const MAX_SLIPPAGE: Decimal = dec!(0.8);

pub const CANDIDATE_COUNT: usize = 40;
pub const CANDIDATE_START: Decimal = dec!(0.25);
pub const CANDIDATE_STEP: Decimal = dec!(0.125);
pub const CANDIDATE_ROUNDING_UNIT: Decimal = dec!(10000);
pub const CANDIDATE_SIGNIFICANT_FIGURES: u32 = 2;

pub const HIGH_RISK_WEIGHT: Decimal = dec!(0.5);
pub const MEDIUM_RISK_WEIGHT: Decimal = dec!(0.25);
pub const LOW_RISK_WEIGHT: Decimal = dec!(0.05);

pub const LOOKBACK_MINUTES: i64 = 180;
pub const KICK_WINDOW_MINUTES: i64 = 360;
pub const MAX_AUCTION_MINUTES: i64 = 1440;

pub const STEP_GRID_SECONDS: [u32; 12] = [60, 70, 80, 90, 100, 110, 120, 130, 140, 150, 160, 170];
pub const BUF_GRID: [f64; 6] = [1.05, 1.10, 1.15, 1.20, 1.25, 1.30];
pub const DEFAULT_PERCENTILES: [f64; 4] = [0.5, 0.75, 0.9, 0.95];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPremiumConfig {
    pub threshold: Decimal,
    pub max_slippage: Decimal,
    pub candidate_count: usize,
    pub candidate_start: Decimal,
    pub candidate_step: Decimal,
    pub rounding_unit: Decimal,
    pub significant_figures: u32,
}

impl Default for RiskPremiumConfig {
    fn default() -> Self {
        Self {
            threshold: RISK_PREMIUM_THRESHOLD,
            max_slippage: MAX_SLIPPAGE,
            candidate_count: CANDIDATE_COUNT,
            candidate_start: CANDIDATE_START,
            candidate_step: CANDIDATE_STEP,
            rounding_unit: CANDIDATE_ROUNDING_UNIT,
            significant_figures: CANDIDATE_SIGNIFICANT_FIGURES,
        }
    }
}

/// Assumed fraction of at-risk debt in each tier that reaches liquidation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionWeights {
    pub high: Decimal,
    pub medium: Decimal,
    pub low: Decimal,
}

impl Default for ProtectionWeights {
    fn default() -> Self {
        Self {
            high: HIGH_RISK_WEIGHT,
            medium: MEDIUM_RISK_WEIGHT,
            low: LOW_RISK_WEIGHT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
    /// Minutes before the reference timestamp where kick scanning starts.
    pub lookback_minutes: i64,
    /// Number of minutes scanned for kicks.
    pub kick_window_minutes: i64,
    /// Auctions not taken within this many minutes are dropped.
    pub max_auction_minutes: i64,
    pub step_grid: Vec<u32>,
    pub buf_grid: Vec<f64>,
    pub percentiles: Vec<f64>,
}

impl AuctionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lookback_minutes < 0 {
            return Err(RiskError::InvalidParameter(format!(
                "lookback_minutes {} is negative",
                self.lookback_minutes
            )));
        }
        if self.kick_window_minutes <= 0 || self.max_auction_minutes <= 0 {
            return Err(RiskError::InvalidParameter(
                "auction windows must be positive".into(),
            ));
        }
        if self.percentiles.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(RiskError::InvalidParameter(
                "percentiles must lie in [0, 1]".into(),
            ));
        }

        Ok(())
    }
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: LOOKBACK_MINUTES,
            kick_window_minutes: KICK_WINDOW_MINUTES,
            max_auction_minutes: MAX_AUCTION_MINUTES,
            step_grid: STEP_GRID_SECONDS.to_vec(),
            buf_grid: BUF_GRID.to_vec(),
            percentiles: DEFAULT_PERCENTILES.to_vec(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub risk_premium: RiskPremiumConfig,
    pub protection: ProtectionWeights,
    pub auctions: AuctionConfig,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        let rp = &self.risk_premium;
        if rp.rounding_unit <= Decimal::ZERO {
            return Err(RiskError::InvalidParameter(
                "rounding_unit must be positive".into(),
            ));
        }
        if rp.significant_figures == 0 {
            return Err(RiskError::InvalidParameter(
                "significant_figures must be at least 1".into(),
            ));
        }
        if rp.max_slippage < Decimal::ZERO || rp.max_slippage > Decimal::ONE {
            return Err(RiskError::InvalidParameter(format!(
                "max_slippage {} outside [0, 1]",
                rp.max_slippage
            )));
        }

        self.auctions.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JsonDeserialization;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.risk_premium.threshold, dec!(10));
        assert_eq!(config.auctions.step_grid.len(), 12);
        assert_eq!(config.auctions.buf_grid.len(), 6);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimulationConfig::from_json(
            r#"{ "auctions": { "max_auction_minutes": 720 } }"#,
        )
        .unwrap();

        assert_eq!(config.auctions.max_auction_minutes, 720);
        assert_eq!(config.auctions.lookback_minutes, LOOKBACK_MINUTES);
        assert_eq!(config.protection, ProtectionWeights::default());
    }

    #[test]
    fn test_invalid_percentile_rejected() {
        let mut config = SimulationConfig::default();
        config.auctions.percentiles = vec![1.5];
        assert!(matches!(
            config.validate(),
            Err(RiskError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_auction_windows_rejected() {
        let negative_max = AuctionConfig {
            max_auction_minutes: -100,
            ..AuctionConfig::default()
        };
        assert!(matches!(negative_max.validate(), Err(RiskError::InvalidParameter(_))));

        let negative_lookback = AuctionConfig {
            lookback_minutes: -1,
            ..AuctionConfig::default()
        };
        assert!(negative_lookback.validate().is_err());

        let zero_window = AuctionConfig {
            kick_window_minutes: 0,
            ..AuctionConfig::default()
        };
        assert!(zero_window.validate().is_err());

        let no_lookback = AuctionConfig {
            lookback_minutes: 0,
            ..AuctionConfig::default()
        };
        assert!(no_lookback.validate().is_ok());
    }
}
