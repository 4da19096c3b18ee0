//! Oracle Price History
//!
//! Minute-granularity price series consumed by the auction simulator, and a
//! generator of synthetic crash paths for running it without historical
//! oracle data.
//!
//! ## Price Models
//! - Geometric Brownian Motion (baseline)
//! - Jump-diffusion (Merton model)
//! - GARCH (volatility clustering)
//!
//! Every model gets a scheduled crash on top, so a path always contains the
//! kind of drawdown that triggers liquidation auctions.

use std::collections::BTreeMap;
use std::f64::consts::E;

use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand_distr::{Distribution, Normal, Poisson};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, Result};

const MINUTES_PER_YEAR: f64 = 365.0 * 24.0 * 60.0;
const PRICE_FLOOR: f64 = 0.01;

/// Oracle price at a minute. Missing minutes are errors, never skipped.
pub trait OraclePriceHistory {
    fn price_at(&self, asset: &str, at: DateTime<Utc>) -> Result<Decimal>;
}

fn minute_of(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(60)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MinutePriceSeries {
    pub asset: String,
    /// Unix minute -> price.
    pub prices: BTreeMap<i64, Decimal>,
}

impl MinutePriceSeries {
    pub fn new(asset: &str) -> Self {
        Self {
            asset: asset.to_string(),
            prices: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, at: DateTime<Utc>, price: Decimal) {
        self.prices.insert(minute_of(at), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl OraclePriceHistory for MinutePriceSeries {
    fn price_at(&self, asset: &str, at: DateTime<Utc>) -> Result<Decimal> {
        if asset != self.asset {
            return Err(RiskError::MissingData(format!("no price series for {}", asset)));
        }
        self.prices
            .get(&minute_of(at))
            .copied()
            .ok_or_else(|| RiskError::MissingData(format!("{} price at {}", asset, at)))
    }
}

/// Price history backed by a closure.
pub struct FnPriceHistory<F>(pub F);

impl<F> OraclePriceHistory for FnPriceHistory<F>
where
    F: Fn(&str, DateTime<Utc>) -> Option<Decimal>,
{
    fn price_at(&self, asset: &str, at: DateTime<Utc>) -> Result<Decimal> {
        (self.0)(asset, at).ok_or_else(|| RiskError::MissingData(format!("{} price at {}", asset, at)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PriceModel {
    Gbm,
    JumpDiffusion,
    Garch,
}

impl PriceModel {
    pub fn all() -> Vec<Self> {
        vec![Self::Gbm, Self::JumpDiffusion, Self::Garch]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Gbm => "GBM (baseline)",
            Self::JumpDiffusion => "Jump-Diffusion",
            Self::Garch => "GARCH",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrashPathConfig {
    pub model: PriceModel,
    pub initial_price: f64,
    pub minutes: usize,
    pub drift: f64,          // Annual drift (mu)
    pub volatility: f64,     // Annual volatility (sigma)
    pub jump_intensity: f64, // Jumps per year (lambda)
    pub jump_mean: f64,      // Mean jump size
    pub jump_std: f64,       // Jump size std dev
    /// Minute at which the crash starts.
    pub crash_at: usize,
    /// Total fractional drop of the crash, e.g. -0.3.
    pub crash_size: f64,
    /// Minutes over which the crash unfolds.
    pub crash_minutes: usize,
}

impl Default for CrashPathConfig {
    fn default() -> Self {
        Self {
            model: PriceModel::JumpDiffusion,
            initial_price: 2000.0,
            minutes: 32 * 60,
            drift: -0.5,
            volatility: 1.0,
            jump_intensity: 50.0,
            jump_mean: -0.02,
            jump_std: 0.01,
            crash_at: 4 * 60,
            crash_size: -0.3,
            crash_minutes: 120,
        }
    }
}

/// Generates `config.minutes + 1` minute prices starting at `start`.
pub fn generate_crash_path(
    config: &CrashPathConfig,
    asset: &str,
    start: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<MinutePriceSeries> {
    let dt = 1.0 / MINUTES_PER_YEAR;
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| RiskError::InvalidParameter(format!("normal distribution: {}", e)))?;
    let jump_normal = Normal::new(config.jump_mean, config.jump_std)
        .map_err(|e| RiskError::InvalidParameter(format!("jump distribution: {}", e)))?;
    let poisson = Poisson::new(config.jump_intensity * dt)
        .map_err(|e| RiskError::InvalidParameter(format!("jump intensity: {}", e)))?;

    let crash_minutes = config.crash_minutes.max(1);
    let crash_step = (1.0 + config.crash_size).powf(1.0 / crash_minutes as f64);

    let mut price = config.initial_price;
    let mut current_vol = config.volatility;
    let mut prices = Vec::with_capacity(config.minutes + 1);
    prices.push(price);

    for minute in 1..=config.minutes {
        let z: f64 = normal.sample(rng);

        let ret = match config.model {
            PriceModel::Gbm => {
                (config.drift - 0.5 * config.volatility.powi(2)) * dt
                    + config.volatility * dt.sqrt() * z
            }

            PriceModel::JumpDiffusion => {
                let diffusion = (config.drift - 0.5 * config.volatility.powi(2)) * dt
                    + config.volatility * dt.sqrt() * z;

                let num_jumps = poisson.sample(rng) as u64;
                let jump_component: f64 = (0..num_jumps).map(|_| jump_normal.sample(rng)).sum();

                diffusion + jump_component
            }

            PriceModel::Garch => {
                let alpha = 0.1;
                let beta = 0.85;
                let omega = config.volatility.powi(2) * (1.0 - alpha - beta);

                let shock = current_vol * z;
                current_vol = (omega + alpha * shock.powi(2) + beta * current_vol.powi(2)).sqrt();
                current_vol = current_vol.clamp(0.5, 3.0);

                (config.drift - 0.5 * current_vol.powi(2)) * dt + current_vol * dt.sqrt() * z
            }
        };

        price *= E.powf(ret);
        if minute > config.crash_at && minute <= config.crash_at + crash_minutes {
            price *= crash_step;
        }

        price = price.max(PRICE_FLOOR);
        prices.push(price);
    }

    let mut series = MinutePriceSeries::new(asset);
    for (minute, price) in prices.into_iter().enumerate() {
        let value = Decimal::from_f64(price)
            .ok_or_else(|| RiskError::InvalidParameter(format!("price {} not representable", price)))?
            .round_dp(8);
        series.insert(start + Duration::minutes(minute as i64), value);
    }

    Ok(series)
}

/// Value at quantile `p` of an ascending slice, nearest rank.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
