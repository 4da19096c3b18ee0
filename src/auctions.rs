//! Auction Kick/Duration Simulation
//!
//! Replays oracle prices around historical crashes to estimate how long
//! liquidation auctions take to clear under a given parameterization and how
//! far below the oracle price they clear.
//!
//! ## Auction Mechanics
//! 1. A kick happens every minute the oracle price (delayed one hour) is
//!    below its value an hour earlier
//! 2. The auction starts at `oracle price * buf`
//! 3. The price decays by `cut` every `step` seconds
//! 4. It is taken the first minute a taker can buy it and sell at market
//!    for `taker_profit`
//! 5. Auctions not taken within the maximum duration are dropped
//!
//! ## What We Measure
//! - Duration distribution (PDF/CDF by minute)
//! - Realized slippage against the oracle price at kick
//! - Percentile durations across a step x buf grid

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::SimulationCache;
use crate::config::AuctionConfig;
use crate::error::{RiskError, Result};
use crate::price_path::OraclePriceHistory;

/// Minutes between the oracle price and the price it is compared with.
const OSM_DELAY_MINUTES: i64 = 60;

/// Reference timestamps of known market crashes (unix seconds, UTC).
pub const REFERENCE_TIMESTAMPS: [i64; 5] = [
    1584014400, // 2020-03-12 12:00
    1621429200, // 2021-05-19 13:00
    1638590400, // 2021-12-04 04:00
    1655100000, // 2022-06-13 06:00
    1668016800, // 2022-11-09 18:00
];

pub fn reference_dates() -> Vec<DateTime<Utc>> {
    REFERENCE_TIMESTAMPS
        .iter()
        .filter_map(|ts| DateTime::from_timestamp(*ts, 0))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionParams {
    pub asset: String,
    /// Multiplicative price decrease per step, e.g. 0.99.
    pub cut: f64,
    pub step_seconds: u32,
    /// Starting price multiplier over the oracle price, e.g. 1.2.
    pub buf: f64,
    pub taker_profit: f64,
}

impl AuctionParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.cut > 0.0 && self.cut <= 1.0) {
            return Err(RiskError::InvalidParameter(format!("cut {} outside (0, 1]", self.cut)));
        }
        if self.step_seconds == 0 {
            return Err(RiskError::InvalidParameter("step must be positive".into()));
        }
        if self.buf < 1.0 {
            return Err(RiskError::InvalidParameter(format!("buf {} below 1", self.buf)));
        }
        if self.taker_profit < 0.0 {
            return Err(RiskError::InvalidParameter(format!(
                "taker profit {} is negative",
                self.taker_profit
            )));
        }
        Ok(())
    }

    pub fn cache_key(&self) -> String {
        format!(
            "auction-sim:{}:{}:{}:{}:{}",
            self.asset, self.cut, self.step_seconds, self.buf, self.taker_profit
        )
    }

    /// Auction price `elapsed_minutes` after a kick starting at `top`.
    pub fn price_after(&self, top: f64, elapsed_minutes: i64) -> f64 {
        let steps = (elapsed_minutes * 60) / self.step_seconds as i64;
        top * self.cut.powi(steps as i32)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CdfPoint {
    pub minute: u32,
    pub probability: f64,
    pub cumulative: f64,
}

/// Distribution of auction durations over minute buckets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationCdf {
    points: Vec<CdfPoint>,
}

impl DurationCdf {
    pub fn from_durations(durations: &[u32]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }

        let mut histogram: BTreeMap<u32, usize> = BTreeMap::new();
        for d in durations {
            *histogram.entry(*d).or_default() += 1;
        }

        let total = durations.len() as f64;
        let mut cumulative = 0usize;
        let points = histogram
            .into_iter()
            .map(|(minute, count)| {
                cumulative += count;
                CdfPoint {
                    minute,
                    probability: count as f64 / total,
                    cumulative: cumulative as f64 / total,
                }
            })
            .collect();

        Self { points }
    }

    pub fn points(&self) -> &[CdfPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Duration whose cumulative probability is closest to `p`.
    ///
    /// Equal distances resolve to the shorter duration.
    pub fn percentile_duration(&self, p: f64) -> Option<u32> {
        if self.points.is_empty() {
            return None;
        }

        let idx = self.points.partition_point(|pt| pt.cumulative < p);
        let above = self.points.get(idx);
        let below = idx.checked_sub(1).and_then(|i| self.points.get(i));

        match (below, above) {
            (Some(b), Some(a)) => {
                if (p - b.cumulative).abs() <= (a.cumulative - p).abs() {
                    Some(b.minute)
                } else {
                    Some(a.minute)
                }
            }
            (Some(b), None) => Some(b.minute),
            (None, Some(a)) => Some(a.minute),
            (None, None) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlippageSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl SlippageSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Some(Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionOutcome {
    pub kicked_at: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Take price over oracle price at kick, minus one.
    pub slippage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuctionSimulationResult {
    pub params: AuctionParams,
    pub reference_dates: Vec<DateTime<Utc>>,
    pub kicks: usize,
    /// Kicks never taken within the maximum auction duration.
    pub dropped_auctions: usize,
    pub cdf: DurationCdf,
    /// `None` when no auction was taken.
    pub slippage: Option<SlippageSummary>,
}

/// Oracle prices around one reference date, loaded once per run.
pub struct PriceWindow {
    reference: DateTime<Utc>,
    /// First minute of kick scanning.
    scan_start: DateTime<Utc>,
    /// Minute prices starting two hours before `scan_start`.
    prices: Vec<f64>,
}

impl PriceWindow {
    pub fn load(
        history: &impl OraclePriceHistory,
        asset: &str,
        reference: DateTime<Utc>,
        config: &AuctionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let scan_start = reference - Duration::minutes(config.lookback_minutes);
        let first = scan_start - Duration::minutes(2 * OSM_DELAY_MINUTES);
        let len = 2 * OSM_DELAY_MINUTES + config.kick_window_minutes + config.max_auction_minutes;

        let prices = (0..len)
            .map(|m| {
                let at = first + Duration::minutes(m);
                let price = history.price_at(asset, at)?;
                price
                    .to_f64()
                    .ok_or_else(|| RiskError::InvalidParameter(format!("{} price {} at {}", asset, price, at)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            reference,
            scan_start,
            prices,
        })
    }

    pub fn reference(&self) -> DateTime<Utc> {
        self.reference
    }

    fn kicks(
        &self,
        params: &AuctionParams,
        config: &AuctionConfig,
        outcomes: &mut Vec<AuctionOutcome>,
    ) -> (usize, usize) {
        let offset = 2 * OSM_DELAY_MINUTES;
        let mut kicks = 0;
        let mut dropped = 0;

        for k in 0..config.kick_window_minutes {
            let now = (offset + k) as usize;
            let osm = self.prices[now - OSM_DELAY_MINUTES as usize];
            let prev_osm = self.prices[now - 2 * OSM_DELAY_MINUTES as usize];

            if osm >= prev_osm {
                continue;
            }
            kicks += 1;

            let top = osm * params.buf;
            let take = (0..config.max_auction_minutes).find_map(|elapsed| {
                let auction_price = params.price_after(top, elapsed);
                let market = self.prices[now + elapsed as usize];
                (auction_price * (1.0 + params.taker_profit) <= market).then_some((elapsed, auction_price))
            });

            match take {
                Some((elapsed, price)) => outcomes.push(AuctionOutcome {
                    kicked_at: self.scan_start + Duration::minutes(k),
                    duration_minutes: elapsed as u32,
                    slippage: price.min(top) / osm - 1.0,
                }),
                None => dropped += 1,
            }
        }

        (kicks, dropped)
    }
}

fn simulate_windows(
    windows: &[PriceWindow],
    params: &AuctionParams,
    config: &AuctionConfig,
) -> AuctionSimulationResult {
    let mut outcomes = Vec::new();
    let mut kicks = 0;
    let mut dropped = 0;

    for window in windows {
        let (k, d) = window.kicks(params, config, &mut outcomes);
        kicks += k;
        dropped += d;
    }

    let durations: Vec<u32> = outcomes.iter().map(|o| o.duration_minutes).collect();
    let slippages: Vec<f64> = outcomes.iter().map(|o| o.slippage).collect();

    AuctionSimulationResult {
        params: params.clone(),
        reference_dates: windows.iter().map(|w| w.reference).collect(),
        kicks,
        dropped_auctions: dropped,
        cdf: DurationCdf::from_durations(&durations),
        slippage: SlippageSummary::from_values(&slippages),
    }
}

fn load_windows(
    history: &impl OraclePriceHistory,
    asset: &str,
    dates: &[DateTime<Utc>],
    config: &AuctionConfig,
) -> Result<Vec<PriceWindow>> {
    dates
        .iter()
        .map(|date| PriceWindow::load(history, asset, *date, config))
        .collect()
}

pub fn simulate(
    history: &impl OraclePriceHistory,
    params: &AuctionParams,
    dates: &[DateTime<Utc>],
    config: &AuctionConfig,
) -> Result<AuctionSimulationResult> {
    config.validate()?;
    params.validate()?;
    let windows = load_windows(history, &params.asset, dates, config)?;
    let result = simulate_windows(&windows, params, config);

    if result.dropped_auctions > 0 {
        warn!(
            key = %params.cache_key(),
            dropped = result.dropped_auctions,
            "Auctions not taken within {} minutes were dropped",
            config.max_auction_minutes
        );
    }

    info!(
        key = %params.cache_key(),
        kicks = result.kicks,
        dropped = result.dropped_auctions,
        "Auction simulation finished"
    );

    Ok(result)
}

/// `simulate`, memoized by the parameter tuple.
pub fn simulate_cached(
    cache: &mut SimulationCache<AuctionSimulationResult>,
    now: DateTime<Utc>,
    history: &impl OraclePriceHistory,
    params: &AuctionParams,
    dates: &[DateTime<Utc>],
    config: &AuctionConfig,
) -> Result<AuctionSimulationResult> {
    cache.get_or_compute(&params.cache_key(), now, || simulate(history, params, dates, config))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentileDuration {
    pub percentile: f64,
    pub minutes: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub step_seconds: u32,
    pub buf: f64,
    pub kicks: usize,
    pub dropped_auctions: usize,
    pub durations: Vec<PercentileDuration>,
}

/// Runs the simulation for every step x buf combination of the config.
pub fn simulate_grid(
    history: &impl OraclePriceHistory,
    asset: &str,
    cut: f64,
    taker_profit: f64,
    dates: &[DateTime<Utc>],
    config: &AuctionConfig,
) -> Result<Vec<GridPoint>> {
    config.validate()?;
    let windows = load_windows(history, asset, dates, config)?;
    let mut grid = Vec::with_capacity(config.step_grid.len() * config.buf_grid.len());

    for step_seconds in &config.step_grid {
        for buf in &config.buf_grid {
            let params = AuctionParams {
                asset: asset.to_string(),
                cut,
                step_seconds: *step_seconds,
                buf: *buf,
                taker_profit,
            };
            params.validate()?;

            let result = simulate_windows(&windows, &params, config);
            let durations = config
                .percentiles
                .iter()
                .map(|p| PercentileDuration {
                    percentile: *p,
                    minutes: result.cdf.percentile_duration(*p),
                })
                .collect();

            grid.push(GridPoint {
                step_seconds: *step_seconds,
                buf: *buf,
                kicks: result.kicks,
                dropped_auctions: result.dropped_auctions,
                durations,
            });
        }
    }

    let dropped: usize = grid.iter().map(|p| p.dropped_auctions).sum();
    if dropped > 0 {
        warn!(
            asset = %asset,
            dropped,
            points = grid.iter().filter(|p| p.dropped_auctions > 0).count(),
            "Auctions not taken within {} minutes were dropped",
            config.max_auction_minutes
        );
    }

    info!(asset = %asset, points = grid.len(), "Auction grid finished");
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_path::{generate_crash_path, CrashPathConfig, FnPriceHistory};
    use chrono::TimeZone;
    use rand::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 6, 13, 6, 0, 0).unwrap()
    }

    /// Minute at which the test series first moves: 100 minutes into the scan.
    fn first_move() -> DateTime<Utc> {
        reference() - Duration::minutes(LOOKBACK) + Duration::minutes(100)
    }

    const LOOKBACK: i64 = crate::config::LOOKBACK_MINUTES;

    fn params(step_seconds: u32, buf: f64) -> AuctionParams {
        AuctionParams {
            asset: "ETH".into(),
            cut: 0.99,
            step_seconds,
            buf,
            taker_profit: 0.0,
        }
    }

    fn single_drop() -> FnPriceHistory<impl Fn(&str, DateTime<Utc>) -> Option<Decimal>> {
        let t0 = first_move();
        FnPriceHistory(move |_: &str, at: DateTime<Utc>| {
            Some(if at < t0 { dec!(100) } else { dec!(90) })
        })
    }

    #[test]
    fn test_reference_dates() {
        let dates = reference_dates();
        assert_eq!(dates.len(), 5);
        assert_eq!(dates[0], Utc.with_ymd_and_hms(2020, 3, 12, 12, 0, 0).unwrap());
        assert_eq!(dates[4], Utc.with_ymd_and_hms(2022, 11, 9, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_flat_prices_never_kick() {
        let history = FnPriceHistory(|_: &str, _: DateTime<Utc>| Some(dec!(2000)));
        let config = AuctionConfig::default();

        let result = simulate(&history, &params(90, 1.2), &[reference()], &config).unwrap();

        assert_eq!(result.kicks, 0);
        assert_eq!(result.dropped_auctions, 0);
        assert!(result.cdf.is_empty());
        assert!(result.slippage.is_none());
    }

    #[test]
    fn test_single_drop_kicks_for_one_hour() {
        let config = AuctionConfig::default();
        let result = simulate(&single_drop(), &params(90, 1.2), &[reference()], &config).unwrap();

        assert_eq!(result.kicks, 60);
        assert_eq!(result.dropped_auctions, 0);

        // 1.2 * 0.99^19 is the first decayed price under the market,
        // step 19 starts at 28.5 minutes
        assert_eq!(result.cdf.points().len(), 1);
        assert_eq!(result.cdf.points()[0].minute, 29);
        assert!((result.cdf.points()[0].cumulative - 1.0).abs() < 1e-12);

        let slippage = result.slippage.unwrap();
        let expected = 1.2 * 0.99f64.powi(19) - 1.0;
        assert!((slippage.median - expected).abs() < 1e-9);
        assert!(slippage.max < 0.0);
    }

    #[test]
    fn test_taker_profit_delays_take() {
        let config = AuctionConfig::default();
        let mut with_profit = params(90, 1.2);
        with_profit.taker_profit = 0.05;

        let base = simulate(&single_drop(), &params(90, 1.2), &[reference()], &config).unwrap();
        let delayed = simulate(&single_drop(), &with_profit, &[reference()], &config).unwrap();

        assert!(delayed.cdf.points()[0].minute > base.cdf.points()[0].minute);
        assert!(delayed.slippage.unwrap().median < base.slippage.unwrap().median);
    }

    #[test]
    fn test_untaken_auctions_are_dropped() {
        let t0 = first_move();
        let t1 = t0 + Duration::minutes(61);
        let history = FnPriceHistory(move |_: &str, at: DateTime<Utc>| {
            Some(if at < t0 {
                dec!(100)
            } else if at < t1 {
                dec!(90)
            } else {
                dec!(0.0001)
            })
        });
        let config = AuctionConfig::default();

        let result = simulate(&history, &params(90, 1.2), &[reference()], &config).unwrap();

        // kicks off the 90 oracle price never clear against 0.0001,
        // kicks off the 0.0001 oracle price clear as usual
        assert_eq!(result.kicks, 120);
        assert_eq!(result.dropped_auctions, 60);
        assert_eq!(result.cdf.points()[0].minute, 29);
    }

    #[test]
    fn test_missing_minute_surfaces() {
        let gap = first_move();
        let history = FnPriceHistory(move |_: &str, at: DateTime<Utc>| {
            (at != gap).then_some(dec!(100))
        });

        let result = simulate(&history, &params(90, 1.2), &[reference()], &AuctionConfig::default());
        assert!(matches!(result, Err(RiskError::MissingData(_))));
    }

    #[test]
    fn test_invalid_window_config_is_an_error() {
        let config = AuctionConfig {
            max_auction_minutes: -100,
            ..AuctionConfig::default()
        };

        let result = simulate(&single_drop(), &params(90, 1.2), &[reference()], &config);
        assert!(matches!(result, Err(RiskError::InvalidParameter(_))));

        let grid = simulate_grid(&single_drop(), "ETH", 0.99, 0.0, &[reference()], &config);
        assert!(matches!(grid, Err(RiskError::InvalidParameter(_))));

        let no_lookback = AuctionConfig {
            lookback_minutes: -30,
            ..AuctionConfig::default()
        };
        assert!(PriceWindow::load(&single_drop(), "ETH", reference(), &no_lookback).is_err());
    }

    #[test]
    fn test_grid_reports_dropped_per_point() {
        let t0 = first_move();
        let t1 = t0 + Duration::minutes(61);
        let history = FnPriceHistory(move |_: &str, at: DateTime<Utc>| {
            Some(if at < t0 {
                dec!(100)
            } else if at < t1 {
                dec!(90)
            } else {
                dec!(0.0001)
            })
        });
        let config = AuctionConfig {
            step_grid: vec![90, 120],
            buf_grid: vec![1.1, 1.2],
            ..AuctionConfig::default()
        };

        let grid = simulate_grid(&history, "ETH", 0.99, 0.0, &[reference()], &config).unwrap();

        assert_eq!(grid.len(), 4);
        assert!(grid.iter().all(|p| p.kicks == 120 && p.dropped_auctions == 60));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(params(0, 1.2).validate().is_err());
        assert!(params(90, 0.9).validate().is_err());
        let mut p = params(90, 1.2);
        p.cut = 1.5;
        assert!(p.validate().is_err());
        assert!(params(90, 1.2).validate().is_ok());
    }

    #[test]
    fn test_cache_key_covers_every_parameter() {
        let a = params(90, 1.2);
        let mut b = a.clone();
        b.taker_profit = 0.01;
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), params(90, 1.25).cache_key());
        assert_eq!(a.cache_key(), params(90, 1.2).cache_key());
    }

    #[test]
    fn test_percentile_nearest_with_shorter_tie_break() {
        let cdf = DurationCdf::from_durations(&[10, 20, 20, 30]);

        assert_eq!(cdf.percentile_duration(0.0), Some(10));
        // 0.25 and 0.75 are equally far from 0.5
        assert_eq!(cdf.percentile_duration(0.5), Some(10));
        assert_eq!(cdf.percentile_duration(0.7), Some(20));
        assert_eq!(cdf.percentile_duration(0.95), Some(30));
        assert_eq!(cdf.percentile_duration(1.0), Some(30));
        assert_eq!(DurationCdf::default().percentile_duration(0.5), None);
    }

    #[test]
    fn test_slippage_summary() {
        let summary = SlippageSummary::from_values(&[-0.1, -0.3, -0.2, 0.0]).unwrap();
        assert_eq!(summary.min, -0.3);
        assert_eq!(summary.max, 0.0);
        assert!((summary.mean + 0.15).abs() < 1e-12);
        assert!((summary.median + 0.15).abs() < 1e-12);
        assert!(SlippageSummary::from_values(&[]).is_none());
    }

    #[test]
    fn test_slippage_never_above_buf() {
        let config = AuctionConfig::default();
        // path covers the whole window: 300 minutes before through 1620 after
        let start = reference() - Duration::hours(5);
        let mut rng = StdRng::seed_from_u64(5);

        for buf in [1.05, 1.2, 1.3] {
            let path = generate_crash_path(&CrashPathConfig::default(), "ETH", start, &mut rng).unwrap();
            let result = simulate(&path, &params(60, buf), &[reference()], &config).unwrap();

            assert!(result.kicks > 0);
            if let Some(slippage) = result.slippage {
                assert!(slippage.max <= buf - 1.0 + 1e-12);
            }
        }
    }

    #[test]
    fn test_grid_percentiles() {
        let config = AuctionConfig::default();
        let grid = simulate_grid(&single_drop(), "ETH", 0.99, 0.0, &[reference()], &config).unwrap();

        assert_eq!(grid.len(), 72);
        assert!(grid.iter().all(|p| p.kicks == 60 && p.dropped_auctions == 0));

        // 1.05 * 0.99^5 < 1 with one step per minute
        let fastest = grid.iter().find(|p| p.step_seconds == 60 && p.buf == 1.05).unwrap();
        assert_eq!(fastest.durations[0].minutes, Some(5));

        for step in &config.step_grid {
            let row: Vec<u32> = grid
                .iter()
                .filter(|p| p.step_seconds == *step)
                .filter_map(|p| p.durations[0].minutes)
                .collect();
            assert!(row.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn test_cached_simulation_reuses_result() {
        let mut cache = SimulationCache::auction();
        let config = AuctionConfig::default();
        let now = reference();

        let first = simulate_cached(&mut cache, now, &single_drop(), &params(90, 1.2), &[reference()], &config).unwrap();

        // a failing history proves the second call is served from the cache
        let broken = FnPriceHistory(|_: &str, _: DateTime<Utc>| None);
        let second = simulate_cached(&mut cache, now + Duration::days(1), &broken, &params(90, 1.2), &[reference()], &config).unwrap();
        assert_eq!(first, second);

        let expired = simulate_cached(&mut cache, now + Duration::days(8), &broken, &params(90, 1.2), &[reference()], &config);
        assert!(expired.is_err());
    }
}
