//! Auction Duration Simulation Binary
//!
//! Replays synthetic crash paths placed at each historical reference date and
//! reports auction duration percentiles over the step x buf grid.
//!
//! ## Usage
//! ```bash
//! cargo run --bin auctions --release
//! ```

use chrono::{Duration, Utc};
use rand::prelude::*;
use tracing::error;
use tracing_subscriber::EnvFilter;

use vault_risk_simulation::auctions::{reference_dates, simulate_cached, simulate_grid, AuctionParams};
use vault_risk_simulation::cache::SimulationCache;
use vault_risk_simulation::config::AuctionConfig;
use vault_risk_simulation::price_path::{generate_crash_path, CrashPathConfig, MinutePriceSeries, PriceModel};
use vault_risk_simulation::Result;

const ASSET: &str = "ETH";
const CUT: f64 = 0.99;
const TAKER_PROFIT: f64 = 0.01;
const SEED: u64 = 2020;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!("Auction simulation failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = AuctionConfig::default();
    let dates = reference_dates();

    println!("=======================================================");
    println!("  Auction Kick/Duration Simulation");
    println!("  Synthetic crashes at historical reference dates");
    println!("=======================================================");
    println!();
    println!("Parameters:");
    println!("  Asset:          {}", ASSET);
    println!("  Cut:            {}", CUT);
    println!("  Taker profit:   {:.1}%", TAKER_PROFIT * 100.0);
    println!("  Reference dates:");
    for date in &dates {
        println!("    {}", date);
    }
    println!();

    for model in PriceModel::all() {
        let history = crash_history(model, &dates, &config)?;

        println!("=======================================================");
        println!("Price Model: {}", model.name());
        println!("=======================================================");
        println!();

        let grid = simulate_grid(&history, ASSET, CUT, TAKER_PROFIT, &dates, &config)?;

        println!("Median duration (minutes), rows step seconds, columns buf");
        print!("| step |");
        for buf in &config.buf_grid {
            print!(" {:>6.2} |", buf);
        }
        println!();
        println!("|------|{}", "--------|".repeat(config.buf_grid.len()));

        for step in &config.step_grid {
            print!("| {:>4} |", step);
            for point in grid.iter().filter(|p| p.step_seconds == *step) {
                let median = point
                    .durations
                    .iter()
                    .find(|d| d.percentile == 0.5)
                    .and_then(|d| d.minutes)
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".into());
                print!(" {:>6} |", median);
            }
            println!();
        }
        println!();

        let mut cache = SimulationCache::auction();
        let params = AuctionParams {
            asset: ASSET.into(),
            cut: CUT,
            step_seconds: 90,
            buf: 1.2,
            taker_profit: TAKER_PROFIT,
        };
        let result = simulate_cached(&mut cache, Utc::now(), &history, &params, &dates, &config)?;

        println!("Auction step=90s buf=1.20");
        println!("{}", "-".repeat(50));
        println!("  Kicks:              {}", result.kicks);
        println!("  Dropped auctions:   {}", result.dropped_auctions);
        for p in &config.percentiles {
            println!(
                "  P{:<3} duration:      {} min",
                (p * 100.0).round() as u32,
                result
                    .cdf
                    .percentile_duration(*p)
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".into())
            );
        }
        match &result.slippage {
            Some(s) => {
                println!("  Slippage min:       {:.2}%", s.min * 100.0);
                println!("  Slippage median:    {:.2}%", s.median * 100.0);
                println!("  Slippage mean:      {:.2}%", s.mean * 100.0);
                println!("  Slippage max:       {:.2}%", s.max * 100.0);
            }
            None => println!("  No auction was taken"),
        }
        println!();
    }

    Ok(())
}

/// One crash path per reference date, merged into a single series.
fn crash_history(
    model: PriceModel,
    dates: &[chrono::DateTime<Utc>],
    config: &AuctionConfig,
) -> Result<MinutePriceSeries> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let lead = config.lookback_minutes + 120;
    let path_config = CrashPathConfig {
        model,
        minutes: (lead + config.kick_window_minutes + config.max_auction_minutes) as usize,
        crash_at: lead as usize,
        ..CrashPathConfig::default()
    };

    let mut history = MinutePriceSeries::new(ASSET);
    for date in dates {
        let start = *date - Duration::minutes(lead);
        let path = generate_crash_path(&path_config, ASSET, start, &mut rng)?;
        history.prices.extend(path.prices);
    }

    Ok(history)
}
