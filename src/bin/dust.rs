//! Dust Recommendation Binary
//!
//! Prints the recommended minimum vault debt across gas price regimes.
//!
//! ## Usage
//! ```bash
//! cargo run --bin dust --release
//! ```

use rand::prelude::*;
use rand_distr::{Distribution, LogNormal};
use rust_decimal_macros::dec;
use tracing::error;
use tracing_subscriber::EnvFilter;

use vault_risk_simulation::dust::{dust_from_gas_history, DustParams};
use vault_risk_simulation::{Result, RiskError};

const GAS_SAMPLES: usize = 10_000;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!("Dust recommendation failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let params = DustParams::default();

    // gas prices in gwei, median around 40
    let mut rng = StdRng::seed_from_u64(42);
    let log_normal = LogNormal::new(40f64.ln(), 0.6)
        .map_err(|e| RiskError::InvalidParameter(format!("gas distribution: {}", e)))?;
    let gas: Vec<f64> = (0..GAS_SAMPLES).map(|_| log_normal.sample(&mut rng)).collect();

    println!("=======================================================");
    println!("  Dust Recommendation");
    println!("  Minimum debt worth a keeper's gas");
    println!("=======================================================");
    println!();
    println!("Parameters:");
    println!("  ETH price:        ${}", params.eth_price);
    println!("  Liquidation gas:  {}", params.liquidation_gas);
    println!("  Tip:              {} DAI", params.tip);
    println!("  Chip:             {}%", params.chip * dec!(100));
    println!("  Keeper margin:    {}%", params.keeper_margin * dec!(100));
    println!();

    println!("| Gas pct | Gas (gwei) | Cost (USD) | Dust (DAI) |");
    println!("|---------|------------|------------|------------|");

    for p in [0.5, 0.75, 0.9, 0.95, 0.99] {
        let rec = dust_from_gas_history(&gas, p, &params)?;
        println!(
            "| {:>6}% | {:>10} | {:>10.2} | {:>10} |",
            (p * 100.0).round() as u32,
            rec.gas_price_gwei,
            rec.liquidation_cost,
            rec.dust
        );
    }

    Ok(())
}
