//! Risk Premium Sweep Binary
//!
//! Sweeps candidate debt ceilings for every collateral class of a market
//! snapshot and prints the recommended max debt ceiling per class.
//!
//! ## Usage
//! ```bash
//! # Demo snapshot
//! cargo run --bin risk_premium --release
//!
//! # Snapshot and config from JSON, results appended as JSON lines
//! cargo run --bin risk_premium --release -- snapshot.json config.json results.jsonl
//! ```

use std::fs::OpenOptions;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::error;
use tracing_subscriber::EnvFilter;

use vault_risk_simulation::config::SimulationConfig;
use vault_risk_simulation::market::{
    CollateralClass, MarketSnapshot, ProtectionExposure, SlippagePoint, VaultPosition,
};
use vault_risk_simulation::risk_premium::{run_batch, RiskPremiumResult};
use vault_risk_simulation::scenario::ScenarioSet;
use vault_risk_simulation::sink::{JsonLinesSink, ResultSink};
use vault_risk_simulation::{JsonDeserialization, Result, RiskError};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        error!("Risk premium run failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let snapshot = match args.first() {
        Some(path) => MarketSnapshot::from_json_file(path)?,
        None => demo_snapshot(),
    };
    let config = match args.get(1) {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::default(),
    };
    config.validate()?;

    let scenarios = ScenarioSet::from_base(2, dec!(-0.5), dec!(0.05))?;

    println!("=======================================================");
    println!("  Risk Premium Sweep");
    println!("  Recommended max debt ceiling per collateral class");
    println!("=======================================================");
    println!();
    println!("Parameters:");
    println!("  Threshold:         {}%", config.risk_premium.threshold);
    println!("  Candidates:        {} + anchors", config.risk_premium.candidate_count);
    for scenario in scenarios.scenarios() {
        println!(
            "  {:18} jf={} js={} kp={}",
            scenario.kind.name(),
            scenario.jump_frequency,
            scenario.jump_severity,
            scenario.keeper_profit
        );
    }
    println!();

    let results = run_batch(&snapshot, &snapshot.asset_groups(), &scenarios, &config, Utc::now());

    for result in &results {
        print_result(result);
    }

    print_summary_table(&results);

    if let Some(path) = args.get(2) {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| RiskError::Serialization(e.to_string()))?;
        let mut sink = JsonLinesSink::new(file);
        for result in &results {
            sink.append_risk_premium(result)?;
        }
        println!();
        println!("Appended {} results to {}", sink.records(), path);
    }

    Ok(())
}

fn print_result(result: &RiskPremiumResult) {
    println!("Collateral: {} ({})", result.ilk, result.asset);
    println!("{}", "-".repeat(50));
    println!("  Current debt:        {:.0}", result.current_debt);
    println!("  Debt ceiling:        {:.0}", result.debt_ceiling);
    println!("  Share protected:     {}", result.share_protected);
    println!("  Points:");
    for point in result.curve.iter().step_by(5) {
        println!(
            "    debt {:>14.0}  risk premium {:>5}%",
            point.simulated_debt, point.risk_premium
        );
    }
    println!();
}

fn print_summary_table(results: &[RiskPremiumResult]) {
    println!("=======================================================");
    println!("  Summary Table");
    println!("=======================================================");
    println!();
    println!("| Ilk      | Current Debt   | Current RP | Max Debt Ceiling |");
    println!("|----------|----------------|------------|------------------|");

    for result in results {
        let current = result
            .current_risk_premium
            .map(|rp| format!("{}%", rp))
            .unwrap_or_else(|| "-".into());
        let ceiling = result
            .max_debt_ceiling
            .map(|c| format!("{:.0}", c))
            .unwrap_or_else(|| "unbounded".into());

        println!(
            "| {:8} | {:>14.0} | {:>10} | {:>16} |",
            result.ilk, result.current_debt, current, ceiling
        );
    }
}

fn class(ilk: &str, asset: &str, lr: Decimal, debt: Decimal, ceiling: Decimal) -> CollateralClass {
    CollateralClass {
        ilk: ilk.into(),
        asset: asset.into(),
        liquidation_ratio: lr,
        debt,
        debt_ceiling: ceiling,
    }
}

fn vaults(rows: &[(Decimal, Decimal)]) -> Vec<VaultPosition> {
    rows.iter()
        .map(|(collateralization, debt)| VaultPosition {
            collateralization: *collateralization,
            debt: *debt,
        })
        .collect()
}

/// At-risk debt grows linearly with the drop, split evenly across tiers.
fn with_exposure(mut snapshot: MarketSnapshot, ilk: &str, debt: Decimal) -> MarketSnapshot {
    for drop in (30..=80).step_by(5) {
        let tier = debt * Decimal::from(drop) / dec!(300);
        snapshot = snapshot.with_protection(
            ilk,
            drop,
            ProtectionExposure {
                high: tier,
                medium: tier,
                low: tier,
            },
        );
    }
    snapshot
}

fn demo_snapshot() -> MarketSnapshot {
    let snapshot = MarketSnapshot::default()
        .with_class(class("ETH-A", "ETH", dec!(1.45), dec!(350000000), dec!(500000000)))
        .with_class(class("ETH-B", "ETH", dec!(1.30), dec!(60000000), dec!(100000000)))
        .with_class(class("WBTC-A", "WBTC", dec!(1.45), dec!(80000000), dec!(150000000)))
        .with_positions(
            "ETH-A",
            vaults(&[
                (dec!(155), dec!(40000000)),
                (dec!(180), dec!(70000000)),
                (dec!(220), dec!(90000000)),
                (dec!(300), dec!(100000000)),
                (dec!(450), dec!(50000000)),
            ]),
        )
        .with_positions(
            "ETH-B",
            vaults(&[
                (dec!(135), dec!(15000000)),
                (dec!(160), dec!(25000000)),
                (dec!(250), dec!(20000000)),
            ]),
        )
        .with_positions(
            "WBTC-A",
            vaults(&[
                (dec!(170), dec!(30000000)),
                (dec!(240), dec!(30000000)),
                (dec!(400), dec!(20000000)),
            ]),
        )
        .with_slippage_curve(
            "ETH",
            vec![
                SlippagePoint { usd_amount: 10_000_000, slippage: dec!(0.01) },
                SlippagePoint { usd_amount: 50_000_000, slippage: dec!(0.04) },
                SlippagePoint { usd_amount: 200_000_000, slippage: dec!(0.15) },
                SlippagePoint { usd_amount: 500_000_000, slippage: dec!(0.40) },
            ],
        )
        .with_slippage_curve(
            "WBTC",
            vec![
                SlippagePoint { usd_amount: 5_000_000, slippage: dec!(0.02) },
                SlippagePoint { usd_amount: 25_000_000, slippage: dec!(0.07) },
                SlippagePoint { usd_amount: 100_000_000, slippage: dec!(0.25) },
            ],
        );

    let snapshot = with_exposure(snapshot, "ETH-A", dec!(350000000));
    let snapshot = with_exposure(snapshot, "ETH-B", dec!(60000000));
    with_exposure(snapshot, "WBTC-A", dec!(80000000))
}
