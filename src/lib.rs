//! Vault Risk Simulation Library
//!
//! This library estimates the credit risk of collateralized debt positions:
//! how much debt a collateral class can carry before expected liquidation
//! losses become unacceptable, and how liquidation auctions behave during
//! historical crashes.
//!
//! ## Modules
//!
//! - `market`: Market data types and the `MarketDataProvider` seam
//! - `distribution`: Debt-weighted collateralization distribution builder
//! - `scenario`: Base, downside and upside stress scenarios
//! - `protection`: Share of debt protected from liquidation
//! - `loss`: Expected liquidation loss for one scenario
//! - `risk_premium`: Debt ceiling sweep and recommended max debt ceiling
//! - `auctions`: Auction kick/duration simulation over a step x buf grid
//! - `price_path`: Minute oracle price series and synthetic crash paths
//! - `cache`: Time-bounded memoization of simulation results
//! - `sink`: Append-only result sinks
//! - `dust`: Minimum profitable vault size for keepers
//! - `d3m`: Direct deposit module rate targeting
//!
//! ## Usage
//!
//! ```bash
//! # Risk premium sweep over a market snapshot (demo snapshot without args)
//! cargo run --bin risk_premium --release -- snapshot.json
//!
//! # Auction duration grid over synthetic crash paths
//! cargo run --bin auctions --release
//!
//! # Dust recommendation
//! cargo run --bin dust --release
//! ```
//!
//! Logging goes through `tracing`; set `RUST_LOG=debug` for per-scenario detail.

pub mod auctions;
pub mod cache;
pub mod config;
pub mod d3m;
pub mod distribution;
pub mod dust;
pub mod error;
pub mod loss;
pub mod market;
pub mod price_path;
pub mod protection;
pub mod risk_premium;
pub mod scenario;
pub mod sink;

pub use error::{JsonDeserialization, JsonSerialization, Result, RiskError};
