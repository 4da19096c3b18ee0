//! Append-only destinations for simulation results.

use std::io::Write;

use serde::Serialize;
use tracing::debug;

use crate::auctions::AuctionSimulationResult;
use crate::error::{RiskError, Result};
use crate::risk_premium::RiskPremiumResult;

pub trait ResultSink {
    fn append_risk_premium(&mut self, result: &RiskPremiumResult) -> Result<()>;

    fn append_auction_simulation(&mut self, result: &AuctionSimulationResult) -> Result<()>;
}

#[derive(Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
enum Record<'a> {
    RiskPremium(&'a RiskPremiumResult),
    AuctionSimulation(&'a AuctionSimulationResult),
}

/// One JSON document per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    records: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn append(&mut self, record: Record) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &record)
            .map_err(|e| RiskError::Serialization(e.to_string()))?;
        writeln!(self.writer).map_err(|e| RiskError::Serialization(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| RiskError::Serialization(e.to_string()))?;

        self.records += 1;
        debug!(records = self.records, "Appended result");
        Ok(())
    }
}

impl<W: Write> ResultSink for JsonLinesSink<W> {
    fn append_risk_premium(&mut self, result: &RiskPremiumResult) -> Result<()> {
        self.append(Record::RiskPremium(result))
    }

    fn append_auction_simulation(&mut self, result: &AuctionSimulationResult) -> Result<()> {
        self.append(Record::AuctionSimulation(result))
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    pub risk_premiums: Vec<RiskPremiumResult>,
    pub auction_simulations: Vec<AuctionSimulationResult>,
}

impl ResultSink for MemorySink {
    fn append_risk_premium(&mut self, result: &RiskPremiumResult) -> Result<()> {
        self.risk_premiums.push(result.clone());
        Ok(())
    }

    fn append_auction_simulation(&mut self, result: &AuctionSimulationResult) -> Result<()> {
        self.auction_simulations.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auctions::{AuctionParams, DurationCdf};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn risk_premium() -> RiskPremiumResult {
        RiskPremiumResult {
            ilk: "ETH-A".into(),
            asset: "ETH".into(),
            timestamp: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            current_debt: dec!(1000000),
            debt_ceiling: dec!(2000000),
            curve: Vec::new(),
            max_debt_ceiling: None,
            current_risk_premium: Some(Decimal::ZERO),
            share_protected: dec!(0.6),
            high_risk_debt: Decimal::ZERO,
            medium_risk_debt: Decimal::ZERO,
            low_risk_debt: Decimal::ZERO,
        }
    }

    fn auction() -> AuctionSimulationResult {
        AuctionSimulationResult {
            params: AuctionParams {
                asset: "ETH".into(),
                cut: 0.99,
                step_seconds: 90,
                buf: 1.2,
                taker_profit: 0.0,
            },
            reference_dates: Vec::new(),
            kicks: 3,
            dropped_auctions: 1,
            cdf: DurationCdf::from_durations(&[10, 20]),
            slippage: None,
        }
    }

    #[test]
    fn test_json_lines_one_record_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.append_risk_premium(&risk_premium()).unwrap();
        sink.append_auction_simulation(&auction()).unwrap();
        assert_eq!(sink.records(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["kind"], "risk_premium");
        assert_eq!(first["record"]["ilk"], "ETH-A");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["kind"], "auction_simulation");
        assert_eq!(second["record"]["dropped_auctions"], 1);
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::default();
        sink.append_risk_premium(&risk_premium()).unwrap();
        sink.append_auction_simulation(&auction()).unwrap();

        assert_eq!(sink.risk_premiums, vec![risk_premium()]);
        assert_eq!(sink.auction_simulations.len(), 1);
    }
}
