//! Human-readable batch report

use std::fmt::Write as _;
use tracing::info;

use super::{ReportSink, SinkError};
use crate::types::{BatchReport, FeeUnit};

/// Writes each report as a multi-line `info` event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn publish(&self, report: &BatchReport) -> Result<(), SinkError> {
        info!(
            start_slot = report.start_slot,
            end_slot = report.end_slot,
            "\n{}",
            render_report(report)
        );
        Ok(())
    }
}

fn amount(unit: FeeUnit, value: f64) -> String {
    match unit {
        FeeUnit::Lamports => format!("{:.2} {}", value, unit),
        FeeUnit::Sol => format!("{:.9} {}", value, unit),
    }
}

fn with_fiat(report: &BatchReport, value: f64) -> String {
    match report.fiat(value) {
        Some(fiat) => format!("{} (${:.6})", amount(report.fee_unit, value), fiat),
        None => amount(report.fee_unit, value),
    }
}

/// Render `report` for people. Fiat equivalents appear only when the report
/// carries a price.
pub fn render_report(report: &BatchReport) -> String {
    let mut out = String::new();
    let unit = report.fee_unit;

    // Writing to a String cannot fail
    let _ = writeln!(
        out,
        "Batch {} -> {} ({} blocks)",
        report.start_slot, report.end_slot, report.block_count
    );
    let _ = writeln!(
        out,
        "  Transactions: {}  TPS: {:.2}  Elapsed: {:.1}s",
        report.total_transactions, report.average_tps, report.elapsed_secs
    );
    let _ = writeln!(out, "  Max fee:    {}", with_fiat(report, report.fee.max));
    let _ = writeln!(out, "  Avg fee:    {}", with_fiat(report, report.fee.average));
    let _ = writeln!(out, "  Median fee: {}", with_fiat(report, report.fee.median));
    let _ = writeln!(
        out,
        "  CU max/avg/median: {:.0} / {:.2} / {:.1}  successful avg: {:.2}",
        report.compute_units.max,
        report.compute_units.average,
        report.compute_units.median,
        report.average_success_cu
    );
    let _ = writeln!(
        out,
        "  CU price: {:.6e} {unit}/CU  successful: {:.6e} {unit}/CU",
        report.cu_price,
        report.cu_price_success,
        unit = unit
    );
    let _ = writeln!(
        out,
        "  Avg block reward: {}  Avg seigniorage: {}",
        amount(unit, report.average_block_reward),
        amount(unit, report.average_seigniorage)
    );
    if let Some(supply) = report.total_supply {
        let _ = writeln!(out, "  Total supply: {}", amount(unit, supply));
    }
    if let Some(rate) = report.inflation_rate {
        let _ = writeln!(out, "  Inflation: {:.4}%", rate * 100.0);
    }
    match report.price {
        Some(price) => {
            let _ = write!(out, "  Price: ${:.4}", price);
        }
        None => {
            let _ = write!(out, "  Price: unavailable");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Distribution;

    fn report(price: Option<f64>) -> BatchReport {
        BatchReport {
            start_slot: 200,
            end_slot: 191,
            block_count: 10,
            total_transactions: 1_000,
            elapsed_secs: 4.0,
            average_tps: 250.0,
            fee: Distribution { max: 0.002, average: 0.0015, median: 0.0015 },
            compute_units: Distribution { max: 300.0, average: 150.0, median: 150.0 },
            average_success_cu: 140.0,
            cu_price: 0.00001,
            cu_price_success: 0.00001,
            average_block_reward: 0.0,
            average_seigniorage: 0.0,
            total_supply: None,
            inflation_rate: None,
            price,
            fee_unit: FeeUnit::Sol,
        }
    }

    #[test]
    fn test_fiat_only_with_price() {
        let with_price = render_report(&report(Some(100.0)));
        assert!(with_price.contains("0.002000000 SOL ($0.200000)"));
        assert!(with_price.contains("Price: $100.0000"));

        let without = render_report(&report(None));
        assert!(!without.contains('$'));
        assert!(without.contains("Price: unavailable"));
    }

    #[test]
    fn test_optional_lines() {
        let mut r = report(None);
        assert!(!render_report(&r).contains("Total supply"));
        r.total_supply = Some(580_000_000.0);
        r.inflation_rate = Some(0.046);
        let text = render_report(&r);
        assert!(text.contains("Total supply"));
        assert!(text.contains("Inflation: 4.6000%"));
    }
}
