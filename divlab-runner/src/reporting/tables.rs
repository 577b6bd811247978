//! CSV tables.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use divlab_core::domain::{DisclosureRecord, Exclusion, FeatureRow, ParseStatus, PriceBar};
use divlab_core::filings::Rejection;

use crate::optimizer::OptimizationReport;

/// Disclosure table row: the stored record minus its body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisclosureRow {
    pub filing_id: String,
    pub corp_code: String,
    pub corp_name: String,
    pub ticker: String,
    pub market: String,
    pub report_name: String,
    pub filing_date: NaiveDate,
    pub dividend_type: String,
    pub dividend_class: String,
    pub amount_per_share: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub total_amount: Option<f64>,
    pub record_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub parse_status: String,
}

impl From<&DisclosureRecord> for DisclosureRow {
    fn from(r: &DisclosureRecord) -> Self {
        let parse_status = match r.parse_status {
            ParseStatus::Ok => "ok".to_string(),
            ParseStatus::Failed(reason) => reason.code().to_string(),
        };
        Self {
            filing_id: r.filing_id.to_string(),
            corp_code: r.corp_code.clone(),
            corp_name: r.corp_name.clone(),
            ticker: r.listing.ticker.clone(),
            market: r.listing.market.as_str().to_string(),
            report_name: r.report_name.clone(),
            filing_date: r.filing_date,
            dividend_type: r.dividend_type.as_str().to_string(),
            dividend_class: r.dividend_class.as_str().to_string(),
            amount_per_share: r.amount_per_share,
            dividend_yield: r.dividend_yield,
            total_amount: r.total_amount,
            record_date: r.record_date,
            payment_date: r.payment_date,
            parse_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReportRow {
    pub half_window: u32,
    pub retention_rate: f64,
    pub proxy_score: f64,
    pub sample_count: usize,
    pub event_count: usize,
    pub selected: bool,
}

fn writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::Writer::from_path(path).with_context(|| format!("Failed to create CSV {}", path.display()))
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut wtr = writer(path)?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_disclosures_csv(path: &Path, records: &[DisclosureRecord]) -> Result<()> {
    write_rows(path, records.iter().map(DisclosureRow::from))
}

pub fn write_rejections_csv(path: &Path, rejections: &[Rejection]) -> Result<()> {
    let mut wtr = writer(path)?;
    wtr.write_record(["filing_id", "reason", "recorded"])?;
    for r in rejections {
        wtr.write_record([
            r.filing_id.as_str(),
            r.reason.code(),
            if r.record.is_some() { "true" } else { "false" },
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Price bars serialize flat (`source` as `primary`/`secondary`).
pub fn write_price_history_csv(path: &Path, bars: &[PriceBar]) -> Result<()> {
    write_rows(path, bars)
}

/// Load a previously written price history table.
pub fn read_price_history_csv(path: &Path) -> Result<Vec<PriceBar>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open price history {}", path.display()))?;
    let mut bars = Vec::new();
    for row in rdr.deserialize() {
        let bar: PriceBar =
            row.with_context(|| format!("Malformed price history row in {}", path.display()))?;
        bars.push(bar);
    }
    Ok(bars)
}

pub fn write_features_csv(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    write_rows(path, rows)
}

pub fn write_exclusions_csv(path: &Path, exclusions: &[Exclusion]) -> Result<()> {
    let mut wtr = writer(path)?;
    wtr.write_record(["event_id", "reason", "coverage"])?;
    for e in exclusions {
        let coverage = e.coverage.map(|c| format!("{c:.4}")).unwrap_or_default();
        wtr.write_record([e.event_id.as_str(), &e.reason.to_string(), &coverage])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_window_report_csv(path: &Path, report: &OptimizationReport) -> Result<()> {
    write_rows(
        path,
        report.candidates.iter().map(|c| WindowReportRow {
            half_window: c.half_window,
            retention_rate: c.retention_rate,
            proxy_score: c.proxy_score,
            sample_count: c.sample_count,
            event_count: c.event_count,
            selected: report.selected == Some(c.half_window),
        }),
    )
}
