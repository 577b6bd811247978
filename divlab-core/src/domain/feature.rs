//! Feature table rows and the exclusion report that accompanies them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::disclosure::{DividendClass, DividendType, Market};
use super::ids::FilingId;

/// One row of the canonical feature table, keyed by `event_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub event_id: FilingId,
    pub ticker: String,
    pub market: Market,
    pub corp_name: String,
    pub sector: String,
    pub filing_date: NaiveDate,
    pub dividend_type: DividendType,
    pub dividend_class: DividendClass,
    pub amount_per_share: f64,
    pub dividend_yield: Option<f64>,
    pub total_amount: Option<f64>,
    pub half_window: u32,
    pub coverage: f64,
    /// Cumulative close-to-close return over the pre-event bars.
    pub pre_return: f64,
    /// Cumulative return from the last pre-event close through the window end.
    pub post_return: f64,
    /// Return from the last pre-event close to the anchor close.
    pub event_day_return: Option<f64>,
    pub pre_volatility: f64,
    pub post_volatility: f64,
    /// Mean post-event volume over mean pre-event volume.
    pub volume_ratio: Option<f64>,
}

/// Why an event produced no feature row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    ParseFailed,
    MissingWindow,
    InsufficientCoverage,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ExclusionReason::ParseFailed => "parse_failed",
            ExclusionReason::MissingWindow => "missing_window",
            ExclusionReason::InsufficientCoverage => "insufficient_coverage",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub event_id: FilingId,
    pub reason: ExclusionReason,
    pub coverage: Option<f64>,
}
