//! Disclosure records, the canonical output of the normalizer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::FilingId;

/// Exchange segment an issuer is listed on (`corp_cls` in listing metadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Kospi,
    Kosdaq,
    Konex,
    Other,
}

impl Market {
    pub fn from_corp_cls(cls: &str) -> Self {
        match cls.trim() {
            "Y" => Market::Kospi,
            "K" => Market::Kosdaq,
            "N" => Market::Konex,
            _ => Market::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Kospi => "kospi",
            Market::Kosdaq => "kosdaq",
            Market::Konex => "konex",
            Market::Other => "other",
        }
    }
}

/// A listed security: ticker plus the market it trades on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Listing {
    pub ticker: String,
    pub market: Market,
}

impl Listing {
    pub fn new(ticker: impl Into<String>, market: Market) -> Self {
        Self {
            ticker: ticker.into(),
            market,
        }
    }
}

/// Dividend payment form. Stock dividends are not recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendType {
    Cash,
    InKind,
}

impl DividendType {
    /// Classify the free-text dividend kind field (`배당종류`).
    pub fn classify(text: &str) -> Option<Self> {
        let t = text.trim();
        let lower = t.to_ascii_lowercase();
        if t.contains("현물") || lower.contains("in-kind") || lower.contains("in kind") {
            Some(DividendType::InKind)
        } else if t.contains("현금") || lower.contains("cash") {
            Some(DividendType::Cash)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DividendType::Cash => "cash",
            DividendType::InKind => "in_kind",
        }
    }
}

/// Dividend period class (`배당구분`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DividendClass {
    YearEnd,
    Interim,
    Quarterly,
    Other,
}

impl DividendClass {
    pub fn classify(text: &str) -> Self {
        let t = text.trim();
        if t.contains("결산") {
            DividendClass::YearEnd
        } else if t.contains("중간") {
            DividendClass::Interim
        } else if t.contains("분기") {
            DividendClass::Quarterly
        } else {
            DividendClass::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DividendClass::YearEnd => "year_end",
            DividendClass::Interim => "interim",
            DividendClass::Quarterly => "quarterly",
            DividendClass::Other => "other",
        }
    }
}

/// Why the normalizer refused a raw filing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotDividend,
    UnlistedIssuer,
    UnrecognizedDividendType,
    MissingAmount,
    NonNumericAmount,
    NonNumericYield,
    InvalidFilingDate,
    FutureFilingDate,
    DuplicateFilingId,
    /// The listing was seen but its body could not be retrieved.
    BodyUnavailable,
}

impl RejectReason {
    /// Parse failures are recorded in the disclosure table with a failed status.
    /// All other reasons are plain filtering.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            RejectReason::MissingAmount
                | RejectReason::NonNumericAmount
                | RejectReason::NonNumericYield
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NotDividend => "not_dividend",
            RejectReason::UnlistedIssuer => "unlisted_issuer",
            RejectReason::UnrecognizedDividendType => "unrecognized_dividend_type",
            RejectReason::MissingAmount => "missing_amount",
            RejectReason::NonNumericAmount => "non_numeric_amount",
            RejectReason::NonNumericYield => "non_numeric_yield",
            RejectReason::InvalidFilingDate => "invalid_filing_date",
            RejectReason::FutureFilingDate => "future_filing_date",
            RejectReason::DuplicateFilingId => "duplicate_filing_id",
            RejectReason::BodyUnavailable => "body_unavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of parsing the filing body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ParseStatus {
    Ok,
    Failed(RejectReason),
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseStatus::Ok => f.write_str("ok"),
            ParseStatus::Failed(reason) => write!(f, "failed:{reason}"),
        }
    }
}

/// A normalized dividend disclosure.
///
/// Unique per `filing_id`. Records with `ParseStatus::Failed` are kept in the
/// disclosure table for inspection but never become events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisclosureRecord {
    pub filing_id: FilingId,
    pub corp_code: String,
    pub corp_name: String,
    pub listing: Listing,
    pub report_name: String,
    pub filing_date: NaiveDate,
    pub dividend_type: DividendType,
    pub dividend_class: DividendClass,
    /// Cash (or cash-equivalent) amount per common share, KRW.
    pub amount_per_share: Option<f64>,
    /// Market-price dividend yield of common shares, percent.
    pub dividend_yield: Option<f64>,
    pub total_amount: Option<f64>,
    pub record_date: Option<NaiveDate>,
    pub payment_date: Option<NaiveDate>,
    pub body: String,
    pub parse_status: ParseStatus,
}

impl DisclosureRecord {
    pub fn is_parsed(&self) -> bool {
        self.parse_status == ParseStatus::Ok
    }

    /// The price-window event for this disclosure, if it parsed cleanly.
    pub fn event(&self) -> Option<DisclosureEvent> {
        self.is_parsed().then(|| DisclosureEvent {
            event_id: self.filing_id.clone(),
            listing: self.listing.clone(),
            event_date: self.filing_date,
        })
    }
}

/// An (issuer, date) event whose surrounding prices are observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisclosureEvent {
    pub event_id: FilingId,
    pub listing: Listing,
    pub event_date: NaiveDate,
}
