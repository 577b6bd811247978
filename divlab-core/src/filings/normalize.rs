//! Disclosure normalization: raw filing (listing + body) into a canonical
//! [`DisclosureRecord`], or a [`Rejection`] with a reason code.
//!
//! Checks run in a fixed order so the reported reason is deterministic:
//! report name, issuer listing, filing date, dividend type, then the numeric
//! fields. Numeric failures still carry a record (status `Failed`) so the
//! disclosure table can show what was filed.

use std::collections::HashSet;

use chrono::NaiveDate;

use super::parse::{parse_body, parse_date, parse_number, ParsedBody};
use super::source::RawFiling;
use crate::domain::{
    DisclosureRecord, DividendClass, DividendType, FilingId, Listing, Market, ParseStatus,
    RejectReason,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub filing_id: FilingId,
    pub reason: RejectReason,
    /// Present for parse failures only.
    pub record: Option<DisclosureRecord>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub accepted: Vec<DisclosureRecord>,
    pub rejections: Vec<Rejection>,
}

impl NormalizedBatch {
    /// Records to persist: accepted ones plus parse failures with their status.
    pub fn records(&self) -> Vec<DisclosureRecord> {
        let mut out = self.accepted.clone();
        out.extend(self.rejections.iter().filter_map(|r| r.record.clone()));
        out
    }

    pub fn extend(&mut self, other: NormalizedBatch) {
        self.accepted.extend(other.accepted);
        self.rejections.extend(other.rejections);
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    today: NaiveDate,
}

impl Normalizer {
    /// `today` is the processing date; filings dated after it are rejected.
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn normalize(&self, raw: &RawFiling) -> Result<DisclosureRecord, Rejection> {
        let listing = &raw.listing;
        let reject = |reason: RejectReason| Rejection {
            filing_id: listing.filing_id.clone(),
            reason,
            record: None,
        };

        if !is_dividend_report(&listing.report_name) {
            return Err(reject(RejectReason::NotDividend));
        }

        let ticker = listing.stock_code.trim();
        if ticker.len() != 6 || !ticker.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(reject(RejectReason::UnlistedIssuer));
        }

        let filing_date = parse_date(&listing.filing_date)
            .ok_or_else(|| reject(RejectReason::InvalidFilingDate))?;
        if filing_date > self.today {
            return Err(reject(RejectReason::FutureFilingDate));
        }

        let parsed = parse_body(&raw.body);

        // The report name only stands in when the body states no kind at all.
        let dividend_type = match parsed.dividend_kind.as_deref() {
            Some(kind) => DividendType::classify(kind),
            None => type_from_report_name(&listing.report_name),
        }
        .ok_or_else(|| reject(RejectReason::UnrecognizedDividendType))?;

        let mut record = DisclosureRecord {
            filing_id: listing.filing_id.clone(),
            corp_code: listing.corp_code.clone(),
            corp_name: listing.corp_name.clone(),
            listing: Listing::new(ticker, Market::from_corp_cls(&listing.corp_cls)),
            report_name: listing.report_name.clone(),
            filing_date,
            dividend_type,
            dividend_class: parsed
                .dividend_class
                .as_deref()
                .map(DividendClass::classify)
                .unwrap_or(DividendClass::Other),
            amount_per_share: None,
            dividend_yield: None,
            total_amount: parsed
                .total_amount
                .as_deref()
                .and_then(|t| parse_number(t).ok().flatten()),
            record_date: parsed.record_date.as_deref().and_then(parse_date),
            payment_date: parsed.payment_date.as_deref().and_then(parse_date),
            body: raw.body.clone(),
            parse_status: ParseStatus::Ok,
        };

        match numeric_fields(&parsed) {
            Ok((amount, dividend_yield)) => {
                record.amount_per_share = Some(amount);
                record.dividend_yield = dividend_yield;
                Ok(record)
            }
            Err(reason) => {
                record.parse_status = ParseStatus::Failed(reason);
                tracing::debug!(filing = %record.filing_id, %reason, "filing body did not parse");
                Err(Rejection {
                    filing_id: record.filing_id.clone(),
                    reason,
                    record: Some(record),
                })
            }
        }
    }

    /// Normalize a batch, dropping repeated filing identifiers (first wins).
    pub fn normalize_batch(&self, raws: &[RawFiling]) -> NormalizedBatch {
        let mut seen: HashSet<&FilingId> = HashSet::new();
        let mut batch = NormalizedBatch::default();

        for raw in raws {
            let id = &raw.listing.filing_id;
            if !seen.insert(id) {
                batch.rejections.push(Rejection {
                    filing_id: id.clone(),
                    reason: RejectReason::DuplicateFilingId,
                    record: None,
                });
                continue;
            }
            match self.normalize(raw) {
                Ok(record) => batch.accepted.push(record),
                Err(rejection) => batch.rejections.push(rejection),
            }
        }

        if !batch.rejections.is_empty() {
            tracing::debug!(
                accepted = batch.accepted.len(),
                rejected = batch.rejections.len(),
                "normalized batch"
            );
        }
        batch
    }
}

fn is_dividend_report(report_name: &str) -> bool {
    report_name.contains("배당") || report_name.to_ascii_lowercase().contains("dividend")
}

/// Report names such as `현금ㆍ현물배당결정` name both kinds; cash wins.
fn type_from_report_name(report_name: &str) -> Option<DividendType> {
    if report_name.contains("현금") {
        Some(DividendType::Cash)
    } else if report_name.contains("현물") {
        Some(DividendType::InKind)
    } else {
        None
    }
}

/// Required amount and optional yield.
fn numeric_fields(parsed: &ParsedBody) -> Result<(f64, Option<f64>), RejectReason> {
    let amount = match parsed.per_share_common.as_deref() {
        None => return Err(RejectReason::MissingAmount),
        Some(raw) => match parse_number(raw) {
            Ok(Some(v)) => v,
            Ok(None) => return Err(RejectReason::MissingAmount),
            Err(_) => return Err(RejectReason::NonNumericAmount),
        },
    };
    let dividend_yield = match parsed.yield_common.as_deref() {
        None => None,
        Some(raw) => parse_number(raw).map_err(|_| RejectReason::NonNumericYield)?,
    };
    Ok((amount, dividend_yield))
}
