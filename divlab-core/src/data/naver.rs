//! Naver Finance secondary price source (`siseJson`).
//!
//! The endpoint returns a JavaScript array literal with single-quoted
//! strings:
//!
//! ```text
//! [['날짜', '시가', '고가', '저가', '종가', '거래량', '외국인소진율'],
//! ["20240102", 78200, 79800, 78200, 79600, 17142847, 53.21],
//! ...]
//! ```
//!
//! Quotes are normalized and the body parsed as JSON; the header row is
//! skipped because its first cell is not a date.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;

use super::provider::PriceSource;
use crate::domain::{Listing, PriceBar, PriceOrigin};
use crate::net::{http, CircuitBreaker, FetchError};

pub struct NaverSource {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    base_url: String,
}

impl NaverSource {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, FetchError> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(15))?,
            circuit_breaker,
            base_url: "https://api.finance.naver.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn sise_url(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/siseJson.naver?symbol={ticker}&requestType=1&startTime={}&endTime={}&timeframe=day",
            self.base_url,
            start.format("%Y%m%d"),
            end.format("%Y%m%d"),
        )
    }

    fn parse_body(
        ticker: &str,
        body: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let normalized = body.trim().replace('\'', "\"");
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<Vec<Value>> = serde_json::from_str(&normalized)
            .map_err(|e| FetchError::ResponseFormat(format!("siseJson for {ticker}: {e}")))?;

        let mut bars = Vec::new();
        for row in rows {
            let Some(date) = row
                .first()
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok())
            else {
                continue;
            };
            if date < start || date > end {
                continue;
            }
            let num = |i: usize| row.get(i).and_then(Value::as_f64);
            let (Some(open), Some(high), Some(low), Some(close)) = (num(1), num(2), num(3), num(4))
            else {
                return Err(FetchError::ResponseFormat(format!(
                    "siseJson row for {ticker} on {date} has non-numeric prices"
                )));
            };
            bars.push(PriceBar {
                ticker: ticker.to_string(),
                date,
                open,
                high,
                low,
                close,
                volume: num(5).unwrap_or(0.0).max(0.0) as u64,
                source: PriceOrigin::Secondary,
            });
        }
        Ok(bars)
    }
}

impl PriceSource for NaverSource {
    fn name(&self) -> &str {
        "naver"
    }

    fn origin(&self) -> PriceOrigin {
        PriceOrigin::Secondary
    }

    fn fetch(
        &self,
        listing: &Listing,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let url = self.sise_url(&listing.ticker, start, end);
        let body = http::get(&self.client, &self.circuit_breaker, &url)?.text()?;
        Self::parse_body(&listing.ticker, &body, start, end)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
