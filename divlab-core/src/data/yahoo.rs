//! Yahoo Finance primary price source.
//!
//! Fetches daily OHLCV bars from the v8 chart API. KOSPI tickers take the
//! `.KS` suffix and KOSDAQ tickers `.KQ`. Timestamps mark the session open in
//! Seoul, so dates are taken at UTC+9.
//!
//! Yahoo has no official API and changes format without notice; every shape
//! problem surfaces as `ResponseFormat` so the fetcher falls through to the
//! secondary source.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;

use super::provider::PriceSource;
use crate::domain::{Listing, Market, PriceBar, PriceOrigin};
use crate::net::{http, CircuitBreaker, FetchError};

const KST_OFFSET_SECS: i32 = 9 * 3600;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

pub struct YahooSource {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    base_url: String,
}

impl YahooSource {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, FetchError> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(30))?,
            circuit_breaker,
            base_url: "https://query2.finance.yahoo.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn symbol(listing: &Listing) -> String {
        let suffix = match listing.market {
            Market::Kosdaq => "KQ",
            Market::Kospi | Market::Konex | Market::Other => "KS",
        };
        format!("{}.{suffix}", listing.ticker)
    }

    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let offset = i64::from(KST_OFFSET_SECS);
        let start_ts = start.and_time(NaiveTime::MIN).and_utc().timestamp() - offset;
        let end_ts = end.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_399 - offset;
        format!(
            "{}/v8/finance/chart/{symbol}?period1={start_ts}&period2={end_ts}&interval=1d",
            self.base_url
        )
    }

    fn parse_response(
        ticker: &str,
        symbol: &str,
        resp: ChartResponse,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let result = match (resp.chart.result, resp.chart.error) {
            (Some(result), _) => result,
            (None, Some(err)) if err.code == "Not Found" => {
                return Err(FetchError::NotFound(format!("yahoo symbol {symbol}")))
            }
            (None, Some(err)) => {
                return Err(FetchError::ResponseFormat(format!("{}: {}", err.code, err.description)))
            }
            (None, None) => {
                return Err(FetchError::ResponseFormat("empty result with no error".into()))
            }
        };

        let Some(data) = result.into_iter().next() else {
            return Err(FetchError::ResponseFormat("result array is empty".into()));
        };
        // No timestamps: the range holds no sessions.
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::ResponseFormat("no quote data".into()))?;

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts + i64::from(KST_OFFSET_SECS), 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| FetchError::ResponseFormat(format!("invalid timestamp: {ts}")))?;
            if date < start || date > end {
                continue;
            }

            let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
            // Holidays come back as all-null rows.
            let (Some(open), Some(high), Some(low), Some(close)) = (
                field(&quote.open),
                field(&quote.high),
                field(&quote.low),
                field(&quote.close),
            ) else {
                continue;
            };

            bars.push(PriceBar {
                ticker: ticker.to_string(),
                date,
                open,
                high,
                low,
                close,
                volume: field(&quote.volume).unwrap_or(0.0).max(0.0) as u64,
                source: PriceOrigin::Primary,
            });
        }
        Ok(bars)
    }
}

impl PriceSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn origin(&self) -> PriceOrigin {
        PriceOrigin::Primary
    }

    fn fetch(
        &self,
        listing: &Listing,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let symbol = Self::symbol(listing);
        let url = self.chart_url(&symbol, start, end);
        let chart: ChartResponse = http::get(&self.client, &self.circuit_breaker, &url)?
            .json()
            .map_err(|e| FetchError::ResponseFormat(format!("chart for {symbol}: {e}")))?;
        Self::parse_response(&listing.ticker, &symbol, chart, start, end)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
