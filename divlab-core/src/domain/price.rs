//! PriceBar: one daily OHLCV observation for a ticker.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which price source supplied a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceOrigin {
    Primary,
    Secondary,
}

impl PriceOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceOrigin::Primary => "primary",
            PriceOrigin::Secondary => "secondary",
        }
    }
}

/// Daily OHLCV bar. One bar per (ticker, trading date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub source: PriceOrigin,
}

impl PriceBar {
    /// Basic OHLC sanity: positive prices, high is the max, low is the min.
    pub fn is_sane(&self) -> bool {
        let finite = self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite();
        finite
            && self.open > 0.0
            && self.close > 0.0
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> PriceBar {
        PriceBar {
            ticker: "005930".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 78_200.0,
            high: 79_800.0,
            low: 78_200.0,
            close: 79_600.0,
            volume: 17_142_847,
            source: PriceOrigin::Primary,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn inverted_bar_is_not_sane() {
        let mut bar = sample_bar();
        bar.high = 70_000.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn nan_bar_is_not_sane() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(!bar.is_sane());
    }
}
