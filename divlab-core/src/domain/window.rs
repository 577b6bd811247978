//! Price windows around events and window-size candidate results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::FilingId;
use super::price::PriceBar;

/// Bars observed in the trading-day window around one event.
///
/// `expected` holds every trading day of the window in ascending order;
/// `bars` holds the subset that some source supplied, in the same order;
/// `gaps` holds the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceWindow {
    pub event_id: FilingId,
    pub ticker: String,
    /// First trading day on or after the event date.
    pub anchor: NaiveDate,
    pub half_window: u32,
    pub expected: Vec<NaiveDate>,
    pub bars: Vec<PriceBar>,
    pub gaps: Vec<NaiveDate>,
}

impl PriceWindow {
    /// Bars obtained divided by trading days expected, in [0, 1].
    pub fn coverage(&self) -> f64 {
        if self.expected.is_empty() {
            return 0.0;
        }
        (self.bars.len() as f64 / self.expected.len() as f64).clamp(0.0, 1.0)
    }

    pub fn is_complete(&self) -> bool {
        !self.expected.is_empty() && self.gaps.is_empty()
    }

    /// Bars strictly before the anchor.
    pub fn pre_bars(&self) -> &[PriceBar] {
        let split = self.bars.partition_point(|b| b.date < self.anchor);
        &self.bars[..split]
    }

    /// Bars on or after the anchor.
    pub fn post_bars(&self) -> &[PriceBar] {
        let split = self.bars.partition_point(|b| b.date < self.anchor);
        &self.bars[split..]
    }

    /// The bar on the anchor date, if obtained.
    pub fn anchor_bar(&self) -> Option<&PriceBar> {
        self.bars.iter().find(|b| b.date == self.anchor)
    }
}

/// Evaluation of one candidate half-window size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowCandidateResult {
    pub half_window: u32,
    /// Fraction of events whose window has complete bar coverage.
    pub retention_rate: f64,
    /// Pre/post separability proxy; only comparable across candidates.
    pub proxy_score: f64,
    /// Events that met the minimum coverage and fed the proxy score.
    pub sample_count: usize,
    pub event_count: usize,
}
