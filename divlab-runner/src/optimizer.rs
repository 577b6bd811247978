//! Window-size optimizer.
//!
//! Each candidate half-window is scored on two axes: retention (share of
//! events with a complete price window) and a proxy signal score (pooled
//! standardized mean difference between pre-anchor and post-anchor daily log
//! returns). The winner is the best-scoring candidate whose retention clears
//! the configured floor.

use serde::{Deserialize, Serialize};

use divlab_core::data::PriceWindowFetcher;
use divlab_core::domain::{DisclosureEvent, PriceWindow, WindowCandidateResult};

use crate::returns::{split_log_returns, standardized_mean_difference};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    /// `None` only when there were no candidates.
    pub selected: Option<u32>,
    /// Ascending by half-window.
    pub candidates: Vec<WindowCandidateResult>,
    /// No candidate met the retention floor; the selection fell back to the
    /// highest retention.
    pub warning: bool,
    pub min_retention: f64,
    pub min_coverage: f64,
}

impl OptimizationReport {
    pub fn selected_result(&self) -> Option<&WindowCandidateResult> {
        let h = self.selected?;
        self.candidates.iter().find(|c| c.half_window == h)
    }
}

/// Score one candidate from its windows.
pub fn score_candidate(
    half_window: u32,
    windows: &[PriceWindow],
    min_coverage: f64,
) -> WindowCandidateResult {
    let event_count = windows.len();
    let complete = windows.iter().filter(|w| w.is_complete()).count();
    let retention_rate = if event_count == 0 {
        0.0
    } else {
        complete as f64 / event_count as f64
    };

    let mut pre = Vec::new();
    let mut post = Vec::new();
    let mut sample_count = 0usize;
    for w in windows.iter().filter(|w| w.coverage() >= min_coverage) {
        let (a, b) = split_log_returns(w);
        pre.extend(a);
        post.extend(b);
        sample_count += 1;
    }

    WindowCandidateResult {
        half_window,
        retention_rate,
        proxy_score: standardized_mean_difference(&pre, &post),
        sample_count,
        event_count,
    }
}

/// Pick a half-window: the highest proxy score among candidates with
/// retention >= `min_retention` (ties to the smaller window). When none
/// qualifies, the highest retention wins (ties to the smaller window) and the
/// returned flag is raised.
pub fn select_window(results: &[WindowCandidateResult], min_retention: f64) -> (Option<u32>, bool) {
    let mut sorted: Vec<&WindowCandidateResult> = results.iter().collect();
    sorted.sort_by_key(|r| r.half_window);

    let mut best: Option<&WindowCandidateResult> = None;
    for r in sorted.iter().copied().filter(|r| r.retention_rate >= min_retention) {
        if best.map_or(true, |b| r.proxy_score > b.proxy_score) {
            best = Some(r);
        }
    }
    if let Some(b) = best {
        return (Some(b.half_window), false);
    }

    for r in sorted.iter().copied() {
        if best.map_or(true, |b| r.retention_rate > b.retention_rate) {
            best = Some(r);
        }
    }
    (best.map(|b| b.half_window), best.is_some())
}

pub struct WindowOptimizer<'a> {
    fetcher: &'a PriceWindowFetcher,
    min_retention: f64,
    min_coverage: f64,
}

impl<'a> WindowOptimizer<'a> {
    pub fn new(fetcher: &'a PriceWindowFetcher, min_retention: f64, min_coverage: f64) -> Self {
        Self {
            fetcher,
            min_retention,
            min_coverage,
        }
    }

    /// Evaluate every candidate, widest first so that narrower windows are
    /// answered from the fetcher's memo.
    pub fn optimize(&self, events: &[DisclosureEvent], candidates: &[u32]) -> OptimizationReport {
        let mut order: Vec<u32> = candidates.to_vec();
        order.sort_unstable_by(|a, b| b.cmp(a));
        order.dedup();

        let mut results = Vec::with_capacity(order.len());
        for h in order {
            let windows = self.fetcher.fetch_windows(events, h);
            let result = score_candidate(h, &windows, self.min_coverage);
            tracing::info!(
                half_window = h,
                retention = result.retention_rate,
                proxy = result.proxy_score,
                samples = result.sample_count,
                "window candidate scored"
            );
            results.push(result);
        }
        results.reverse();

        let (selected, warning) = select_window(&results, self.min_retention);
        if warning {
            tracing::warn!(
                min_retention = self.min_retention,
                selected = ?selected,
                "no window meets the retention floor, using highest retention"
            );
        } else {
            tracing::info!(selected = ?selected, "window selected");
        }

        OptimizationReport {
            selected,
            candidates: results,
            warning,
            min_retention: self.min_retention,
            min_coverage: self.min_coverage,
        }
    }
}
