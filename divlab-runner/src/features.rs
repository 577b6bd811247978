//! Feature table assembly: disclosures joined with their selected price
//! window and sector label.

use std::collections::{HashMap, HashSet};

use divlab_core::data::SectorTable;
use divlab_core::domain::{
    DisclosureRecord, Exclusion, ExclusionReason, FeatureRow, FilingId, PriceBar, PriceWindow,
};

use crate::returns::{mean, split_log_returns, std_dev};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureBuild {
    pub rows: Vec<FeatureRow>,
    pub exclusions: Vec<Exclusion>,
}

impl FeatureBuild {
    pub fn excluded(&self, reason: ExclusionReason) -> usize {
        self.exclusions.iter().filter(|e| e.reason == reason).count()
    }
}

pub struct FeatureBuilder<'a> {
    sectors: &'a SectorTable,
    half_window: u32,
    min_coverage: f64,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(sectors: &'a SectorTable, half_window: u32, min_coverage: f64) -> Self {
        Self {
            sectors,
            half_window,
            min_coverage,
        }
    }

    /// One row per parsed disclosure whose window meets the coverage floor;
    /// everything else lands in `exclusions`. Windows of other sizes are
    /// ignored. Repeated filing identifiers keep their first occurrence.
    pub fn build(&self, disclosures: &[DisclosureRecord], windows: &[PriceWindow]) -> FeatureBuild {
        let by_event: HashMap<&FilingId, &PriceWindow> = windows
            .iter()
            .filter(|w| w.half_window == self.half_window)
            .map(|w| (&w.event_id, w))
            .collect();

        let mut seen: HashSet<&FilingId> = HashSet::new();
        let mut out = FeatureBuild::default();
        for record in disclosures {
            if !seen.insert(&record.filing_id) {
                continue;
            }
            let exclude = |reason, coverage| Exclusion {
                event_id: record.filing_id.clone(),
                reason,
                coverage,
            };

            let amount = match record.amount_per_share {
                Some(a) if record.is_parsed() => a,
                _ => {
                    out.exclusions.push(exclude(ExclusionReason::ParseFailed, None));
                    continue;
                }
            };
            let Some(window) = by_event.get(&record.filing_id) else {
                out.exclusions.push(exclude(ExclusionReason::MissingWindow, None));
                continue;
            };
            let coverage = window.coverage();
            if coverage < self.min_coverage || window.bars.is_empty() {
                out.exclusions
                    .push(exclude(ExclusionReason::InsufficientCoverage, Some(coverage)));
                continue;
            }

            out.rows.push(self.row(record, amount, window));
        }

        tracing::info!(
            rows = out.rows.len(),
            excluded = out.exclusions.len(),
            half_window = self.half_window,
            "feature table built"
        );
        out
    }

    fn row(&self, record: &DisclosureRecord, amount: f64, window: &PriceWindow) -> FeatureRow {
        let pre = window.pre_bars();
        let post = window.post_bars();
        let (pre_returns, post_returns) = split_log_returns(window);
        let last_pre = pre.last();

        let pre_return = match (pre.first(), last_pre) {
            (Some(first), Some(last)) => simple_return(first, last),
            _ => 0.0,
        };
        let post_return = match (last_pre.or(post.first()), post.last()) {
            (Some(base), Some(last)) => simple_return(base, last),
            _ => 0.0,
        };
        let event_day_return = match (last_pre, window.anchor_bar()) {
            (Some(prev), Some(anchor)) => Some(simple_return(prev, anchor)),
            _ => None,
        };

        FeatureRow {
            event_id: record.filing_id.clone(),
            ticker: record.listing.ticker.clone(),
            market: record.listing.market,
            corp_name: record.corp_name.clone(),
            sector: self.sectors.sector_of(&record.listing.ticker).to_string(),
            filing_date: record.filing_date,
            dividend_type: record.dividend_type,
            dividend_class: record.dividend_class,
            amount_per_share: amount,
            dividend_yield: record.dividend_yield,
            total_amount: record.total_amount,
            half_window: self.half_window,
            coverage: window.coverage(),
            pre_return,
            post_return,
            event_day_return,
            pre_volatility: std_dev(&pre_returns).unwrap_or(0.0),
            post_volatility: std_dev(&post_returns).unwrap_or(0.0),
            volume_ratio: volume_ratio(pre, post),
        }
    }
}

fn simple_return(from: &PriceBar, to: &PriceBar) -> f64 {
    if from.close <= 0.0 {
        return 0.0;
    }
    to.close / from.close - 1.0
}

fn volume_ratio(pre: &[PriceBar], post: &[PriceBar]) -> Option<f64> {
    let volumes = |bars: &[PriceBar]| bars.iter().map(|b| b.volume as f64).collect::<Vec<_>>();
    let pre_mean = mean(&volumes(pre))?;
    let post_mean = mean(&volumes(post))?;
    (pre_mean > 0.0).then(|| post_mean / pre_mean)
}
