//! Price window fetcher.
//!
//! For an event, the window is `h` trading days either side of the anchor
//! (the event date, or the next trading day when the event falls on a closed
//! day). Bars are resolved per (ticker, date):
//!
//! 1. the memo, shared by every event of the invocation;
//! 2. the first source, with one request spanning the unresolved dates;
//! 3. each later source, one single-date request per date still missing.
//!
//! A bar, or a miss confirmed by every source, is memoized. A date that some
//! source failed to answer (error, open breaker) stays out of the memo so a
//! later window can try again.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use rayon::prelude::*;

use super::calendar::TradingCalendar;
use super::provider::PriceSource;
use crate::domain::{DisclosureEvent, Listing, PriceBar, PriceWindow};
use crate::net::{FetchError, RetryPolicy};

type MemoKey = (String, NaiveDate);

pub struct PriceWindowFetcher {
    sources: Vec<Arc<dyn PriceSource>>,
    calendar: TradingCalendar,
    memo: RwLock<HashMap<MemoKey, Option<PriceBar>>>,
    retry: RetryPolicy,
    threads: usize,
}

impl PriceWindowFetcher {
    /// `sources` in priority order.
    pub fn new(sources: Vec<Arc<dyn PriceSource>>, calendar: TradingCalendar) -> Self {
        Self {
            sources,
            calendar,
            memo: RwLock::new(HashMap::new()),
            retry: RetryPolicy::default(),
            threads: 4,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn memo_len(&self) -> usize {
        self.memo.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Preload bars (e.g. a previous run's price history).
    pub fn seed(&self, bars: impl IntoIterator<Item = PriceBar>) {
        let mut memo = self.memo.write().unwrap_or_else(PoisonError::into_inner);
        for bar in bars {
            memo.entry((bar.ticker.clone(), bar.date)).or_insert(Some(bar));
        }
    }

    /// Every memoized bar, ordered by (ticker, date).
    pub fn cached_bars(&self) -> Vec<PriceBar> {
        let memo = self.memo.read().unwrap_or_else(PoisonError::into_inner);
        let mut bars: Vec<PriceBar> = memo.values().flatten().cloned().collect();
        bars.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));
        bars
    }

    pub fn fetch_window(&self, event: &DisclosureEvent, half_window: u32) -> PriceWindow {
        let ticker = &event.listing.ticker;
        let expected = self.calendar.window(event.event_date, half_window);
        let anchor = self.calendar.next_trading_day(event.event_date);

        let mut known: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();
        let mut missing = Vec::new();
        {
            let memo = self.memo.read().unwrap_or_else(PoisonError::into_inner);
            for date in &expected {
                match memo.get(&(ticker.clone(), *date)) {
                    Some(Some(bar)) => {
                        known.insert(*date, bar.clone());
                    }
                    Some(None) => {}
                    None => missing.push(*date),
                }
            }
        }
        if !missing.is_empty() {
            known.extend(self.fill(&event.listing, &missing));
        }

        let bars: Vec<PriceBar> = expected.iter().filter_map(|d| known.get(d).cloned()).collect();
        let gaps: Vec<NaiveDate> = expected
            .iter()
            .filter(|d| !known.contains_key(d))
            .copied()
            .collect();
        if !gaps.is_empty() {
            tracing::debug!(
                event = %event.event_id,
                ticker = %ticker,
                gaps = gaps.len(),
                expected = expected.len(),
                "price window has gaps"
            );
        }

        PriceWindow {
            event_id: event.event_id.clone(),
            ticker: ticker.clone(),
            anchor,
            half_window,
            expected,
            bars,
            gaps,
        }
    }

    /// Fetch windows for many events on a bounded pool. Output order matches
    /// `events`.
    pub fn fetch_windows(&self, events: &[DisclosureEvent], half_window: u32) -> Vec<PriceWindow> {
        match rayon::ThreadPoolBuilder::new().num_threads(self.threads).build() {
            Ok(pool) => pool.install(|| {
                events
                    .par_iter()
                    .map(|e| self.fetch_window(e, half_window))
                    .collect()
            }),
            Err(e) => {
                tracing::warn!(error = %e, "thread pool unavailable, fetching windows sequentially");
                events
                    .iter()
                    .map(|e| self.fetch_window(e, half_window))
                    .collect()
            }
        }
    }

    /// One source request through the retry policy. `NotFound` is an empty,
    /// definitive answer. Returned bars are restricted to the ticker, the
    /// requested span and sane OHLC values.
    fn query(
        &self,
        source: &dyn PriceSource,
        listing: &Listing,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        let what = format!("{} {} {start}..={end}", source.name(), listing.ticker);
        match self.retry.run(&what, None, || source.fetch(listing, start, end)) {
            Ok(bars) => Ok(bars
                .into_iter()
                .filter(|b| b.ticker == listing.ticker && b.date >= start && b.date <= end)
                .filter(PriceBar::is_sane)
                .map(|mut b| {
                    b.source = source.origin();
                    b
                })
                .collect()),
            Err(FetchError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Resolve `missing` (ascending, non-empty) through the sources and record
    /// definitive answers in the memo.
    fn fill(&self, listing: &Listing, missing: &[NaiveDate]) -> BTreeMap<NaiveDate, PriceBar> {
        let mut found: BTreeMap<NaiveDate, PriceBar> = BTreeMap::new();
        let mut pending: Vec<NaiveDate> = missing.to_vec();
        let mut uncertain: BTreeSet<NaiveDate> = BTreeSet::new();

        for (rank, source) in self.sources.iter().enumerate() {
            if pending.is_empty() {
                break;
            }
            if !source.is_available() {
                uncertain.extend(pending.iter().copied());
                continue;
            }

            if rank == 0 {
                let (start, end) = (pending[0], pending[pending.len() - 1]);
                match self.query(source.as_ref(), listing, start, end) {
                    Ok(bars) => {
                        for bar in bars {
                            if pending.contains(&bar.date) {
                                found.insert(bar.date, bar);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            source = source.name(),
                            ticker = %listing.ticker,
                            error = %e,
                            "primary price request failed"
                        );
                        uncertain.extend(pending.iter().copied());
                    }
                }
            } else {
                for date in &pending {
                    match self.query(source.as_ref(), listing, *date, *date) {
                        Ok(bars) => {
                            if let Some(bar) = bars.into_iter().find(|b| b.date == *date) {
                                found.insert(*date, bar);
                            }
                        }
                        Err(e) => {
                            tracing::debug!(
                                source = source.name(),
                                ticker = %listing.ticker,
                                date = %date,
                                error = %e,
                                "fallback price request failed"
                            );
                            uncertain.insert(*date);
                        }
                    }
                }
            }
            pending.retain(|d| !found.contains_key(d));
        }

        let mut memo = self.memo.write().unwrap_or_else(PoisonError::into_inner);
        for (date, bar) in &found {
            memo.entry((listing.ticker.clone(), *date))
                .or_insert_with(|| Some(bar.clone()));
        }
        for date in pending.iter().filter(|d| !uncertain.contains(d)) {
            memo.entry((listing.ticker.clone(), *date)).or_insert(None);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::memory::InMemoryPrices;
    use crate::domain::{FilingId, Market, PriceOrigin};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(ticker: &str, date: NaiveDate, close: f64) -> PriceBar {
        PriceBar {
            ticker: ticker.into(),
            date,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 1_000,
            source: PriceOrigin::Primary,
        }
    }

    fn event(id: &str, ticker: &str, date: NaiveDate) -> DisclosureEvent {
        DisclosureEvent {
            event_id: FilingId::new(id),
            listing: Listing::new(ticker, Market::Kospi),
            event_date: date,
        }
    }

    /// Every weekday of January 2024 for `ticker`.
    fn january(ticker: &str, origin: PriceOrigin) -> InMemoryPrices {
        let cal = TradingCalendar::weekdays();
        let mut src = InMemoryPrices::new(origin.as_str(), origin);
        for (i, date) in cal.trading_days(d(2024, 1, 1), d(2024, 1, 31)).into_iter().enumerate() {
            src.insert(bar(ticker, date, 100.0 + i as f64));
        }
        src
    }

    fn fetcher(primary: Arc<InMemoryPrices>, secondary: Arc<InMemoryPrices>) -> PriceWindowFetcher {
        PriceWindowFetcher::new(
            vec![primary as Arc<dyn PriceSource>, secondary],
            TradingCalendar::weekdays(),
        )
            .with_retry(RetryPolicy::immediate(1))
            .with_threads(2)
    }

    #[test]
    fn secondary_fills_single_missing_date() {
        let mut primary = january("005930", PriceOrigin::Primary);
        primary.remove("005930", d(2024, 1, 16));
        let primary = Arc::new(primary);
        let secondary = Arc::new(january("005930", PriceOrigin::Secondary));
        let f = fetcher(primary.clone(), secondary.clone());

        let w = f.fetch_window(&event("e1", "005930", d(2024, 1, 15)), 2);
        assert_eq!(w.expected.len(), 5);
        assert_eq!(w.coverage(), 1.0);
        assert!(w.is_complete());
        let filled = w.bars.iter().find(|b| b.date == d(2024, 1, 16)).unwrap();
        assert_eq!(filled.source, PriceOrigin::Secondary);
        assert_eq!(primary.calls(), 1);
        assert_eq!(
            secondary.requests(),
            vec![("005930".to_string(), d(2024, 1, 16), d(2024, 1, 16))]
        );
    }

    #[test]
    fn shared_dates_are_served_from_memo() {
        let primary = Arc::new(january("000660", PriceOrigin::Primary));
        let secondary = Arc::new(january("000660", PriceOrigin::Secondary));
        let f = fetcher(primary.clone(), secondary.clone());

        f.fetch_window(&event("a", "000660", d(2024, 1, 17)), 3);
        let calls = primary.calls();
        let w = f.fetch_window(&event("b", "000660", d(2024, 1, 17)), 2);
        assert_eq!(primary.calls(), calls);
        assert_eq!(secondary.calls(), 0);
        assert!(w.is_complete());
    }

    #[test]
    fn confirmed_gaps_are_memoized() {
        let mut primary = january("035720", PriceOrigin::Primary);
        primary.remove("035720", d(2024, 1, 10));
        let mut secondary = january("035720", PriceOrigin::Secondary);
        secondary.remove("035720", d(2024, 1, 10));
        let (primary, secondary) = (Arc::new(primary), Arc::new(secondary));
        let f = fetcher(primary.clone(), secondary.clone());

        let w = f.fetch_window(&event("a", "035720", d(2024, 1, 10)), 1);
        assert_eq!(w.gaps, vec![d(2024, 1, 10)]);
        assert!((w.coverage() - 2.0 / 3.0).abs() < 1e-12);

        let (p, s) = (primary.calls(), secondary.calls());
        f.fetch_window(&event("b", "035720", d(2024, 1, 10)), 1);
        assert_eq!((primary.calls(), secondary.calls()), (p, s));
    }

    #[test]
    fn failed_dates_are_retried_later() {
        let primary = Arc::new(january("005380", PriceOrigin::Primary));
        let secondary = Arc::new(january("005380", PriceOrigin::Secondary));
        primary.fail("005380", [FetchError::Server("502".into())]);
        secondary.fail(
            "005380",
            (0..3).map(|_| FetchError::NetworkUnreachable("reset".into())),
        );
        let f = fetcher(primary.clone(), secondary.clone());

        let w = f.fetch_window(&event("a", "005380", d(2024, 1, 10)), 1);
        assert_eq!(w.coverage(), 0.0);
        assert_eq!(f.memo_len(), 0);

        let w = f.fetch_window(&event("b", "005380", d(2024, 1, 10)), 1);
        assert!(w.is_complete());
        assert!(w.bars.iter().all(|b| b.source == PriceOrigin::Primary));
    }

    #[test]
    fn unknown_ticker_is_definitive_gap() {
        let primary = Arc::new(InMemoryPrices::new("primary", PriceOrigin::Primary));
        let secondary = Arc::new(InMemoryPrices::new("secondary", PriceOrigin::Secondary));
        primary.fail("999999", [FetchError::NotFound("symbol".into())]);
        let f = fetcher(primary, secondary);
        let w = f.fetch_window(&event("a", "999999", d(2024, 1, 10)), 1);
        assert_eq!(w.coverage(), 0.0);
        assert_eq!(f.memo_len(), 3);
        assert!(f.cached_bars().is_empty());
    }

    #[test]
    fn parallel_windows_keep_order() {
        let primary = Arc::new(january("005930", PriceOrigin::Primary));
        let secondary = Arc::new(january("005930", PriceOrigin::Secondary));
        let f = fetcher(primary, secondary);
        let events: Vec<_> = (8..=19)
            .map(|day| event(&format!("e{day}"), "005930", d(2024, 1, day)))
            .collect();
        let windows = f.fetch_windows(&events, 2);
        assert_eq!(windows.len(), events.len());
        for (w, e) in windows.iter().zip(&events) {
            assert_eq!(w.event_id, e.event_id);
            assert!(w.coverage() > 0.0 && w.coverage() <= 1.0);
        }
        let cached = f.cached_bars();
        assert!(cached.windows(2).all(|p| p[0].date < p[1].date));
    }
}
