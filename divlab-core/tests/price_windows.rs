//! Window fetching over in-memory primary/secondary sources.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use divlab_core::data::{InMemoryPrices, PriceSource, PriceWindowFetcher, TradingCalendar};
use divlab_core::domain::{DisclosureEvent, FilingId, Listing, Market, PriceBar, PriceOrigin};
use divlab_core::net::RetryPolicy;
use proptest::prelude::*;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn bar(ticker: &str, date: NaiveDate, close: f64) -> PriceBar {
    PriceBar {
        ticker: ticker.into(),
        date,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 500,
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

fn source(
    name: &str,
    origin: PriceOrigin,
    ticker: &str,
    cal: &TradingCalendar,
    skip: &[NaiveDate],
) -> InMemoryPrices {
    let mut src = InMemoryPrices::new(name, origin);
    for (i, date) in cal.trading_days(d(2024, 1, 1), d(2024, 3, 31)).into_iter().enumerate() {
        if !skip.contains(&date) {
            src.insert(bar(ticker, date, 1000.0 + i as f64));
        }
    }
    src
}

#[test]
fn secondary_supplies_the_single_date_primary_misses() {
    let cal = TradingCalendar::new([d(2024, 2, 9), d(2024, 2, 12)]);
    let missing = d(2024, 2, 14);
    let primary = Arc::new(source("yahoo", PriceOrigin::Primary, "005930", &cal, &[missing]));
    let secondary = Arc::new(source("naver", PriceOrigin::Secondary, "005930", &cal, &[]));
    let fetcher = PriceWindowFetcher::new(
        vec![primary.clone() as Arc<dyn PriceSource>, secondary.clone()],
        cal.clone(),
    )
    .with_retry(RetryPolicy::immediate(2));

    // Filed on the Lunar New Year holiday: anchor moves to the next session.
    let w = fetcher.fetch_window(&event("e", "005930", d(2024, 2, 9)), 3);
    assert_eq!(w.anchor, d(2024, 2, 13));
    assert_eq!(w.expected.len(), 7);
    assert!(!w.expected.contains(&d(2024, 2, 12)));
    assert_eq!(w.coverage(), 1.0);
    assert!(w.gaps.is_empty());

    let origins: Vec<_> = w.bars.iter().map(|b| (b.date, b.source)).collect();
    assert!(origins.contains(&(missing, PriceOrigin::Secondary)));
    assert_eq!(
        origins.iter().filter(|(_, o)| *o == PriceOrigin::Secondary).count(),
        1
    );
    assert_eq!(secondary.requests(), vec![("005930".to_string(), missing, missing)]);
}

#[test]
fn clustered_events_share_fetched_bars() {
    let cal = TradingCalendar::weekdays();
    let primary = Arc::new(source("yahoo", PriceOrigin::Primary, "000660", &cal, &[]));
    let secondary = Arc::new(source("naver", PriceOrigin::Secondary, "000660", &cal, &[]));
    let fetcher = PriceWindowFetcher::new(
        vec![primary.clone() as Arc<dyn PriceSource>, secondary.clone()],
        cal,
    )
    .with_retry(RetryPolicy::immediate(1))
    .with_threads(1);

    fetcher.fetch_window(&event("a", "000660", d(2024, 1, 24)), 5);
    assert_eq!(primary.calls(), 1);
    // Same dates, different filing: no network.
    let w = fetcher.fetch_window(&event("b", "000660", d(2024, 1, 24)), 5);
    assert_eq!(primary.calls(), 1);
    assert!(w.is_complete());
    // Overlapping window: only the uncached tail is requested.
    fetcher.fetch_window(&event("c", "000660", d(2024, 1, 26)), 5);
    assert_eq!(primary.calls(), 2);
    let (_, start, _) = primary.requests()[1].clone();
    assert!(start > d(2024, 1, 26));
    assert_eq!(secondary.calls(), 0);
}

proptest! {
    #[test]
    fn coverage_is_bars_over_expected(
        offset in 0i64..60,
        h in 0u32..8,
        holes in proptest::collection::vec(0i64..90, 0..12),
    ) {
        let cal = TradingCalendar::weekdays();
        let skip: Vec<NaiveDate> = holes.iter().map(|o| d(2024, 1, 1) + Duration::days(*o)).collect();
        let primary = Arc::new(source("p", PriceOrigin::Primary, "111111", &cal, &skip));
        let secondary = Arc::new(source("s", PriceOrigin::Secondary, "111111", &cal, &skip));
        let fetcher = PriceWindowFetcher::new(vec![primary as Arc<dyn PriceSource>, secondary], cal.clone())
            .with_retry(RetryPolicy::immediate(1));

        let event_date = d(2024, 1, 15) + Duration::days(offset);
        let w = fetcher.fetch_window(&event("e", "111111", event_date), h);

        prop_assert_eq!(w.expected.len(), 2 * h as usize + 1);
        prop_assert_eq!(w.bars.len() + w.gaps.len(), w.expected.len());
        let cov = w.coverage();
        prop_assert!((0.0..=1.0).contains(&cov));
        prop_assert!((cov - w.bars.len() as f64 / w.expected.len() as f64).abs() < 1e-12);
        prop_assert!(w.gaps.iter().all(|g| skip.contains(g)));
    }
}
