//! Criterion benchmarks for window scoring.
//!
//! Run with: `cargo bench -p divlab-runner`

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use divlab_core::data::TradingCalendar;
use divlab_core::domain::{FilingId, PriceBar, PriceOrigin, PriceWindow, WindowCandidateResult};
use divlab_runner::{score_candidate, select_window};

/// `n` complete windows of half-width `h` with a deterministic wavy close.
fn make_windows(n: usize, h: u32) -> Vec<PriceWindow> {
    let cal = TradingCalendar::weekdays();
    let base = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    (0..n)
        .map(|i| {
            let event_date = cal.next_trading_day(base + Duration::days(40 + (i as i64 * 3) % 600));
            let expected = cal.window(event_date, h);
            let bars = expected
                .iter()
                .enumerate()
                .map(|(j, date)| {
                    let close = 20_000.0 + ((i * 31 + j) as f64 * 0.37).sin() * 400.0;
                    PriceBar {
                        ticker: format!("{:06}", i % 50),
                        date: *date,
                        open: close,
                        high: close + 100.0,
                        low: close - 100.0,
                        close,
                        volume: 50_000 + j as u64,
                        source: PriceOrigin::Primary,
                    }
                })
                .collect();
            PriceWindow {
                event_id: FilingId::new(format!("{i:014}")),
                ticker: format!("{:06}", i % 50),
                anchor: event_date,
                half_window: h,
                expected,
                bars,
                gaps: Vec::new(),
            }
        })
        .collect()
}

fn bench_score_candidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_candidate");
    for h in [5u32, 10, 20] {
        let windows = make_windows(500, h);
        group.bench_with_input(BenchmarkId::from_parameter(h), &h, |b, &h| {
            b.iter(|| score_candidate(h, black_box(&windows), 0.8))
        });
    }
    group.finish();
}

fn bench_select_window(c: &mut Criterion) {
    let results: Vec<WindowCandidateResult> = (1..=30)
        .map(|h| WindowCandidateResult {
            half_window: h,
            retention_rate: 1.0 - h as f64 * 0.01,
            proxy_score: (h as f64 * 0.3).sin().abs(),
            sample_count: 500,
            event_count: 500,
        })
        .collect();
    c.bench_function("select_window_30", |b| {
        b.iter(|| select_window(black_box(&results), 0.85))
    });
}

criterion_group!(benches, bench_score_candidate, bench_select_window);
criterion_main!(benches);
