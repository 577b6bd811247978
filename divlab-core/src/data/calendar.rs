//! Trading calendar: weekdays minus configured exchange holidays.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradingCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Plain Monday-to-Friday calendar.
    pub fn weekdays() -> Self {
        Self::default()
    }

    pub fn holidays(&self) -> &BTreeSet<NaiveDate> {
        &self.holidays
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// `date` itself if it is a trading day, otherwise the next one.
    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        while !self.is_trading_day(d) {
            d += Duration::days(1);
        }
        d
    }

    /// `date` itself if it is a trading day, otherwise the previous one.
    pub fn prev_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        while !self.is_trading_day(d) {
            d -= Duration::days(1);
        }
        d
    }

    /// Move `n` trading days from `date` (negative goes back). Starting from a
    /// non-trading day, the first step lands on the adjacent trading day.
    pub fn shift(&self, date: NaiveDate, n: i64) -> NaiveDate {
        let step = if n < 0 { -1 } else { 1 };
        let mut d = date;
        for _ in 0..n.unsigned_abs() {
            d += Duration::days(step);
            while !self.is_trading_day(d) {
                d += Duration::days(step);
            }
        }
        d
    }

    /// Trading days in `[start, end]`, ascending.
    pub fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_trading_day(*d))
            .collect()
    }

    /// The `2h + 1` trading days centered on the anchor of `event_date`
    /// (the event date or the next trading day after it).
    pub fn window(&self, event_date: NaiveDate, half_window: u32) -> Vec<NaiveDate> {
        let anchor = self.next_trading_day(event_date);
        let h = i64::from(half_window);
        let first = self.shift(anchor, -h);
        let last = self.shift(anchor, h);
        self.trading_days(first, last)
    }
}
