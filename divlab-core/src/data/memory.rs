//! In-memory price source for offline runs and tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;

use super::provider::PriceSource;
use crate::domain::{Listing, PriceBar, PriceOrigin};
use crate::net::FetchError;

pub struct InMemoryPrices {
    name: String,
    origin: PriceOrigin,
    bars: HashMap<String, BTreeMap<NaiveDate, PriceBar>>,
    failures: Mutex<HashMap<String, VecDeque<FetchError>>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
}

impl InMemoryPrices {
    pub fn new(name: impl Into<String>, origin: PriceOrigin) -> Self {
        Self {
            name: name.into(),
            origin,
            bars: HashMap::new(),
            failures: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Store a bar; its source tag is overwritten with this source's origin.
    pub fn insert(&mut self, mut bar: PriceBar) {
        bar.source = self.origin;
        self.bars
            .entry(bar.ticker.clone())
            .or_default()
            .insert(bar.date, bar);
    }

    pub fn extend(&mut self, bars: impl IntoIterator<Item = PriceBar>) {
        for bar in bars {
            self.insert(bar);
        }
    }

    pub fn remove(&mut self, ticker: &str, date: NaiveDate) -> Option<PriceBar> {
        self.bars.get_mut(ticker).and_then(|m| m.remove(&date))
    }

    /// Queue errors returned by the next calls for `ticker`.
    pub fn fail(&self, ticker: &str, errors: impl IntoIterator<Item = FetchError>) {
        let mut map = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(ticker.to_string()).or_default().extend(errors);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every (ticker, start, end) request received, in arrival order.
    pub fn requests(&self) -> Vec<(String, NaiveDate, NaiveDate)> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PriceSource for InMemoryPrices {
    fn name(&self) -> &str {
        &self.name
    }

    fn origin(&self) -> PriceOrigin {
        self.origin
    }

    fn fetch(
        &self,
        listing: &Listing,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((listing.ticker.clone(), start, end));
        {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(err) = failures.get_mut(&listing.ticker).and_then(VecDeque::pop_front) {
                return Err(err);
            }
        }

        Ok(self
            .bars
            .get(&listing.ticker)
            .map(|m| m.range(start..=end).map(|(_, b)| b.clone()).collect())
            .unwrap_or_default())
    }

    fn is_available(&self) -> bool {
        true
    }
}
