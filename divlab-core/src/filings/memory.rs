//! In-memory disclosure source for offline replay and tests.
//!
//! Holds a fixed set of filings with bodies and serves them through the same
//! pagination contract as the remote API. Failures can be scripted per
//! listing sub-range start date and per filing body.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;

use super::source::{DisclosureSource, FilingListing, ListingPage, RawFiling};
use crate::domain::{DateRange, FilingId, FilingType};
use crate::net::FetchError;

pub struct InMemorySource {
    filings: BTreeMap<FilingType, Vec<RawFiling>>,
    page_size: usize,
    list_failures: Mutex<HashMap<NaiveDate, VecDeque<FetchError>>>,
    body_failures: Mutex<HashMap<FilingId, VecDeque<FetchError>>>,
    requested: Mutex<Vec<DateRange>>,
    list_calls: AtomicUsize,
    body_calls: AtomicUsize,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySource {
    pub fn new() -> Self {
        Self {
            filings: BTreeMap::new(),
            page_size: 100,
            list_failures: Mutex::new(HashMap::new()),
            body_failures: Mutex::new(HashMap::new()),
            requested: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            body_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn add(&mut self, filing_type: FilingType, filing: RawFiling) {
        self.filings.entry(filing_type).or_default().push(filing);
    }

    /// Queue errors returned by listing calls whose range starts at `start`,
    /// one per call, before the call succeeds.
    pub fn fail_listing(&self, start: NaiveDate, errors: impl IntoIterator<Item = FetchError>) {
        let mut map = self.list_failures.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(start).or_default().extend(errors);
    }

    pub fn fail_body(&self, filing_id: &FilingId, errors: impl IntoIterator<Item = FetchError>) {
        let mut map = self.body_failures.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(filing_id.clone()).or_default().extend(errors);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn body_calls(&self) -> usize {
        self.body_calls.load(Ordering::SeqCst)
    }

    /// Distinct ranges that reached the listing endpoint, sorted by start.
    pub fn requested_ranges(&self) -> Vec<DateRange> {
        let requested = self.requested.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ranges = requested.clone();
        ranges.sort_by_key(|r| (r.start, r.end));
        ranges.dedup();
        ranges
    }

    fn matching(&self, filing_type: &FilingType, range: DateRange) -> Vec<&RawFiling> {
        self.filings
            .get(filing_type)
            .map(|all| {
                all.iter()
                    .filter(|f| {
                        NaiveDate::parse_from_str(&f.listing.filing_date, "%Y%m%d")
                            .is_ok_and(|d| range.contains(d))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl DisclosureSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn list_page(
        &self,
        filing_type: &FilingType,
        range: DateRange,
        page_no: u32,
    ) -> Result<ListingPage, FetchError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.list_failures.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(err) = failures.get_mut(&range.start).and_then(VecDeque::pop_front) {
                return Err(err);
            }
        }
        self.requested
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(range);

        let matching = self.matching(filing_type, range);
        let total_pages = matching.len().div_ceil(self.page_size) as u32;
        let skip = (page_no.max(1) as usize - 1) * self.page_size;
        let items: Vec<FilingListing> = matching
            .into_iter()
            .skip(skip)
            .take(self.page_size)
            .map(|f| f.listing.clone())
            .collect();

        Ok(ListingPage {
            page_no,
            total_pages,
            items,
        })
    }

    fn fetch_body(&self, filing_id: &FilingId) -> Result<String, FetchError> {
        self.body_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.body_failures.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(err) = failures.get_mut(filing_id).and_then(VecDeque::pop_front) {
                return Err(err);
            }
        }
        self.filings
            .values()
            .flatten()
            .find(|f| &f.listing.filing_id == filing_id)
            .map(|f| f.body.clone())
            .ok_or_else(|| FetchError::NotFound(format!("filing {filing_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filings::source::ListingPages;

    fn filing(id: &str, date: &str) -> RawFiling {
        RawFiling {
            listing: FilingListing {
                filing_id: FilingId::new(id),
                corp_code: "00000001".into(),
                corp_name: "Test Corp".into(),
                corp_cls: "Y".into(),
                stock_code: "000001".into(),
                report_name: "현금ㆍ현물배당결정".into(),
                filing_date: date.into(),
            },
            body: String::new(),
        }
    }

    fn range(a: (i32, u32, u32), b: (i32, u32, u32)) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(a.0, a.1, a.2).unwrap(),
            NaiveDate::from_ymd_opt(b.0, b.1, b.2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn pages_through_matching_filings() {
        let ty = FilingType::new("I002");
        let mut src = InMemorySource::new().with_page_size(2);
        for (i, day) in ["20240102", "20240103", "20240104", "20240120"].iter().enumerate() {
            src.add(ty.clone(), filing(&format!("id{i}"), day));
        }

        let pages: Vec<_> = ListingPages::new(&src, ty, range((2024, 1, 1), (2024, 1, 10)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].items.len(), 2);
        assert_eq!(pages[1].items.len(), 1);
    }

    #[test]
    fn scripted_failure_then_restart_same_page() {
        let ty = FilingType::new("I002");
        let mut src = InMemorySource::new();
        src.add(ty.clone(), filing("a", "20240105"));
        let r = range((2024, 1, 1), (2024, 1, 7));
        src.fail_listing(r.start, [FetchError::Server("503".into())]);

        let mut pages = ListingPages::new(&src, ty, r);
        assert!(pages.fetch_next().is_err());
        assert_eq!(pages.next_page_no(), 1);
        let page = pages.fetch_next().unwrap().unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(pages.fetch_next().unwrap().is_none());
    }

    #[test]
    fn unknown_body_is_not_found() {
        let src = InMemorySource::new();
        let err = src.fetch_body(&FilingId::new("missing")).unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
        assert_eq!(src.body_calls(), 1);
    }
}
