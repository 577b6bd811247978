//! Disclosure source trait and the lazy, restartable page sequence over it.

use serde::{Deserialize, Serialize};

use crate::domain::{DateRange, FilingId, FilingType};
use crate::net::FetchError;

/// Raw filing metadata as returned by a listing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingListing {
    pub filing_id: FilingId,
    pub corp_code: String,
    pub corp_name: String,
    /// Market class code (`Y` KOSPI, `K` KOSDAQ, `N` KONEX, `E` other).
    pub corp_cls: String,
    pub stock_code: String,
    pub report_name: String,
    /// Filing date as `YYYYMMDD`.
    pub filing_date: String,
}

/// One page of a listing query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub page_no: u32,
    pub total_pages: u32,
    pub items: Vec<FilingListing>,
}

/// A listing joined with its fetched body, ready for normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFiling {
    pub listing: FilingListing,
    pub body: String,
}

/// Thin adapter over a regulatory filings API.
///
/// Implementations are stateless apart from connection reuse; they never
/// retry on their own. Retrying and pacing belong to the caller.
pub trait DisclosureSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch page `page_no` (1-based) of filings of `filing_type` in `range`.
    fn list_page(
        &self,
        filing_type: &FilingType,
        range: DateRange,
        page_no: u32,
    ) -> Result<ListingPage, FetchError>;

    /// Fetch the body (HTML or XML) of one filing.
    fn fetch_body(&self, filing_id: &FilingId) -> Result<String, FetchError>;
}

/// Lazy sequence of listing pages for one (filing type, range) query.
///
/// A failed fetch leaves the cursor in place, so calling again re-requests the
/// same page. The sequence ends after the last reported page or at the first
/// empty page.
pub struct ListingPages<'a> {
    source: &'a dyn DisclosureSource,
    filing_type: FilingType,
    range: DateRange,
    next_page: u32,
    total_pages: Option<u32>,
    done: bool,
}

impl<'a> ListingPages<'a> {
    pub fn new(source: &'a dyn DisclosureSource, filing_type: FilingType, range: DateRange) -> Self {
        Self {
            source,
            filing_type,
            range,
            next_page: 1,
            total_pages: None,
            done: false,
        }
    }

    /// Restart the sequence at a given page.
    pub fn starting_at(mut self, page_no: u32) -> Self {
        self.next_page = page_no.max(1);
        self
    }

    pub fn next_page_no(&self) -> u32 {
        self.next_page
    }

    /// Fetch the next page; `Ok(None)` once the sequence is exhausted.
    pub fn fetch_next(&mut self) -> Result<Option<ListingPage>, FetchError> {
        if self.done {
            return Ok(None);
        }
        if let Some(total) = self.total_pages {
            if self.next_page > total {
                self.done = true;
                return Ok(None);
            }
        }

        let page = self
            .source
            .list_page(&self.filing_type, self.range, self.next_page)?;

        if page.items.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.total_pages = Some(page.total_pages);
        self.next_page += 1;
        Ok(Some(page))
    }
}

impl Iterator for ListingPages<'_> {
    type Item = Result<ListingPage, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.fetch_next().transpose()
    }
}
