//! Price source trait.
//!
//! Primary and secondary price providers sit behind one interface and are
//! queried in priority order by the window fetcher. Sources never retry on
//! their own and know nothing about the memo.

use chrono::NaiveDate;

use crate::domain::{Listing, PriceBar, PriceOrigin};
use crate::net::FetchError;

pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Tag stamped on every bar this source returns.
    fn origin(&self) -> PriceOrigin;

    /// Daily bars for `listing` over `[start, end]`.
    ///
    /// `Ok` is a definitive answer: a trading day with no bar in the result
    /// has no bar at this source. `Err(NotFound)` means the source does not
    /// know the ticker at all, which is equally definitive.
    fn fetch(
        &self,
        listing: &Listing,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, FetchError>;

    /// False while the source's circuit breaker is open.
    fn is_available(&self) -> bool;
}
