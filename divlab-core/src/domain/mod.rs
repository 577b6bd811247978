//! Domain types for divlab

pub mod date_range;
pub mod disclosure;
pub mod feature;
pub mod ids;
pub mod price;
pub mod window;

pub use date_range::{DateRange, DateRangeError};
pub use disclosure::{
    DisclosureEvent, DisclosureRecord, DividendClass, DividendType, Listing, Market, ParseStatus,
    RejectReason,
};
pub use feature::{Exclusion, ExclusionReason, FeatureRow};
pub use ids::{FilingId, FilingType};
pub use price::{PriceBar, PriceOrigin};
pub use window::{PriceWindow, WindowCandidateResult};

/// Ticker type alias (six-digit KRX stock code)
pub type Ticker = String;
