//! Price side: sources, trading calendar, window fetcher, sector metadata.

pub mod calendar;
pub mod memory;
pub mod naver;
pub mod provider;
pub mod sector;
pub mod window;
pub mod yahoo;

pub use calendar::TradingCalendar;
pub use memory::InMemoryPrices;
pub use naver::NaverSource;
pub use provider::PriceSource;
pub use sector::{SectorError, SectorTable, UNCLASSIFIED};
pub use window::PriceWindowFetcher;
pub use yahoo::YahooSource;
