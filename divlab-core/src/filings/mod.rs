//! Filings side of the pipeline: listing/body sources, body parsing,
//! normalization into `DisclosureRecord`s, and the on-disk store and
//! checkpoint used by the collector.

pub mod checkpoint;
pub mod dart;
pub mod memory;
pub mod normalize;
pub mod parse;
pub mod source;
pub mod store;

pub use checkpoint::{CheckpointError, CheckpointStore, CollectionCheckpoint, FilingTypeProgress};
pub use dart::DartClient;
pub use memory::InMemorySource;
pub use normalize::{NormalizedBatch, Normalizer, Rejection};
pub use parse::{parse_body, ParsedBody};
pub use source::{DisclosureSource, FilingListing, ListingPage, ListingPages, RawFiling};
pub use store::{DisclosureStore, StoreError};
