//! divlab core: domain types, disclosure sources and normalization, price
//! sources and the price window fetcher.
//!
//! - Domain types (disclosure records, price bars, windows, feature rows)
//! - Network plumbing (error classes, retry, pacing, circuit breaker)
//! - Filings: OpenDART client, body parser, normalizer, store, checkpoint
//! - Prices: Yahoo/Naver sources, trading calendar, memoized window fetcher

pub mod data;
pub mod domain;
pub mod filings;
pub mod net;
