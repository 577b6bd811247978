//! Static sector metadata: sector name to member tickers, from TOML.
//!
//! ```toml
//! [sectors]
//! "Information Technology" = ["005930", "000660"]
//! Financials = ["105560", "055550"]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UNCLASSIFIED: &str = "Unclassified";

#[derive(Debug, Error)]
pub enum SectorError {
    #[error("read sector file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse sector TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("ticker {ticker} listed under both {first} and {second}")]
    Conflict {
        ticker: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SectorFile {
    #[serde(default)]
    sectors: BTreeMap<String, Vec<String>>,
}

/// Sector table with reverse (ticker to sector) lookup.
#[derive(Debug, Clone, Default)]
pub struct SectorTable {
    sectors: BTreeMap<String, Vec<String>>,
    by_ticker: HashMap<String, String>,
}

impl SectorTable {
    pub fn from_file(path: &Path) -> Result<Self, SectorError> {
        let content = std::fs::read_to_string(path).map_err(|source| SectorError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SectorError> {
        let file: SectorFile = toml::from_str(content)?;
        Self::from_map(file.sectors)
    }

    /// A ticker may belong to one sector only.
    pub fn from_map(sectors: BTreeMap<String, Vec<String>>) -> Result<Self, SectorError> {
        let mut by_ticker: HashMap<String, String> = HashMap::new();
        for (sector, tickers) in &sectors {
            for ticker in tickers {
                if let Some(first) = by_ticker.insert(ticker.clone(), sector.clone()) {
                    if &first != sector {
                        return Err(SectorError::Conflict {
                            ticker: ticker.clone(),
                            first,
                            second: sector.clone(),
                        });
                    }
                }
            }
        }
        Ok(Self { sectors, by_ticker })
    }

    /// Sector label for a ticker; `Unclassified` when unknown.
    pub fn sector_of(&self, ticker: &str) -> &str {
        self.by_ticker
            .get(ticker)
            .map(String::as_str)
            .unwrap_or(UNCLASSIFIED)
    }

    pub fn sector_names(&self) -> Vec<&str> {
        self.sectors.keys().map(String::as_str).collect()
    }

    pub fn ticker_count(&self) -> usize {
        self.by_ticker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ticker.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[sectors]
"Information Technology" = ["005930", "000660"]
Financials = ["105560"]
"#;

    #[test]
    fn reverse_lookup() {
        let table = SectorTable::from_toml(TOML).unwrap();
        assert_eq!(table.sector_of("000660"), "Information Technology");
        assert_eq!(table.sector_of("105560"), "Financials");
        assert_eq!(table.sector_of("999999"), UNCLASSIFIED);
        assert_eq!(table.ticker_count(), 3);
        assert_eq!(table.sector_names(), vec!["Financials", "Information Technology"]);
    }

    #[test]
    fn ticker_in_two_sectors_is_rejected() {
        let err = SectorTable::from_toml("[sectors]\nA = [\"1\"]\nB = [\"1\"]\n").unwrap_err();
        assert!(matches!(err, SectorError::Conflict { .. }));
    }

    #[test]
    fn empty_file_is_empty_table() {
        let table = SectorTable::from_toml("").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.sector_of("005930"), UNCLASSIFIED);
    }
}
