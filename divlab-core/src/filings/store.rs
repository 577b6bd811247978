//! Append-only JSONL disclosure store.
//!
//! One `DisclosureRecord` per line. Appends are written in one call and
//! fsync'd before returning, so a checkpoint written afterwards never refers
//! to records that are not on disk. Malformed lines (a torn final write) are
//! skipped on read.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::{DisclosureRecord, FilingId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("disclosure store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize record {filing_id}: {source}")]
    Serialize {
        filing_id: FilingId,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct DisclosureStore {
    path: PathBuf,
}

impl DisclosureStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Append records and fsync. An empty slice is a no-op.
    pub fn append(&self, records: &[DisclosureRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for rec in records {
            let line = serde_json::to_string(rec).map_err(|source| StoreError::Serialize {
                filing_id: rec.filing_id.clone(),
                source,
            })?;
            buf.push_str(&line);
            buf.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        // A torn previous write leaves no trailing newline; start on a fresh line.
        if !ends_with_newline(&mut file).map_err(|e| self.io_err(e))? {
            buf.insert(0, '\n');
        }

        file.write_all(buf.as_bytes()).map_err(|e| self.io_err(e))?;
        file.sync_data().map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Read every well-formed record, in file order.
    pub fn read_all(&self) -> Result<Vec<DisclosureRecord>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };

        let mut records = Vec::new();
        for (lineno, line) in io::BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_err(e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DisclosureRecord>(&line) {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping malformed disclosure line"
                    );
                }
            }
        }
        Ok(records)
    }

    /// Latest record per filing id, in first-seen order.
    pub fn read_unique(&self) -> Result<Vec<DisclosureRecord>, StoreError> {
        let mut slots: HashMap<FilingId, usize> = HashMap::new();
        let mut out: Vec<DisclosureRecord> = Vec::new();
        for rec in self.read_all()? {
            match slots.entry(rec.filing_id.clone()) {
                Entry::Occupied(slot) => out[*slot.get()] = rec,
                Entry::Vacant(slot) => {
                    slot.insert(out.len());
                    out.push(rec);
                }
            }
        }
        Ok(out)
    }

    pub fn known_ids(&self) -> Result<HashSet<FilingId>, StoreError> {
        Ok(self.read_all()?.into_iter().map(|r| r.filing_id).collect())
    }
}

fn ends_with_newline(file: &mut fs::File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DividendClass, DividendType, Listing, Market, ParseStatus};
    use chrono::NaiveDate;

    fn record(id: &str, amount: f64) -> DisclosureRecord {
        DisclosureRecord {
            filing_id: FilingId::new(id),
            corp_code: "00126380".into(),
            corp_name: "Samsung Electronics".into(),
            listing: Listing::new("005930", Market::Kospi),
            report_name: "현금ㆍ현물배당결정".into(),
            filing_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            dividend_type: DividendType::Cash,
            dividend_class: DividendClass::YearEnd,
            amount_per_share: Some(amount),
            dividend_yield: Some(1.9),
            total_amount: None,
            record_date: None,
            payment_date: None,
            body: "<html/>".into(),
            parse_status: ParseStatus::Ok,
        }
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = DisclosureStore::new(dir.path().join("nested").join("disclosures.jsonl"));
        assert!(store.read_all().unwrap().is_empty());

        store.append(&[record("a", 1.0), record("b", 2.0)]).unwrap();
        store.append(&[record("c", 3.0)]).unwrap();
        store.append(&[]).unwrap();

        let ids: Vec<_> = store.read_all().unwrap().into_iter().map(|r| r.filing_id).collect();
        assert_eq!(ids, vec![FilingId::new("a"), FilingId::new("b"), FilingId::new("c")]);
        assert_eq!(store.known_ids().unwrap().len(), 3);
    }

    #[test]
    fn torn_line_is_skipped_and_next_append_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disclosures.jsonl");
        let store = DisclosureStore::new(&path);
        store.append(&[record("a", 1.0)]).unwrap();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"{\"filing_id\":\"tor").unwrap();
        }
        store.append(&[record("b", 2.0)]).unwrap();

        let recs = store.read_all().unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].filing_id, FilingId::new("b"));
    }

    #[test]
    fn read_unique_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = DisclosureStore::new(dir.path().join("d.jsonl"));
        store.append(&[record("a", 1.0), record("b", 2.0)]).unwrap();
        store.append(&[record("a", 5.0)]).unwrap();
        let recs = store.read_unique().unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].amount_per_share, Some(5.0));
    }

    #[test]
    fn read_unique_over_many_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = DisclosureStore::new(dir.path().join("d.jsonl"));
        let first: Vec<_> = (0..2_000).map(|i| record(&format!("{i:05}"), 1.0)).collect();
        store.append(&first).unwrap();
        // Every third id is re-appended with a new amount.
        let rewrites: Vec<_> = (0..2_000)
            .step_by(3)
            .map(|i| record(&format!("{i:05}"), i as f64))
            .collect();
        store.append(&rewrites).unwrap();

        let recs = store.read_unique().unwrap();
        assert_eq!(recs.len(), 2_000);
        for (i, rec) in recs.iter().enumerate() {
            assert_eq!(rec.filing_id, FilingId::new(format!("{i:05}")));
            let expected = if i % 3 == 0 { i as f64 } else { 1.0 };
            assert_eq!(rec.amount_per_share, Some(expected));
        }
    }
}
