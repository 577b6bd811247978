//! Collection checkpoint: per filing type, the date intervals already synced
//! and the set of known filing identifiers.
//!
//! Synced coverage is a sorted list of disjoint, non-adjacent date ranges, so
//! a range collected out of order (a later month first, an earlier one after)
//! leaves a visible hole instead of being shadowed by a high-water date.
//!
//! The file is pretty JSON so it can be inspected by hand. Each filing type
//! carries a BLAKE3 digest of its sorted identifier list; a mismatch on load
//! means the file was edited or torn, and the caller quarantines it.
//!
//! Writes are atomic: write to `.tmp`, fsync, rename into place.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DateRange, FilingId, FilingType};

pub const CHECKPOINT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt checkpoint {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilingTypeProgress {
    #[serde(default)]
    pub synced: Vec<DateRange>,
    pub known_ids: BTreeSet<FilingId>,
    pub ids_digest: String,
}

impl FilingTypeProgress {
    pub fn digest_of(ids: &BTreeSet<FilingId>) -> String {
        let mut hasher = blake3::Hasher::new();
        for (i, id) in ids.iter().enumerate() {
            if i > 0 {
                hasher.update(b"\n");
            }
            hasher.update(id.as_str().as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    fn refresh_digest(&mut self) {
        self.ids_digest = Self::digest_of(&self.known_ids);
    }

    pub fn is_consistent(&self) -> bool {
        self.ids_digest == Self::digest_of(&self.known_ids)
    }

    /// Last synced date across every interval.
    pub fn synced_through(&self) -> Option<NaiveDate> {
        self.synced.last().map(|r| r.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionCheckpoint {
    pub version: u32,
    pub filing_types: BTreeMap<FilingType, FilingTypeProgress>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for CollectionCheckpoint {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            filing_types: BTreeMap::new(),
            updated_at: None,
        }
    }
}

impl CollectionCheckpoint {
    /// Latest synced date for `filing_type`; never moves backwards.
    pub fn synced_through(&self, filing_type: &FilingType) -> Option<NaiveDate> {
        self.filing_types
            .get(filing_type)
            .and_then(FilingTypeProgress::synced_through)
    }

    pub fn synced_ranges(&self, filing_type: &FilingType) -> &[DateRange] {
        self.filing_types
            .get(filing_type)
            .map(|p| p.synced.as_slice())
            .unwrap_or_default()
    }

    /// The parts of `range` not yet synced for `filing_type`, in date order.
    pub fn unsynced(&self, filing_type: &FilingType, range: DateRange) -> Vec<DateRange> {
        range.subtract(self.synced_ranges(filing_type))
    }

    pub fn is_known(&self, filing_type: &FilingType, id: &FilingId) -> bool {
        self.filing_types
            .get(filing_type)
            .is_some_and(|p| p.known_ids.contains(id))
    }

    pub fn known_ids(&self, filing_type: &FilingType) -> BTreeSet<FilingId> {
        self.filing_types
            .get(filing_type)
            .map(|p| p.known_ids.clone())
            .unwrap_or_default()
    }

    /// Record `range` as synced, merging it with touching intervals. Returns
    /// whether coverage grew.
    pub fn mark_synced(&mut self, filing_type: &FilingType, range: DateRange) -> bool {
        let progress = self.filing_types.entry(filing_type.clone()).or_default();
        progress.refresh_digest();
        if progress.synced.iter().any(|r| r.start <= range.start && range.end <= r.end) {
            return false;
        }
        DateRange::merge_into(&mut progress.synced, range);
        true
    }

    /// Add identifiers to the known set; returns how many were new.
    pub fn remember<'a>(
        &mut self,
        filing_type: &FilingType,
        ids: impl IntoIterator<Item = &'a FilingId>,
    ) -> usize {
        let progress = self.filing_types.entry(filing_type.clone()).or_default();
        let before = progress.known_ids.len();
        progress.known_ids.extend(ids.into_iter().cloned());
        let added = progress.known_ids.len() - before;
        progress.refresh_digest();
        added
    }

    /// Filing types whose digest does not match their identifier list.
    pub fn inconsistent_types(&self) -> Vec<FilingType> {
        self.filing_types
            .iter()
            .filter(|(_, p)| !p.is_consistent())
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Load the checkpoint. A missing file is an empty checkpoint; unreadable
    /// JSON or a digest mismatch is `Corrupt`.
    pub fn load(&self) -> Result<CollectionCheckpoint, CheckpointError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(CollectionCheckpoint::default())
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let checkpoint: CollectionCheckpoint =
            serde_json::from_str(&text).map_err(|e| CheckpointError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let bad = checkpoint.inconsistent_types();
        if !bad.is_empty() {
            let names: Vec<_> = bad.iter().map(FilingType::as_str).collect();
            return Err(CheckpointError::Corrupt {
                path: self.path.clone(),
                reason: format!("digest mismatch for {}", names.join(", ")),
            });
        }
        Ok(checkpoint)
    }

    /// Atomically replace the checkpoint file.
    pub fn save(&self, checkpoint: &CollectionCheckpoint) -> Result<(), CheckpointError> {
        let mut stamped = checkpoint.clone();
        stamped.updated_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&stamped)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            self.io_err(e)
        })
    }

    /// Move a corrupt checkpoint aside as `{file}.quarantined`.
    pub fn quarantine(&self) -> Result<PathBuf, CheckpointError> {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".quarantined");
        let target = PathBuf::from(name);
        fs::rename(&self.path, &target).map_err(|e| self.io_err(e))?;
        tracing::warn!(
            from = %self.path.display(),
            to = %target.display(),
            "quarantined corrupt checkpoint"
        );
        Ok(target)
    }
}
