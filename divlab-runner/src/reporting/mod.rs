//! Artifact export: CSV and Parquet tables plus the window report JSON.
//!
//! Every file is written to `{name}.tmp` in the output directory and renamed
//! into place, so a reader never sees a half-written table.

mod parquet;
mod tables;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use divlab_core::domain::{DisclosureRecord, Exclusion, FeatureRow, PriceBar};
use divlab_core::filings::Rejection;

use crate::optimizer::OptimizationReport;

pub use tables::{read_price_history_csv, DisclosureRow, WindowReportRow};

pub const DISCLOSURES_CSV: &str = "disclosures.csv";
pub const PRICE_HISTORY_CSV: &str = "price_history.csv";
pub const PRICE_HISTORY_PARQUET: &str = "price_history.parquet";
pub const FEATURES_CSV: &str = "features.csv";
pub const FEATURES_PARQUET: &str = "features.parquet";
pub const WINDOW_REPORT_CSV: &str = "window_report.csv";
pub const WINDOW_REPORT_JSON: &str = "window_report.json";
pub const REJECTIONS_CSV: &str = "rejections.csv";
pub const EXCLUSIONS_CSV: &str = "exclusions.csv";

/// Write `path` through a sibling temp file and an atomic rename.
pub fn write_atomic(path: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    if let Err(e) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub disclosures_csv: PathBuf,
    pub price_history_csv: PathBuf,
    pub price_history_parquet: PathBuf,
    pub features_csv: PathBuf,
    pub features_parquet: PathBuf,
    pub window_report_csv: PathBuf,
    pub window_report_json: PathBuf,
    pub rejections_csv: PathBuf,
    pub exclusions_csv: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            disclosures_csv: dir.join(DISCLOSURES_CSV),
            price_history_csv: dir.join(PRICE_HISTORY_CSV),
            price_history_parquet: dir.join(PRICE_HISTORY_PARQUET),
            features_csv: dir.join(FEATURES_CSV),
            features_parquet: dir.join(FEATURES_PARQUET),
            window_report_csv: dir.join(WINDOW_REPORT_CSV),
            window_report_json: dir.join(WINDOW_REPORT_JSON),
            rejections_csv: dir.join(REJECTIONS_CSV),
            exclusions_csv: dir.join(EXCLUSIONS_CSV),
        }
    }
}

/// Writes the pipeline's tables into one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    paths: ArtifactPaths,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create artifact directory {}", output_dir.display())
        })?;
        Ok(Self {
            paths: ArtifactPaths::in_dir(output_dir),
        })
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn write_disclosures(&self, records: &[DisclosureRecord]) -> Result<()> {
        write_atomic(&self.paths.disclosures_csv, |tmp| {
            tables::write_disclosures_csv(tmp, records)
        })
    }

    pub fn write_rejections(&self, rejections: &[Rejection]) -> Result<()> {
        write_atomic(&self.paths.rejections_csv, |tmp| {
            tables::write_rejections_csv(tmp, rejections)
        })
    }

    pub fn write_price_history(&self, bars: &[PriceBar]) -> Result<()> {
        write_atomic(&self.paths.price_history_csv, |tmp| {
            tables::write_price_history_csv(tmp, bars)
        })?;
        write_atomic(&self.paths.price_history_parquet, |tmp| {
            parquet::write_price_history_parquet(tmp, bars)
        })
    }

    pub fn write_features(&self, rows: &[FeatureRow], exclusions: &[Exclusion]) -> Result<()> {
        write_atomic(&self.paths.features_csv, |tmp| {
            tables::write_features_csv(tmp, rows)
        })?;
        write_atomic(&self.paths.features_parquet, |tmp| {
            parquet::write_features_parquet(tmp, rows)
        })?;
        write_atomic(&self.paths.exclusions_csv, |tmp| {
            tables::write_exclusions_csv(tmp, exclusions)
        })
    }

    pub fn write_window_report(&self, report: &OptimizationReport) -> Result<()> {
        write_atomic(&self.paths.window_report_csv, |tmp| {
            tables::write_window_report_csv(tmp, report)
        })?;
        write_atomic(&self.paths.window_report_json, |tmp| {
            let json = serde_json::to_string_pretty(report)
                .context("Failed to serialize window report")?;
            fs::write(tmp, json)
                .with_context(|| format!("Failed to write window report {}", tmp.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        write_atomic(&path, |tmp| Ok(fs::write(tmp, "a,b\n")?)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
        assert!(!dir.path().join("t.csv.tmp").exists());
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "old").unwrap();
        let result = write_atomic(&path, |tmp| {
            fs::write(tmp, "partial")?;
            anyhow::bail!("disk full")
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(!dir.path().join("t.csv.tmp").exists());
    }
}
