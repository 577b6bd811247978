//! End-to-end pipeline: collect, load, optimize the window, fetch prices,
//! build features, write artifacts.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use divlab_core::data::{
    NaverSource, PriceSource, PriceWindowFetcher, SectorError, SectorTable, YahooSource,
};
use divlab_core::domain::{DateRange, DisclosureRecord, FilingType, WindowCandidateResult};
use divlab_core::filings::{
    CheckpointStore, DartClient, DisclosureSource, DisclosureStore, InMemorySource, Normalizer,
    Rejection, StoreError,
};
use divlab_core::net::{CircuitBreaker, FetchError};

use crate::collector::{CollectError, CollectionReport, IncrementalCollector, SubRangeStatus};
use crate::config::{ConfigError, Credentials, PipelineConfig};
use crate::features::FeatureBuilder;
use crate::optimizer::{OptimizationReport, WindowOptimizer};
use crate::reporting::{read_price_history_csv, ArtifactPaths, ArtifactWriter};

pub const DISCLOSURE_STORE: &str = "disclosures.jsonl";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("collection error: {0}")]
    Collect(#[from] CollectError),

    #[error("disclosure store error: {0}")]
    Store(#[from] StoreError),

    #[error("sector table error: {0}")]
    Sector(#[from] SectorError),

    #[error("source setup error: {0}")]
    Source(#[from] FetchError),

    #[error("artifact export failed: {0}")]
    Artifact(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        PipelineError::Artifact(format!("{e:#}"))
    }
}

/// Remote collaborators, in priority order for prices.
pub struct PipelineSources {
    pub disclosures: Arc<dyn DisclosureSource>,
    pub prices: Vec<Arc<dyn PriceSource>>,
}

impl PipelineSources {
    /// OpenDART for filings; Yahoo then Naver for prices.
    pub fn remote(credentials: &Credentials, config: &PipelineConfig) -> Result<Self, PipelineError> {
        let dart = DartClient::new(
            credentials.dart_api_key.clone(),
            Arc::new(CircuitBreaker::for_source("opendart")),
        )?
        .with_page_size(config.collector.page_size);
        let yahoo = YahooSource::new(Arc::new(config.prices.breaker("yahoo")))?;
        let naver = NaverSource::new(Arc::new(config.prices.breaker("naver")))?;
        Ok(Self {
            disclosures: Arc::new(dart),
            prices: vec![Arc::new(yahoo), Arc::new(naver)],
        })
    }

    /// No network at all: stored disclosures and cached price history only.
    pub fn offline() -> Self {
        Self {
            disclosures: Arc::new(InMemorySource::new()),
            prices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub range: DateRange,
    pub data_dir: PathBuf,
    /// Overrides `collector.workers` when set.
    pub workers: Option<usize>,
    /// Skip collection and use what the store already holds.
    pub offline: bool,
    /// Processing date; filings dated later are rejected.
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedRange {
    pub filing_type: FilingType,
    pub range: DateRange,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSummary {
    pub ingested: usize,
    pub rejected: usize,
    pub committed_sub_ranges: usize,
    pub failed_ranges: Vec<FailedRange>,
    /// Every requested filing type was already synced.
    pub up_to_date: bool,
    pub disclosures: usize,
    pub events: usize,
    pub feature_rows: usize,
    pub excluded: usize,
    pub selected_window: Option<u32>,
    pub selected_stats: Option<WindowCandidateResult>,
    pub window_warning: bool,
    pub artifacts: Option<ArtifactPaths>,
}

impl PipelineSummary {
    /// At least one sub-range committed, or there was nothing left to sync.
    pub fn is_success(&self) -> bool {
        self.committed_sub_ranges > 0 || self.up_to_date
    }
}

pub fn disclosure_store(data_dir: &Path) -> DisclosureStore {
    DisclosureStore::new(data_dir.join(DISCLOSURE_STORE))
}

pub fn checkpoint_store(data_dir: &Path) -> CheckpointStore {
    CheckpointStore::new(data_dir.join(CHECKPOINT_FILE))
}

/// Run the collector for every configured filing type.
pub fn run_collection(
    config: &PipelineConfig,
    source: Arc<dyn DisclosureSource>,
    options: &RunOptions,
    cancel: Arc<AtomicBool>,
) -> Result<Vec<CollectionReport>, PipelineError> {
    config.validate()?;
    std::fs::create_dir_all(&options.data_dir).map_err(|source| StoreError::Io {
        path: options.data_dir.clone(),
        source,
    })?;

    let collector = IncrementalCollector::new(
        source,
        disclosure_store(&options.data_dir),
        checkpoint_store(&options.data_dir),
        Normalizer::new(options.today),
    )
    .with_sub_range_days(config.collector.sub_range_days)
    .with_request_interval(config.collector.request_interval())
    .with_retry(config.collector.retry.policy())
    .with_cancel_flag(cancel);

    let workers = options.workers.unwrap_or(config.collector.workers);
    let mut reports = Vec::new();
    for filing_type in config.collector.filing_types() {
        reports.push(collector.collect(options.range, &filing_type, workers)?);
    }
    Ok(reports)
}

fn summarize_collection(reports: &[CollectionReport], summary: &mut PipelineSummary) {
    summary.up_to_date = reports.iter().all(CollectionReport::is_up_to_date);
    for report in reports {
        summary.committed_sub_ranges += report.committed_count();
        summary.ingested += report.accepted_count();
        summary.rejected += report.rejections.len();
        for outcome in report.failed_ranges() {
            let error = match &outcome.status {
                SubRangeStatus::Failed { error } => error.clone(),
                _ => "cancelled".to_string(),
            };
            summary.failed_ranges.push(FailedRange {
                filing_type: report.filing_type.clone(),
                range: outcome.range,
                error,
            });
        }
    }
}

fn load_sectors(config: &PipelineConfig) -> Result<SectorTable, PipelineError> {
    match &config.sectors.file {
        Some(path) => Ok(SectorTable::from_file(path)?),
        None => Ok(SectorTable::default()),
    }
}

/// Full pipeline over `options.range`.
pub fn run_pipeline(
    config: &PipelineConfig,
    sources: PipelineSources,
    options: &RunOptions,
) -> Result<PipelineSummary, PipelineError> {
    config.validate()?;
    let sectors = load_sectors(config)?;

    let mut summary = PipelineSummary {
        ingested: 0,
        rejected: 0,
        committed_sub_ranges: 0,
        failed_ranges: Vec::new(),
        up_to_date: options.offline,
        disclosures: 0,
        events: 0,
        feature_rows: 0,
        excluded: 0,
        selected_window: None,
        selected_stats: None,
        window_warning: false,
        artifacts: None,
    };

    let mut rejections: Vec<Rejection> = Vec::new();
    if options.offline {
        tracing::info!("offline run, skipping collection");
    } else {
        let cancel = Arc::new(AtomicBool::new(false));
        let reports = run_collection(config, sources.disclosures, options, cancel)?;
        summarize_collection(&reports, &mut summary);
        rejections.extend(reports.into_iter().flat_map(|r| r.rejections));
    }

    let writer = ArtifactWriter::new(&options.data_dir)?;
    let stored = disclosure_store(&options.data_dir).read_unique()?;
    writer.write_disclosures(&stored)?;
    writer.write_rejections(&rejections)?;

    let in_range: Vec<DisclosureRecord> = stored
        .into_iter()
        .filter(|r| options.range.contains(r.filing_date))
        .collect();
    let events: Vec<_> = in_range.iter().filter_map(DisclosureRecord::event).collect();
    summary.disclosures = in_range.len();
    summary.events = events.len();
    tracing::info!(disclosures = in_range.len(), events = events.len(), "disclosures loaded");

    let fetcher = PriceWindowFetcher::new(sources.prices, config.calendar.calendar())
        .with_retry(config.prices.retry.policy())
        .with_threads(config.prices.threads);
    let history = &writer.paths().price_history_csv;
    if history.exists() {
        match read_price_history_csv(history) {
            Ok(bars) => {
                tracing::info!(bars = bars.len(), "seeded price memo from history");
                fetcher.seed(bars);
            }
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "ignoring unreadable price history"),
        }
    }

    let optimizer = WindowOptimizer::new(
        &fetcher,
        config.optimizer.min_retention,
        config.optimizer.min_coverage,
    );
    let report: OptimizationReport = optimizer.optimize(&events, &config.optimizer.candidates);
    let selected = report
        .selected
        .ok_or_else(|| ConfigError::Invalid("optimizer.candidates is empty".into()))?;

    let windows = fetcher.fetch_windows(&events, selected);
    let build = FeatureBuilder::new(&sectors, selected, config.optimizer.min_coverage)
        .build(&in_range, &windows);

    writer.write_price_history(&fetcher.cached_bars())?;
    writer.write_features(&build.rows, &build.exclusions)?;
    writer.write_window_report(&report)?;

    summary.feature_rows = build.rows.len();
    summary.excluded = build.exclusions.len();
    summary.selected_window = Some(selected);
    summary.selected_stats = report.selected_result().cloned();
    summary.window_warning = report.warning;
    summary.artifacts = Some(writer.paths().clone());

    tracing::info!(
        ingested = summary.ingested,
        rejected = summary.rejected,
        features = summary.feature_rows,
        excluded = summary.excluded,
        failed_ranges = summary.failed_ranges.len(),
        half_window = selected,
        "pipeline finished"
    );
    Ok(summary)
}
