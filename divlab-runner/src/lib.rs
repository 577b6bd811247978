//! divlab runner: collection, window optimization, feature building, artifacts.
//!
//! This crate builds on `divlab-core` to provide:
//! - Pipeline configuration (TOML) and credentials
//! - Incremental, checkpointed disclosure collection on a bounded worker pool
//! - Window-size optimization (retention vs. proxy signal score)
//! - The canonical feature table
//! - CSV / Parquet / JSON artifact export

pub mod collector;
pub mod config;
pub mod features;
pub mod optimizer;
pub mod pipeline;
pub mod reporting;
pub mod returns;

pub use collector::{
    CollectError, CollectionReport, CommittedBatch, IncrementalCollector, SubRangeOutcome,
    SubRangeStatus,
};
pub use config::{
    CalendarConfig, CollectorConfig, ConfigError, Credentials, OptimizerConfig, PipelineConfig,
    PriceConfig, RetryConfig, SectorConfig,
};
pub use features::{FeatureBuild, FeatureBuilder};
pub use optimizer::{score_candidate, select_window, OptimizationReport, WindowOptimizer};
pub use pipeline::{
    run_collection, run_pipeline, FailedRange, PipelineError, PipelineSources, PipelineSummary,
    RunOptions,
};
pub use reporting::{ArtifactPaths, ArtifactWriter};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn collector_is_send_sync() {
        assert_send::<IncrementalCollector>();
        assert_sync::<IncrementalCollector>();
    }

    #[test]
    fn reports_are_send_sync() {
        assert_send::<CollectionReport>();
        assert_sync::<CollectionReport>();
        assert_send::<OptimizationReport>();
        assert_sync::<OptimizationReport>();
        assert_send::<FeatureBuild>();
        assert_sync::<FeatureBuild>();
        assert_send::<PipelineSummary>();
        assert_sync::<PipelineSummary>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
        assert_send::<Credentials>();
        assert_sync::<Credentials>();
    }

    #[test]
    fn pipeline_sources_are_send() {
        assert_send::<PipelineSources>();
        assert_sync::<PipelineSources>();
    }
}
