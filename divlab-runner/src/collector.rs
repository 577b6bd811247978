//! Incremental disclosure collector.
//!
//! One `collect` call covers one filing type over one date range:
//!
//! 1. Resume from the checkpoint: only the parts of the range no synced
//!    interval covers are fetched, earlier gaps included.
//! 2. Split those gaps into fixed-size sub-ranges and hand them to a bounded
//!    rayon pool. Each worker pages through listings, skips known identifiers,
//!    fetches and normalizes new bodies.
//! 3. The calling thread commits worker outcomes strictly in sub-range order:
//!    store append (fsync'd) first, checkpoint rename second.
//!
//! A sub-range is marked synced only while every earlier sub-range of the run
//! has committed, so a failed or interrupted range is fetched again on the
//! next run. A sub-range with an unavailable filing body commits its records
//! but stays unsynced, so that body is retried too.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use divlab_core::domain::{DateRange, DisclosureRecord, FilingId, FilingType, RejectReason};
use divlab_core::filings::{
    CheckpointError, CheckpointStore, CollectionCheckpoint, DisclosureSource, DisclosureStore,
    FilingListing, ListingPages, NormalizedBatch, Normalizer, RawFiling, Rejection, StoreError,
};
use divlab_core::net::{FetchError, Pacer, RetryPolicy};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("disclosure store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// What happened to one sub-range.
#[derive(Debug, Clone, PartialEq)]
pub enum SubRangeStatus {
    Committed {
        new_records: usize,
        rejected: usize,
        /// Filings dropped because their identifier was already stored.
        duplicates: usize,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubRangeOutcome {
    pub range: DateRange,
    pub status: SubRangeStatus,
}

impl SubRangeOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, SubRangeStatus::Committed { .. })
    }
}

/// Records committed for one sub-range.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedBatch {
    pub range: DateRange,
    pub records: Vec<DisclosureRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionReport {
    pub filing_type: FilingType,
    pub requested: DateRange,
    /// The parts of `requested` that still needed fetching, in date order.
    /// Empty when the checkpoint already covered it.
    pub pending: Vec<DateRange>,
    /// One batch per committed sub-range, in date order.
    pub batches: Vec<CommittedBatch>,
    pub rejections: Vec<Rejection>,
    pub outcomes: Vec<SubRangeOutcome>,
    pub synced_through: Option<NaiveDate>,
    /// The checkpoint was unreadable and was rebuilt.
    pub recovered_checkpoint: bool,
}

impl CollectionReport {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn committed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_committed()).count()
    }

    pub fn failed_ranges(&self) -> Vec<&SubRangeOutcome> {
        self.outcomes.iter().filter(|o| !o.is_committed()).collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.status == SubRangeStatus::Cancelled)
    }

    /// Every committed record, parse failures included.
    pub fn records(&self) -> impl Iterator<Item = &DisclosureRecord> {
        self.batches.iter().flat_map(|b| b.records.iter())
    }

    /// Committed records that parsed cleanly.
    pub fn accepted_count(&self) -> usize {
        self.records().filter(|r| r.is_parsed()).count()
    }
}

enum WorkOutcome {
    Fetched {
        batch: NormalizedBatch,
        /// Listed filings whose body could not be retrieved.
        unavailable: usize,
    },
    Failed(FetchError),
    Cancelled,
}

pub struct IncrementalCollector {
    source: Arc<dyn DisclosureSource>,
    store: DisclosureStore,
    checkpoints: CheckpointStore,
    normalizer: Normalizer,
    sub_range_days: u32,
    request_interval: Duration,
    retry: RetryPolicy,
    cancel: Arc<AtomicBool>,
}

impl IncrementalCollector {
    pub fn new(
        source: Arc<dyn DisclosureSource>,
        store: DisclosureStore,
        checkpoints: CheckpointStore,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            source,
            store,
            checkpoints,
            normalizer,
            sub_range_days: 7,
            request_interval: Duration::ZERO,
            retry: RetryPolicy::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_sub_range_days(mut self, days: u32) -> Self {
        self.sub_range_days = days.max(1);
        self
    }

    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share a cancel flag with the caller (e.g. a Ctrl-C handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn store(&self) -> &DisclosureStore {
        &self.store
    }

    /// Load the checkpoint, quarantining and rebuilding a corrupt one.
    fn load_checkpoint(&self) -> Result<(CollectionCheckpoint, bool), CollectError> {
        match self.checkpoints.load() {
            Ok(checkpoint) => Ok((checkpoint, false)),
            Err(CheckpointError::Corrupt { reason, .. }) => {
                tracing::warn!(%reason, "checkpoint corrupt, rebuilding from disclosure store");
                self.checkpoints.quarantine()?;
                Ok((CollectionCheckpoint::default(), true))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn collect(
        &self,
        range: DateRange,
        filing_type: &FilingType,
        workers: usize,
    ) -> Result<CollectionReport, CollectError> {
        let (mut checkpoint, recovered) = self.load_checkpoint()?;

        let mut known: HashSet<FilingId> = self.store.known_ids()?;
        known.extend(checkpoint.known_ids(filing_type));

        let pending = checkpoint.unsynced(filing_type, range);

        let mut report = CollectionReport {
            filing_type: filing_type.clone(),
            requested: range,
            pending: pending.clone(),
            batches: Vec::new(),
            rejections: Vec::new(),
            outcomes: Vec::new(),
            synced_through: checkpoint.synced_through(filing_type),
            recovered_checkpoint: recovered,
        };

        if pending.is_empty() {
            tracing::info!(filing_type = %filing_type, %range, "range already synced, nothing to fetch");
            return Ok(report);
        }

        let sub_ranges: Vec<DateRange> = pending
            .iter()
            .flat_map(|gap| gap.split(self.sub_range_days))
            .collect();
        let workers = workers.clamp(1, sub_ranges.len());
        tracing::info!(
            filing_type = %filing_type,
            range = %range,
            gaps = pending.len(),
            sub_ranges = sub_ranges.len(),
            workers,
            known = known.len(),
            "collecting disclosures"
        );

        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        let pacers: Vec<Mutex<Pacer>> = (0..workers)
            .map(|_| Mutex::new(Pacer::new(self.request_interval)))
            .collect();
        let snapshot = &known.clone();
        let (tx, rx) = mpsc::channel::<(usize, WorkOutcome)>();

        let mut fatal: Option<CollectError> = None;
        let mut contiguous = true;

        pool.in_place_scope(|scope| {
            for (idx, sub) in sub_ranges.iter().copied().enumerate() {
                let tx = tx.clone();
                let pacers = &pacers;
                scope.spawn(move |_| {
                    let outcome = if self.cancel.load(Ordering::SeqCst) {
                        WorkOutcome::Cancelled
                    } else {
                        let slot = rayon::current_thread_index().unwrap_or(0) % pacers.len();
                        self.work(sub, filing_type, snapshot, &pacers[slot])
                    };
                    // The coordinator only hangs up after every outcome arrived.
                    let _ = tx.send((idx, outcome));
                });
            }
            drop(tx);

            let mut pending: BTreeMap<usize, WorkOutcome> = BTreeMap::new();
            let mut next = 0usize;
            for (idx, outcome) in rx.iter() {
                pending.insert(idx, outcome);
                while let Some(outcome) = pending.remove(&next) {
                    let sub = sub_ranges[next];
                    next += 1;
                    if fatal.is_some() {
                        report.outcomes.push(SubRangeOutcome {
                            range: sub,
                            status: SubRangeStatus::Cancelled,
                        });
                        continue;
                    }
                    match self.commit(
                        sub,
                        filing_type,
                        outcome,
                        contiguous,
                        &mut checkpoint,
                        &mut known,
                        &mut report,
                    ) {
                        Ok(committed) => contiguous &= committed,
                        Err(e) => {
                            tracing::error!(range = %sub, error = %e, "commit failed, stopping collection");
                            self.cancel.store(true, Ordering::SeqCst);
                            report.outcomes.push(SubRangeOutcome {
                                range: sub,
                                status: SubRangeStatus::Failed {
                                    error: e.to_string(),
                                },
                            });
                            fatal = Some(e);
                        }
                    }
                }
            }
        });

        if let Some(e) = fatal {
            return Err(e);
        }

        report.synced_through = checkpoint.synced_through(filing_type);
        tracing::info!(
            filing_type = %filing_type,
            committed = report.committed_count(),
            failed = report.failed_ranges().len(),
            records = report.records().count(),
            rejected = report.rejections.len(),
            synced_through = ?report.synced_through,
            "collection finished"
        );
        Ok(report)
    }

    /// Fetch and normalize one sub-range on a worker thread.
    fn work(
        &self,
        sub: DateRange,
        filing_type: &FilingType,
        known: &HashSet<FilingId>,
        pacer: &Mutex<Pacer>,
    ) -> WorkOutcome {
        match self.fetch_sub_range(sub, filing_type, known, pacer) {
            Ok((raws, unavailable)) => {
                let mut batch = self.normalizer.normalize_batch(&raws);
                let count = unavailable.len();
                batch
                    .rejections
                    .extend(unavailable.into_iter().map(|listing| Rejection {
                        filing_id: listing.filing_id,
                        reason: RejectReason::BodyUnavailable,
                        record: None,
                    }));
                WorkOutcome::Fetched {
                    batch,
                    unavailable: count,
                }
            }
            Err(FetchError::Cancelled) => WorkOutcome::Cancelled,
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(range = %sub, error = %e, "fatal source error, cancelling workers");
                    self.cancel.store(true, Ordering::SeqCst);
                } else {
                    tracing::warn!(range = %sub, error = %e, "sub-range failed");
                }
                WorkOutcome::Failed(e)
            }
        }
    }

    fn pace(&self, pacer: &Mutex<Pacer>) {
        pacer.lock().unwrap_or_else(PoisonError::into_inner).wait();
    }

    fn fetch_sub_range(
        &self,
        sub: DateRange,
        filing_type: &FilingType,
        known: &HashSet<FilingId>,
        pacer: &Mutex<Pacer>,
    ) -> Result<(Vec<RawFiling>, Vec<FilingListing>), FetchError> {
        let source = self.source.as_ref();
        let cancel = Some(self.cancel.as_ref());
        let mut pages = ListingPages::new(source, filing_type.clone(), sub);
        let mut seen: HashSet<FilingId> = HashSet::new();
        let mut raws = Vec::new();
        let mut unavailable = Vec::new();

        loop {
            let what = format!("{} list {filing_type} {sub} page {}", source.name(), pages.next_page_no());
            let page = self.retry.run(&what, cancel, || {
                self.pace(pacer);
                pages.fetch_next()
            })?;
            let Some(page) = page else { break };

            for item in page.items {
                if known.contains(&item.filing_id) || !seen.insert(item.filing_id.clone()) {
                    continue;
                }
                let what = format!("{} body {}", source.name(), item.filing_id);
                let body = self.retry.run(&what, cancel, || {
                    self.pace(pacer);
                    source.fetch_body(&item.filing_id)
                });
                match body {
                    Ok(body) => raws.push(RawFiling { listing: item, body }),
                    Err(e @ (FetchError::NotFound(_) | FetchError::ResponseFormat(_))) => {
                        tracing::warn!(filing_id = %item.filing_id, error = %e, "filing body unavailable");
                        unavailable.push(item);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok((raws, unavailable))
    }

    /// Commit one outcome. Returns whether the sub-range committed.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        sub: DateRange,
        filing_type: &FilingType,
        outcome: WorkOutcome,
        advance: bool,
        checkpoint: &mut CollectionCheckpoint,
        known: &mut HashSet<FilingId>,
        report: &mut CollectionReport,
    ) -> Result<bool, CollectError> {
        let (batch, unavailable) = match outcome {
            WorkOutcome::Fetched { batch, unavailable } => (batch, unavailable),
            WorkOutcome::Failed(e) => {
                report.outcomes.push(SubRangeOutcome {
                    range: sub,
                    status: SubRangeStatus::Failed {
                        error: e.to_string(),
                    },
                });
                return Ok(false);
            }
            WorkOutcome::Cancelled => {
                report.outcomes.push(SubRangeOutcome {
                    range: sub,
                    status: SubRangeStatus::Cancelled,
                });
                return Ok(false);
            }
        };

        let mut duplicates = 0usize;
        let mut records = Vec::new();
        for record in batch.records() {
            if known.insert(record.filing_id.clone()) {
                records.push(record);
            } else {
                duplicates += 1;
            }
        }

        if !records.is_empty() {
            self.store.append(&records)?;
        }

        // Rejected filings are remembered too, so their bodies are not fetched
        // again. Unavailable bodies are not: the next run retries them.
        let processed: Vec<&FilingId> = records
            .iter()
            .map(|r| &r.filing_id)
            .chain(
                batch
                    .rejections
                    .iter()
                    .filter(|r| r.record.is_none() && remembers(r.reason))
                    .map(|r| &r.filing_id),
            )
            .collect();
        known.extend(processed.iter().map(|id| (*id).clone()));
        checkpoint.remember(filing_type, processed);
        if advance && unavailable == 0 {
            checkpoint.mark_synced(filing_type, sub);
        }
        self.checkpoints.save(checkpoint)?;

        let rejected = batch.rejections.len();
        tracing::debug!(
            range = %sub,
            new_records = records.len(),
            rejected,
            duplicates,
            unavailable,
            "sub-range committed"
        );
        report.outcomes.push(SubRangeOutcome {
            range: sub,
            status: SubRangeStatus::Committed {
                new_records: records.len(),
                rejected,
                duplicates,
            },
        });
        report.rejections.extend(batch.rejections);
        report.batches.push(CommittedBatch { range: sub, records });
        Ok(true)
    }
}

fn remembers(reason: RejectReason) -> bool {
    !matches!(
        reason,
        RejectReason::DuplicateFilingId | RejectReason::BodyUnavailable
    )
}
