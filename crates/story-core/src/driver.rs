use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::POOL_WIDTH;
use crate::fetch::{fetch, DownloadOutcome, FetchError, MediaSource, SkipReason};
use crate::resolve::resolve;
use crate::story::StoryRecord;
use crate::ThrottledProgress;

/// Outcome of one story, tagged with its position in the input batch.
#[derive(Debug)]
pub struct ItemOutcome {
    pub index: usize,
    pub id: Option<String>,
    pub outcome: DownloadOutcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    /// Number of files newly written by this run.
    pub fn downloaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_downloaded()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, DownloadOutcome::Skipped(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, DownloadOutcome::Failed(_)))
            .count()
    }
}

/// Download every record on a pool of `POOL_WIDTH` workers.
///
/// Items are independent: a resolution error, HTTP error, I/O error or
/// panic in one item is recorded in its outcome and never reaches siblings.
pub fn run(
    records: &[StoryRecord],
    root: &Path,
    source: &dyn MediaSource,
    progress: &ThrottledProgress,
) -> anyhow::Result<BatchReport> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(POOL_WIDTH)
        .thread_name(|i| format!("story-fetch-{}", i))
        .build()?;

    let total = records.len() as u64;
    let counter = AtomicU64::new(0);

    let outcomes: Vec<ItemOutcome> = pool.install(|| {
        records
            .par_iter()
            .enumerate()
            .map(|(index, record)| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    download_one(record, root, source)
                }))
                .unwrap_or_else(|payload| {
                    DownloadOutcome::Failed(FetchError::Panicked(panic_message(&payload)))
                });
                log_outcome(index, record, &outcome);

                let current = counter.fetch_add(1, Ordering::Relaxed);
                progress.report("download", current, total, "Downloading stories");

                ItemOutcome {
                    index,
                    id: record.id.clone(),
                    outcome,
                }
            })
            .collect()
    });

    let report = BatchReport { outcomes };
    info!(
        downloaded = report.downloaded(),
        skipped = report.skipped(),
        failed = report.failed(),
        "batch finished"
    );
    Ok(report)
}

fn download_one(record: &StoryRecord, root: &Path, source: &dyn MediaSource) -> DownloadOutcome {
    match resolve(record) {
        Ok(media) => fetch(&media, root, source),
        Err(e) => DownloadOutcome::Skipped(SkipReason::Unresolvable(e)),
    }
}

fn log_outcome(index: usize, record: &StoryRecord, outcome: &DownloadOutcome) {
    let id = record.id.as_deref().unwrap_or("-");
    match outcome {
        DownloadOutcome::Downloaded(path) => {
            debug!(index, id, path = %path.display(), "downloaded")
        }
        DownloadOutcome::Skipped(SkipReason::AlreadyExists(path)) => {
            debug!(index, id, path = %path.display(), "skipped, already exists")
        }
        DownloadOutcome::Skipped(SkipReason::Unresolvable(e)) => {
            debug!(index, id, reason = %e, "skipped, unresolvable")
        }
        DownloadOutcome::Failed(e) => warn!(index, id, error = %e, "download failed"),
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
