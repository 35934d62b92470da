pub mod api;
pub mod config;
pub mod driver;
pub mod fetch;
pub mod plan;
pub mod resolve;
pub mod story;

#[cfg(test)]
mod test_support;

use std::fs;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use api::{BootstrapError, StoryApi, StorySource};
pub use config::{ArchiveOptions, ClientConfig};
pub use driver::BatchReport;
pub use fetch::{DownloadOutcome, HttpSource, MediaSource};
pub use story::StoryRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResult {
    pub total_stories: u64,
    pub downloaded: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Type alias for progress callback; `'a` lets the closure borrow locals.
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

/// Throttled progress reporter: emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        let now = Instant::now();
        Self {
            inner,
            last_emit: Mutex::new(now.checked_sub(Duration::from_secs(1)).unwrap_or(now)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap_or_else(|e| e.into_inner());
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// List the user's stories and download them into `options.output`.
///
/// Errors are bootstrap failures only; per-story problems end up in the counts.
pub fn archive(
    options: &ArchiveOptions,
    stories: &dyn StorySource,
    media: &dyn MediaSource,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ArchiveResult> {
    fs::create_dir_all(&options.output)
        .with_context(|| format!("cannot create {}", options.output.display()))?;

    let records = stories
        .list_stories(&options.username)
        .with_context(|| format!("cannot list stories for {}", options.username))?;

    if records.is_empty() {
        info!(username = %options.username, "no stories");
        return Ok(ArchiveResult::default());
    }

    let tp = ThrottledProgress::new(progress_callback);
    let report = driver::run(&records, &options.output, media, &tp)?;

    Ok(ArchiveResult {
        total_stories: records.len() as u64,
        downloaded: report.downloaded() as u64,
        skipped: report.skipped() as u64,
        failed: report.failed() as u64,
    })
}

/// `archive` against the live service using `options.client`.
pub fn archive_remote(
    options: &ArchiveOptions,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ArchiveResult> {
    let api = StoryApi::new(&options.client).context("cannot build API client")?;
    let media = HttpSource::new(&options.client).context("cannot build media client")?;
    archive(options, &api, &media, progress_callback)
}
