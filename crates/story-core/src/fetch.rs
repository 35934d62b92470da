use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::ClientConfig;
use crate::plan::plan;
use crate::resolve::{ResolveError, ResolvedMedia};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("download task panicked: {0}")]
    Panicked(String),
}

/// Why an item produced no new file without anything going wrong.
#[derive(Debug)]
pub enum SkipReason {
    AlreadyExists(PathBuf),
    Unresolvable(ResolveError),
}

/// Per-item result of the download loop.
#[derive(Debug)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    Skipped(SkipReason),
    Failed(FetchError),
}

impl DownloadOutcome {
    pub fn is_downloaded(&self) -> bool {
        matches!(self, DownloadOutcome::Downloaded(_))
    }
}

/// Retrieves media bytes for a URL.
pub trait MediaSource: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP source; one client is shared by all workers.
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(config: &ClientConfig) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.media_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl MediaSource for HttpSource {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_err = |source: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().map_err(request_err)?;
        Ok(body.to_vec())
    }
}

/// Download one item into its date bucket under `root`.
///
/// An existing destination short-circuits before any request is made.
pub fn fetch(media: &ResolvedMedia, root: &Path, source: &dyn MediaSource) -> DownloadOutcome {
    let dest = match plan(root, &media.folder, &media.filename) {
        Ok(path) => path,
        Err(source) => {
            return DownloadOutcome::Failed(FetchError::Io {
                path: root.join(&media.folder),
                source,
            })
        }
    };

    if dest.exists() {
        debug!(path = %dest.display(), "already archived");
        return DownloadOutcome::Skipped(SkipReason::AlreadyExists(dest));
    }

    let body = match source.get(&media.media_url) {
        Ok(body) => body,
        Err(e) => return DownloadOutcome::Failed(e),
    };

    match write_new(&dest, &body) {
        Ok(true) => {
            if let Some(secs) = media.taken_at {
                let ft = filetime::FileTime::from_unix_time(secs, 0);
                filetime::set_file_mtime(&dest, ft).ok();
            }
            DownloadOutcome::Downloaded(dest)
        }
        // Another worker got there first.
        Ok(false) => DownloadOutcome::Skipped(SkipReason::AlreadyExists(dest)),
        Err(source) => DownloadOutcome::Failed(FetchError::Io { path: dest, source }),
    }
}

/// Write via a sibling temp file and a no-clobber rename.
/// Returns `Ok(false)` if `dest` appeared in the meantime.
fn write_new(dest: &Path, body: &[u8]) -> io::Result<bool> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)?;
    tmp.write_all(body)?;
    tmp.flush()?;

    match tmp.persist_noclobber(dest) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}
