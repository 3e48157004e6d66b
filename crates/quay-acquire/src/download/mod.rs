//! Concurrent artifact downloading.
//!
//! A batch of [`DownloadEntry`] values is drained by a fixed pool of worker
//! tasks. Each entry is fetched through the HTTPS client or, for URLs that
//! match a recognized object-storage shape, through the multi-part storage
//! client, and written to its destination path.

mod https;
mod sink;
mod storage;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub use https::HttpsFetcher;
pub use sink::{VecSink, WriteAt};
pub use storage::{StorageClient, StorageClientConfig, StorageLocator};

use crate::progress::ProgressFactory;

pub(crate) const USER_AGENT: &str = concat!("quay-acquire/", env!("CARGO_PKG_VERSION"));
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised by the fetch clients.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("URL does not match a supported object-storage shape: {0}")]
    UnsupportedUrl(String),

    #[error("server does not support range requests: {0}")]
    RangeNotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The first error observed by a download batch.
///
/// Other workers' errors are discarded; a non-`Ok` result means the
/// installation may be partially complete and the caller is responsible for
/// cleanup or retry-from-scratch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("download failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One unit of download work: fetch `url`, write the bytes to `path`.
///
/// `data` is never interpreted here; it is carried through and handed back
/// to the caller for post-processing once the batch completes.
#[derive(Debug, Clone)]
pub struct DownloadEntry<T> {
    pub path: PathBuf,
    pub url: String,
    pub data: T,
}

impl<T> DownloadEntry<T> {
    pub fn new(path: impl Into<PathBuf>, url: impl Into<String>, data: T) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
            data,
        }
    }
}

/// Orchestrates a batch download across a fixed pool of workers.
pub struct DownloadManager {
    https: Arc<HttpsFetcher>,
    storage: Arc<StorageClient>,
}

impl DownloadManager {
    pub fn new(https: HttpsFetcher, storage: StorageClient) -> Self {
        Self {
            https: Arc::new(https),
            storage: Arc::new(storage),
        }
    }

    /// Download every entry, fanning out over `worker_count` workers.
    ///
    /// Fail-fast and non-atomic: the first fetch error stops workers from
    /// claiming new entries, but an entry already in flight runs to
    /// completion and files written before the failure stay on disk. On
    /// success the consumed entries are handed back (in completion order)
    /// so callers can post-process via their opaque `data`.
    pub async fn download<T: Send + Sync + 'static>(
        &self,
        entries: Vec<DownloadEntry<T>>,
        worker_count: usize,
        progress: Arc<dyn ProgressFactory>,
    ) -> Result<Vec<DownloadEntry<T>>, BatchError> {
        let total = entries.len() as u64;
        let worker_count = worker_count.max(1);
        log::debug!("downloading {} artifacts with {} workers", total, worker_count);

        // The queue is pre-filled before any worker starts; capacity equals
        // the batch size so no backpressure is needed.
        let queue = Arc::new(Mutex::new(VecDeque::from(entries)));
        let completed = Arc::new(Mutex::new(Vec::with_capacity(total as usize)));
        let batch_bar = progress.count_bar("Downloading", total);
        let failed = Arc::new(AtomicBool::new(false));
        let first_error: Arc<Mutex<Option<BatchError>>> = Arc::new(Mutex::new(None));

        let mut workers = tokio::task::JoinSet::new();
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let completed = Arc::clone(&completed);
            let batch_bar = Arc::clone(&batch_bar);
            let failed = Arc::clone(&failed);
            let first_error = Arc::clone(&first_error);
            let progress = Arc::clone(&progress);
            let https = Arc::clone(&self.https);
            let storage = Arc::clone(&self.storage);

            workers.spawn(async move {
                loop {
                    // Checked between entries only; an in-flight fetch is
                    // never cancelled by a sibling's failure.
                    if failed.load(Ordering::SeqCst) {
                        break;
                    }
                    let entry = queue.lock().unwrap().pop_front();
                    let Some(entry) = entry else { break };

                    match fetch_entry(&https, &storage, progress.as_ref(), &entry).await {
                        Ok(()) => {
                            batch_bar.increment_by(1);
                            completed.lock().unwrap().push(entry);
                        }
                        Err(err) => {
                            failed.store(true, Ordering::SeqCst);
                            let mut slot = first_error.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            break;
                        }
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                log::debug!("download worker panicked: {}", err);
            }
        }

        let err = first_error.lock().unwrap().take();
        match err {
            Some(err) => Err(err),
            None => {
                batch_bar.complete();
                Ok(Arc::try_unwrap(completed)
                    .map(|m| m.into_inner().unwrap())
                    .unwrap_or_default())
            }
        }
    }
}

async fn fetch_entry<T>(
    https: &HttpsFetcher,
    storage: &StorageClient,
    progress: &dyn ProgressFactory,
    entry: &DownloadEntry<T>,
) -> Result<(), BatchError> {
    let name = entry
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.url.clone());
    let reporter = progress.byte_bar(&name, None);

    let is_storage_url = Url::parse(&entry.url)
        .ok()
        .map(|u| StorageLocator::from_url(&u).is_ok())
        .unwrap_or(false);

    let bytes = if is_storage_url {
        storage.fetch(&entry.url, reporter.as_ref()).await
    } else {
        https.fetch(&entry.url, reporter.as_ref()).await
    }
    .map_err(|source| BatchError::Fetch {
        url: entry.url.clone(),
        source,
    })?;

    if let Some(parent) = entry.path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| BatchError::Write {
                path: entry.path.clone(),
                source,
            })?;
    }
    tokio::fs::write(&entry.path, &bytes)
        .await
        .map_err(|source| BatchError::Write {
            path: entry.path.clone(),
            source,
        })?;

    reporter.complete();
    Ok(())
}
