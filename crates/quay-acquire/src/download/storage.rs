//! Object-storage artifact fetching.
//!
//! Artifact URLs that point at S3-style object storage are downloaded in
//! parallel ranged parts. Pre-signed URLs are used exactly as given: the
//! query string is never re-encoded or rebuilt, since any change would
//! invalidate the signature.

use futures_util::{stream, StreamExt, TryStreamExt};
use url::Url;

use super::sink::{VecSink, WriteAt};
use super::{FetchError, CONNECT_TIMEOUT, USER_AGENT};
use crate::progress::ProgressReporter;

const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;
const DEFAULT_MAX_PARALLEL: usize = 4;

/// Bucket, key and region extracted from a recognized object-storage URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocator {
    pub bucket: String,
    pub key: String,
    pub region: String,
}

impl StorageLocator {
    /// Parse one of the three recognized URL shapes:
    ///
    /// - `https://<bucket>.s3.amazonaws.com/<key>` (legacy global endpoint,
    ///   region fixed to `us-east-1`)
    /// - `https://<bucket>.s3.<region>.amazonaws.com/<key>`
    /// - `https://s3.<region>.amazonaws.com/<bucket>/<key>` (path style)
    ///
    /// Anything else is rejected rather than guessed at; a misparsed region
    /// would produce signature errors far away from the real cause.
    pub fn from_url(url: &Url) -> Result<Self, FetchError> {
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::UnsupportedUrl(url.to_string()))?;
        let path = url.path().trim_start_matches('/');

        // Path style: the bucket is the first path segment.
        if let Some(region) = host
            .strip_prefix("s3.")
            .and_then(|rest| rest.strip_suffix(".amazonaws.com"))
        {
            let (bucket, key) = path
                .split_once('/')
                .ok_or_else(|| FetchError::UnsupportedUrl(url.to_string()))?;
            return Self::build(bucket, key, region, url);
        }

        // Legacy global endpoint carries no region in the host.
        if let Some(bucket) = host.strip_suffix(".s3.amazonaws.com") {
            return Self::build(bucket, path, "us-east-1", url);
        }

        // Virtual-hosted with region. The bucket name may itself contain
        // dots, so split on the last ".s3." marker.
        if let Some(rest) = host.strip_suffix(".amazonaws.com") {
            if let Some(idx) = rest.rfind(".s3.") {
                let bucket = &rest[..idx];
                let region = &rest[idx + 4..];
                return Self::build(bucket, path, region, url);
            }
        }

        Err(FetchError::UnsupportedUrl(url.to_string()))
    }

    fn build(bucket: &str, key: &str, region: &str, url: &Url) -> Result<Self, FetchError> {
        if bucket.is_empty() || key.is_empty() || region.is_empty() || region.contains('.') {
            return Err(FetchError::UnsupportedUrl(url.to_string()));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
            region: region.to_string(),
        })
    }
}

/// Tuning knobs for the multi-part storage client.
#[derive(Debug, Clone)]
pub struct StorageClientConfig {
    /// Size of each ranged part.
    pub part_size: u64,
    /// Upper bound on parts in flight per artifact.
    pub max_parallel: usize,
    /// Replaces the scheme and host of every request while keeping the
    /// path and query verbatim. Used to point the client at a local test
    /// server.
    pub endpoint_override: Option<String>,
}

impl Default for StorageClientConfig {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            max_parallel: DEFAULT_MAX_PARALLEL,
            endpoint_override: None,
        }
    }
}

/// Multi-part downloader for S3-style object storage.
pub struct StorageClient {
    client: reqwest::Client,
    config: StorageClientConfig,
}

impl StorageClient {
    pub fn new(config: StorageClientConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch an object into memory.
    ///
    /// When the object's size can be learned up front the body is pulled as
    /// parallel ranged parts written at their offsets; otherwise it falls
    /// back to a single sequential request.
    pub async fn fetch(
        &self,
        url: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url)?;
        let locator = StorageLocator::from_url(&parsed)?;
        log::debug!(
            "fetching s3://{}/{} ({})",
            locator.bucket,
            locator.key,
            locator.region
        );

        let request_url = self.request_url(url);
        match self.probe_content_length(&request_url).await {
            Some(len) => {
                reporter.set_total(len, false);
                let sink = VecSink::with_capacity(usize::try_from(len).unwrap_or(0));
                self.fetch_parts(&request_url, len, &sink, reporter).await?;
                Ok(sink.into_bytes())
            }
            None => {
                let sink = VecSink::new();
                self.fetch_sequential(&request_url, &sink, reporter).await?;
                Ok(sink.into_bytes())
            }
        }
    }

    /// Learn the object size with a plain GET whose body is dropped unread.
    /// Pre-signed URLs are signed for GET only, so HEAD is not an option.
    /// A failed probe degrades to an unknown-total sequential download; any
    /// real problem surfaces from that request instead.
    async fn probe_content_length(&self, url: &str) -> Option<u64> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => {
                log::debug!("content length probe failed: {}", err);
                return None;
            }
        };
        if !response.status().is_success() {
            log::debug!("content length probe returned HTTP {}", response.status());
            return None;
        }
        response.content_length()
    }

    async fn fetch_parts(
        &self,
        url: &str,
        len: u64,
        sink: &dyn WriteAt,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), FetchError> {
        let part_size = self.config.part_size.max(1);
        let mut parts = Vec::new();
        let mut start = 0u64;
        while start < len {
            let end = (start + part_size).min(len) - 1;
            parts.push((start, end));
            start = end + 1;
        }

        stream::iter(
            parts
                .into_iter()
                .map(|(start, end)| self.fetch_part(url, start, end, sink, reporter)),
        )
        .buffer_unordered(self.config.max_parallel.max(1))
        .try_collect::<Vec<()>>()
        .await?;

        Ok(())
    }

    async fn fetch_part(
        &self,
        url: &str,
        start: u64,
        end: u64,
        sink: &dyn WriteAt,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), FetchError> {
        let mut response = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await?;

        let status = response.status();
        // A 200 answer to a ranged request means the server ignored the
        // Range header and is sending the whole object.
        if status == reqwest::StatusCode::OK && start > 0 {
            return Err(FetchError::RangeNotSupported(url.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut offset = start;
        while let Some(chunk) = response.chunk().await? {
            sink.write_at(offset, &chunk)?;
            offset += chunk.len() as u64;
            reporter.increment_by(chunk.len() as u64);
        }
        Ok(())
    }

    async fn fetch_sequential(
        &self,
        url: &str,
        sink: &dyn WriteAt,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), FetchError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let mut offset = 0u64;
        while let Some(chunk) = response.chunk().await? {
            sink.write_at(offset, &chunk)?;
            offset += chunk.len() as u64;
            reporter.increment_by(chunk.len() as u64);
        }
        Ok(())
    }

    /// Keep the caller's URL byte-for-byte unless an endpoint override is
    /// configured, in which case only the scheme and host are replaced.
    fn request_url(&self, url: &str) -> String {
        match &self.config.endpoint_override {
            None => url.to_string(),
            Some(endpoint) => {
                let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
                let path_and_query = after_scheme
                    .find('/')
                    .map(|idx| &after_scheme[idx..])
                    .unwrap_or("/");
                format!("{}{}", endpoint.trim_end_matches('/'), path_and_query)
            }
        }
    }
}
