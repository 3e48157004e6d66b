//! Plain HTTPS artifact fetching.

use futures_util::StreamExt;

use super::sink::{VecSink, WriteAt};
use super::{FetchError, CONNECT_TIMEOUT, USER_AGENT};
use crate::progress::ProgressReporter;

/// Streaming HTTPS client for artifacts served by ordinary web endpoints.
///
/// No request timeout is set; artifact downloads are long-running and their
/// liveness is visible through the progress reporter instead.
pub struct HttpsFetcher {
    client: reqwest::Client,
}

impl HttpsFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch `url` into memory, reporting byte progress as chunks arrive.
    pub async fn fetch(
        &self,
        url: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<Vec<u8>, FetchError> {
        let sink = VecSink::new();
        self.fetch_to_sink(url, &sink, reporter).await?;
        Ok(sink.into_bytes())
    }

    /// Stream the response body into `sink`. The content length, when the
    /// server sends one, becomes the reporter's total.
    pub async fn fetch_to_sink(
        &self,
        url: &str,
        sink: &dyn WriteAt,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), FetchError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        if let Some(total) = response.content_length() {
            reporter.set_total(total, false);
        }

        let mut offset = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_at(offset, &chunk)?;
            offset += chunk.len() as u64;
            reporter.increment_by(chunk.len() as u64);
        }

        Ok(())
    }
}
