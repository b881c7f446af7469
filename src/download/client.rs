//! Streaming downloader with byte-range resume, progress, and cancellation.
//!
//! [`Downloader::download`] streams a URL to a destination path. When a file
//! already exists at the destination its length becomes the resume offset and
//! the request carries a `Range` header from that offset. Downloads are
//! expensive, so the whole attempt is wrapped in the retry executor with only
//! two attempts.
//!
//! Progress fires per received chunk as
//! `(resume_offset + received) / (resume_offset + announced_total)`, clamped
//! to `[0, 1]`; when the server announces no total length, no progress fires
//! at all. The terminal outcome (path, error, or cancellation) is returned
//! exactly once.
//!
//! A failed attempt deletes the partial file only when it started from
//! offset 0; a failed resume leaves the partial intact for the next resume.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;

use crate::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, default_user_agent};
use crate::retry::RetryExecutor;

use super::error::DownloadError;

/// Downloads are expensive; do not retry indefinitely.
const DOWNLOAD_MAX_ATTEMPTS: u32 = 2;

/// Progress callback, invoked with a fraction in `[0, 1]`.
pub type ProgressFn = dyn Fn(f64) + Send + Sync;

/// Cooperative cancellation signal for an in-flight download.
///
/// Cloning shares the signal. Cancellation is observed between chunks and
/// before each retry attempt; a cancelled attempt is never retried.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Streaming HTTP downloader with resume support.
///
/// Created once and reused; the underlying client pools connections.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    retry: RetryExecutor,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    /// Creates a downloader with default timeouts (30s connect, 5min read).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .user_agent(default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            retry: RetryExecutor::new(),
        }
    }

    /// Downloads `url` to `dest`, resuming from an existing partial file.
    ///
    /// Returns `Ok(Some(path))` on success and `Ok(None)` on cancellation
    /// (a normal outcome, not an error).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for unparseable URLs and
    /// [`DownloadError::Exhausted`] wrapping the last transport, status, or
    /// IO failure once both attempts are spent.
    #[instrument(skip(self, on_progress, cancel), fields(url = %url, dest = %dest.display()))]
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: Option<&ProgressFn>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Option<PathBuf>, DownloadError> {
        if Url::parse(url).is_err() {
            return Err(DownloadError::invalid_url(url));
        }

        let this = self;
        let outcome = self
            .retry
            .execute(
                move || this.attempt(url, dest, on_progress, timeout, cancel),
                "download",
                DOWNLOAD_MAX_ATTEMPTS,
            )
            .await
            .map_err(|exhausted| DownloadError::Exhausted {
                operation: format!("download {url}"),
                attempts: exhausted.attempts,
                source: Box::new(exhausted.source),
            })?;

        match outcome {
            Some(bytes) => {
                info!(bytes, path = %dest.display(), "download complete");
                Ok(Some(dest.to_path_buf()))
            }
            None => {
                info!("download cancelled");
                Ok(None)
            }
        }
    }

    /// One download attempt. `Ok(None)` means cancelled; the retry wrapper
    /// treats that as a success, so cancellations are never retried.
    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        on_progress: Option<&ProgressFn>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Option<u64>, DownloadError> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        // An existing file at the destination is a partial from an earlier
        // attempt; its length is the resume offset.
        let resume_offset = match tokio::fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(url).timeout(timeout);
        if resume_offset > 0 {
            debug!(resume_offset, "resuming with range request");
            request = request.header(RANGE, format!("bytes={resume_offset}-"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        // The server honored the range only on 206; a 200 restarts from zero
        // even if we asked to resume.
        let resumed = resume_offset > 0 && status == StatusCode::PARTIAL_CONTENT;
        let effective_offset = if resumed { resume_offset } else { 0 };
        let announced_total = response
            .content_length()
            .map(|remaining| effective_offset + remaining);

        let mut file = if resumed {
            OpenOptions::new()
                .append(true)
                .open(dest)
                .await
                .map_err(|e| DownloadError::io(dest, e))?
        } else {
            File::create(dest)
                .await
                .map_err(|e| DownloadError::io(dest, e))?
        };

        let streamed = self
            .stream_body(response, &mut file, url, dest, effective_offset, announced_total, on_progress, cancel)
            .await;

        match streamed {
            Err(error) => {
                // Fresh attempts clean up after themselves; failed resumes
                // keep the partial for the next resume.
                if effective_offset == 0 {
                    debug!(path = %dest.display(), "removing partial file after failed fresh attempt");
                    let _ = tokio::fs::remove_file(dest).await;
                }
                Err(error)
            }
            Ok(None) => Ok(None),
            Ok(Some(received)) => {
                let final_size = effective_offset + received;
                if let Some(expected) = announced_total
                    && expected != final_size
                {
                    if effective_offset == 0 {
                        let _ = tokio::fs::remove_file(dest).await;
                    }
                    return Err(DownloadError::integrity(dest, expected, final_size));
                }
                Ok(Some(final_size))
            }
        }
    }

    /// Streams the response body to the open file. `Ok(None)` = cancelled.
    #[allow(clippy::too_many_arguments)]
    async fn stream_body(
        &self,
        response: reqwest::Response,
        file: &mut File,
        url: &str,
        dest: &Path,
        effective_offset: u64,
        announced_total: Option<u64>,
        on_progress: Option<&ProgressFn>,
        cancel: &CancelToken,
    ) -> Result<Option<u64>, DownloadError> {
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                debug!("cancellation observed mid-stream, aborting transfer");
                return Ok(None);
            }
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(url)
                } else {
                    DownloadError::network(url, e)
                }
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(dest, e))?;
            received += chunk.len() as u64;

            if let (Some(callback), Some(total)) = (on_progress, announced_total)
                && total > 0
            {
                let fraction =
                    ((effective_offset + received) as f64 / total as f64).clamp(0.0, 1.0);
                callback(fraction);
            }
        }

        file.flush().await.map_err(|e| DownloadError::io(dest, e))?;
        Ok(Some(received))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_roundtrip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_without_network() {
        let downloader = Downloader::new();
        let cancel = CancelToken::new();
        let result = downloader
            .download(
                "not a url",
                Path::new("/tmp/unused"),
                None,
                Duration::from_secs(1),
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_returns_none_without_network() {
        let downloader = Downloader::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = downloader
            .download(
                "http://127.0.0.1:9/never-reached",
                Path::new("/tmp/unused"),
                None,
                Duration::from_secs(1),
                &cancel,
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
