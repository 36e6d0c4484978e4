//! Extraction backend downloading the locator directly over HTTP(S)

use super::backend::{ExtractedAudio, ExtractionBackend, ProgressSender, ProgressTick};
use crate::config::RetryConfig;
use crate::error::FetchError;
use crate::retry::download_with_retry;
use crate::types::SourceLocator;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Direct HTTP(S) download of an audio resource
///
/// Establishing the request is retried with exponential backoff on transient
/// failures (timeouts, refused connections, 5xx). Once the body starts streaming,
/// an interruption fails the fetch.
pub struct HttpBackend {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpBackend {
    /// Create a backend with a per-request timeout and retry policy
    pub fn new(request_timeout: Duration, retry: RetryConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("trackfetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, retry })
    }

    fn parse_locator(locator: &SourceLocator) -> crate::Result<url::Url> {
        let url = url::Url::parse(locator.as_str()).map_err(|e| FetchError::Extraction {
            locator: locator.clone(),
            reason: format!("invalid URL: {}", e),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(FetchError::Extraction {
                locator: locator.clone(),
                reason: format!("unsupported scheme '{}'", other),
            }
            .into()),
        }
    }
}

#[async_trait]
impl ExtractionBackend for HttpBackend {
    async fn extract(
        &self,
        locator: &SourceLocator,
        output_path: &Path,
        progress: ProgressSender,
    ) -> crate::Result<ExtractedAudio> {
        let url = Self::parse_locator(locator)?;

        let response = download_with_retry(&self.retry, || {
            let request = self.client.get(url.clone());
            async move {
                let response = request.send().await?.error_for_status()?;
                Ok::<_, crate::Error>(response)
            }
        })
        .await
        .map_err(|e| match e {
            crate::Error::Network(e) => FetchError::Transfer {
                locator: locator.clone(),
                reason: e.to_string(),
            }
            .into(),
            other => other,
        })?;

        let total_bytes = response.content_length();

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(output_path).await?;

        let mut downloaded_bytes = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Transfer {
                locator: locator.clone(),
                reason: e.to_string(),
            })?;
            file.write_all(&chunk).await?;
            downloaded_bytes += chunk.len() as u64;
            // receiver may be gone; progress is best effort
            let _ = progress.send(ProgressTick {
                downloaded_bytes,
                total_bytes,
            });
        }
        file.flush().await?;

        if let Some(expected) = total_bytes
            && expected != downloaded_bytes
        {
            return Err(FetchError::Transfer {
                locator: locator.clone(),
                reason: format!(
                    "body ended after {} of {} bytes",
                    downloaded_bytes, expected
                ),
            }
            .into());
        }

        tracing::debug!(locator = %locator, bytes = downloaded_bytes, "HTTP download finished");
        Ok(ExtractedAudio { duration_ms: None })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_downloads_body_and_reports_progress() {
        let server = MockServer::start().await;
        let body = vec![7u8; 64 * 1024];
        Mock::given(method("GET"))
            .and(path("/audio/t1.opus"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("t1.opus");
        let backend = HttpBackend::new(Duration::from_secs(5), fast_retry()).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        backend
            .extract(
                &SourceLocator::new(format!("{}/audio/t1.opus", server.uri())),
                &output,
                tx,
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), body);

        let mut last = None;
        while let Ok(tick) = rx.try_recv() {
            last = Some(tick);
        }
        let last = last.expect("at least one progress tick");
        assert_eq!(last.downloaded_bytes, body.len() as u64);
        assert_eq!(last.total_bytes, Some(body.len() as u64));
        assert_eq!(last.percent(), Some(100.0));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"audio".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("t1.opus");
        let backend = HttpBackend::new(Duration::from_secs(5), fast_retry()).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        backend
            .extract(&SourceLocator::new(server.uri()), &output, tx)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_not_found_is_a_transfer_failure_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let backend = HttpBackend::new(Duration::from_secs(5), fast_retry()).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let result = backend
            .extract(
                &SourceLocator::new(server.uri()),
                &dir.path().join("t1.opus"),
                tx,
            )
            .await;
        assert!(matches!(
            result,
            Err(crate::Error::Fetch(FetchError::Transfer { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rejects_non_http_locators() {
        let backend = HttpBackend::new(Duration::from_secs(5), fast_retry()).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        for locator in ["not a url", "ftp://example.com/a.opus"] {
            let result = backend
                .extract(&SourceLocator::new(locator), Path::new("/tmp/unused.opus"), tx.clone())
                .await;
            assert!(matches!(
                result,
                Err(crate::Error::Fetch(FetchError::Extraction { .. }))
            ));
        }
    }
}
