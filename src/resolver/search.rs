//! Search backends used by the resolver

use crate::types::{MatchCandidate, SourceLocator};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Trait for a catalog-independent audio search service
///
/// Implementations return at most `max_results` candidates for a free-text query.
/// An error or an empty list only affects the current query variant; the resolver
/// moves on to the next one.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Search for candidates matching a free-text query
    async fn search(&self, query: &str, max_results: usize) -> crate::Result<Vec<MatchCandidate>>;

    /// Get the name of this backend
    fn name(&self) -> &'static str;
}

/// Search backend driving the external `yt-dlp` binary (`ytsearchN:` queries)
pub struct CliSearchBackend {
    binary_path: PathBuf,
}

impl CliSearchBackend {
    /// Create a backend with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }
}

#[async_trait]
impl SearchBackend for CliSearchBackend {
    async fn search(&self, query: &str, max_results: usize) -> crate::Result<Vec<MatchCandidate>> {
        let search_query = format!("ytsearch{}:{}", max_results, query);

        let output = Command::new(&self.binary_path)
            .args([
                "--dump-json",
                "--flat-playlist",
                "--no-download",
                "--no-warnings",
                "--ignore-errors",
                "--socket-timeout",
                "10",
            ])
            .arg(&search_query)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(crate::Error::ExternalTool(format!(
                "yt-dlp search exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let candidates = parse_search_output(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!(query, results = candidates.len(), "yt-dlp search finished");
        Ok(candidates.into_iter().take(max_results).collect())
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// One line of `yt-dlp --dump-json --flat-playlist` output
#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    view_count: Option<u64>,
}

impl SearchEntry {
    fn into_candidate(self) -> Option<MatchCandidate> {
        let locator = self
            .webpage_url
            .or(self.url)
            .or_else(|| {
                self.id
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })?;

        Some(MatchCandidate {
            locator: SourceLocator(locator),
            title: self.title.unwrap_or_default(),
            duration_secs: self.duration,
            publisher: self.channel.or(self.uploader).unwrap_or_default(),
            popularity: self.view_count.unwrap_or(0),
        })
    }
}

/// Parse newline-delimited JSON search output, skipping lines that are not entries
pub(crate) fn parse_search_output(stdout: &str) -> Vec<MatchCandidate> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<SearchEntry>(line) {
            Ok(entry) => entry.into_candidate(),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable search line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_output() {
        let stdout = concat!(
            r#"{"id":"abc","url":"https://www.youtube.com/watch?v=abc","title":"Band - Song (Official Audio)","duration":181.0,"channel":"BandVEVO","view_count":12345}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"id":"def","title":"Song cover","uploader":"Someone"}"#,
            "\n",
            r#"{"title":"no locator at all"}"#,
            "\n",
        );

        let candidates = parse_search_output(stdout);
        assert_eq!(candidates.len(), 2);

        assert_eq!(
            candidates[0].locator.as_str(),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(candidates[0].duration_secs, Some(181.0));
        assert_eq!(candidates[0].publisher, "BandVEVO");
        assert_eq!(candidates[0].popularity, 12345);

        // Missing url falls back to the id; missing channel falls back to uploader
        assert_eq!(
            candidates[1].locator.as_str(),
            "https://www.youtube.com/watch?v=def"
        );
        assert_eq!(candidates[1].publisher, "Someone");
        assert_eq!(candidates[1].duration_secs, None);
    }

    #[test]
    fn test_from_path_consistency_with_which_crate() {
        let which_result = which::which("yt-dlp");
        let from_path_result = CliSearchBackend::from_path();

        assert_eq!(
            which_result.is_ok(),
            from_path_result.is_some(),
            "from_path() should return Some if and only if which::which() succeeds"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_external_tool_error() {
        let backend = CliSearchBackend::new(PathBuf::from("/nonexistent/yt-dlp-binary-xyz"));
        let result = backend.search("anything", 3).await;
        assert!(matches!(result, Err(crate::Error::ExternalTool(_))));
    }
}
