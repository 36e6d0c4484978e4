//! Extraction backend driving the external yt-dlp binary

use super::backend::{ExtractedAudio, ExtractionBackend, ProgressSender, ProgressTick};
use crate::error::FetchError;
use crate::types::SourceLocator;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Prefix marking our progress lines among yt-dlp's other output
const PROGRESS_MARKER: &str = "trackfetch-progress";

/// Extraction backend using the external `yt-dlp` binary
///
/// The selected audio stream is written directly to the requested output path as
/// it downloads (`--no-part`, no post-processing), so a partially downloaded file
/// is playable. Streams matching the output path's extension (for example `opus`
/// or `m4a`) at or below the configured bitrate are preferred.
///
/// # Examples
///
/// ```no_run
/// use trackfetch::fetch::YtDlpBackend;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let backend = YtDlpBackend::new(PathBuf::from("/usr/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let backend = YtDlpBackend::from_path().expect("yt-dlp not found in PATH");
/// ```
pub struct YtDlpBackend {
    binary_path: PathBuf,
    audio_quality_kbps: u32,
}

impl YtDlpBackend {
    /// Create a new backend with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            audio_quality_kbps: 192,
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Set the highest audio bitrate to prefer when selecting a stream
    pub fn with_audio_quality(mut self, kbps: u32) -> Self {
        self.audio_quality_kbps = kbps;
        self
    }

    /// Path of the binary this backend runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// yt-dlp format selector: the requested codec within the bitrate cap first
    fn format_selector(&self, audio_format: &str) -> String {
        let codec = match audio_format {
            "opus" => "acodec=opus".to_string(),
            "ogg" => "acodec=vorbis".to_string(),
            other => format!("ext={}", other),
        };
        let kbps = self.audio_quality_kbps;
        format!("bestaudio[{codec}][abr<={kbps}]/bestaudio[{codec}]/bestaudio[abr<={kbps}]/bestaudio/best")
    }

    fn command(&self, locator: &SourceLocator, output_path: &Path) -> Command {
        let audio_format = output_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("opus");

        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("-f")
            .arg(self.format_selector(audio_format))
            .args([
                "--no-playlist",
                "--no-part",
                "--newline",
                "--no-warnings",
                "--progress-template",
            ])
            .arg(format!(
                "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s \
                 %(progress.total_bytes_estimate)s %(info.duration)s",
                PROGRESS_MARKER
            ))
            .arg("-o")
            .arg(output_path)
            .arg(locator.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ExtractionBackend for YtDlpBackend {
    async fn extract(
        &self,
        locator: &SourceLocator,
        output_path: &Path,
        progress: ProgressSender,
    ) -> crate::Result<ExtractedAudio> {
        let mut child = self
            .command(locator, output_path)
            .spawn()
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        // Drain stderr concurrently so a chatty extractor never blocks on a full pipe
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut duration_ms = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(parsed) = parse_progress_line(&line) {
                    duration_ms = parsed.duration_ms.or(duration_ms);
                    // receiver may be gone; progress is best effort
                    let _ = progress.send(parsed.tick);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            let reason = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no error output")
                .trim()
                .to_string();
            tracing::debug!(locator = %locator, %status, stderr = %stderr, "yt-dlp failed");
            return Err(FetchError::Extraction {
                locator: locator.clone(),
                reason: format!("yt-dlp exited with {}: {}", status, reason),
            }
            .into());
        }

        Ok(ExtractedAudio { duration_ms })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// A parsed progress line
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ProgressLine {
    pub(crate) tick: ProgressTick,
    pub(crate) duration_ms: Option<u64>,
}

/// Parse one line produced by our `--progress-template`
///
/// Fields yt-dlp cannot fill are printed as `NA`. The exact total is preferred over
/// the estimate.
pub(crate) fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let mut fields = line.trim().split_whitespace();
    if fields.next()? != PROGRESS_MARKER {
        return None;
    }

    let number = |field: Option<&str>| -> Option<f64> {
        field
            .and_then(|f| f.parse::<f64>().ok())
            .filter(|n| n.is_finite() && *n >= 0.0)
    };

    let downloaded = number(fields.next())?;
    let total = number(fields.next());
    let estimate = number(fields.next());
    let duration = number(fields.next());

    Some(ProgressLine {
        tick: ProgressTick {
            downloaded_bytes: downloaded as u64,
            total_bytes: total.or(estimate).map(|t| t as u64),
        },
        duration_ms: duration.map(|secs| (secs * 1000.0).round() as u64),
    })
}
