//! Extraction backend trait and the values it exchanges with the fetch controller

use crate::types::SourceLocator;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// One progress notification from a running extraction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressTick {
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Total bytes, when known
    pub total_bytes: Option<u64>,
}

impl ProgressTick {
    /// Percentage complete, or None if the total is unknown
    pub fn percent(&self) -> Option<f32> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0) as f32)
            }
            _ => None,
        }
    }
}

/// Channel on which a backend reports progress
pub type ProgressSender = mpsc::UnboundedSender<ProgressTick>;

/// Information a backend reports about a finished extraction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractedAudio {
    /// Audio duration in milliseconds, when the backend knows it
    pub duration_ms: Option<u64>,
}

/// Trait for audio extraction/download backends
///
/// A backend writes the audio for `locator` to exactly `output_path`, reporting
/// progress on `progress` as it goes. The fetch controller validates the output
/// file and commits the cache index row; backends never touch the index.
///
/// Dropping `progress` is allowed at any time (ticks are best effort).
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Download and extract the audio of `locator` into `output_path`
    async fn extract(
        &self,
        locator: &SourceLocator,
        output_path: &Path,
        progress: ProgressSender,
    ) -> crate::Result<ExtractedAudio>;

    /// Get the name of this backend
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_percent() {
        let tick = ProgressTick {
            downloaded_bytes: 25,
            total_bytes: Some(200),
        };
        assert_eq!(tick.percent(), Some(12.5));

        let unknown = ProgressTick {
            downloaded_bytes: 25,
            total_bytes: None,
        };
        assert_eq!(unknown.percent(), None);

        let overshoot = ProgressTick {
            downloaded_bytes: 300,
            total_bytes: Some(200),
        };
        assert_eq!(overshoot.percent(), Some(100.0));
    }
}
