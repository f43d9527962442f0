//! Still-frame capture

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::remove_quietly;
use crate::cancel::CancellationToken;
use crate::config::ThumbnailConfig;
use crate::engine::{FrameRequest, MediaEngine};
use crate::error::{EngineError, ThumbnailError};

/// A capture request: timestamp in seconds plus target dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    pub timestamp: u64,
    pub width: u32,
    pub height: u32,
}

impl ThumbnailSpec {
    pub fn at(timestamp: u64, width: u32, height: u32) -> Self {
        Self {
            timestamp,
            width,
            height,
        }
    }

    /// `count` captures evenly spaced across `duration`
    pub fn evenly_spaced(duration: u64, count: usize, width: u32, height: u32) -> Vec<Self> {
        evenly_spaced_timestamps(duration, count)
            .into_iter()
            .map(|timestamp| Self::at(timestamp, width, height))
            .collect()
    }
}

/// `interval * i` for i in 1..=count, with `interval = floor(duration / (count + 1))`
pub fn evenly_spaced_timestamps(duration: u64, count: usize) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    let interval = duration / (count as u64 + 1);
    (1..=count as u64).map(|i| interval * i).collect()
}

/// `HH:MM:SS`
pub fn format_timestamp(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub timestamp: u64,
    pub time_string: String,
    /// Provided by the caller rather than captured by the pipeline
    #[serde(default)]
    pub supplied: bool,
}

impl Thumbnail {
    pub fn generated(path: PathBuf, timestamp: u64) -> Self {
        Self {
            path,
            timestamp,
            time_string: format_timestamp(timestamp),
            supplied: false,
        }
    }

    pub fn supplied(path: PathBuf) -> Self {
        Self {
            path,
            timestamp: 0,
            time_string: format_timestamp(0),
            supplied: true,
        }
    }
}

/// Captures frames through the media engine
#[derive(Clone)]
pub struct ThumbnailGenerator {
    engine: Arc<dyn MediaEngine>,
    width: u32,
    height: u32,
    format: String,
}

impl ThumbnailGenerator {
    pub fn new(engine: Arc<dyn MediaEngine>, config: &ThumbnailConfig) -> Self {
        Self {
            engine,
            width: config.width,
            height: config.height,
            format: config.format.clone(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn spec_at(&self, timestamp: u64) -> ThumbnailSpec {
        ThumbnailSpec::at(timestamp, self.width, self.height)
    }

    pub fn evenly_spaced(&self, duration: u64, count: usize) -> Vec<ThumbnailSpec> {
        ThumbnailSpec::evenly_spaced(duration, count, self.width, self.height)
    }

    /// Unique image path inside `dir`; `index` distinguishes captures of one job
    pub fn output_path(&self, dir: &Path, index: Option<usize>) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        let name = match index {
            Some(i) => format!("thumb-{}-{}-{}.{}", Uuid::new_v4(), millis, i, self.format),
            None => format!("thumb-{}-{}.{}", Uuid::new_v4(), millis, self.format),
        };
        dir.join(name)
    }

    /// Capture one frame into `output`. A failed or cancelled capture leaves no file behind.
    pub async fn generate(
        &self,
        source: &Path,
        spec: &ThumbnailSpec,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<Thumbnail, ThumbnailError> {
        if cancel.is_cancelled() {
            return Err(ThumbnailError::Cancelled);
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ThumbnailError::Io(e.to_string()))?;
        }

        let request = FrameRequest {
            timestamp: spec.timestamp,
            width: spec.width,
            height: spec.height,
        };

        let result = self
            .engine
            .extract_frame(source, &request, output, cancel)
            .await;

        match result {
            Ok(()) => {
                if !tokio::fs::try_exists(output).await.unwrap_or(false) {
                    return Err(ThumbnailError::MissingOutput {
                        path: output.to_path_buf(),
                    });
                }
                info!(
                    "🖼️ Thumbnail generated at {}: {}",
                    format_timestamp(spec.timestamp),
                    output.display()
                );
                Ok(Thumbnail::generated(output.to_path_buf(), spec.timestamp))
            }
            Err(EngineError::Cancelled) => {
                remove_quietly(output).await;
                Err(ThumbnailError::Cancelled)
            }
            Err(err) => {
                remove_quietly(output).await;
                warn!("Error generating thumbnail at {}s: {}", spec.timestamp, err);
                Err(ThumbnailError::Engine {
                    timestamp: spec.timestamp,
                    source: err,
                })
            }
        }
    }
}
