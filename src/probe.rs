use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::MediaEngine;
use crate::error::ProbeError;

/// A staged upload handed over by the upload layer. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    path: PathBuf,
    size: u64,
}

impl SourceFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        Self { path, size }
    }

    /// Resolve `path` to an absolute path and record its size on disk
    pub async fn stage(path: impl AsRef<Path>) -> Result<Self, ProbeError> {
        let path = path.as_ref();
        let unreadable = |e: std::io::Error| ProbeError::Unreadable {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let absolute = tokio::fs::canonicalize(path).await.map_err(unreadable)?;
        let metadata = tokio::fs::metadata(&absolute).await.map_err(unreadable)?;
        if !metadata.is_file() {
            return Err(ProbeError::Unreadable {
                path: absolute,
                message: "not a regular file".to_string(),
            });
        }

        Ok(Self {
            path: absolute,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// File name without extension, used to derive variant names
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video")
            .to_string()
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub bitrate: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub bitrate: u64,
}

/// Structural metadata of a source file, produced once per job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Whole seconds, truncated
    pub duration: u64,
    pub format: String,
    pub file_size: u64,
    /// Container-level bitrate
    pub bitrate: u64,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioStreamInfo>,
}

/// Reads a numeric field that may be a JSON number or a numeric string; anything else is 0
fn number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0)
}

fn whole(value: &Value) -> u64 {
    number(value).floor() as u64
}

/// Like `whole`, saturating at `u32::MAX` instead of wrapping
fn dimension(value: &Value) -> u32 {
    u32::try_from(whole(value)).unwrap_or(u32::MAX)
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or("unknown").to_string()
}

/// Parses rationals such as `30000/1001`, falling back to a plain number
fn frame_rate(value: &Value) -> f64 {
    value
        .as_str()
        .and_then(|s| {
            let parts: Vec<&str> = s.split('/').collect();
            if parts.len() == 2 {
                let num: f64 = parts[0].trim().parse().ok()?;
                let den: f64 = parts[1].trim().parse().ok()?;
                if den == 0.0 {
                    return Some(0.0);
                }
                Some(num / den)
            } else {
                s.trim().parse().ok()
            }
        })
        .or_else(|| value.as_f64())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Turn ffprobe JSON into `VideoMetadata`.
///
/// Absent or unparseable numeric fields become 0. Missing audio or video
/// streams become `None`. Only a missing stream table is an error.
pub fn parse_probe_output(path: &Path, json: &str) -> Result<VideoMetadata, ProbeError> {
    let data: Value = serde_json::from_str(json).map_err(|e| ProbeError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let streams = data["streams"]
        .as_array()
        .filter(|streams| !streams.is_empty())
        .ok_or_else(|| ProbeError::NoStreamTable {
            path: path.to_path_buf(),
        })?;

    let format = &data["format"];

    let video = streams
        .iter()
        .find(|s| s["codec_type"] == "video")
        .map(|stream| VideoStreamInfo {
            codec: text(&stream["codec_name"]),
            width: dimension(&stream["width"]),
            height: dimension(&stream["height"]),
            frame_rate: frame_rate(&stream["r_frame_rate"]),
            bitrate: whole(&stream["bit_rate"]),
        });

    let audio = streams
        .iter()
        .find(|s| s["codec_type"] == "audio")
        .map(|stream| AudioStreamInfo {
            codec: text(&stream["codec_name"]),
            sample_rate: dimension(&stream["sample_rate"]),
            channels: dimension(&stream["channels"]),
            bitrate: whole(&stream["bit_rate"]),
        });

    Ok(VideoMetadata {
        duration: whole(&format["duration"]),
        format: text(&format["format_name"]),
        file_size: whole(&format["size"]),
        bitrate: whole(&format["bit_rate"]),
        video,
        audio,
    })
}

/// Extracts `VideoMetadata` through the media engine
#[derive(Clone)]
pub struct MetadataProber {
    engine: Arc<dyn MediaEngine>,
}

impl MetadataProber {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }

    pub async fn probe(&self, path: &Path) -> Result<VideoMetadata, ProbeError> {
        // Surface unreadable files as such rather than as an engine failure
        tokio::fs::File::open(path)
            .await
            .map_err(|e| ProbeError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!("📊 Probing: {}", path.display());

        let json = self
            .engine
            .probe(path)
            .await
            .map_err(|source| ProbeError::Engine {
                path: path.to_path_buf(),
                source,
            })?;

        let metadata = parse_probe_output(path, &json)?;

        match &metadata.video {
            Some(video) => info!(
                "📹 Probed {}: {} {}x{} {:.2}fps, {}s, {} bytes",
                path.display(),
                video.codec,
                video.width,
                video.height,
                video.frame_rate,
                metadata.duration,
                metadata.file_size
            ),
            None => info!(
                "📹 Probed {}: no video stream, {}s, {} bytes",
                path.display(),
                metadata.duration,
                metadata.file_size
            ),
        }

        Ok(metadata)
    }
}
