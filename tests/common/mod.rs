#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use video_ingest_rust::engine::{AudioRequest, EncodeRequest, FrameRequest, MediaEngine};
use video_ingest_rust::error::EngineError;
use video_ingest_rust::{CancellationToken, ConfigBuilder, PipelineCoordinator, SourceFile};

/// ffprobe-style JSON for a source with one h264 stream and one aac stream
pub fn probe_json(duration: f64, width: u32, height: u32, size: u64) -> String {
    format!(
        r#"{{
            "streams": [
                {{"codec_type": "video", "codec_name": "h264", "width": {width}, "height": {height},
                  "r_frame_rate": "30/1", "bit_rate": "2500000"}},
                {{"codec_type": "audio", "codec_name": "aac", "sample_rate": "44100",
                  "channels": 2, "bit_rate": "128000"}}
            ],
            "format": {{"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "{duration}",
                        "size": "{size}", "bit_rate": "2628000"}}
        }}"#
    )
}

pub fn audio_only_json(duration: f64, size: u64) -> String {
    format!(
        r#"{{
            "streams": [{{"codec_type": "audio", "codec_name": "mp3", "sample_rate": "44100", "channels": 2}}],
            "format": {{"format_name": "mp3", "duration": "{duration}", "size": "{size}"}}
        }}"#
    )
}

/// Deterministic stand-in for ffmpeg/ffprobe.
///
/// Every write starts with a partial file so that cleanup of failed and
/// cancelled tasks is observable.
#[derive(Default)]
pub struct StubEngine {
    probe_json: String,
    failing_widths: HashSet<u32>,
    failing_timestamps: HashSet<u64>,
    frame_delays: HashMap<u64, Duration>,
    encode_delay: Duration,
    disk_full: bool,
    remove_source_on_encode: bool,
    probe_calls: AtomicUsize,
    encode_calls: AtomicUsize,
}

impl StubEngine {
    pub fn new(probe_json: impl Into<String>) -> Self {
        Self {
            probe_json: probe_json.into(),
            ..Default::default()
        }
    }

    pub fn fail_width(mut self, width: u32) -> Self {
        self.failing_widths.insert(width);
        self
    }

    pub fn fail_frame_at(mut self, timestamp: u64) -> Self {
        self.failing_timestamps.insert(timestamp);
        self
    }

    pub fn frame_delay(mut self, timestamp: u64, delay: Duration) -> Self {
        self.frame_delays.insert(timestamp, delay);
        self
    }

    pub fn encode_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = delay;
        self
    }

    pub fn disk_full(mut self) -> Self {
        self.disk_full = true;
        self
    }

    pub fn remove_source_on_encode(mut self) -> Self {
        self.remove_source_on_encode = true;
        self
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    fn exited(stderr: &str) -> EngineError {
        EngineError::Exited {
            program: "ffmpeg".to_string(),
            code: Some(1),
            stderr: stderr.to_string(),
        }
    }

    async fn wait(delay: Duration, cancel: &CancellationToken) -> Result<(), EngineError> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn write(path: &Path, contents: &[u8]) -> Result<(), EngineError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(EngineError::from_io)
    }
}

#[async_trait]
impl MediaEngine for StubEngine {
    async fn probe(&self, _input: &Path) -> Result<String, EngineError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probe_json.clone())
    }

    async fn extract_frame(
        &self,
        _input: &Path,
        request: &FrameRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        Self::write(output, b"partial frame").await?;

        let delay = self
            .frame_delays
            .get(&request.timestamp)
            .copied()
            .unwrap_or_default();
        Self::wait(delay, cancel).await?;

        if self.disk_full {
            return Err(Self::exited("No space left on device"));
        }
        if self.failing_timestamps.contains(&request.timestamp) {
            return Err(Self::exited("Invalid data found when processing input"));
        }

        Self::write(output, format!("frame@{}", request.timestamp).as_bytes()).await
    }

    async fn encode(
        &self,
        input: &Path,
        request: &EncodeRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        Self::write(output, b"partial encode").await?;

        Self::wait(self.encode_delay, cancel).await?;

        if self.remove_source_on_encode {
            let _ = tokio::fs::remove_file(input).await;
        }
        if self.disk_full {
            return Err(Self::exited("av_interleaved_write_frame(): No space left on device"));
        }
        if self.failing_widths.contains(&request.width) {
            return Err(Self::exited("Conversion failed!"));
        }

        Self::write(
            output,
            format!("{}x{}@{}k", request.width, request.height, request.video_bitrate_kbps).as_bytes(),
        )
        .await
    }

    async fn extract_audio(
        &self,
        _input: &Path,
        request: &AudioRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        Self::wait(self.encode_delay, cancel).await?;
        Self::write(output, format!("{}@{}k", request.codec, request.bitrate_kbps).as_bytes()).await
    }
}

/// Scratch layout for one job: an input file plus the two destination directories
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub video_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let video_dir = dir.path().join("videos");
        let thumbnail_dir = dir.path().join("thumbnails");
        std::fs::create_dir_all(&video_dir).unwrap();
        std::fs::create_dir_all(&thumbnail_dir).unwrap();
        Self {
            dir,
            video_dir,
            thumbnail_dir,
        }
    }

    pub async fn source(&self, name: &str) -> SourceFile {
        let path = self.dir.path().join(name);
        tokio::fs::write(&path, vec![7u8; 4096]).await.unwrap();
        SourceFile::stage(&path).await.unwrap()
    }

    pub fn video_files(&self) -> Vec<PathBuf> {
        files_in(&self.video_dir)
    }

    pub fn thumbnail_files(&self) -> Vec<PathBuf> {
        files_in(&self.thumbnail_dir)
    }
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

pub fn coordinator(engine: Arc<StubEngine>, workers: usize) -> PipelineCoordinator {
    let config = ConfigBuilder::new().with_workers(workers).build();
    PipelineCoordinator::new(&config, engine)
}
