//! Error types for each stage of the ingestion pipeline

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::processing::QualityPolicy;
use crate::profiles::Quality;
use crate::state::JobState;

const DISK_FULL_MARKERS: [&str; 3] = [
    "No space left on device",
    "ENOSPC",
    "Disk quota exceeded",
];

/// Failure of a single invocation of the external processing engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("{program} exited with status {code:?}: {stderr}")]
    Exited {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Engine invocation cancelled")]
    Cancelled,

    #[error("Engine I/O error: {0}")]
    Io(String),
}

impl EngineError {
    /// Whether the engine reported that the destination filesystem is exhausted
    pub fn is_disk_full(&self) -> bool {
        let text = match self {
            EngineError::Exited { stderr, .. } => stderr.as_str(),
            EngineError::Io(message) => message.as_str(),
            EngineError::Spawn { message, .. } => message.as_str(),
            EngineError::Cancelled => return false,
        };
        DISK_FULL_MARKERS.iter().any(|marker| text.contains(marker))
    }

    pub fn from_io(err: std::io::Error) -> Self {
        // ENOSPC
        if err.raw_os_error() == Some(28) {
            return EngineError::Io(format!("No space left on device ({})", err));
        }
        EngineError::Io(err.to_string())
    }
}

/// The source could not be probed; always fatal for a job
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("Cannot open source file {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Probe failed for {path}: {source}")]
    Engine {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("Unreadable probe output for {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("No readable stream table in {path}")]
    NoStreamTable { path: PathBuf },
}

#[derive(Error, Debug, Clone)]
pub enum ThumbnailError {
    #[error("Frame extraction at {timestamp}s failed: {source}")]
    Engine {
        timestamp: u64,
        #[source]
        source: EngineError,
    },

    #[error("Engine produced no image at {path}")]
    MissingOutput { path: PathBuf },

    #[error("Thumbnail capture cancelled")]
    Cancelled,

    #[error("Thumbnail I/O error: {0}")]
    Io(String),
}

impl ThumbnailError {
    pub fn is_disk_full(&self) -> bool {
        match self {
            ThumbnailError::Engine { source, .. } => source.is_disk_full(),
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum TranscodeError {
    #[error("Unsupported quality: {0}")]
    UnsupportedProfile(Quality),

    #[error("Transcoding to {quality} failed: {source}")]
    Engine {
        quality: Quality,
        #[source]
        source: EngineError,
    },

    #[error("Engine produced no output at {path}")]
    MissingOutput { path: PathBuf },

    #[error("Transcode cancelled")]
    Cancelled,

    #[error("Transcode I/O error: {0}")]
    Io(String),
}

impl TranscodeError {
    pub fn is_disk_full(&self) -> bool {
        match self {
            TranscodeError::Engine { source, .. } => source.is_disk_full(),
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum AudioError {
    #[error("Source has no audio stream: {path}")]
    NoAudioStream { path: PathBuf },

    #[error("Audio extraction failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Engine produced no audio at {path}")]
    MissingOutput { path: PathBuf },

    #[error("Audio extraction cancelled")]
    Cancelled,

    #[error("Audio probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Audio I/O error: {0}")]
    Io(String),
}

/// Stage of the pipeline a fatal error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Probe,
    Validate,
    Process,
}

impl std::fmt::Display for FailedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailedStage::Probe => "probe",
            FailedStage::Validate => "validate",
            FailedStage::Process => "process",
        };
        f.write_str(name)
    }
}

/// Fatal failure of a whole job, surfaced to the caller as one value
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Probe stage failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Validation failed: {}", .errors.join("; "))]
    Validation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error("Thumbnail generation failed: {0}")]
    Thumbnail(ThumbnailError),

    #[error("Processing aborted: {reason}")]
    Catastrophic { reason: String },

    #[error("Quality policy {policy:?} not met ({} variant(s) failed)", .failures.len())]
    QualityPolicy {
        policy: QualityPolicy,
        failures: BTreeMap<Quality, String>,
    },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    #[error("Invalid state transition {from:?} -> {to:?}")]
    InvalidTransition { from: JobState, to: JobState },
}

impl PipelineError {
    /// Name of the stage the job was in when it failed
    pub fn stage(&self) -> FailedStage {
        match self {
            PipelineError::Probe(_) | PipelineError::InvalidRequest(_) => FailedStage::Probe,
            PipelineError::Validation { .. } => FailedStage::Validate,
            PipelineError::Thumbnail(_)
            | PipelineError::Catastrophic { .. }
            | PipelineError::QualityPolicy { .. }
            | PipelineError::Cancelled
            | PipelineError::InvalidTransition { .. } => FailedStage::Process,
        }
    }
}
