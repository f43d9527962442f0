/// Video Ingest - Rust Implementation
///
/// Takes one staged source video, probes and validates it, then captures
/// thumbnails and transcodes playback quality variants concurrently through
/// an external engine, cleaning up every artifact when a job fails.

pub mod artifacts;
pub mod audio;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod probe;
pub mod processing;
pub mod profiles;
pub mod state;
pub mod thumbnail;
pub mod transcode;
pub mod validation;

// Re-export main types for easy access
pub use crate::artifacts::{ArtifactTracker, CleanupReport};
pub use crate::audio::AudioExtractor;
pub use crate::cancel::CancellationToken;
pub use crate::config::{Config, ConfigBuilder};
pub use crate::engine::{FfmpegEngine, MediaEngine};
pub use crate::error::{FailedStage, PipelineError, ProbeError, ThumbnailError, TranscodeError};
pub use crate::probe::{MetadataProber, SourceFile, VideoMetadata};
pub use crate::processing::{
    JobRequest, PipelineCoordinator, ProcessingResult, QualityPolicy, ThumbnailPlan,
};
pub use crate::profiles::{ProfileTable, Quality, QualityProfile};
pub use crate::state::{JobState, JobStateMachine};
pub use crate::thumbnail::{Thumbnail, ThumbnailGenerator, ThumbnailSpec};
pub use crate::transcode::{QualityTranscoder, TranscodeOutcome};
pub use crate::validation::{ValidationVerdict, Validator};
