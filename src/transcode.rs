//! Re-encoding into the fixed quality profiles

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::remove_quietly;
use crate::cancel::CancellationToken;
use crate::config::TranscodeConfig;
use crate::engine::{EncodeRequest, MediaEngine};
use crate::error::{EngineError, TranscodeError};
use crate::profiles::{ProfileTable, Quality, QualityProfile};

/// Result of one quality variant. Always a value, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeOutcome {
    pub quality: Quality,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TranscodeOutcome {
    pub fn success(quality: Quality, output_path: PathBuf) -> Self {
        Self {
            quality,
            succeeded: true,
            output_path: Some(output_path),
            error_message: None,
        }
    }

    pub fn failure(quality: Quality, error_message: impl Into<String>) -> Self {
        Self {
            quality,
            succeeded: false,
            output_path: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Codec, audio and container settings shared by every profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSettings {
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
    pub container: String,
}

impl From<&TranscodeConfig> for TranscodeSettings {
    fn from(config: &TranscodeConfig) -> Self {
        Self {
            video_codec: config.video_codec.clone(),
            audio_codec: config.audio_codec.clone(),
            audio_bitrate_kbps: config.audio_bitrate_kbps,
            container: config.container.clone(),
        }
    }
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self::from(&TranscodeConfig::default())
    }
}

#[derive(Clone)]
pub struct QualityTranscoder {
    engine: Arc<dyn MediaEngine>,
    profiles: Arc<ProfileTable>,
    settings: TranscodeSettings,
}

impl QualityTranscoder {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        profiles: Arc<ProfileTable>,
        settings: TranscodeSettings,
    ) -> Self {
        Self {
            engine,
            profiles,
            settings,
        }
    }

    pub fn with_profiles(mut self, profiles: Arc<ProfileTable>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    pub fn profile(&self, quality: Quality) -> Result<&QualityProfile, TranscodeError> {
        self.profiles
            .get(quality)
            .ok_or(TranscodeError::UnsupportedProfile(quality))
    }

    /// Engine request for `profile`; audio and container never vary by profile
    pub fn encode_request(&self, profile: &QualityProfile, duration_hint: u64) -> EncodeRequest {
        EncodeRequest {
            width: profile.width,
            height: profile.height,
            video_bitrate_kbps: profile.video_bitrate_kbps,
            video_codec: self.settings.video_codec.clone(),
            audio_codec: self.settings.audio_codec.clone(),
            audio_bitrate_kbps: self.settings.audio_bitrate_kbps,
            container: self.settings.container.clone(),
            duration_hint,
        }
    }

    /// `{stem}-{quality}-{millis}-{short id}.{container}` inside `dir`
    pub fn output_path(&self, dir: &Path, stem: &str, quality: Quality) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        let id = Uuid::new_v4().simple().to_string();
        dir.join(format!(
            "{}-{}-{}-{}.{}",
            stem,
            quality,
            millis,
            &id[..8],
            self.settings.container
        ))
    }

    /// Encode `source` into `output` for `quality`.
    ///
    /// On any failure, including cancellation, the partial output is deleted.
    pub async fn transcode(
        &self,
        source: &Path,
        quality: Quality,
        output: &Path,
        duration_hint: u64,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, TranscodeError> {
        if cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }

        let profile = *self.profile(quality)?;
        let request = self.encode_request(&profile, duration_hint);

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TranscodeError::Io(e.to_string()))?;
        }

        info!(
            "🎞️ Transcoding started: {} -> {} ({}x{} @ {}k)",
            source.display(),
            quality,
            profile.width,
            profile.height,
            profile.video_bitrate_kbps
        );
        let started = Instant::now();

        match self.engine.encode(source, &request, output, cancel).await {
            Ok(()) => {
                if !tokio::fs::try_exists(output).await.unwrap_or(false) {
                    return Err(TranscodeError::MissingOutput {
                        path: output.to_path_buf(),
                    });
                }
                info!(
                    "✅ Transcoding completed: {} in {:.1}s",
                    output.display(),
                    started.elapsed().as_secs_f64()
                );
                Ok(output.to_path_buf())
            }
            Err(EngineError::Cancelled) => {
                remove_quietly(output).await;
                Err(TranscodeError::Cancelled)
            }
            Err(err) => {
                remove_quietly(output).await;
                warn!("❌ Transcoding error for {}: {}", quality, err);
                Err(TranscodeError::Engine {
                    quality,
                    source: err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FfmpegEngine;

    fn transcoder() -> QualityTranscoder {
        QualityTranscoder::new(
            Arc::new(FfmpegEngine::default()),
            Arc::new(ProfileTable::standard()),
            TranscodeSettings::default(),
        )
    }

    #[test]
    fn test_audio_is_fixed_across_profiles() {
        let transcoder = transcoder();
        for profile in transcoder.profiles().iter() {
            let request = transcoder.encode_request(profile, 60);
            assert_eq!(request.audio_bitrate_kbps, 128);
            assert_eq!(request.audio_codec, "aac");
            assert_eq!(request.container, "mp4");
            assert_eq!(request.video_bitrate_kbps, profile.video_bitrate_kbps);
        }
    }

    #[test]
    fn test_output_path_shape() {
        let path = transcoder().output_path(Path::new("/out"), "clip", Quality::P720);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("clip-720p-"));
        assert!(name.ends_with(".mp4"));
        assert_eq!(path.parent().unwrap(), Path::new("/out"));
    }

    #[test]
    fn test_unsupported_profile() {
        let transcoder = QualityTranscoder::new(
            Arc::new(FfmpegEngine::default()),
            Arc::new(ProfileTable::from_profiles(2, Vec::<QualityProfile>::new())),
            TranscodeSettings::default(),
        );
        assert!(matches!(
            transcoder.profile(Quality::P360),
            Err(TranscodeError::UnsupportedProfile(Quality::P360))
        ));
    }

    #[test]
    fn test_outcome_serialization() {
        let failed = TranscodeOutcome::failure(Quality::P480, "boom");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["succeeded"], false);
        assert_eq!(json["error_message"], "boom");
        assert!(json.get("output_path").is_none());
    }
}
