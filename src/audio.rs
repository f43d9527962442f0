use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::remove_quietly;
use crate::cancel::CancellationToken;
use crate::config::AudioConfig;
use crate::engine::{AudioRequest, MediaEngine};
use crate::error::{AudioError, EngineError};
use crate::probe::MetadataProber;

/// Extracts the audio track of a source into a standalone file
#[derive(Clone)]
pub struct AudioExtractor {
    engine: Arc<dyn MediaEngine>,
    prober: MetadataProber,
    request: AudioRequest,
}

impl AudioExtractor {
    pub fn new(engine: Arc<dyn MediaEngine>, config: &AudioConfig) -> Self {
        Self {
            prober: MetadataProber::new(Arc::clone(&engine)),
            engine,
            request: AudioRequest {
                codec: config.codec.clone(),
                bitrate_kbps: config.bitrate_kbps,
                format: config.format.clone(),
            },
        }
    }

    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!(
            "audio-{}-{}.{}",
            Uuid::new_v4(),
            chrono::Utc::now().timestamp_millis(),
            self.request.format
        ))
    }

    /// Extract audio from `video_path` into `output_dir`
    pub async fn extract(
        &self,
        video_path: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AudioError> {
        let metadata = self.prober.probe(video_path).await?;
        if metadata.audio.is_none() {
            return Err(AudioError::NoAudioStream {
                path: video_path.to_path_buf(),
            });
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| AudioError::Io(e.to_string()))?;

        let audio_path = self.output_path(output_dir);
        info!("🎵 Extracting audio from {}", video_path.display());

        match self
            .engine
            .extract_audio(video_path, &self.request, &audio_path, cancel)
            .await
        {
            Ok(()) => {
                if !tokio::fs::try_exists(&audio_path).await.unwrap_or(false) {
                    return Err(AudioError::MissingOutput { path: audio_path });
                }
                info!("✅ Audio extracted: {}", audio_path.display());
                Ok(audio_path)
            }
            Err(EngineError::Cancelled) => {
                remove_quietly(&audio_path).await;
                Err(AudioError::Cancelled)
            }
            Err(e) => {
                remove_quietly(&audio_path).await;
                warn!("Audio extraction error for {}: {}", video_path.display(), e);
                Err(AudioError::Engine(e))
            }
        }
    }
}
