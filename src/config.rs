use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::processing::QualityPolicy;
use crate::profiles::Quality;

/// Configuration for the video ingestion pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External engine binaries
    pub engine: EngineConfig,

    /// Destination directories and logging
    pub output: OutputConfig,

    /// Thumbnail capture settings
    pub thumbnails: ThumbnailConfig,

    /// Quality variant settings
    pub transcode: TranscodeConfig,

    /// Advisory validation thresholds
    pub validation: ValidationConfig,

    /// Audio extraction settings
    pub audio: AudioConfig,

    /// Concurrency and time limits
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the ffmpeg binary
    pub ffmpeg_path: PathBuf,

    /// Path to the ffprobe binary
    pub ffprobe_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for transcoded quality variants
    pub video_dir: PathBuf,

    /// Directory for generated thumbnails
    pub thumbnail_dir: PathBuf,

    /// Directory for extracted audio tracks
    pub audio_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Write each processing result as JSON to this file
    pub report_file: Option<PathBuf>,
}

/// Thumbnails captured when a job does not choose for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThumbnailMode {
    None,

    /// One capture at `default_offset_secs`
    Single,

    /// `default_count` captures evenly spaced across the duration
    #[default]
    Evenly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,

    /// Default capture mode for jobs built from configuration
    pub mode: ThumbnailMode,

    /// Capture offset when a single thumbnail is requested
    pub default_offset_secs: u64,

    /// Number of captures in evenly spaced mode
    pub default_count: usize,

    /// Image format / file extension
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub video_codec: String,
    pub audio_codec: String,

    /// Audio bitrate applied to every quality variant
    pub audio_bitrate_kbps: u32,

    /// Output container shared by every quality variant
    pub container: String,

    /// Qualities produced when a job does not name any
    pub default_qualities: Vec<String>,

    /// Whether failed variants fail the whole job
    pub quality_policy: QualityPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Warn below this width
    pub min_width: u32,

    /// Warn above this duration
    pub max_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub codec: String,
    pub bitrate_kbps: u32,
    pub format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Upper bound on concurrent engine processes per job (unset = CPU count)
    pub max_workers: Option<usize>,

    /// Cancel a job that runs longer than this many seconds
    pub job_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("./uploads/videos"),
            thumbnail_dir: PathBuf::from("./uploads/thumbnails"),
            audio_dir: PathBuf::from("./uploads/videos"),
            log_level: "info".to_string(),
            report_file: None,
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            mode: ThumbnailMode::Evenly,
            default_offset_secs: 5,
            default_count: 3,
            format: "jpg".to_string(),
        }
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 128,
            container: "mp4".to_string(),
            default_qualities: vec!["360p".to_string(), "720p".to_string()],
            quality_policy: QualityPolicy::BestEffort,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_width: 640,
            max_duration_secs: 3600, // 1 hour
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: "libmp3lame".to_string(),
            bitrate_kbps: 192,
            format: "mp3".to_string(),
        }
    }
}

impl TranscodeConfig {
    /// Parse `default_qualities` into profile names
    pub fn default_quality_list(&self) -> Result<Vec<Quality>> {
        self.default_qualities
            .iter()
            .map(|name| name.parse::<Quality>().map_err(|e| anyhow!(e)))
            .collect()
    }
}

impl Config {
    /// Load configuration from the first config file found, falling back to the environment
    pub fn load() -> Result<Self> {
        let config_paths = [
            "video-ingest.toml",
            "config/video-ingest.toml",
            "/etc/video-ingest/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config.apply_env();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Cannot parse config file {}", path.display()))?;
        config.apply_env();
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Defaults with environment variable overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("FFMPEG_PATH") {
            self.engine.ffmpeg_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("FFPROBE_PATH") {
            self.engine.ffprobe_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("VIDEO_UPLOAD_PATH") {
            self.output.video_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("THUMBNAIL_UPLOAD_PATH") {
            self.output.thumbnail_dir = PathBuf::from(dir);
        }

        if let Ok(workers) = std::env::var("VIDEO_INGEST_WORKERS") {
            match workers.parse() {
                Ok(workers) => self.performance.max_workers = Some(workers),
                Err(_) => tracing::warn!("Ignoring invalid VIDEO_INGEST_WORKERS: {}", workers),
            }
        }

        if let Ok(log_level) = std::env::var("VIDEO_INGEST_LOG_LEVEL") {
            self.output.log_level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.performance.max_workers == Some(0) {
            return Err(anyhow!("max_workers must be greater than 0"));
        }

        if self.thumbnails.width == 0 || self.thumbnails.height == 0 {
            return Err(anyhow!("thumbnail dimensions must be greater than 0"));
        }

        if self.thumbnails.mode == ThumbnailMode::Evenly && self.thumbnails.default_count == 0 {
            return Err(anyhow!("default_count must be greater than 0 in evenly spaced mode"));
        }

        if self.transcode.audio_bitrate_kbps == 0 {
            return Err(anyhow!("audio_bitrate_kbps must be greater than 0"));
        }

        if self.audio.bitrate_kbps == 0 {
            return Err(anyhow!("audio extraction bitrate must be greater than 0"));
        }

        if self.transcode.container.trim().is_empty() {
            return Err(anyhow!("transcode container must not be empty"));
        }

        self.transcode.default_quality_list()?;

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Video Ingest Configuration:\n\
            - ffmpeg: {}\n\
            - ffprobe: {}\n\
            - Video Directory: {}\n\
            - Thumbnail Directory: {}\n\
            - Default Qualities: {}\n\
            - Quality Policy: {:?}\n\
            - Workers: {}",
            self.engine.ffmpeg_path.display(),
            self.engine.ffprobe_path.display(),
            self.output.video_dir.display(),
            self.output.thumbnail_dir.display(),
            self.transcode.default_qualities.join(", "),
            self.transcode.quality_policy,
            self.performance
                .max_workers
                .map(|w| w.to_string())
                .unwrap_or_else(|| "auto".to_string()),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.performance.max_workers = Some(workers);
        self
    }

    pub fn with_video_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.video_dir = dir;
        self
    }

    pub fn with_thumbnail_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.thumbnail_dir = dir;
        self
    }

    pub fn with_ffmpeg(mut self, ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        self.config.engine.ffmpeg_path = ffmpeg;
        self.config.engine.ffprobe_path = ffprobe;
        self
    }

    pub fn with_quality_policy(mut self, policy: QualityPolicy) -> Self {
        self.config.transcode.quality_policy = policy;
        self
    }

    pub fn with_default_qualities(mut self, qualities: &[Quality]) -> Self {
        self.config.transcode.default_qualities =
            qualities.iter().map(|q| q.as_str().to_string()).collect();
        self
    }

    pub fn with_thumbnail_size(mut self, width: u32, height: u32) -> Self {
        self.config.thumbnails.width = width;
        self.config.thumbnails.height = height;
        self
    }

    pub fn with_job_timeout(mut self, seconds: u64) -> Self {
        self.config.performance.job_timeout_secs = Some(seconds);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transcode.audio_bitrate_kbps, 128);
        assert_eq!(config.transcode.container, "mp4");
        assert_eq!((config.thumbnails.width, config.thumbnails.height), (1280, 720));
        assert_eq!(config.validation.min_width, 640);
        assert_eq!(config.performance.max_workers, None);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_workers(8)
            .with_quality_policy(QualityPolicy::RequireAny)
            .with_default_qualities(&[Quality::P480, Quality::P1080])
            .build();

        assert_eq!(config.performance.max_workers, Some(8));
        assert_eq!(config.transcode.quality_policy, QualityPolicy::RequireAny);
        assert_eq!(
            config.transcode.default_quality_list().unwrap(),
            vec![Quality::P480, Quality::P1080]
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());

        let config = ConfigBuilder::new().with_workers(0).build();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.transcode.default_qualities = vec!["8k".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.thumbnails.default_count = 0;
        assert!(config.validate().is_err());
        config.thumbnails.mode = ThumbnailMode::Single;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [thumbnails]
            mode = "single"

            [transcode]
            default_qualities = ["240p"]
            quality_policy = "require-any"

            [performance]
            max_workers = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.thumbnails.mode, ThumbnailMode::Single);
        assert_eq!(config.thumbnails.default_count, 3);
        assert_eq!(config.transcode.default_qualities, vec!["240p".to_string()]);
        assert_eq!(config.transcode.quality_policy, QualityPolicy::RequireAny);
        assert_eq!(config.transcode.audio_codec, "aac");
        assert_eq!(config.performance.max_workers, Some(2));
        assert_eq!(config.engine.ffmpeg_path, PathBuf::from("ffmpeg"));
    }
}
