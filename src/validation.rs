//! Acceptance rules applied to probed metadata

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::config::ValidationConfig;
use crate::probe::{MetadataProber, VideoMetadata};

pub const NO_VIDEO_STREAM: &str = "No video stream found";
pub const INVALID_DURATION: &str = "Invalid video duration";
pub const INVALID_FILE_SIZE: &str = "Invalid file size";
pub const LOW_RESOLUTION: &str = "Video resolution is quite low";
pub const LONG_VIDEO: &str = "Video is longer than 1 hour";
pub const UNREADABLE_SOURCE: &str = "Failed to read video file";

/// Pass/fail verdict; warnings never affect `is_valid`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationVerdict {
    fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Thresholds for the advisory warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRules {
    pub min_width: u32,
    pub max_duration_secs: u64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_width: 640,
            max_duration_secs: 3600,
        }
    }
}

impl From<&ValidationConfig> for ValidationRules {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            min_width: config.min_width,
            max_duration_secs: config.max_duration_secs,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: ValidationRules,
}

impl Validator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    /// Evaluate every rule; errors accumulate rather than short-circuit
    pub fn validate(&self, metadata: &VideoMetadata) -> ValidationVerdict {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if metadata.video.is_none() {
            errors.push(NO_VIDEO_STREAM.to_string());
        }

        if metadata.duration == 0 {
            errors.push(INVALID_DURATION.to_string());
        }

        if metadata.file_size == 0 {
            errors.push(INVALID_FILE_SIZE.to_string());
        }

        if let Some(video) = &metadata.video {
            if video.width < self.rules.min_width {
                warnings.push(LOW_RESOLUTION.to_string());
            }
        }

        if metadata.duration > self.rules.max_duration_secs {
            warnings.push(LONG_VIDEO.to_string());
        }

        ValidationVerdict::from_findings(errors, warnings)
    }

    /// Probe and validate in one step; an unreadable file yields an invalid verdict
    pub async fn validate_source(&self, prober: &MetadataProber, path: &Path) -> ValidationVerdict {
        match prober.probe(path).await {
            Ok(metadata) => self.validate(&metadata),
            Err(e) => {
                warn!("Cannot validate {}: {}", path.display(), e);
                ValidationVerdict::from_findings(vec![UNREADABLE_SOURCE.to_string()], Vec::new())
            }
        }
    }
}
