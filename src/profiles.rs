//! Fixed quality presets used by the transcoder

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Named playback quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Quality {
    pub const ALL: [Quality; 5] = [
        Quality::P240,
        Quality::P360,
        Quality::P480,
        Quality::P720,
        Quality::P1080,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::P240 => "240p",
            Quality::P360 => "360p",
            Quality::P480 => "480p",
            Quality::P720 => "720p",
            Quality::P1080 => "1080p",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::ALL
            .iter()
            .copied()
            .find(|q| q.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unsupported quality: {}", s))
    }
}

/// Target geometry and video bitrate for one quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub quality: Quality,
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
}

const STANDARD_PROFILES: [QualityProfile; 5] = [
    QualityProfile { quality: Quality::P240, width: 426, height: 240, video_bitrate_kbps: 400 },
    QualityProfile { quality: Quality::P360, width: 640, height: 360, video_bitrate_kbps: 800 },
    QualityProfile { quality: Quality::P480, width: 854, height: 480, video_bitrate_kbps: 1200 },
    QualityProfile { quality: Quality::P720, width: 1280, height: 720, video_bitrate_kbps: 2500 },
    QualityProfile { quality: Quality::P1080, width: 1920, height: 1080, video_bitrate_kbps: 5000 },
];

/// Versioned, immutable table of quality profiles.
///
/// Built once and shared behind an `Arc` by the transcoder.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileTable {
    version: u32,
    profiles: BTreeMap<Quality, QualityProfile>,
}

impl ProfileTable {
    pub const STANDARD_VERSION: u32 = 1;

    /// The standard 240p..1080p table
    pub fn standard() -> Self {
        Self::from_profiles(Self::STANDARD_VERSION, STANDARD_PROFILES)
    }

    pub fn from_profiles(version: u32, profiles: impl IntoIterator<Item = QualityProfile>) -> Self {
        Self {
            version,
            profiles: profiles.into_iter().map(|p| (p.quality, p)).collect(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn get(&self, quality: Quality) -> Option<&QualityProfile> {
        self.profiles.get(&quality)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QualityProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        Self::standard()
    }
}
