// Common data models for the preview pipeline

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Byte ceiling for regular destinations
pub const REGULAR_MAX_BYTES: u64 = 25 * 1024 * 1024;

/// Byte ceiling for premium destinations
pub const PREMIUM_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Which platform family a URL was attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformTag {
    /// Platform whose watch pages need a manifest or a rendered page
    WatchPage(String),
    /// Platform serving media from predictable CDN paths
    CdnMirror(String),
    /// URL already points at a playable file
    DirectMedia,
    /// Nothing matched; URL is used as-is
    Generic,
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WatchPage(name) => write!(f, "watch-page:{}", name),
            Self::CdnMirror(name) => write!(f, "cdn-mirror:{}", name),
            Self::DirectMedia => write!(f, "direct"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// A raw URL together with the canonical media URL the chain settled on.
///
/// Only the resolver chain builds these; fields are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    raw_url: String,
    canonical_url: String,
    platform: PlatformTag,
}

impl MediaReference {
    pub(crate) fn new(raw_url: String, canonical_url: String, platform: PlatformTag) -> Self {
        Self {
            raw_url,
            canonical_url,
            platform,
        }
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn platform(&self) -> &PlatformTag {
        &self.platform
    }

    /// Whether resolution changed the URL at all
    pub fn was_rewritten(&self) -> bool {
        self.raw_url != self.canonical_url
    }
}

/// Metadata read from the media engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub container: String,
    pub bitrate: u64,
}

impl VideoMetadata {
    /// Duration and both dimensions must be known to render a preview
    pub fn is_valid_for_gif(&self) -> bool {
        self.duration_seconds > 0.0 && self.width > 0 && self.height > 0
    }

    /// Resolution string, e.g. "1920x1080"
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Duration as mm:ss (minutes are not wrapped into hours)
    pub fn formatted_duration(&self) -> String {
        let total = if self.duration_seconds.is_finite() && self.duration_seconds > 0.0 {
            self.duration_seconds.floor() as u64
        } else {
            0
        };
        format!("{:02}:{:02}", total / 60, total % 60)
    }
}

/// Size and shape the caller wants the preview to fit into.
///
/// Dimensions, fps and duration are starting points; the transcoder shrinks
/// them when the first encode overshoots `max_bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodingTarget {
    pub max_bytes: u64,
    pub max_duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl EncodingTarget {
    pub fn regular() -> Self {
        Self::default()
    }

    pub fn premium() -> Self {
        Self {
            max_bytes: PREMIUM_MAX_BYTES,
            ..Self::default()
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_duration(mut self, seconds: f64) -> Self {
        self.max_duration_seconds = seconds;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }
}

impl Default for EncodingTarget {
    fn default() -> Self {
        Self {
            max_bytes: REGULAR_MAX_BYTES,
            max_duration_seconds: 30.0,
            width: 480,
            height: 270,
            fps: 12,
        }
    }
}

/// One point of the encoder parameter space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodeParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_seconds: f64,
}

impl fmt::Display for EncodeParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}@{}fps/{:.1}s",
            self.width, self.height, self.fps, self.duration_seconds
        )
    }
}

/// A file living in the scratch directory.
///
/// Consumers read `path()`; deletion goes through `ScratchDir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempArtifact {
    path: PathBuf,
    created_at_epoch_millis: u64,
}

impl TempArtifact {
    pub(crate) fn new(path: PathBuf, created_at_epoch_millis: u64) -> Self {
        Self {
            path,
            created_at_epoch_millis,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at_epoch_millis(&self) -> u64 {
        self.created_at_epoch_millis
    }
}

/// Result of an adaptive transcode.
///
/// `met_target == false` means `artifact` is the smallest file achieved and
/// still exceeds the requested byte ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeOutcome {
    pub artifact: TempArtifact,
    pub bytes: u64,
    pub params: EncodeParams,
    pub rounds: u32,
    pub met_target: bool,
}

/// Everything produced for one preview request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewOutcome {
    pub reference: MediaReference,
    pub metadata: VideoMetadata,
    pub transcode: TranscodeOutcome,
}

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Frames sampled from a video and the color they have in common
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSample {
    pub timestamps: Vec<f64>,
    pub frames: Vec<TempArtifact>,
    pub dominant: Rgb,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(duration: f64, width: u32, height: u32) -> VideoMetadata {
        VideoMetadata {
            duration_seconds: duration,
            width,
            height,
            codec: "h264".to_string(),
            container: "mp4".to_string(),
            bitrate: 1_000_000,
        }
    }

    #[test]
    fn test_valid_for_gif() {
        assert!(metadata(12.5, 1280, 720).is_valid_for_gif());
        assert!(!metadata(0.0, 1280, 720).is_valid_for_gif());
        assert!(!metadata(12.5, 0, 720).is_valid_for_gif());
        assert!(!metadata(12.5, 1280, 0).is_valid_for_gif());
    }

    #[test]
    fn test_derived_values() {
        let meta = metadata(125.9, 1920, 1080);
        assert_eq!(meta.resolution(), "1920x1080");
        assert_eq!(meta.formatted_duration(), "02:05");
    }

    #[test]
    fn test_target_presets() {
        let regular = EncodingTarget::regular();
        assert_eq!(regular.width, 480);
        assert_eq!(regular.height, 270);
        assert_eq!(regular.fps, 12);
        assert_eq!(regular.max_duration_seconds, 30.0);
        assert_eq!(regular.max_bytes, REGULAR_MAX_BYTES);
        assert!(EncodingTarget::premium().max_bytes > regular.max_bytes);
    }

    #[test]
    fn test_rgb_formatting() {
        let color = Rgb::new(0x12, 0xab, 0xef);
        assert_eq!(color.to_hex(), "#12abef");
    }
}
