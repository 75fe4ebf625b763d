// Runtime configuration for resolvers, engines and the scratch directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::{LogFormat, LoggingConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: String, message: String },
}

/// Platform whose media sits at predictable CDN paths keyed by an identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdnMirrorPlatform {
    pub name: String,
    /// Hosts serving the human-facing pages
    pub page_hosts: Vec<String>,
    /// CDN hosts tried in order for every template
    pub cdn_hosts: Vec<String>,
    /// URL templates with `{cdn}` and `{id}` placeholders
    pub templates: Vec<String>,
}

/// Platform whose watch pages need a manifest lookup or a rendered page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchPagePlatform {
    pub name: String,
    pub page_hosts: Vec<String>,
    /// Manifest endpoint with `{host}` and `{id}` placeholders
    pub manifest_template: String,
    /// CSS selector of the player element to wait for
    pub player_selector: String,
    /// Hosts the poster-derived media candidates are built against
    pub media_hosts: Vec<String>,
}

/// All platform families known at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSet {
    pub cdn_mirrors: Vec<CdnMirrorPlatform>,
    pub watch_pages: Vec<WatchPagePlatform>,
}

impl PlatformSet {
    pub fn empty() -> Self {
        Self {
            cdn_mirrors: Vec::new(),
            watch_pages: Vec::new(),
        }
    }

    pub fn with_cdn_mirror(mut self, platform: CdnMirrorPlatform) -> Self {
        self.cdn_mirrors.push(platform);
        self
    }

    pub fn with_watch_page(mut self, platform: WatchPagePlatform) -> Self {
        self.watch_pages.push(platform);
        self
    }
}

impl Default for PlatformSet {
    fn default() -> Self {
        Self {
            cdn_mirrors: vec![CdnMirrorPlatform {
                name: "clipmirror".to_string(),
                page_hosts: vec!["clipmirror.net".to_string(), "www.clipmirror.net".to_string()],
                cdn_hosts: vec![
                    "media.clipmirror.net".to_string(),
                    "thumbs.clipmirror.net".to_string(),
                ],
                templates: vec![
                    "https://{cdn}/{id}.mp4".to_string(),
                    "https://{cdn}/{id}/source.mp4".to_string(),
                    "https://{cdn}/{id}-mobile.mp4".to_string(),
                ],
            }],
            watch_pages: vec![WatchPagePlatform {
                name: "example-platform".to_string(),
                page_hosts: vec![
                    "example-platform.com".to_string(),
                    "www.example-platform.com".to_string(),
                ],
                manifest_template: "https://{host}/api/v1/media/{id}/manifest".to_string(),
                player_selector: "video".to_string(),
                media_hosts: vec!["media.example-platform.com".to_string()],
            }],
        }
    }
}

/// How to reach a browser for page automation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// DevTools HTTP endpoint of a running browser, e.g. http://127.0.0.1:9222.
    /// Browser fallback is disabled when unset.
    pub endpoint: Option<String>,
}

/// Paths to the external media engines (auto-detected when unset)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_path: Option<String>,
    pub ffprobe_path: Option<String>,
}

/// Per-stage time limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    /// HEAD probes against candidate media URLs
    pub connection_probe_ms: u64,
    /// Manifest fetch
    pub manifest_secs: u64,
    /// Page navigation in the browser
    pub page_load_secs: u64,
    /// Waiting for the player element
    pub selector_secs: u64,
    /// One ffprobe run
    pub probe_secs: u64,
    /// One ffmpeg encode
    pub encode_secs: u64,
    /// Whole resolution stage at the pipeline boundary
    pub resolve_stage_secs: u64,
    /// Whole transcode stage (all rounds) at the pipeline boundary
    pub transcode_stage_secs: u64,
}

impl StageTimeouts {
    pub fn connection_probe(&self) -> Duration {
        Duration::from_millis(self.connection_probe_ms)
    }

    pub fn manifest(&self) -> Duration {
        Duration::from_secs(self.manifest_secs)
    }

    pub fn page_load(&self) -> Duration {
        Duration::from_secs(self.page_load_secs)
    }

    pub fn selector(&self) -> Duration {
        Duration::from_secs(self.selector_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_secs)
    }

    pub fn encode(&self) -> Duration {
        Duration::from_secs(self.encode_secs)
    }

    pub fn resolve_stage(&self) -> Duration {
        Duration::from_secs(self.resolve_stage_secs)
    }

    pub fn transcode_stage(&self) -> Duration {
        Duration::from_secs(self.transcode_stage_secs)
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            connection_probe_ms: 2_000,
            manifest_secs: 8,
            page_load_secs: 15,
            selector_secs: 8,
            probe_secs: 15,
            encode_secs: 120,
            resolve_stage_secs: 60,
            transcode_stage_secs: 1_500,
        }
    }
}

/// Scratch directory settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    pub dir: PathBuf,
    /// Files older than this are removed by the sweep
    pub max_age_secs: u64,
    /// Interval of the background sweeper
    pub sweep_interval_secs: u64,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("clip-preview"),
            max_age_secs: 60 * 60,
            sweep_interval_secs: 10 * 60,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub platforms: PlatformSet,
    pub browser: BrowserConfig,
    pub engines: EngineConfig,
    pub timeouts: StageTimeouts,
    pub scratch: ScratchConfig,
    pub logging: LoggingConfig,
}

impl PreviewConfig {
    /// Load from a JSON file; missing sections fall back to defaults
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Overlay `CLIP_PREVIEW_*` environment variables
    pub fn from_env(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("CLIP_PREVIEW_SCRATCH_DIR") {
            self.scratch.dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("CLIP_PREVIEW_FFMPEG") {
            self.engines.ffmpeg_path = Some(path);
        }
        if let Some(path) = lookup("CLIP_PREVIEW_FFPROBE") {
            self.engines.ffprobe_path = Some(path);
        }
        if let Some(endpoint) = lookup("CLIP_PREVIEW_BROWSER_ENDPOINT") {
            self.browser.endpoint = Some(endpoint).filter(|e| !e.trim().is_empty());
        }
        if let Some(level) = lookup("CLIP_PREVIEW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("CLIP_PREVIEW_LOG_FORMAT") {
            match format.to_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "text" => self.logging.format = LogFormat::Text,
                other => tracing::warn!(format = other, "Ignoring unknown log format"),
            }
        }
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch.dir = dir.into();
        self
    }

    pub fn with_browser_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.browser.endpoint = endpoint;
        self
    }

    pub fn with_platforms(mut self, platforms: PlatformSet) -> Self {
        self.platforms = platforms;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = PreviewConfig::default();
        assert_eq!(config.timeouts.probe(), Duration::from_secs(15));
        assert_eq!(config.timeouts.encode(), Duration::from_secs(120));
        assert_eq!(config.timeouts.connection_probe(), Duration::from_secs(2));
        assert_eq!(config.scratch.max_age_secs, 3600);
        assert!(config.browser.endpoint.is_none());
        assert!(config.scratch.dir.ends_with("clip-preview"));
    }

    #[test]
    fn test_env_overlay() {
        let vars: HashMap<&str, &str> = [
            ("CLIP_PREVIEW_SCRATCH_DIR", "/tmp/previews"),
            ("CLIP_PREVIEW_FFMPEG", "/opt/ffmpeg"),
            ("CLIP_PREVIEW_BROWSER_ENDPOINT", "http://127.0.0.1:9222"),
            ("CLIP_PREVIEW_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let config = PreviewConfig::default()
            .apply_vars(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.scratch.dir, PathBuf::from("/tmp/previews"));
        assert_eq!(config.engines.ffmpeg_path.as_deref(), Some("/opt/ffmpeg"));
        assert!(config.engines.ffprobe_path.is_none());
        assert_eq!(
            config.browser.endpoint.as_deref(),
            Some("http://127.0.0.1:9222")
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "timeouts": { "probe_secs": 5 }, "browser": { "endpoint": "http://localhost:9222" } }"#,
        )
        .unwrap();

        let config = PreviewConfig::from_json_file(&path).unwrap();
        assert_eq!(config.timeouts.probe_secs, 5);
        assert_eq!(config.timeouts.encode_secs, 120);
        assert_eq!(config.platforms, PlatformSet::default());
        assert_eq!(config.browser.endpoint.as_deref(), Some("http://localhost:9222"));
    }

    #[test]
    fn test_builder_replaces_platforms() {
        let platforms = PlatformSet::empty()
            .with_cdn_mirror(CdnMirrorPlatform {
                name: "mirror".to_string(),
                page_hosts: vec!["mirror.test".to_string()],
                cdn_hosts: vec!["cdn.mirror.test".to_string()],
                templates: vec!["https://{cdn}/{id}.mp4".to_string()],
            })
            .with_watch_page(WatchPagePlatform {
                name: "watch".to_string(),
                page_hosts: vec!["watch.test".to_string()],
                manifest_template: "https://{host}/m/{id}".to_string(),
                player_selector: "video".to_string(),
                media_hosts: vec!["media.watch.test".to_string()],
            });

        let config = PreviewConfig::default()
            .with_platforms(platforms)
            .with_browser_endpoint(Some("ws://127.0.0.1:9222/devtools/browser/x".to_string()));

        assert_eq!(config.platforms.cdn_mirrors.len(), 1);
        assert_eq!(config.platforms.cdn_mirrors[0].name, "mirror");
        assert_eq!(config.platforms.watch_pages[0].manifest_template, "https://{host}/m/{id}");
        assert!(config.browser.endpoint.is_some());
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PreviewConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
