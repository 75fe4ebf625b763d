// Media probe - reads duration, dimensions and codec through ffprobe

use std::ffi::OsString;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::diagnostics::diagnose_engine_error;
use super::errors::ProbeError;
use super::models::VideoMetadata;
use super::utils::{run_output_with_timeout, stderr_tail, RunError};

/// Anything that can turn a media URL into metadata
#[async_trait]
pub trait Prober: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self, url: &str) -> Result<VideoMetadata, ProbeError>;
}

pub struct FfprobeProber {
    program: String,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn build_args(url: &str) -> Vec<OsString> {
        [
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            url,
        ]
        .iter()
        .map(OsString::from)
        .collect()
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, url: &str) -> Result<VideoMetadata, ProbeError> {
        debug!(url = %url, "Probing media");

        let output = run_output_with_timeout(&self.program, Self::build_args(url), self.timeout)
            .await
            .map_err(|e| match e {
                RunError::Launch(msg) => ProbeError::Launch(msg),
                RunError::TimedOut(limit) => ProbeError::Timeout(limit),
                RunError::Io(msg) => ProbeError::Engine {
                    reason: None,
                    stderr: msg,
                },
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = diagnose_engine_error(&stderr);
            warn!(
                url = %url,
                reason = reason.map(|r| r.description()),
                retryable = reason.map(|r| r.is_retryable()),
                "ffprobe failed"
            );
            return Err(ProbeError::Engine {
                reason,
                stderr: stderr_tail(&output.stderr, 5),
            });
        }

        let metadata = parse_ffprobe_output(&output.stdout)?;
        debug!(
            duration = %metadata.formatted_duration(),
            resolution = %metadata.resolution(),
            codec = %metadata.codec,
            "Probe finished"
        );
        Ok(metadata)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// Map `ffprobe -print_format json` output onto `VideoMetadata`.
///
/// Missing values become zero / empty; only unreadable JSON is an error.
pub fn parse_ffprobe_output(stdout: &[u8]) -> Result<VideoMetadata, ProbeError> {
    let parsed: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let format = parsed.format.as_ref();

    let duration_seconds = format
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| video.and_then(|v| parse_seconds(v.duration.as_deref())))
        .unwrap_or(0.0);

    let bitrate = format
        .and_then(|f| parse_u64(f.bit_rate.as_deref()))
        .or_else(|| video.and_then(|v| parse_u64(v.bit_rate.as_deref())))
        .unwrap_or(0);

    Ok(VideoMetadata {
        duration_seconds,
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        codec: video
            .and_then(|v| v.codec_name.clone())
            .unwrap_or_default(),
        container: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_default(),
        bitrate,
    })
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

fn parse_u64(value: Option<&str>) -> Option<u64> {
    value?.trim().parse().ok()
}
