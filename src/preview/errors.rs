// Error types for the preview pipeline stages

use std::time::Duration;

use thiserror::Error;

use super::diagnostics::EngineFailure;

fn engine_reason(reason: &Option<EngineFailure>) -> &'static str {
    reason.map_or("unrecognised failure", |r| r.description())
}

/// Raised inside a platform resolver. Never surfaced to callers: the chain
/// logs it and degrades to the original URL.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// No identifier could be pulled out of the page URL
    #[error("No media identifier in URL: {0}")]
    MissingIdentifier(String),

    /// Manifest endpoint failed or had no direct stream
    #[error("Manifest lookup failed: {0}")]
    Manifest(String),

    /// Browser automation stage failed
    #[error("Browser stage failed: {0}")]
    Browser(#[from] BrowserError),

    /// Every strategy of the resolver came up empty
    #[error("All strategies exhausted for {0}")]
    Exhausted(String),
}

/// Metadata engine failures
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// ffprobe exited non-zero
    #[error("ffprobe failed ({}): {stderr}", engine_reason(.reason))]
    Engine {
        reason: Option<EngineFailure>,
        stderr: String,
    },

    /// ffprobe could not be started
    #[error("Failed to launch ffprobe: {0}")]
    Launch(String),

    /// ffprobe did not finish in time
    #[error("ffprobe timed out after {0:?}")]
    Timeout(Duration),

    /// ffprobe output was not the JSON we expected
    #[error("Unparsable ffprobe output: {0}")]
    Parse(String),

    /// Metadata was read but lacks duration or dimensions
    #[error("Media is not usable for a preview: {0}")]
    Unusable(String),
}

/// Transcoding engine failures
#[derive(Debug, Clone, Error)]
pub enum EncodingError {
    /// ffmpeg exited non-zero
    #[error("ffmpeg failed ({}): {stderr}", engine_reason(.reason))]
    Engine {
        reason: Option<EngineFailure>,
        stderr: String,
    },

    /// ffmpeg could not be started
    #[error("Failed to launch ffmpeg: {0}")]
    Launch(String),

    /// A single encode did not finish in time
    #[error("ffmpeg timed out after {0:?}")]
    Timeout(Duration),

    /// Output file could not be inspected or removed
    #[error("Artifact I/O error: {0}")]
    Io(String),

    /// Every round timed out without producing an artifact
    #[error("No artifact produced after {0} rounds")]
    ExhaustedRounds(u32),

    /// Scratch directory refused an allocation
    #[error("Scratch directory error: {0}")]
    Scratch(#[from] ScratchError),
}

impl EncodingError {
    /// Timeouts are retried with smaller parameters, everything else is final
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Scratch directory failures
#[derive(Debug, Clone, Error)]
pub enum ScratchError {
    #[error("Failed to create scratch directory {path}: {message}")]
    Create { path: String, message: String },

    #[error("Failed to read scratch directory {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to delete {path}: {message}")]
    Delete { path: String, message: String },
}

/// Browser automation failures
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Browser operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// HTTP transport failures
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Errors surfaced by the pipeline to its callers
#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Scratch(#[from] ScratchError),

    /// A stage-level timeout fired at the pipeline boundary
    #[error("{stage} stage timed out after {timeout:?}")]
    StageTimeout { stage: &'static str, timeout: Duration },

    /// Frame extraction or color analysis failed
    #[error("Sampling failed: {0}")]
    Sampling(String),

    /// Pipeline could not be assembled from configuration
    #[error("Setup failed: {0}")]
    Setup(String),
}
