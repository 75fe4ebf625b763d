// Engine diagnostics - classifies ffmpeg/ffprobe stderr
//
// Media engines report network and demuxer problems only as free text.
// This module maps that text to a small set of reasons so callers can
// decide whether a retry with different parameters makes sense.

use serde::{Deserialize, Serialize};

/// Reasons an external media engine gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineFailure {
    /// Remote server answered 403
    Forbidden,

    /// Remote server answered 404 or the file does not exist
    NotFound,

    /// Input could not be demuxed (HTML page, truncated file, ...)
    InvalidData,

    /// Stream uses a codec the engine build cannot decode
    UnsupportedCodec,

    /// Connection or read timeout inside the engine
    NetworkTimeout,

    /// Connection refused or DNS failure
    ConnectionFailed,

    /// Engine ran out of memory or disk
    ResourceExhausted,
}

impl EngineFailure {
    /// Whether trying again (possibly with smaller parameters) can help
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::ConnectionFailed | Self::ResourceExhausted
        )
    }

    /// Whether the input itself is bad and no parameter change will fix it
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Forbidden | Self::NotFound | Self::InvalidData | Self::UnsupportedCodec
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Forbidden => "Remote server refused access (HTTP 403)",
            Self::NotFound => "Media not found",
            Self::InvalidData => "Input is not a readable media stream",
            Self::UnsupportedCodec => "Codec not supported by the engine",
            Self::NetworkTimeout => "Network timeout while reading media",
            Self::ConnectionFailed => "Could not connect to media host",
            Self::ResourceExhausted => "Engine ran out of memory or disk",
        }
    }
}

/// Classify engine stderr. Returns `None` when nothing recognisable matched.
pub fn diagnose_engine_error(stderr: &str) -> Option<EngineFailure> {
    let lower = stderr.to_lowercase();

    if lower.contains("403 forbidden") || lower.contains("http error 403") {
        return Some(EngineFailure::Forbidden);
    }

    if lower.contains("404 not found")
        || lower.contains("http error 404")
        || lower.contains("no such file or directory")
    {
        return Some(EngineFailure::NotFound);
    }

    if lower.contains("timed out") || lower.contains("timeout") {
        return Some(EngineFailure::NetworkTimeout);
    }

    if lower.contains("connection refused")
        || lower.contains("failed to resolve hostname")
        || lower.contains("name or service not known")
        || lower.contains("network is unreachable")
    {
        return Some(EngineFailure::ConnectionFailed);
    }

    if lower.contains("decoder not found")
        || lower.contains("unknown decoder")
        || lower.contains("unsupported codec")
    {
        return Some(EngineFailure::UnsupportedCodec);
    }

    if lower.contains("invalid data found when processing input")
        || lower.contains("moov atom not found")
        || lower.contains("end of file")
    {
        return Some(EngineFailure::InvalidData);
    }

    if lower.contains("cannot allocate memory") || lower.contains("no space left on device") {
        return Some(EngineFailure::ResourceExhausted);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_detection() {
        let error = "[https @ 0x55] HTTP error 403 Forbidden\nhttps://cdn/x.mp4: Server returned 403 Forbidden";
        assert_eq!(diagnose_engine_error(error), Some(EngineFailure::Forbidden));
    }

    #[test]
    fn test_not_found_detection() {
        let error = "https://cdn/x.mp4: Server returned 404 Not Found";
        assert_eq!(diagnose_engine_error(error), Some(EngineFailure::NotFound));
    }

    #[test]
    fn test_invalid_data_detection() {
        let error = "page.html: Invalid data found when processing input";
        assert_eq!(diagnose_engine_error(error), Some(EngineFailure::InvalidData));
    }

    #[test]
    fn test_timeout_detection() {
        let error = "Connection timed out";
        let reason = diagnose_engine_error(error);
        assert_eq!(reason, Some(EngineFailure::NetworkTimeout));
        assert!(reason.unwrap().is_retryable());
    }

    #[test]
    fn test_unknown_text() {
        assert_eq!(diagnose_engine_error("something odd happened"), None);
    }

    #[test]
    fn test_permanent_reasons() {
        assert!(EngineFailure::InvalidData.is_permanent());
        assert!(!EngineFailure::NetworkTimeout.is_permanent());
    }
}
