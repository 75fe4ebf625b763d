// CDN pattern-probing resolver
//
// Mirror platforms serve media from predictable paths keyed by a slug in the
// page URL. We build every candidate and take the first one whose HEAD probe
// looks like real video.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::preview::config::CdnMirrorPlatform;
use crate::preview::errors::ResolutionError;
use crate::preview::transport::{HttpTransport, ProbeResponse};

/// Identifier segments must be longer than this
pub const MIN_IDENTIFIER_LEN: usize = 6;

/// Anything smaller is an error page or a placeholder
pub const MIN_CONTENT_BYTES: u64 = 10 * 1024;

/// Suffixes the candidate templates themselves add to a file name
const VARIANT_SUFFIXES: &[&str] = &["-mobile"];

pub struct CdnProbeResolver {
    platform: CdnMirrorPlatform,
    transport: Arc<dyn HttpTransport>,
    probe_timeout: Duration,
}

impl CdnProbeResolver {
    pub fn new(
        platform: CdnMirrorPlatform,
        transport: Arc<dyn HttpTransport>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            transport,
            probe_timeout,
        }
    }

    pub fn platform(&self) -> &CdnMirrorPlatform {
        &self.platform
    }

    /// Candidate URLs in probe order: templates outer, hosts inner
    pub fn candidates(&self, identifier: &str) -> Vec<String> {
        self.platform
            .templates
            .iter()
            .flat_map(|template| {
                self.platform.cdn_hosts.iter().map(move |host| {
                    template.replace("{cdn}", host).replace("{id}", identifier)
                })
            })
            .collect()
    }

    pub async fn resolve(&self, url: &str) -> Result<String, ResolutionError> {
        let identifier = extract_identifier(url)
            .ok_or_else(|| ResolutionError::MissingIdentifier(url.to_string()))?;
        let candidates = self.candidates(&identifier);

        for candidate in &candidates {
            match self.transport.probe(candidate, self.probe_timeout).await {
                Ok(response) if accepts(&response) => {
                    debug!(
                        platform = %self.platform.name,
                        candidate = %candidate,
                        status = response.status,
                        "CDN candidate accepted"
                    );
                    return Ok(candidate.clone());
                }
                Ok(response) => {
                    debug!(
                        candidate = %candidate,
                        status = response.status,
                        content_type = ?response.content_type,
                        content_length = ?response.content_length,
                        "CDN candidate rejected"
                    );
                }
                Err(e) => debug!(candidate = %candidate, error = %e, "CDN probe failed"),
            }
        }

        // Nothing confirmed; the first guess is still better than the page URL
        debug!(
            platform = %self.platform.name,
            identifier = %identifier,
            "No CDN candidate confirmed, using first candidate"
        );
        candidates
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::Exhausted(url.to_string()))
    }
}

/// Media identifier carried by a mirror page URL.
///
/// First path segment longer than `MIN_IDENTIFIER_LEN` that has no dot and
/// is not the host itself; otherwise the stem of a trailing file name, minus
/// any variant suffix.
pub fn extract_identifier(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    let preferred = segments.iter().find(|segment| {
        segment.len() > MIN_IDENTIFIER_LEN
            && !segment.contains('.')
            && segment.to_lowercase() != host
    });
    if let Some(segment) = preferred {
        return Some(segment.to_string());
    }

    let last = segments.last()?;
    let dot = last.rfind('.').filter(|idx| *idx > 0)?;
    let mut stem = &last[..dot];
    for suffix in VARIANT_SUFFIXES {
        if let Some(stripped) = stem.strip_suffix(suffix) {
            stem = stripped;
        }
    }
    Some(stem.to_string()).filter(|s| !s.is_empty())
}

/// 2xx, video-ish (or unlabelled) content, and not suspiciously small
pub fn accepts(response: &ProbeResponse) -> bool {
    if !response.is_success() {
        return false;
    }

    let type_ok = match response.content_type.as_deref() {
        None => true,
        Some(raw) => {
            let mime = raw.split(';').next().unwrap_or_default().trim().to_lowercase();
            mime.is_empty() || mime.starts_with("video/") || mime == "application/octet-stream"
        }
    };

    let length_ok = response
        .content_length
        .map_or(true, |len| len >= MIN_CONTENT_BYTES);

    type_ok && length_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::config::PlatformSet;
    use crate::preview::testing::{video_response, ScriptedTransport};

    fn resolver(transport: Arc<ScriptedTransport>) -> CdnProbeResolver {
        let platform = PlatformSet::default().cdn_mirrors.remove(0);
        CdnProbeResolver::new(platform, transport, Duration::from_secs(2))
    }

    #[test]
    fn test_extract_identifier() {
        assert_eq!(
            extract_identifier("https://clipmirror.net/HappyGreenFrog").as_deref(),
            Some("HappyGreenFrog")
        );
        assert_eq!(
            extract_identifier("https://clipmirror.net/watch/HappyGreenFrog?utm=1").as_deref(),
            Some("HappyGreenFrog")
        );
        // Short segments are skipped
        assert_eq!(
            extract_identifier("https://clipmirror.net/v/abc/CalmBlueRiver").as_deref(),
            Some("CalmBlueRiver")
        );
        assert_eq!(extract_identifier("https://clipmirror.net/").as_deref(), None);
        assert_eq!(extract_identifier("https://clipmirror.net/about").as_deref(), None);
    }

    #[test]
    fn test_identifier_is_stable_across_candidates() {
        let transport = Arc::new(ScriptedTransport::default());
        let resolver = resolver(transport);
        let id = extract_identifier("https://clipmirror.net/HappyGreenFrog").unwrap();

        for candidate in resolver.candidates(&id) {
            assert_eq!(
                extract_identifier(&candidate).as_deref(),
                Some("HappyGreenFrog"),
                "candidate {} lost the identifier",
                candidate
            );
        }
    }

    #[test]
    fn test_candidate_order() {
        let resolver = resolver(Arc::new(ScriptedTransport::default()));
        assert_eq!(
            resolver.candidates("HappyGreenFrog"),
            vec![
                "https://media.clipmirror.net/HappyGreenFrog.mp4",
                "https://thumbs.clipmirror.net/HappyGreenFrog.mp4",
                "https://media.clipmirror.net/HappyGreenFrog/source.mp4",
                "https://thumbs.clipmirror.net/HappyGreenFrog/source.mp4",
                "https://media.clipmirror.net/HappyGreenFrog-mobile.mp4",
                "https://thumbs.clipmirror.net/HappyGreenFrog-mobile.mp4",
            ]
        );
    }

    #[test]
    fn test_acceptance_rules() {
        assert!(accepts(&video_response(MIN_CONTENT_BYTES)));
        assert!(accepts(&ProbeResponse {
            status: 206,
            content_type: Some("application/octet-stream".to_string()),
            content_length: None,
        }));
        assert!(accepts(&ProbeResponse {
            status: 200,
            content_type: Some("video/webm; codecs=vp9".to_string()),
            content_length: Some(50_000),
        }));
        assert!(!accepts(&video_response(MIN_CONTENT_BYTES - 1)));
        assert!(!accepts(&ProbeResponse {
            status: 200,
            content_type: Some("text/html".to_string()),
            content_length: Some(50_000),
        }));
        assert!(!accepts(&ProbeResponse {
            status: 403,
            content_type: Some("video/mp4".to_string()),
            content_length: Some(50_000),
        }));
    }

    #[tokio::test]
    async fn test_returns_first_passing_candidate() {
        // Only the fourth candidate answers like real media
        let transport = Arc::new(
            ScriptedTransport::default()
                .with_probe(
                    "https://media.clipmirror.net/HappyGreenFrog.mp4",
                    video_response(512),
                )
                .with_probe(
                    "https://thumbs.clipmirror.net/HappyGreenFrog/source.mp4",
                    video_response(2_000_000),
                )
                .with_probe(
                    "https://media.clipmirror.net/HappyGreenFrog-mobile.mp4",
                    video_response(2_000_000),
                ),
        );
        let resolver = resolver(transport.clone());

        let resolved = resolver
            .resolve("https://clipmirror.net/HappyGreenFrog")
            .await
            .unwrap();

        assert_eq!(resolved, "https://thumbs.clipmirror.net/HappyGreenFrog/source.mp4");
        assert_eq!(transport.requested().len(), 4);
    }

    #[tokio::test]
    async fn test_falls_back_to_first_candidate() {
        let resolver = resolver(Arc::new(ScriptedTransport::default()));
        let resolved = resolver
            .resolve("https://clipmirror.net/HappyGreenFrog")
            .await
            .unwrap();
        assert_eq!(resolved, "https://media.clipmirror.net/HappyGreenFrog.mp4");
    }

    #[tokio::test]
    async fn test_missing_identifier() {
        let resolver = resolver(Arc::new(ScriptedTransport::default()));
        let result = resolver.resolve("https://clipmirror.net/").await;
        assert!(matches!(result, Err(ResolutionError::MissingIdentifier(_))));
    }
}
