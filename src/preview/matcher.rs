// Candidate URL matcher - pure predicates over raw URLs
//
// Nothing in here touches the network. Resolver predicates and platform
// attribution are built from these.

use regex::Regex;
use url::Url;

lazy_static::lazy_static! {
    /// Extension of a file the media engine can read directly
    static ref MEDIA_EXT_RE: Regex =
        Regex::new(r"(?i)\.(mp4|webm|mov|m4v|mkv|gifv|m4s|m3u8)$").unwrap();
    /// Path shapes of a platform watch page: /watch/<id>, /v/<id>, /watch?v=<id>
    static ref WATCH_PATH_RE: Regex =
        Regex::new(r"^/(?:watch|v)(?:/([A-Za-z0-9_-]+))?/?$").unwrap();
    /// DASH segment extension the manifest path sometimes hands out
    static ref SEGMENT_EXT_RE: Regex = Regex::new(r"(?i)\.m4s$").unwrap();
}

fn parse_http(url: &str) -> Option<Url> {
    let parsed = Url::parse(url.trim()).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(parsed),
        _ => None,
    }
}

/// Lowercased host without a trailing dot
pub fn host_of(url: &str) -> Option<String> {
    let parsed = parse_http(url)?;
    parsed
        .host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
}

/// Host equals one of `hosts` or is a subdomain of one
pub fn matches_host(url: &str, hosts: &[String]) -> bool {
    let Some(host) = host_of(url) else {
        return false;
    };
    hosts.iter().any(|candidate| {
        let candidate = candidate.to_lowercase();
        host == candidate || host.ends_with(&format!(".{}", candidate))
    })
}

/// URL path ends in a media file extension
pub fn is_direct_media_url(url: &str) -> bool {
    match parse_http(url) {
        Some(parsed) => MEDIA_EXT_RE.is_match(parsed.path()),
        None => false,
    }
}

/// A link a subprocess can fetch: http(s), media extension, not `blob:`
pub fn is_direct_stream_link(url: &str) -> bool {
    !url.trim_start().starts_with("blob:") && is_direct_media_url(url)
}

/// `/watch/<id>`, `/v/<id>` or `/watch?v=<id>`
pub fn is_watch_page(url: &str) -> bool {
    watch_page_id(url).is_some()
}

/// Identifier of a watch-page URL
pub fn watch_page_id(url: &str) -> Option<String> {
    let parsed = parse_http(url)?;
    let caps = WATCH_PATH_RE.captures(parsed.path())?;
    if let Some(id) = caps.get(1) {
        return Some(id.as_str().to_string());
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Point a DASH segment URL at the progressive file next to it
pub fn rewrite_segment_extension(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) if SEGMENT_EXT_RE.is_match(parsed.path()) => {
            let path = SEGMENT_EXT_RE.replace(parsed.path(), ".mp4").into_owned();
            parsed.set_path(&path);
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

/// Last path segment without its extension
pub fn file_stem(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()?;
    let stem = match last.rfind('.') {
        Some(0) | None => last,
        Some(idx) => &last[..idx],
    };
    Some(stem.to_string()).filter(|s| !s.is_empty())
}
