// Media manifest parsing
//
// Watch-page platforms answer a per-video JSON document listing the files
// behind the player. Its shape varies between platforms and API versions,
// so we search the whole tree rather than binding a schema.

use serde_json::Value;

use crate::preview::matcher::{is_direct_stream_link, rewrite_segment_extension};

/// Keys that usually hold the primary file, best first
const PREFERRED_KEYS: &[&str] = &["hd", "url", "src", "sd"];

/// Pick the direct stream link out of a manifest body.
///
/// Links under a preferred key win; otherwise the first direct link found
/// anywhere. DASH segments are pointed at their progressive file.
pub fn extract_stream_url(body: &str) -> Result<String, String> {
    let document: Value =
        serde_json::from_str(body).map_err(|e| format!("Manifest is not JSON: {}", e))?;

    for key in PREFERRED_KEYS {
        if let Some(link) = find_under_key(&document, key) {
            return Ok(rewrite_segment_extension(&link));
        }
    }

    find_any(&document)
        .map(|link| rewrite_segment_extension(&link))
        .ok_or_else(|| "Manifest lists no direct stream".to_string())
}

fn find_under_key(value: &Value, wanted: &str) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(link)) = map.get(wanted) {
                if is_direct_stream_link(link) {
                    return Some(link.clone());
                }
            }
            map.values().find_map(|child| find_under_key(child, wanted))
        }
        Value::Array(items) => items.iter().find_map(|item| find_under_key(item, wanted)),
        _ => None,
    }
}

fn find_any(value: &Value) -> Option<String> {
    match value {
        Value::String(link) if is_direct_stream_link(link) => Some(link.clone()),
        Value::Object(map) => map.values().find_map(find_any),
        Value::Array(items) => items.iter().find_map(find_any),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_hd() {
        let body = r#"{
            "media": {
                "sd": "https://media.example-platform.com/abc123-sd.mp4",
                "hd": "https://media.example-platform.com/abc123-hd.mp4"
            }
        }"#;
        assert_eq!(
            extract_stream_url(body).unwrap(),
            "https://media.example-platform.com/abc123-hd.mp4"
        );
    }

    #[test]
    fn test_segment_is_rewritten() {
        let body = r#"{"renditions":[{"url":"https://media.example-platform.com/v/abc123.m4s"}]}"#;
        assert_eq!(
            extract_stream_url(body).unwrap(),
            "https://media.example-platform.com/v/abc123.mp4"
        );
    }

    #[test]
    fn test_any_direct_link_as_fallback() {
        let body = r#"{"files":["https://example.com/thumb.jpg","https://media.example-platform.com/x.webm"]}"#;
        assert_eq!(
            extract_stream_url(body).unwrap(),
            "https://media.example-platform.com/x.webm"
        );
    }

    #[test]
    fn test_blob_and_non_media_ignored() {
        let body = r#"{"url":"blob:https://example-platform.com/1-2","poster":"https://x.com/p.jpg"}"#;
        assert!(extract_stream_url(body).is_err());
        assert!(extract_stream_url("<html>").is_err());
    }
}
