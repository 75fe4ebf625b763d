// HTTP seam used by the resolvers
//
// Resolvers only need two things from the network: a cheap reachability
// probe and a text fetch. Keeping them behind a trait lets tests script the
// network per URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE, USER_AGENT};

use super::errors::TransportError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// What a HEAD probe learned about a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Full length of the resource when known
    pub content_length: Option<u64>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// HEAD request with `Range: bytes=0-`
    async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, TransportError>;

    /// GET and return the body as text; non-2xx is an error
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    fn map_error(url: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(url.to_string())
        } else {
            TransportError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn probe(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, TransportError> {
        let response = self
            .client
            .head(url)
            .header(RANGE, "bytes=0-")
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_error(url, e))?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        // A 206 reports the total after the slash: "bytes 0-99/12345"
        let content_length = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .or_else(|| {
                headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
            });

        Ok(ProbeResponse {
            status: response.status().as_u16(),
            content_type,
            content_length,
        })
    }

    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, TransportError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| Self::map_error(url, e))
    }
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}
