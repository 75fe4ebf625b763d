// Browser automation - pages for watch-page resolvers that need rendering
//
// One page (and one browser context) per resolution attempt; callers must
// `close()` it on every exit path.

pub mod cdp;

pub use cdp::CdpBrowser;

use std::time::Duration;

use async_trait::async_trait;

use super::errors::BrowserError;

/// Navigation milestone to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// DOM parsed, subresources may still be loading
    #[default]
    DomContentLoaded,
    /// Everything loaded
    Load,
}

impl WaitUntil {
    /// `document.readyState` values that satisfy this milestone
    pub fn ready_states(&self) -> &'static [&'static str] {
        match self {
            Self::DomContentLoaded => &["interactive", "complete"],
            Self::Load => &["complete"],
        }
    }
}

/// Source of isolated browser pages
#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    /// Open a fresh page in its own browser context
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError>;
}

/// A single page. `close` is idempotent.
#[async_trait]
pub trait BrowserPage: Send {
    async fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    /// Evaluate a script and return its JSON-serialisable result
    /// (`Null` for `undefined`).
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, BrowserError>;

    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Script returning an attribute of the `<video>` inside (or at) `selector`,
/// or an empty string.
pub fn video_attribute_script(selector: &str, attribute: &str) -> String {
    let selector = serde_json::Value::String(selector.to_string()).to_string();
    let attribute = serde_json::Value::String(attribute.to_string()).to_string();
    format!(
        "(() => {{ const el = document.querySelector({sel}); \
         const video = el && (el.tagName === 'VIDEO' ? el : el.querySelector('video')); \
         return video ? (video.getAttribute({attr}) || video[{attr}] || '') : ''; }})()",
        sel = selector,
        attr = attribute
    )
}
