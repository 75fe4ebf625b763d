// Watch-page resolver
//
// Two stages: ask the platform's manifest endpoint, then (when a browser is
// configured) render the page and read the player. Every page opened here is
// closed before returning, whatever happened in between.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use super::manifest::extract_stream_url;
use crate::preview::browser::{video_attribute_script, BrowserAutomation, BrowserPage, WaitUntil};
use crate::preview::config::{StageTimeouts, WatchPagePlatform};
use crate::preview::errors::{BrowserError, ResolutionError};
use crate::preview::matcher::{
    file_stem, host_of, is_direct_stream_link, is_watch_page, rewrite_segment_extension,
    watch_page_id,
};
use crate::preview::transport::HttpTransport;

/// Poster file names carry one of these after the media stem
const POSTER_SUFFIXES: &[&str] = &["-poster", "-thumbnail", "-thumb"];

pub struct WatchPageResolver {
    platform: WatchPagePlatform,
    transport: Arc<dyn HttpTransport>,
    browser: Option<Arc<dyn BrowserAutomation>>,
    timeouts: StageTimeouts,
}

impl WatchPageResolver {
    pub fn new(
        platform: WatchPagePlatform,
        transport: Arc<dyn HttpTransport>,
        browser: Option<Arc<dyn BrowserAutomation>>,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            platform,
            transport,
            browser,
            timeouts,
        }
    }

    pub fn platform(&self) -> &WatchPagePlatform {
        &self.platform
    }

    pub async fn resolve(&self, url: &str) -> Result<String, ResolutionError> {
        // Profile pages, search results and the like are not ours to rewrite
        if !is_watch_page(url) {
            return Ok(url.to_string());
        }
        let id = watch_page_id(url)
            .ok_or_else(|| ResolutionError::MissingIdentifier(url.to_string()))?;

        match self.from_manifest(url, &id).await {
            Ok(stream) => {
                info!(platform = %self.platform.name, id = %id, "Resolved from manifest");
                return Ok(stream);
            }
            Err(e) => debug!(platform = %self.platform.name, error = %e, "Manifest stage failed"),
        }

        let Some(browser) = self.browser.as_ref() else {
            return Err(ResolutionError::Exhausted(url.to_string()));
        };

        let stream = self.from_browser(browser.as_ref(), url).await?;
        info!(platform = %self.platform.name, id = %id, "Resolved from rendered page");
        Ok(stream)
    }

    /// Manifest endpoint for a watch page
    pub fn manifest_url(&self, url: &str, id: &str) -> Option<String> {
        let host = host_of(url)?;
        Some(
            self.platform
                .manifest_template
                .replace("{host}", &host)
                .replace("{id}", id),
        )
    }

    async fn from_manifest(&self, url: &str, id: &str) -> Result<String, ResolutionError> {
        let manifest_url = self
            .manifest_url(url, id)
            .ok_or_else(|| ResolutionError::Manifest(format!("No host in {}", url)))?;
        let body = self
            .transport
            .fetch_text(&manifest_url, self.timeouts.manifest())
            .await
            .map_err(|e| ResolutionError::Manifest(e.to_string()))?;
        extract_stream_url(&body).map_err(ResolutionError::Manifest)
    }

    async fn from_browser(
        &self,
        browser: &dyn BrowserAutomation,
        url: &str,
    ) -> Result<String, ResolutionError> {
        let mut page = browser.open_page().await?;

        let budget = self.browser_budget();
        let outcome = match tokio::time::timeout(budget, self.scrape_page(page.as_mut(), url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BrowserError::Timeout(budget).into()),
        };

        if let Err(e) = page.close().await {
            warn!(error = %e, "Failed to close browser page");
        }
        outcome
    }

    /// Navigation, selector wait, and a handful of poster probes
    fn browser_budget(&self) -> Duration {
        let probes = (self.platform.media_hosts.len() as u32 * 2).max(1);
        self.timeouts.page_load()
            + self.timeouts.selector()
            + self.timeouts.connection_probe() * probes
            + Duration::from_secs(5)
    }

    async fn scrape_page(
        &self,
        page: &mut dyn BrowserPage,
        url: &str,
    ) -> Result<String, ResolutionError> {
        page.navigate(url, WaitUntil::DomContentLoaded, self.timeouts.page_load())
            .await?;
        page.wait_for_selector(&self.platform.player_selector, self.timeouts.selector())
            .await?;

        let poster = page
            .evaluate(&video_attribute_script(&self.platform.player_selector, "poster"))
            .await?;
        if let Some(poster) = poster.as_str().filter(|p| !p.trim().is_empty()) {
            for candidate in self.poster_candidates(url, poster) {
                if self.is_reachable(&candidate).await {
                    debug!(candidate = %candidate, "Poster-derived candidate reachable");
                    return Ok(candidate);
                }
            }
        }

        let src = page
            .evaluate(&video_attribute_script(&self.platform.player_selector, "src"))
            .await?;
        match src.as_str() {
            Some(src) if src.starts_with("blob:") => {
                debug!("Player uses a blob source, nothing fetchable");
            }
            Some(src) if is_direct_stream_link(src) => {
                return Ok(rewrite_segment_extension(src));
            }
            _ => {}
        }

        Err(ResolutionError::Exhausted(url.to_string()))
    }

    /// Media URLs guessed from the poster file name, probe order
    pub fn poster_candidates(&self, page_url: &str, poster: &str) -> Vec<String> {
        let absolute = match Url::parse(page_url).and_then(|base| base.join(poster)) {
            Ok(joined) => joined.to_string(),
            Err(_) => poster.to_string(),
        };
        let Some(mut stem) = file_stem(&absolute) else {
            return Vec::new();
        };
        for suffix in POSTER_SUFFIXES {
            if let Some(stripped) = stem.strip_suffix(suffix) {
                stem = stripped.to_string();
                break;
            }
        }
        if stem.is_empty() {
            return Vec::new();
        }

        self.platform
            .media_hosts
            .iter()
            .flat_map(|host| {
                [
                    format!("https://{}/{}.mp4", host, stem),
                    format!("https://{}/{}-mobile.mp4", host, stem),
                ]
            })
            .collect()
    }

    async fn is_reachable(&self, url: &str) -> bool {
        match self
            .transport
            .probe(url, self.timeouts.connection_probe())
            .await
        {
            Ok(response) => response.is_success(),
            Err(e) => {
                debug!(candidate = %url, error = %e, "Poster candidate unreachable");
                false
            }
        }
    }
}
