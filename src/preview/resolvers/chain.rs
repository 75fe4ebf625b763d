// Resolver chain - priority-ordered table of URL resolvers
//
// Selection is a pure function of (url, table): highest priority first,
// registration order breaks ties, and a pass-through entry at the very
// bottom guarantees something always matches.

use std::sync::Arc;

use tracing::{debug, warn};

use super::cdn_probe::CdnProbeResolver;
use super::watch_page::WatchPageResolver;
use crate::preview::browser::BrowserAutomation;
use crate::preview::config::PreviewConfig;
use crate::preview::errors::ResolutionError;
use crate::preview::matcher::{is_direct_media_url, matches_host};
use crate::preview::models::{MediaReference, PlatformTag};
use crate::preview::transport::HttpTransport;

pub const PRIORITY_WATCH_PAGE: i32 = 300;
pub const PRIORITY_CDN_PROBE: i32 = 200;
pub const PRIORITY_PASS_THROUGH: i32 = i32::MIN;

/// When a descriptor applies to a URL
#[derive(Clone)]
pub enum UrlPredicate {
    Always,
    /// Host equals or is a subdomain of one of these
    Hosts(Vec<String>),
    Custom(fn(&str) -> bool),
}

impl UrlPredicate {
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Hosts(hosts) => matches_host(url, hosts),
            Self::Custom(predicate) => predicate(url),
        }
    }
}

/// The closed set of resolution strategies
pub enum ResolverKind {
    PassThrough,
    CdnProbe(CdnProbeResolver),
    WatchPage(WatchPageResolver),
}

impl ResolverKind {
    async fn resolve(&self, url: &str) -> Result<String, ResolutionError> {
        match self {
            Self::PassThrough => Ok(url.to_string()),
            Self::CdnProbe(resolver) => resolver.resolve(url).await,
            Self::WatchPage(resolver) => resolver.resolve(url).await,
        }
    }
}

pub struct ResolverDescriptor {
    pub name: String,
    pub priority: i32,
    pub predicate: UrlPredicate,
    pub kind: ResolverKind,
}

impl ResolverDescriptor {
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        predicate: UrlPredicate,
        kind: ResolverKind,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            predicate,
            kind,
        }
    }

    /// Terminal entry: matches everything, changes nothing
    pub fn pass_through() -> Self {
        Self::new(
            "pass-through",
            PRIORITY_PASS_THROUGH,
            UrlPredicate::Always,
            ResolverKind::PassThrough,
        )
    }

    pub fn matches(&self, url: &str) -> bool {
        self.predicate.matches(url)
    }

    /// Platform attribution for URLs this descriptor handles
    pub fn platform_tag(&self, url: &str) -> PlatformTag {
        match &self.kind {
            ResolverKind::WatchPage(resolver) => {
                PlatformTag::WatchPage(resolver.platform().name.clone())
            }
            ResolverKind::CdnProbe(resolver) => {
                PlatformTag::CdnMirror(resolver.platform().name.clone())
            }
            ResolverKind::PassThrough if is_direct_media_url(url) => PlatformTag::DirectMedia,
            ResolverKind::PassThrough => PlatformTag::Generic,
        }
    }
}

#[derive(Default)]
pub struct ResolverChainBuilder {
    descriptors: Vec<ResolverDescriptor>,
}

impl ResolverChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, descriptor: ResolverDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn build(mut self) -> ResolverChain {
        // Stable: equal priorities keep registration order
        self.descriptors
            .sort_by(|a, b| b.priority.cmp(&a.priority));
        self.descriptors.push(ResolverDescriptor::pass_through());
        ResolverChain {
            descriptors: self.descriptors,
        }
    }
}

pub struct ResolverChain {
    descriptors: Vec<ResolverDescriptor>,
}

impl ResolverChain {
    pub fn builder() -> ResolverChainBuilder {
        ResolverChainBuilder::new()
    }

    /// Watch-page and CDN resolvers for every configured platform
    pub fn from_config(
        config: &PreviewConfig,
        transport: Arc<dyn HttpTransport>,
        browser: Option<Arc<dyn BrowserAutomation>>,
    ) -> Self {
        let mut builder = Self::builder();

        for platform in &config.platforms.watch_pages {
            builder = builder.register(ResolverDescriptor::new(
                platform.name.clone(),
                PRIORITY_WATCH_PAGE,
                UrlPredicate::Hosts(platform.page_hosts.clone()),
                ResolverKind::WatchPage(WatchPageResolver::new(
                    platform.clone(),
                    transport.clone(),
                    browser.clone(),
                    config.timeouts.clone(),
                )),
            ));
        }

        for platform in &config.platforms.cdn_mirrors {
            builder = builder.register(ResolverDescriptor::new(
                platform.name.clone(),
                PRIORITY_CDN_PROBE,
                UrlPredicate::Hosts(platform.page_hosts.clone()),
                ResolverKind::CdnProbe(CdnProbeResolver::new(
                    platform.clone(),
                    transport.clone(),
                    config.timeouts.connection_probe(),
                )),
            ));
        }

        builder.build()
    }

    /// Entries in selection order; the last one is always pass-through
    pub fn descriptors(&self) -> &[ResolverDescriptor] {
        &self.descriptors
    }

    /// First descriptor whose predicate accepts the URL
    pub fn select(&self, url: &str) -> &ResolverDescriptor {
        self.descriptors
            .iter()
            .find(|d| d.matches(url))
            .unwrap_or_else(|| {
                // build() always appends the terminal entry
                &self.descriptors[self.descriptors.len() - 1]
            })
    }

    /// Resolve a raw URL. Never fails: resolver errors degrade to the input.
    pub async fn resolve(&self, url: &str) -> MediaReference {
        let descriptor = self.select(url);
        debug!(resolver = %descriptor.name, url = %url, "Selected resolver");

        let canonical = match descriptor.kind.resolve(url).await {
            Ok(resolved) if !resolved.trim().is_empty() => resolved,
            Ok(_) => {
                warn!(resolver = %descriptor.name, "Resolver returned an empty URL, keeping original");
                url.to_string()
            }
            Err(e) => {
                warn!(resolver = %descriptor.name, error = %e, "Resolver failed, keeping original URL");
                url.to_string()
            }
        };

        MediaReference::new(url.to_string(), canonical, descriptor.platform_tag(url))
    }

    /// Reference for a URL whose resolution was abandoned
    pub fn unresolved(&self, url: &str) -> MediaReference {
        MediaReference::new(
            url.to_string(),
            url.to_string(),
            self.select(url).platform_tag(url),
        )
    }
}
