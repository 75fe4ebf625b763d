// URL resolvers - turn a shared page URL into a fetchable media URL

pub mod cdn_probe;
pub mod chain;
pub mod manifest;
pub mod watch_page;

pub use cdn_probe::CdnProbeResolver;
pub use chain::{
    ResolverChain, ResolverChainBuilder, ResolverDescriptor, ResolverKind, UrlPredicate,
    PRIORITY_CDN_PROBE, PRIORITY_PASS_THROUGH, PRIORITY_WATCH_PAGE,
};
pub use watch_page::WatchPageResolver;
