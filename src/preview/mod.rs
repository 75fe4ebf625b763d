// Preview module - URL resolution, media probing and adaptive GIF rendering

pub mod browser;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod probe;
pub mod resolvers;
pub mod sampler;
pub mod scratch;
pub mod tools;
pub mod transcoder;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{PlatformSet, PreviewConfig, StageTimeouts};
pub use errors::{
    BrowserError, EncodingError, PreviewError, ProbeError, ResolutionError, ScratchError,
    TransportError,
};
pub use models::{
    ColorSample, EncodeParams, EncodingTarget, MediaReference, PlatformTag, PreviewOutcome, Rgb,
    TempArtifact, TranscodeOutcome, VideoMetadata,
};
pub use pipeline::PreviewPipeline;
pub use probe::{FfprobeProber, Prober};
pub use resolvers::{ResolverChain, ResolverDescriptor, ResolverKind};
pub use scratch::ScratchDir;
pub use transcoder::{AdaptiveTranscoder, Encoder, FfmpegGifEncoder};
pub use transport::{HttpTransport, ProbeResponse, ReqwestTransport};
