pub mod logging;
pub mod preview;

pub use preview::{
    EncodingTarget, MediaReference, PreviewConfig, PreviewError, PreviewOutcome, PreviewPipeline,
    VideoMetadata,
};
