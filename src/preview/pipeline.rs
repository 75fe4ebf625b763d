// Preview pipeline - resolve, probe, transcode, with a timeout per stage
//
// Stages of one request run strictly in order. A stage timeout drops the
// in-flight future: engine subprocesses are killed on drop and any artifact
// left half-written is reclaimed by the next sweep. The transcoder gets the
// stage budget itself so it can hand back its best attempt before the guard
// fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::browser::{BrowserAutomation, CdpBrowser};
use super::config::{PreviewConfig, StageTimeouts};
use super::errors::{PreviewError, ProbeError};
use super::models::{
    ColorSample, EncodingTarget, MediaReference, PreviewOutcome, TempArtifact, VideoMetadata,
};
use super::probe::{FfprobeProber, Prober};
use super::resolvers::ResolverChain;
use super::sampler::FrameSampler;
use super::scratch::ScratchDir;
use super::tools::ToolManager;
use super::transcoder::{AdaptiveTranscoder, Encoder, FfmpegGifEncoder};
use super::transport::{HttpTransport, ReqwestTransport};

/// Headroom over the engine's own limit before the stage guard fires
const STAGE_SLACK: Duration = Duration::from_secs(5);

pub struct PreviewPipeline {
    chain: ResolverChain,
    prober: Arc<dyn Prober>,
    transcoder: AdaptiveTranscoder,
    sampler: FrameSampler,
    scratch: Arc<ScratchDir>,
    timeouts: StageTimeouts,
}

impl PreviewPipeline {
    pub fn new(
        chain: ResolverChain,
        prober: Arc<dyn Prober>,
        encoder: Arc<dyn Encoder>,
        sampler: FrameSampler,
        scratch: Arc<ScratchDir>,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            chain,
            prober,
            transcoder: AdaptiveTranscoder::new(encoder, scratch.clone()),
            sampler,
            scratch,
            timeouts,
        }
    }

    /// Wire the real engines, HTTP client and (optional) browser
    pub async fn from_config(config: &PreviewConfig) -> Result<Self, PreviewError> {
        let transport: Arc<dyn HttpTransport> = Arc::new(
            ReqwestTransport::new().map_err(|e| PreviewError::Setup(e.to_string()))?,
        );
        let browser = config
            .browser
            .endpoint
            .as_ref()
            .map(|endpoint| Arc::new(CdpBrowser::new(endpoint.clone())) as Arc<dyn BrowserAutomation>);

        let (ffmpeg, ffprobe) = ToolManager::locate_engines(config.engines.clone())
            .await
            .map_err(|e| PreviewError::Setup(format!("Engine lookup failed: {}", e)))?;
        info!(ffmpeg = %ffmpeg, ffprobe = %ffprobe, browser = browser.is_some(), "Assembling preview pipeline");

        let scratch = Arc::new(
            ScratchDir::new(config.scratch.dir.clone())
                .with_max_age(Duration::from_secs(config.scratch.max_age_secs)),
        );
        let timeouts = config.timeouts.clone();

        Ok(Self::new(
            ResolverChain::from_config(config, transport, browser),
            Arc::new(FfprobeProber::new(ffprobe, timeouts.probe())),
            Arc::new(FfmpegGifEncoder::new(ffmpeg.clone(), timeouts.encode())),
            FrameSampler::new(ffmpeg, scratch.clone(), timeouts.probe()),
            scratch,
            timeouts,
        ))
    }

    pub fn chain(&self) -> &ResolverChain {
        &self.chain
    }

    pub fn scratch(&self) -> &Arc<ScratchDir> {
        &self.scratch
    }

    /// Resolution never fails; a timeout keeps the raw URL
    pub async fn resolve(&self, url: &str) -> MediaReference {
        let limit = self.timeouts.resolve_stage();
        match tokio::time::timeout(limit, self.chain.resolve(url)).await {
            Ok(reference) => reference,
            Err(_) => {
                warn!(url = %url, timeout_secs = limit.as_secs(), "Resolution timed out, using raw URL");
                self.chain.unresolved(url)
            }
        }
    }

    /// Resolve then probe
    pub async fn inspect(&self, url: &str) -> Result<(MediaReference, VideoMetadata), PreviewError> {
        let reference = self.resolve(url).await;
        let metadata = run_stage(
            "probe",
            self.timeouts.probe() + STAGE_SLACK,
            self.prober.probe(reference.canonical_url()),
        )
        .await??;
        Ok((reference, metadata))
    }

    /// Resolve, probe, check the media is usable, then fit it into `target`
    pub async fn render_preview(
        &self,
        url: &str,
        target: &EncodingTarget,
    ) -> Result<PreviewOutcome, PreviewError> {
        let (reference, metadata) = self.inspect(url).await?;

        if !metadata.is_valid_for_gif() {
            return Err(ProbeError::Unusable(format!(
                "{} has duration {} and size {}",
                reference.canonical_url(),
                metadata.formatted_duration(),
                metadata.resolution()
            ))
            .into());
        }

        let budget = self.timeouts.transcode_stage();
        let transcode = run_stage(
            "transcode",
            budget + STAGE_SLACK,
            self.transcoder
                .transcode_within(reference.canonical_url(), &metadata, target, budget),
        )
        .await??;

        info!(
            url = %url,
            platform = %reference.platform(),
            bytes = transcode.bytes,
            met_target = transcode.met_target,
            "Preview ready"
        );

        Ok(PreviewOutcome {
            reference,
            metadata,
            transcode,
        })
    }

    /// Resolve, probe, then sample `count` frames for their dominant color
    pub async fn sample_colors(&self, url: &str, count: usize) -> Result<ColorSample, PreviewError> {
        let (reference, metadata) = self.inspect(url).await?;
        let limit = self.timeouts.probe() * count.max(1) as u32 + STAGE_SLACK;
        run_stage(
            "sample",
            limit,
            self.sampler
                .sample(reference.canonical_url(), &metadata, count),
        )
        .await?
    }

    /// Remove an artifact the caller is done with
    pub async fn release(&self, artifact: &TempArtifact) -> Result<(), PreviewError> {
        self.scratch.delete(artifact).await.map_err(PreviewError::from)
    }
}

async fn run_stage<F: Future>(
    stage: &'static str,
    timeout: Duration,
    future: F,
) -> Result<F::Output, PreviewError> {
    tokio::time::timeout(timeout, future).await.map_err(|_| {
        warn!(stage, timeout_secs = timeout.as_secs(), "Stage timed out");
        PreviewError::StageTimeout { stage, timeout }
    })
}
