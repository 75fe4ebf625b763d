// Adaptive GIF transcoder
//
// Encodes, measures the file on disk, and walks the parameter space down
// (frame rate, then scale, then duration) until the result fits the byte
// ceiling or the floor is reached. Only the best artifact survives a call.
// The search always has room to walk all the way to the floor; a time budget
// can cut it short, in which case the best artifact so far is returned.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::diagnostics::diagnose_engine_error;
use super::errors::EncodingError;
use super::models::{EncodeParams, EncodingTarget, TempArtifact, TranscodeOutcome, VideoMetadata};
use super::scratch::ScratchDir;
use super::utils::{run_output_with_timeout, stderr_tail, RunError};

/// Smallest frame-rate drop per round
pub const FPS_STEP: u32 = 2;
pub const FPS_FACTOR: f64 = 0.8;
pub const MIN_FPS: u32 = 8;
pub const SCALE_FACTOR: f64 = 0.75;
pub const MIN_WIDTH: u32 = 160;
pub const DURATION_FACTOR: f64 = 0.5;
pub const MIN_DURATION_SECONDS: f64 = 2.0;

/// Writes one encode of `input` to `output`
#[async_trait]
pub trait Encoder: Send + Sync {
    fn name(&self) -> &'static str;

    async fn encode(
        &self,
        input: &str,
        params: &EncodeParams,
        output: &Path,
    ) -> Result<(), EncodingError>;
}

/// Two-pass-in-one-graph palette GIF encode through ffmpeg
pub struct FfmpegGifEncoder {
    program: String,
    timeout: Duration,
}

impl FfmpegGifEncoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn filter_graph(params: &EncodeParams) -> String {
        format!(
            "fps={},scale={}:{}:flags=lanczos,split[s0][s1];\
             [s0]palettegen=max_colors=128:stats_mode=diff[p];\
             [s1][p]paletteuse=dither=bayer:bayer_scale=5",
            params.fps, params.width, params.height
        )
    }

    pub fn build_args(input: &str, params: &EncodeParams, output: &Path) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-t".into(),
            format!("{:.3}", params.duration_seconds).into(),
            "-i".into(),
            input.into(),
            "-vf".into(),
            Self::filter_graph(params).into(),
            "-an".into(),
            "-loop".into(),
            "0".into(),
            output.as_os_str().to_os_string(),
        ]
    }
}

#[async_trait]
impl Encoder for FfmpegGifEncoder {
    fn name(&self) -> &'static str {
        "ffmpeg-gif"
    }

    async fn encode(
        &self,
        input: &str,
        params: &EncodeParams,
        output: &Path,
    ) -> Result<(), EncodingError> {
        let args = Self::build_args(input, params, output);
        let result = run_output_with_timeout(&self.program, args, self.timeout)
            .await
            .map_err(|e| match e {
                RunError::Launch(msg) => EncodingError::Launch(msg),
                RunError::TimedOut(limit) => EncodingError::Timeout(limit),
                RunError::Io(msg) => EncodingError::Io(msg),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(EncodingError::Engine {
                reason: diagnose_engine_error(&stderr),
                stderr: stderr_tail(&result.stderr, 5),
            });
        }
        Ok(())
    }
}

/// Lowest values the search may reach for a given starting point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchFloor {
    pub fps: u32,
    pub width: u32,
    pub duration_seconds: f64,
}

impl SearchFloor {
    /// Floors never sit above the starting point
    pub fn for_start(start: &EncodeParams) -> Self {
        Self {
            fps: MIN_FPS.min(start.fps),
            width: MIN_WIDTH.min(start.width),
            duration_seconds: MIN_DURATION_SECONDS.min(start.duration_seconds),
        }
    }

    pub fn reached_by(&self, params: &EncodeParams) -> bool {
        params.fps <= self.fps
            && params.width <= self.width
            && params.duration_seconds <= self.duration_seconds
    }
}

/// Starting point: clip window capped by the target, source aspect fitted
/// into the target box without upscaling.
pub fn initial_params(metadata: &VideoMetadata, target: &EncodingTarget) -> EncodeParams {
    let duration_seconds = if metadata.duration_seconds.is_finite() && metadata.duration_seconds > 0.0 {
        metadata.duration_seconds.min(target.max_duration_seconds)
    } else {
        target.max_duration_seconds
    };

    let (width, height) = if metadata.width > 0 && metadata.height > 0 {
        let scale = (target.width as f64 / metadata.width as f64)
            .min(target.height as f64 / metadata.height as f64)
            .min(1.0);
        (
            even(metadata.width as f64 * scale),
            even(metadata.height as f64 * scale),
        )
    } else {
        (even(target.width as f64), even(target.height as f64))
    };

    EncodeParams {
        width,
        height,
        fps: target.fps.max(1),
        duration_seconds,
    }
}

/// One reduction step, or `None` once the floor is reached
pub fn next_params(params: &EncodeParams, floor: &SearchFloor) -> Option<EncodeParams> {
    if params.fps > floor.fps {
        let scaled = (params.fps as f64 * FPS_FACTOR).round() as u32;
        return Some(EncodeParams {
            fps: scaled
                .min(params.fps.saturating_sub(FPS_STEP))
                .max(floor.fps),
            ..*params
        });
    }

    if params.width > floor.width {
        let width = even(params.width as f64 * SCALE_FACTOR).max(floor.width);
        let height = even(params.height as f64 * width as f64 / params.width as f64);
        return Some(EncodeParams {
            width,
            height,
            ..*params
        });
    }

    if params.duration_seconds > floor.duration_seconds {
        return Some(EncodeParams {
            duration_seconds: (params.duration_seconds * DURATION_FACTOR)
                .max(floor.duration_seconds),
            ..*params
        });
    }

    None
}

/// Encodes needed to visit every point from `start` down to the floor
pub fn walk_length(start: &EncodeParams, floor: &SearchFloor) -> u32 {
    let mut params = *start;
    let mut length = 1;
    while let Some(next) = next_params(&params, floor) {
        params = next;
        length += 1;
    }
    length
}

/// Round to an even pixel count, at least 2 (yuv-friendly for the scaler)
fn even(value: f64) -> u32 {
    let rounded = value.round().max(2.0) as u32;
    (rounded - rounded % 2).max(2)
}

pub struct AdaptiveTranscoder {
    encoder: Arc<dyn Encoder>,
    scratch: Arc<ScratchDir>,
    max_rounds: Option<u32>,
}

impl AdaptiveTranscoder {
    pub fn new(encoder: Arc<dyn Encoder>, scratch: Arc<ScratchDir>) -> Self {
        Self {
            encoder,
            scratch,
            max_rounds: None,
        }
    }

    /// Cap the number of encodes below the full walk
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds.max(1));
        self
    }

    /// Produce the largest-quality GIF that fits `target.max_bytes`.
    ///
    /// `met_target == false` hands back the smallest artifact produced when
    /// the floor or the round limit is hit first. A timed-out encode counts
    /// as a round and the search moves on; any other engine failure ends the
    /// call with nothing left in scratch.
    pub async fn transcode(
        &self,
        url: &str,
        metadata: &VideoMetadata,
        target: &EncodingTarget,
    ) -> Result<TranscodeOutcome, EncodingError> {
        self.search(url, metadata, target, None).await
    }

    /// Same as `transcode`, but stops once `budget` has elapsed. An encode
    /// still running at that point is abandoned and the smallest finished
    /// artifact is returned with `met_target == false`.
    pub async fn transcode_within(
        &self,
        url: &str,
        metadata: &VideoMetadata,
        target: &EncodingTarget,
        budget: Duration,
    ) -> Result<TranscodeOutcome, EncodingError> {
        self.search(url, metadata, target, Some(budget)).await
    }

    async fn search(
        &self,
        url: &str,
        metadata: &VideoMetadata,
        target: &EncodingTarget,
        budget: Option<Duration>,
    ) -> Result<TranscodeOutcome, EncodingError> {
        let mut params = initial_params(metadata, target);
        let floor = SearchFloor::for_start(&params);
        let max_rounds = self
            .max_rounds
            .unwrap_or_else(|| walk_length(&params, &floor));
        let deadline = budget.map(|budget| Instant::now() + budget);
        let mut best: Option<(TempArtifact, u64, EncodeParams)> = None;
        let mut rounds = 0;
        let mut out_of_time = false;

        info!(
            encoder = self.encoder.name(),
            start = %params,
            max_bytes = target.max_bytes,
            max_rounds,
            "Starting adaptive transcode"
        );

        while rounds < max_rounds {
            rounds += 1;
            let artifact = match self.scratch.allocate("preview", "gif").await {
                Ok(artifact) => artifact,
                Err(e) => {
                    self.discard_best(&mut best).await;
                    return Err(e.into());
                }
            };

            let attempt = self.encoder.encode(url, &params, artifact.path());
            let result = match deadline {
                Some(deadline) => match timeout_at(deadline, attempt).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(round = rounds, params = %params, "Transcode budget spent, stopping search");
                        self.discard(&artifact).await;
                        out_of_time = true;
                        break;
                    }
                },
                None => attempt.await,
            };

            match result {
                Ok(()) => {
                    let Some(bytes) = self.scratch.size_of(&artifact).await else {
                        self.discard_best(&mut best).await;
                        return Err(EncodingError::Io(format!(
                            "Encoder reported success but wrote nothing at {}",
                            artifact.path().display()
                        )));
                    };
                    debug!(round = rounds, params = %params, bytes, "Encode finished");

                    if bytes <= target.max_bytes {
                        self.discard_best(&mut best).await;
                        info!(rounds, bytes, params = %params, "Preview fits target");
                        return Ok(TranscodeOutcome {
                            artifact,
                            bytes,
                            params,
                            rounds,
                            met_target: true,
                        });
                    }

                    match &best {
                        Some((_, best_bytes, _)) if *best_bytes <= bytes => {
                            self.discard(&artifact).await;
                        }
                        _ => {
                            self.discard_best(&mut best).await;
                            best = Some((artifact, bytes, params));
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(round = rounds, params = %params, error = %e, "Encode attempt timed out");
                    self.discard(&artifact).await;
                }
                Err(e) => {
                    if let EncodingError::Engine { reason, .. } = &e {
                        warn!(
                            round = rounds,
                            reason = reason.map(|r| r.description()),
                            permanent = reason.map(|r| r.is_permanent()),
                            "Encoder failed, abandoning transcode"
                        );
                    }
                    self.discard(&artifact).await;
                    self.discard_best(&mut best).await;
                    return Err(e);
                }
            }

            match next_params(&params, &floor) {
                Some(next) => params = next,
                None => break,
            }
        }

        match best {
            Some((artifact, bytes, params)) => {
                warn!(
                    rounds,
                    bytes,
                    max_bytes = target.max_bytes,
                    params = %params,
                    "Preview still exceeds target, returning smallest attempt"
                );
                Ok(TranscodeOutcome {
                    artifact,
                    bytes,
                    params,
                    rounds,
                    met_target: false,
                })
            }
            None => match budget {
                Some(budget) if out_of_time => Err(EncodingError::Timeout(budget)),
                _ => Err(EncodingError::ExhaustedRounds(rounds)),
            },
        }
    }

    async fn discard(&self, artifact: &TempArtifact) {
        if let Err(e) = self.scratch.delete(artifact).await {
            warn!(error = %e, "Failed to remove superseded artifact");
        }
    }

    async fn discard_best(&self, best: &mut Option<(TempArtifact, u64, EncodeParams)>) {
        if let Some((artifact, _, _)) = best.take() {
            self.discard(&artifact).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Writes `size(params)` bytes, so output size is monotone in every knob
    struct SyntheticEncoder {
        bytes_per_unit: f64,
        calls: Mutex<Vec<EncodeParams>>,
        timeout_first: usize,
        fail_with: Option<EncodingError>,
        delay: Duration,
    }

    impl SyntheticEncoder {
        fn new(bytes_per_unit: f64) -> Self {
            Self {
                bytes_per_unit,
                calls: Mutex::new(Vec::new()),
                timeout_first: 0,
                fail_with: None,
                delay: Duration::ZERO,
            }
        }

        fn size(&self, p: &EncodeParams) -> u64 {
            (p.width as f64 * p.height as f64 * p.fps as f64 * p.duration_seconds
                * self.bytes_per_unit) as u64
        }

        fn calls(&self) -> Vec<EncodeParams> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Encoder for SyntheticEncoder {
        fn name(&self) -> &'static str {
            "synthetic"
        }

        async fn encode(
            &self,
            _input: &str,
            params: &EncodeParams,
            output: &Path,
        ) -> Result<(), EncodingError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(*params);
                calls.len()
            };
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call <= self.timeout_first {
                return Err(EncodingError::Timeout(Duration::from_secs(120)));
            }
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            std::fs::write(output, vec![0u8; self.size(params) as usize])
                .map_err(|e| EncodingError::Io(e.to_string()))
        }
    }

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            duration_seconds: 60.0,
            width: 1920,
            height: 1080,
            codec: "h264".to_string(),
            container: "mp4".to_string(),
            bitrate: 0,
        }
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_initial_params_fit_aspect() {
        let params = initial_params(&metadata(), &EncodingTarget::default());
        assert_eq!((params.width, params.height), (480, 270));
        assert_eq!(params.fps, 12);
        assert_eq!(params.duration_seconds, 30.0);

        let portrait = VideoMetadata {
            width: 1080,
            height: 1920,
            duration_seconds: 8.0,
            ..metadata()
        };
        let params = initial_params(&portrait, &EncodingTarget::default());
        assert_eq!((params.width, params.height), (152, 270));
        assert_eq!(params.duration_seconds, 8.0);
    }

    #[test]
    fn test_initial_params_unknown_source() {
        let unknown = VideoMetadata {
            duration_seconds: 0.0,
            width: 0,
            height: 0,
            ..metadata()
        };
        let params = initial_params(&unknown, &EncodingTarget::default());
        assert_eq!((params.width, params.height), (480, 270));
        assert_eq!(params.duration_seconds, 30.0);
    }

    #[test]
    fn test_no_upscaling() {
        let small = VideoMetadata {
            width: 320,
            height: 240,
            ..metadata()
        };
        let params = initial_params(&small, &EncodingTarget::default());
        assert_eq!((params.width, params.height), (320, 240));
    }

    #[test]
    fn test_reduction_order_and_floor() {
        let start = initial_params(&metadata(), &EncodingTarget::default());
        let floor = SearchFloor::for_start(&start);

        let mut steps = vec![start];
        while let Some(next) = next_params(steps.last().unwrap(), &floor) {
            steps.push(next);
        }

        assert_eq!(steps[1].fps, 10);
        assert_eq!(steps[2].fps, 8);
        assert_eq!((steps[3].width, steps[3].height), (360, 202));
        assert!(steps[3].duration_seconds == 30.0);
        let last = steps.last().unwrap();
        assert!(floor.reached_by(last));
        assert_eq!(last.width, MIN_WIDTH);
        assert_eq!(last.duration_seconds, MIN_DURATION_SECONDS);
        assert_eq!(steps.len() as u32, walk_length(&start, &floor));
    }

    #[test]
    fn test_high_frame_rate_drops_geometrically() {
        let target = EncodingTarget::default().with_fps(30);
        let start = initial_params(&metadata(), &target);
        let floor = SearchFloor::for_start(&start);

        let mut fps = vec![start.fps];
        let mut params = start;
        while let Some(next) = next_params(&params, &floor) {
            if next.fps == params.fps {
                break;
            }
            fps.push(next.fps);
            params = next;
        }

        assert_eq!(fps, vec![30, 24, 19, 15, 12, 10, 8]);
    }

    #[test]
    fn test_args_have_palette_and_loop() {
        let params = EncodeParams {
            width: 480,
            height: 270,
            fps: 12,
            duration_seconds: 30.0,
        };
        let args = FfmpegGifEncoder::build_args("https://x/a.mp4", &params, Path::new("/tmp/o.gif"));
        let joined: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(joined.contains(&"-loop".to_string()));
        assert!(joined.iter().any(|a| a.contains("palettegen") && a.contains("scale=480:270")));
        assert_eq!(joined.last().unwrap(), "/tmp/o.gif");
    }

    #[tokio::test]
    async fn test_meets_target_after_reductions() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let encoder = Arc::new(SyntheticEncoder::new(0.01));
        let transcoder = AdaptiveTranscoder::new(encoder.clone(), scratch);

        // Start: 480*270*12*30*0.01 = 466_560 bytes; fits once below 200_000
        let target = EncodingTarget::default().with_max_bytes(200_000);
        let outcome = transcoder
            .transcode("https://x/a.mp4", &metadata(), &target)
            .await
            .unwrap();

        assert!(outcome.met_target);
        assert!(outcome.bytes <= 200_000);
        assert_eq!(outcome.rounds as usize, encoder.calls().len());
        assert!(outcome.rounds > 1);
        // Only the returned artifact is left behind
        assert_eq!(files_in(dir.path()), 1);
        assert!(outcome.artifact.path().exists());
    }

    #[tokio::test]
    async fn test_large_custom_target_walks_to_duration_floor() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let encoder = Arc::new(SyntheticEncoder::new(0.001));
        let transcoder = AdaptiveTranscoder::new(encoder.clone(), scratch);

        // Only 160x90@8fps for 2s (230 bytes) fits; 3.75s gives 432
        let target = EncodingTarget::default()
            .with_size(1920, 1080)
            .with_fps(30)
            .with_max_bytes(300);
        let start = initial_params(&metadata(), &target);
        let walk = walk_length(&start, &SearchFloor::for_start(&start));
        assert_eq!(walk, 20);

        let outcome = transcoder
            .transcode("https://x/a.mp4", &metadata(), &target)
            .await
            .unwrap();

        assert!(outcome.met_target);
        assert_eq!(outcome.bytes, 230);
        assert_eq!(outcome.params.width, MIN_WIDTH);
        assert_eq!(outcome.params.fps, MIN_FPS);
        assert_eq!(outcome.params.duration_seconds, MIN_DURATION_SECONDS);
        assert_eq!(outcome.rounds, walk);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_returns_best_so_far() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let mut synthetic = SyntheticEncoder::new(0.001);
        synthetic.delay = Duration::from_secs(100);
        let encoder = Arc::new(synthetic);
        let transcoder = AdaptiveTranscoder::new(encoder.clone(), scratch);

        // Nothing fits; three encodes finish before the budget runs out
        let target = EncodingTarget::default().with_max_bytes(1);
        let outcome = transcoder
            .transcode_within("https://x/a.mp4", &metadata(), &target, Duration::from_secs(350))
            .await
            .unwrap();

        assert!(!outcome.met_target);
        assert_eq!(encoder.calls().len(), 4);
        assert_eq!(outcome.params, encoder.calls()[2]);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_spent_before_any_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let mut synthetic = SyntheticEncoder::new(0.001);
        synthetic.delay = Duration::from_secs(100);
        let transcoder = AdaptiveTranscoder::new(Arc::new(synthetic), scratch);

        let result = transcoder
            .transcode_within(
                "https://x/a.mp4",
                &metadata(),
                &EncodingTarget::default(),
                Duration::from_secs(50),
            )
            .await;

        assert!(matches!(result, Err(EncodingError::Timeout(_))));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_first_round_fits() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let encoder = Arc::new(SyntheticEncoder::new(0.0001));
        let transcoder = AdaptiveTranscoder::new(encoder, scratch);

        let outcome = transcoder
            .transcode("https://x/a.mp4", &metadata(), &EncodingTarget::default())
            .await
            .unwrap();

        assert!(outcome.met_target);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.params.width, 480);
    }

    #[tokio::test]
    async fn test_unreachable_target_returns_smallest() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let encoder = Arc::new(SyntheticEncoder::new(0.05));
        let transcoder = AdaptiveTranscoder::new(encoder.clone(), scratch);

        // Floor is 160x90@8fps for 2s = 11_520 bytes
        let target = EncodingTarget::default().with_max_bytes(1_000);
        let outcome = transcoder
            .transcode("https://x/a.mp4", &metadata(), &target)
            .await
            .unwrap();

        assert!(!outcome.met_target);
        let smallest = encoder
            .calls()
            .iter()
            .map(|p| encoder.size(p))
            .min()
            .unwrap();
        assert_eq!(outcome.bytes, smallest);
        assert_eq!(outcome.params.width, MIN_WIDTH);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_round() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let mut synthetic = SyntheticEncoder::new(0.0001);
        synthetic.timeout_first = 1;
        let encoder = Arc::new(synthetic);
        let transcoder = AdaptiveTranscoder::new(encoder.clone(), scratch);

        let outcome = transcoder
            .transcode("https://x/a.mp4", &metadata(), &EncodingTarget::default())
            .await
            .unwrap();

        assert!(outcome.met_target);
        assert_eq!(outcome.rounds, 2);
        // Second attempt ran with reduced parameters
        assert_eq!(encoder.calls()[1].fps, 10);
        assert_eq!(files_in(dir.path()), 1);
    }

    #[tokio::test]
    async fn test_all_rounds_time_out() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let mut synthetic = SyntheticEncoder::new(0.0001);
        synthetic.timeout_first = usize::MAX;
        let transcoder = AdaptiveTranscoder::new(Arc::new(synthetic), scratch).with_max_rounds(3);

        let result = transcoder
            .transcode("https://x/a.mp4", &metadata(), &EncodingTarget::default())
            .await;

        assert!(matches!(result, Err(EncodingError::ExhaustedRounds(3))));
        assert_eq!(files_in(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_is_final() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::new(dir.path()));
        let mut synthetic = SyntheticEncoder::new(0.0001);
        synthetic.fail_with = Some(EncodingError::Engine {
            reason: None,
            stderr: "Invalid data found when processing input".to_string(),
        });
        let encoder = Arc::new(synthetic);
        let transcoder = AdaptiveTranscoder::new(encoder.clone(), scratch);

        let result = transcoder
            .transcode("https://x/a.mp4", &metadata(), &EncodingTarget::default())
            .await;

        assert!(matches!(result, Err(EncodingError::Engine { .. })));
        assert_eq!(encoder.calls().len(), 1);
        assert_eq!(files_in(dir.path()), 0);
    }
}
