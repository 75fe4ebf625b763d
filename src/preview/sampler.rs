// Frame sampler - still frames and their dominant color
//
// Frames are written to the scratch directory by ffmpeg, then decoded and
// bucketed off the async runtime.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tracing::{debug, warn};

use super::diagnostics::diagnose_engine_error;
use super::errors::PreviewError;
use super::models::{ColorSample, Rgb, TempArtifact, VideoMetadata};
use super::scratch::ScratchDir;
use super::utils::{run_output_with_timeout, stderr_tail};

/// Bits kept per channel when bucketing colors
const QUANT_BITS: u32 = 4;
/// Frames are shrunk to fit this box before counting
const ANALYSIS_EDGE: u32 = 96;

pub struct FrameSampler {
    program: String,
    scratch: Arc<ScratchDir>,
    timeout: Duration,
}

impl FrameSampler {
    pub fn new(program: impl Into<String>, scratch: Arc<ScratchDir>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            scratch,
            timeout,
        }
    }

    pub fn build_args(url: &str, timestamp: f64, output: &Path) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-ss".into(),
            format!("{:.3}", timestamp.max(0.0)).into(),
            "-i".into(),
            url.into(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            "scale=320:-2".into(),
            output.as_os_str().to_os_string(),
        ]
    }

    /// Write the frame at `timestamp` to a scratch PNG
    pub async fn extract_frame(&self, url: &str, timestamp: f64) -> Result<TempArtifact, PreviewError> {
        let artifact = self.scratch.allocate("frame", "png").await?;
        let args = Self::build_args(url, timestamp, artifact.path());

        let output = match run_output_with_timeout(&self.program, args, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                self.discard(&artifact).await;
                return Err(PreviewError::Sampling(format!(
                    "Frame extraction at {:.2}s failed: {}",
                    timestamp, e
                )));
            }
        };

        if !output.status.success() || !self.scratch.exists(&artifact).await {
            self.discard(&artifact).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PreviewError::Sampling(format!(
                "ffmpeg produced no frame at {:.2}s ({:?}): {}",
                timestamp,
                diagnose_engine_error(&stderr),
                stderr_tail(&output.stderr, 3)
            )));
        }

        debug!(timestamp, path = %artifact.path().display(), "Extracted frame");
        Ok(artifact)
    }

    /// Extract several frames. On failure, frames already written are removed.
    pub async fn extract_frames(
        &self,
        url: &str,
        timestamps: &[f64],
    ) -> Result<Vec<TempArtifact>, PreviewError> {
        let mut frames = Vec::with_capacity(timestamps.len());
        for &timestamp in timestamps {
            match self.extract_frame(url, timestamp).await {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    for frame in &frames {
                        self.discard(frame).await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(frames)
    }

    /// Evenly spaced frames plus the dominant color across all of them
    pub async fn sample(
        &self,
        url: &str,
        metadata: &VideoMetadata,
        count: usize,
    ) -> Result<ColorSample, PreviewError> {
        let timestamps = sample_timestamps(metadata.duration_seconds, count);
        let frames = self.extract_frames(url, &timestamps).await?;

        let paths: Vec<PathBuf> = frames.iter().map(|f| f.path().to_path_buf()).collect();
        let analysis = tokio::task::spawn_blocking(move || dominant_color_of_files(&paths)).await;

        let dominant = match analysis {
            Ok(Ok(Some(color))) => color,
            Ok(Ok(None)) => {
                self.discard_all(&frames).await;
                return Err(PreviewError::Sampling("Frames have no opaque pixels".to_string()));
            }
            Ok(Err(message)) => {
                self.discard_all(&frames).await;
                return Err(PreviewError::Sampling(message));
            }
            Err(e) => {
                self.discard_all(&frames).await;
                return Err(PreviewError::Sampling(format!("Color analysis task failed: {}", e)));
            }
        };

        Ok(ColorSample {
            timestamps,
            frames,
            dominant,
        })
    }

    async fn discard(&self, artifact: &TempArtifact) {
        if let Err(e) = self.scratch.delete(artifact).await {
            warn!(error = %e, "Failed to remove frame");
        }
    }

    async fn discard_all(&self, artifacts: &[TempArtifact]) {
        for artifact in artifacts {
            self.discard(artifact).await;
        }
    }
}

/// `count` timestamps splitting the clip into equal parts, endpoints excluded
pub fn sample_timestamps(duration_seconds: f64, count: usize) -> Vec<f64> {
    if !(duration_seconds.is_finite() && duration_seconds > 0.0) || count == 0 {
        return vec![0.0];
    }
    let step = duration_seconds / (count as f64 + 1.0);
    (1..=count).map(|i| step * i as f64).collect()
}

/// Histogram over quantised colors; transparent pixels are skipped
#[derive(Debug, Clone)]
pub struct ColorHistogram {
    counts: Vec<u32>,
    sums: Vec<[u64; 3]>,
}

impl Default for ColorHistogram {
    fn default() -> Self {
        let buckets = 1usize << (QUANT_BITS * 3);
        Self {
            counts: vec![0; buckets],
            sums: vec![[0; 3]; buckets],
        }
    }
}

impl ColorHistogram {
    pub fn add_image(&mut self, image: &DynamicImage) {
        let small = if image.width() > ANALYSIS_EDGE || image.height() > ANALYSIS_EDGE {
            image.thumbnail(ANALYSIS_EDGE, ANALYSIS_EDGE)
        } else {
            image.clone()
        };

        for pixel in small.to_rgba8().pixels() {
            let [r, g, b, a] = pixel.0;
            if a == 0 {
                continue;
            }
            let shift = 8 - QUANT_BITS;
            let index = ((r as usize >> shift) << (QUANT_BITS * 2))
                | ((g as usize >> shift) << QUANT_BITS)
                | (b as usize >> shift);
            self.counts[index] += 1;
            self.sums[index][0] += r as u64;
            self.sums[index][1] += g as u64;
            self.sums[index][2] += b as u64;
        }
    }

    /// Mean color of the most populated bucket; ties go to the lower bucket
    pub fn dominant(&self) -> Option<Rgb> {
        let (index, count) = self
            .counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .fold(None, |best: Option<(usize, u32)>, (i, &c)| match best {
                Some((_, best_count)) if best_count >= c => best,
                _ => Some((i, c)),
            })?;

        let [r, g, b] = self.sums[index];
        let n = count as u64;
        Some(Rgb::new((r / n) as u8, (g / n) as u8, (b / n) as u8))
    }
}

/// Dominant color of a single image
pub fn dominant_color(image: &DynamicImage) -> Option<Rgb> {
    let mut histogram = ColorHistogram::default();
    histogram.add_image(image);
    histogram.dominant()
}

fn dominant_color_of_files(paths: &[PathBuf]) -> Result<Option<Rgb>, String> {
    let mut histogram = ColorHistogram::default();
    for path in paths {
        let image = image::open(path)
            .map_err(|e| format!("Failed to decode {}: {}", path.display(), e))?;
        histogram.add_image(&image);
    }
    Ok(histogram.dominant())
}
