// clip-preview CLI - operator commands over the preview pipeline
//
// Every subcommand builds a pipeline from configuration and prints its
// result as JSON on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use clip_preview::logging::init_tracing;
use clip_preview::preview::tools::ToolManager;
use clip_preview::{EncodingTarget, PreviewConfig, PreviewPipeline};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Resolve content URLs and render size-capped animated previews.
#[derive(Parser, Debug)]
#[command(name = "clip-preview", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// JSON configuration file; CLIP_PREVIEW_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the canonical media URL for a content URL.
    Resolve { url: String },

    /// Resolve, then read duration, dimensions and codec.
    Probe { url: String },

    /// Render an animated preview that fits a byte ceiling.
    Preview {
        url: String,

        /// Use the premium byte ceiling (100 MiB instead of 25 MiB)
        #[arg(long)]
        premium: bool,

        /// Explicit byte ceiling, overrides --premium
        #[arg(long)]
        max_bytes: Option<u64>,

        /// Longest clip window in seconds
        #[arg(long)]
        max_duration: Option<f64>,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        #[arg(long)]
        fps: Option<u32>,
    },

    /// Sample frames and report their dominant color.
    Colors {
        url: String,

        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        /// Leave the extracted frames in the scratch directory
        #[arg(long)]
        keep: bool,
    },

    /// Remove stale artifacts from the scratch directory.
    Sweep {
        /// Override the configured maximum age
        #[arg(long)]
        max_age_secs: Option<u64>,

        /// Keep sweeping on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Report which media engines were found.
    Tools,
}

fn load_config(path: Option<&PathBuf>) -> Result<PreviewConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => PreviewConfig::from_json_file(path)?,
        None => PreviewConfig::default(),
    };
    Ok(config.from_env())
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_target(
    premium: bool,
    max_bytes: Option<u64>,
    max_duration: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
) -> EncodingTarget {
    let mut target = if premium {
        EncodingTarget::premium()
    } else {
        EncodingTarget::regular()
    };
    if let Some(bytes) = max_bytes {
        target = target.with_max_bytes(bytes);
    }
    if let Some(seconds) = max_duration {
        target = target.with_max_duration(seconds);
    }
    if width.is_some() || height.is_some() {
        target = target.with_size(width.unwrap_or(target.width), height.unwrap_or(target.height));
    }
    if let Some(fps) = fps {
        target = target.with_fps(fps);
    }
    target
}

async fn run(cli: Cli, config: PreviewConfig) -> CliResult {
    match cli.command {
        Command::Tools => {
            print_json(&ToolManager::detect_all(config.engines.clone()).await?)
        }
        Command::Sweep {
            max_age_secs,
            watch: true,
        } => {
            let pipeline = PreviewPipeline::from_config(&config).await?;
            let mut scratch = (**pipeline.scratch()).clone();
            if let Some(secs) = max_age_secs {
                scratch = scratch.with_max_age(Duration::from_secs(secs));
            }
            let interval = Duration::from_secs(config.scratch.sweep_interval_secs.max(1));
            info!(root = %scratch.root().display(), interval_secs = interval.as_secs(), "Watching scratch directory");
            let handle = Arc::new(scratch).spawn_sweeper(interval);
            tokio::signal::ctrl_c().await?;
            handle.abort();
            Ok(())
        }
        Command::Sweep {
            max_age_secs,
            watch: false,
        } => {
            let pipeline = PreviewPipeline::from_config(&config).await?;
            let scratch = pipeline.scratch();
            let removed = match max_age_secs {
                Some(secs) => scratch.sweep_older_than(Duration::from_secs(secs)).await?,
                None => scratch.sweep().await?,
            };
            print_json(&serde_json::json!({
                "root": scratch.root(),
                "removed": removed,
            }))
        }
        Command::Resolve { url } => {
            let pipeline = PreviewPipeline::from_config(&config).await?;
            print_json(&pipeline.resolve(&url).await)
        }
        Command::Probe { url } => {
            let pipeline = PreviewPipeline::from_config(&config).await?;
            let (reference, metadata) = pipeline.inspect(&url).await?;
            print_json(&serde_json::json!({
                "reference": reference,
                "metadata": metadata,
            }))
        }
        Command::Preview {
            url,
            premium,
            max_bytes,
            max_duration,
            width,
            height,
            fps,
        } => {
            let pipeline = PreviewPipeline::from_config(&config).await?;
            let target = build_target(premium, max_bytes, max_duration, width, height, fps);
            let outcome = pipeline.render_preview(&url, &target).await?;
            print_json(&outcome)
        }
        Command::Colors { url, count, keep } => {
            let pipeline = PreviewPipeline::from_config(&config).await?;
            let sample = pipeline.sample_colors(&url, count).await?;
            let frames = if keep { Some(&sample.frames) } else { None };
            print_json(&serde_json::json!({
                "dominant": sample.dominant.to_hex(),
                "timestamps": sample.timestamps,
                "frames": frames,
            }))?;
            if !keep {
                for frame in &sample.frames {
                    pipeline.release(frame).await?;
                }
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("clip-preview: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("clip-preview: {}", e);
        return ExitCode::from(2);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
