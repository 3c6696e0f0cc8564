//! CLI entry point for the movie pipeline
//!
//! Parses command line arguments, loads the configuration and dispatches to
//! the processing or detection pipelines. Batch commands never abort on a
//! single bad item; single-file commands fail with a non-zero exit status.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use movie_pipeline::detect::{detect_directory, detect_file, write_sidecar, DetectorKind};
use movie_pipeline::{FfmpegToolkit, FolderRunner, MovieFileProcessor, StopFlag};
use movie_pipeline_config::Settings;

/// Movie pipeline - turns approved PVR recordings into finished media files
#[derive(Parser, Debug)]
#[command(name = "movie-pipeline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process one EDL file, or every pending EDL in a directory
    ProcessMovie {
        /// An EDL file or a directory of recordings
        path: PathBuf,

        /// EDL extension to scan for (use .pending_yml_<i> to re-claim
        /// leftovers of a crashed run)
        #[arg(long, default_value = ".yml")]
        custom_ext: String,
    },

    /// Detect candidate keep segments for one recording or a directory
    DetectSegments {
        /// A video file or a directory of recordings
        path: PathBuf,

        /// Detector to run (repeatable)
        #[arg(long, default_value = "auto")]
        detector: Vec<DetectorKind>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let settings = match Settings::load(&args.config) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            error!(config = %args.config.display(), error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let stop = StopFlag::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current operation");
                stop.request_stop();
            }
        });
    }

    let result = match args.command {
        Command::ProcessMovie { path, custom_ext } => {
            run_process_movie(&path, &custom_ext, settings, stop).await
        }
        Command::DetectSegments { path, detector } => {
            run_detect_segments(&path, &detector, settings, stop).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_process_movie(
    path: &Path,
    custom_ext: &str,
    settings: Arc<Settings>,
    stop: StopFlag,
) -> Result<()> {
    let toolkit = Arc::new(FfmpegToolkit::new(settings.transcode.hwaccel));

    if path.is_file() {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !file_name.ends_with(custom_ext) {
            bail!("{} is not a {} decision file", path.display(), custom_ext);
        }

        let mut processor = MovieFileProcessor::new(path, settings, toolkit, stop)
            .with_context(|| format!("Loading {}", path.display()))?;

        let mut last_decile = 0u32;
        processor.process_with_progress(&mut |progress| {
            let decile = (progress.total_percent * 10.0) as u32;
            if decile > last_decile {
                last_decile = decile;
                info!(
                    step = %progress.description,
                    "{:.0}%",
                    progress.total_percent * 100.0
                );
            }
        })?;
        Ok(())
    } else if path.is_dir() {
        let runner = FolderRunner::new(path, Some(custom_ext), settings, toolkit, stop);
        let monitor = spawn_progress_monitor(runner.progress());

        let outcomes = runner.process_directory().await;
        monitor.abort();

        let outcomes = outcomes?;
        for outcome in &outcomes {
            if outcome.fully_succeeded() {
                info!(
                    "Processed all *{} files ({} items)",
                    outcome.claim_ext,
                    outcome.processed.len()
                );
            } else {
                warn!(
                    "*{} finished with {} failures over {} items",
                    outcome.claim_ext,
                    outcome.failed.len(),
                    outcome.failed.len() + outcome.processed.len()
                );
            }
        }
        Ok(())
    } else {
        bail!("No such file or directory: {}", path.display());
    }
}

async fn run_detect_segments(
    path: &Path,
    detectors: &[DetectorKind],
    settings: Arc<Settings>,
    stop: StopFlag,
) -> Result<()> {
    if path.is_file() {
        let outcomes = tokio::task::block_in_place(|| {
            detect_file(path, detectors, &settings, &mut |_| {}, &stop)
        })
        .with_context(|| format!("Detection failed for {}", path.display()))?;

        match write_sidecar(path, &outcomes)? {
            Some(sidecar) => info!(sidecar = %sidecar.display(), "Wrote detection sidecar"),
            None => warn!("No detector produced segments"),
        }
        Ok(())
    } else if path.is_dir() {
        let roots = vec![path.to_path_buf()];
        let written = tokio::task::block_in_place(|| {
            detect_directory(&roots, detectors, &settings, &mut |_| {}, &stop)
        })?;
        info!("Detection complete for {} recordings", written.len());
        Ok(())
    } else {
        bail!("No such file or directory: {}", path.display());
    }
}

/// Periodically log the aggregate progress of a directory run.
fn spawn_progress_monitor(
    progress: movie_pipeline::SharedProgress,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        interval.tick().await; // immediate first tick carries no progress
        loop {
            interval.tick().await;
            let board = progress.read().await;
            info!("Overall progress: {:.0}%", board.overall_fraction() * 100.0);
        }
    })
}
