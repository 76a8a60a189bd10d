//! sentryd - motion-triggered capture daemon
//!
//! This daemon:
//! 1. Loads configuration (JSON file addressed by `SENTRY_CONFIG`, then
//!    `SENTRY_*` environment overrides, then CLI flags)
//! 2. Starts the capture kernel over a synthetic frame source
//! 3. Logs health counters periodically
//! 4. Stops cleanly on Ctrl-C or when `--duration-secs` elapses

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use motion_sentry::{shared, CaptureKernel, SentrydConfig, SyntheticSource};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON config file (overrides SENTRY_CONFIG).
    #[arg(long)]
    config: Option<String>,
    /// Directory for motion snapshots.
    #[arg(long)]
    photo_dir: Option<PathBuf>,
    /// Directory for motion recordings.
    #[arg(long)]
    video_dir: Option<PathBuf>,
    /// Stop after this many seconds (runs until Ctrl-C when omitted).
    #[arg(long)]
    duration_secs: Option<u64>,
}

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Some(path) = &args.config {
        // SENTRY_CONFIG is the only file-path input SentrydConfig reads
        std::env::set_var("SENTRY_CONFIG", path);
    }

    let mut cfg = SentrydConfig::load()?;
    if let Some(dir) = args.photo_dir {
        cfg.capture.photo_dir = Some(dir);
    }
    if let Some(dir) = args.video_dir {
        cfg.capture.video_dir = Some(dir);
    }
    cfg.capture.validate()?;

    let source = SyntheticSource::new(cfg.source.width, cfg.source.height, cfg.source.target_fps);
    let mut kernel = CaptureKernel::new(cfg.capture.clone(), shared(source))?;
    let stats = kernel.stats();

    let run = Arc::new(AtomicBool::new(true));
    {
        let run = Arc::clone(&run);
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            run.store(false, Ordering::SeqCst);
        })?;
    }

    kernel.start_capturing()?;
    log::info!(
        "sentryd running. source {}x{}@{}fps, variance={}, threshold={}, window={:?}",
        cfg.source.width,
        cfg.source.height,
        cfg.source.target_fps,
        cfg.capture.variance,
        cfg.capture.threshold,
        cfg.capture.record_window
    );

    let started = Instant::now();
    let mut last_health_log = Instant::now();
    while run.load(Ordering::SeqCst) {
        if let Some(secs) = args.duration_secs {
            if started.elapsed() >= Duration::from_secs(secs) {
                break;
            }
        }
        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log::info!(
                "health: frames={} detections={} snapshots_queued={} queue_backlog={}",
                stats.frames_seen(),
                stats.detections(),
                stats.snapshots_queued(),
                kernel.snapshot_queue().len()
            );
            last_health_log = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    kernel.stop_capturing();
    log::info!(
        "sentryd stopped. frames={} detections={} snapshots_queued={}",
        stats.frames_seen(),
        stats.detections(),
        stats.snapshots_queued()
    );
    Ok(())
}
