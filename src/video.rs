//! Timed video recording.
//!
//! The video loop is idle until the still loop hands it the motion detector,
//! which doubles as the handoff of device ownership: exactly one loop holds
//! the detection window (and with it the capture device) at any instant.
//!
//! A recording session keeps a window of `record_window` open; every
//! positive tick while recording resets the window start to "now". The
//! window extends, it does not stack. When it expires with no intervening
//! motion the session stops the recording, returns the detector, and raises
//! the still gate so polling resumes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};

use crate::detect::MotionDetector;
use crate::kernel::{Backoff, LoopCtx};
use crate::signal::Gate;

/// Commands consumed by the video loop. Each message is consumed exactly
/// once (the handoff signal is edge-triggered).
pub(crate) enum VideoCmd {
    /// Device ownership transfer: the still loop has stopped its own
    /// acquisition and passes the detection window along.
    Handoff(MotionDetector),
    Shutdown,
}

// ----------------------------------------------------------------------------
// VideoSession
// ----------------------------------------------------------------------------

/// One Idle -> Recording -> Idle pass with a self-extending window.
pub struct VideoSession {
    window: Duration,
}

impl VideoSession {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Record until `window` elapses without motion, then stop.
    ///
    /// On error the recording may still be live; the supervising loop tears
    /// it down before retrying.
    pub(crate) fn record(
        &self,
        ctx: &LoopCtx,
        detector: &mut MotionDetector,
        run: &AtomicBool,
    ) -> Result<()> {
        ctx.device().start_video()?;
        log::info!("recording started, window {:?}", self.window);
        let mut window_start = Instant::now();
        while run.load(Ordering::SeqCst) && window_start.elapsed() < self.window {
            if ctx.observe(detector)? {
                window_start = Instant::now();
            }
        }
        ctx.device().stop_video()?;
        log::info!("recording stopped");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Video loop
// ----------------------------------------------------------------------------

pub(crate) fn video_loop(
    ctx: LoopCtx,
    session: VideoSession,
    video_dir: Option<PathBuf>,
    cmds: Receiver<VideoCmd>,
    resume: Sender<MotionDetector>,
    gate: Arc<Gate>,
    run: Arc<AtomicBool>,
) {
    let mut backoff = Backoff::new();
    'supervise: while run.load(Ordering::SeqCst) {
        if let Err(e) = ctx.device().prepare_video_capture(video_dir.as_deref()) {
            log::warn!("video prepare failed, retrying: {:#}", e);
            backoff.sleep();
            continue;
        }
        backoff.reset();
        while run.load(Ordering::SeqCst) {
            let mut detector = match cmds.recv() {
                Ok(VideoCmd::Handoff(detector)) => detector,
                Ok(VideoCmd::Shutdown) | Err(_) => break 'supervise,
            };
            let outcome = session.record(&ctx, &mut detector, &run);
            // the still loop regains the device whatever the outcome
            let _ = resume.send(detector);
            gate.raise();
            if let Err(e) = outcome {
                log::warn!("video session failed, re-preparing: {:#}", e);
                ctx.stop_video_best_effort();
                backoff.sleep();
                continue 'supervise;
            }
        }
    }
    // forced shutdown must not be blocked by a misbehaving collaborator
    ctx.stop_video_best_effort();
    log::debug!("video loop stopped");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
