//! The capture orchestrator.
//!
//! `CaptureKernel` owns the lifecycle of three loops:
//!
//! - **still**: polls the source for frames and runs the motion detector on
//!   every cycle, gated by a level-triggered `Gate`;
//! - **video** (optional): waits for an edge-triggered handoff carrying the
//!   detector, records with a self-extending window, hands back;
//! - **persist** (optional): drains the snapshot queue on each wake pulse.
//!
//! Device ownership is exchanged between the still and video loops by moving
//! the `MotionDetector` itself through the handoff channel: the loop holding
//! the detector holds the device, so concurrent capture starts are
//! unrepresentable.
//!
//! All runtime errors stay inside their loop. Each loop body runs under a
//! supervising retry with bounded backoff; nothing crashes the process, and
//! the only error the caller can see is a configuration error at
//! construction.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::config::CaptureConfig;
use crate::detect::MotionDetector;
use crate::ingest::{CaptureSource, SharedSource};
use crate::persist::{persist_loop, SnapshotJob, SnapshotQueue, SNAPSHOT_TEMPLATE};
use crate::signal::Gate;
use crate::video::{video_loop, VideoCmd, VideoSession};

/// How long `stop_capturing` waits for each loop before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

const BACKOFF_START: Duration = Duration::from_millis(100);
const BACKOFF_MAX: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Supervision backoff
// ----------------------------------------------------------------------------

/// Bounded exponential backoff for loop supervision: transient collaborator
/// failures are logged and retried instead of silently swallowed.
pub(crate) struct Backoff {
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new() -> Self {
        Self {
            delay: BACKOFF_START,
        }
    }

    pub(crate) fn sleep(&mut self) {
        std::thread::sleep(self.delay);
        self.delay = (self.delay * 2).min(BACKOFF_MAX);
    }

    pub(crate) fn reset(&mut self) {
        self.delay = BACKOFF_START;
    }
}

// ----------------------------------------------------------------------------
// Stats
// ----------------------------------------------------------------------------

/// Health counters for periodic logging by the daemon.
#[derive(Default)]
pub struct CaptureStats {
    frames_seen: AtomicU64,
    detections: AtomicU64,
    snapshots_queued: AtomicU64,
}

impl CaptureStats {
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen.load(Ordering::Relaxed)
    }

    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    pub fn snapshots_queued(&self) -> u64 {
        self.snapshots_queued.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Shared loop context
// ----------------------------------------------------------------------------

/// Everything a capture loop needs per tick. Cheap to clone; one per loop.
#[derive(Clone)]
pub(crate) struct LoopCtx {
    pub(crate) source: SharedSource,
    /// `None` when snapshot saving is disabled.
    pub(crate) queue: Option<SnapshotQueue>,
    pub(crate) stats: Arc<CaptureStats>,
}

impl LoopCtx {
    pub(crate) fn device(&self) -> MutexGuard<'_, dyn CaptureSource + 'static> {
        self.source.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One detection cycle: pull a frame, tick the detector, queue a
    /// snapshot on a positive result. Shared by the still and video loops.
    pub(crate) fn observe(&self, detector: &mut MotionDetector) -> Result<bool> {
        let frame = self.device().retrieve_frame()?;
        if frame.is_some() {
            self.stats.frames_seen.fetch_add(1, Ordering::Relaxed);
        }
        let motion = detector.tick(frame.as_ref());
        if !motion {
            return Ok(false);
        }
        self.stats.detections.fetch_add(1, Ordering::Relaxed);
        log::info!("motion detected");
        if let (Some(queue), Some(frame)) = (&self.queue, frame) {
            queue.enqueue(SnapshotJob::new(frame, SNAPSHOT_TEMPLATE));
            queue.notify();
            self.stats.snapshots_queued.fetch_add(1, Ordering::Relaxed);
        }
        Ok(true)
    }

    pub(crate) fn stop_video_best_effort(&self) {
        if let Err(e) = self.device().stop_video() {
            log::debug!("stop_video during shutdown failed: {:#}", e);
        }
    }
}

// ----------------------------------------------------------------------------
// Still loop
// ----------------------------------------------------------------------------

struct StillLoop {
    ctx: LoopCtx,
    photo_dir: Option<PathBuf>,
    save_video: bool,
    gate: Arc<Gate>,
    handoff: Sender<VideoCmd>,
    resume: Receiver<MotionDetector>,
    run: Arc<AtomicBool>,
    /// `None` while the video session holds the detection window.
    detector: Option<MotionDetector>,
}

impl StillLoop {
    fn run(mut self) {
        let mut backoff = Backoff::new();
        while self.run.load(Ordering::SeqCst) {
            if let Err(e) = self.poll_pass(&mut backoff) {
                log::warn!("still loop error, retrying: {:#}", e);
                backoff.sleep();
            }
        }
        log::debug!("still loop stopped");
    }

    /// One supervised pass: prepare, then poll until error or shutdown.
    fn poll_pass(&mut self, backoff: &mut Backoff) -> Result<()> {
        self.ctx
            .device()
            .prepare_still_capture(self.photo_dir.as_deref())?;
        backoff.reset();
        while self.run.load(Ordering::SeqCst) {
            self.gate.wait();
            if !self.run.load(Ordering::SeqCst) {
                return Ok(());
            }
            if self.detector.is_none() {
                // the video session hands the window state back right
                // before raising the gate; a timeout here means shutdown
                match self.resume.recv_timeout(Duration::from_millis(100)) {
                    Ok(detector) => self.detector = Some(detector),
                    Err(_) => continue,
                }
            }
            self.ctx.device().start_still()?;
            let Some(detector) = self.detector.as_mut() else {
                continue;
            };
            let motion = self.ctx.observe(detector)?;
            if motion && self.save_video {
                // full handoff: stop our own acquisition before the video
                // loop may start its, and pause until it hands back
                self.ctx.device().stop_still()?;
                self.gate.lower();
                if let Some(detector) = self.detector.take() {
                    if let Err(e) = self.handoff.send(VideoCmd::Handoff(detector)) {
                        // video loop is gone; reclaim and resume polling
                        if let VideoCmd::Handoff(detector) = e.0 {
                            self.detector = Some(detector);
                        }
                        self.gate.raise();
                    }
                }
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// CaptureKernel
// ----------------------------------------------------------------------------

struct LoopHandle {
    name: &'static str,
    handle: JoinHandle<()>,
    /// Disconnects when the loop returns; used for the bounded-grace join.
    done: Receiver<()>,
}

pub struct CaptureKernel {
    cfg: CaptureConfig,
    source: SharedSource,
    queue: SnapshotQueue,
    stats: Arc<CaptureStats>,
    gate: Arc<Gate>,
    run_still: Arc<AtomicBool>,
    run_video: Arc<AtomicBool>,
    run_persist: Arc<AtomicBool>,
    handoff_tx: Option<Sender<VideoCmd>>,
    loops: Vec<LoopHandle>,
    started: bool,
}

impl CaptureKernel {
    /// Validates the configuration; an invalid one is a fatal construction
    /// error, never a runtime condition.
    pub fn new(cfg: CaptureConfig, source: SharedSource) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            source,
            queue: SnapshotQueue::new(),
            stats: Arc::new(CaptureStats::default()),
            gate: Arc::new(Gate::new()),
            run_still: Arc::new(AtomicBool::new(false)),
            run_video: Arc::new(AtomicBool::new(false)),
            run_persist: Arc::new(AtomicBool::new(false)),
            handoff_tx: None,
            loops: Vec::new(),
            started: false,
        })
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    pub fn snapshot_queue(&self) -> &SnapshotQueue {
        &self.queue
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.cfg
    }

    /// Start the capture session. Workers are started before the still loop
    /// so a handoff or a snapshot always finds a ready consumer.
    pub fn start_capturing(&mut self) -> Result<()> {
        if self.started {
            return Err(anyhow!("capture session already running"));
        }
        self.started = true;

        let ctx = LoopCtx {
            source: Arc::clone(&self.source),
            queue: self.cfg.save_photo.then(|| self.queue.clone()),
            stats: Arc::clone(&self.stats),
        };

        if self.cfg.save_photo {
            let photo_dir = self
                .cfg
                .photo_dir
                .clone()
                .ok_or_else(|| anyhow!("photo_dir missing"))?;
            self.run_persist.store(true, Ordering::SeqCst);
            let queue = self.queue.clone();
            let run = Arc::clone(&self.run_persist);
            self.spawn_loop("persist", move || persist_loop(queue, photo_dir, run))?;
        }

        let (handoff_tx, handoff_rx) = unbounded();
        let (resume_tx, resume_rx) = bounded(1);
        self.handoff_tx = Some(handoff_tx.clone());

        if self.cfg.save_video {
            self.run_video.store(true, Ordering::SeqCst);
            let session = VideoSession::new(self.cfg.record_window);
            let video_dir = self.cfg.video_dir.clone();
            let video_ctx = ctx.clone();
            let gate = Arc::clone(&self.gate);
            let run = Arc::clone(&self.run_video);
            self.spawn_loop("video", move || {
                video_loop(video_ctx, session, video_dir, handoff_rx, resume_tx, gate, run)
            })?;
        }

        self.gate.raise();
        self.run_still.store(true, Ordering::SeqCst);
        let still = StillLoop {
            ctx,
            photo_dir: self.cfg.photo_dir.clone(),
            save_video: self.cfg.save_video,
            gate: Arc::clone(&self.gate),
            handoff: handoff_tx,
            resume: resume_rx,
            run: Arc::clone(&self.run_still),
            detector: Some(MotionDetector::new(self.cfg.variance, self.cfg.threshold)),
        };
        self.spawn_loop("still", move || still.run())?;

        log::info!(
            "capture started (photo={}, video={})",
            self.cfg.save_photo,
            self.cfg.save_video
        );
        Ok(())
    }

    /// Cooperative shutdown: lower every run flag, raise every wait signal
    /// once, then wait a bounded grace period per loop. A loop stuck inside
    /// a long collaborator call is abandoned, not forced.
    pub fn stop_capturing(&mut self) {
        if !self.started {
            return;
        }
        self.run_still.store(false, Ordering::SeqCst);
        self.run_video.store(false, Ordering::SeqCst);
        self.run_persist.store(false, Ordering::SeqCst);

        self.gate.raise();
        if let Some(tx) = self.handoff_tx.take() {
            let _ = tx.send(VideoCmd::Shutdown);
        }
        self.queue.notify();

        for lp in self.loops.drain(..) {
            match lp.done.recv_timeout(SHUTDOWN_GRACE) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = lp.handle.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "{} loop did not stop within {:?}, abandoning",
                        lp.name,
                        SHUTDOWN_GRACE
                    );
                }
            }
        }
        self.started = false;
        log::info!("capture stopped");
    }

    fn spawn_loop(
        &mut self,
        name: &'static str,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let (done_tx, done_rx) = bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // dropped when the loop returns, disconnecting `done`
                let _done = done_tx;
                body();
            })?;
        self.loops.push(LoopHandle {
            name,
            handle,
            done: done_rx,
        });
        Ok(())
    }
}

impl Drop for CaptureKernel {
    fn drop(&mut self) {
        self.stop_capturing();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::ingest::{shared, SourceCall, StubSource};

    const W: u32 = 64;
    const H: u32 = 48;

    fn flat() -> Frame {
        Frame::solid(W, H, [80, 80, 80])
    }

    fn patch() -> Frame {
        let mut f = flat();
        f.fill_rect(0, 0, 20, 20, [255, 255, 255]);
        f
    }

    /// flat warm-up, one transient patch, then quiet: exactly one detection.
    fn one_detection_script() -> Vec<Option<Frame>> {
        vec![
            Some(flat()),
            Some(flat()),
            Some(flat()),
            Some(flat()),
            Some(patch()),
            Some(flat()),
            Some(flat()),
        ]
    }

    fn photo_config(dir: &std::path::Path) -> CaptureConfig {
        CaptureConfig {
            variance: 25,
            threshold: 100,
            record_window: Duration::from_millis(180_000),
            save_photo: true,
            save_video: false,
            photo_dir: Some(dir.to_path_buf()),
            video_dir: None,
        }
    }

    #[test]
    fn observe_queues_one_snapshot_per_detection() {
        let source = StubSource::scripted(one_detection_script())
            .with_frame_delay(Duration::ZERO);
        let queue = SnapshotQueue::new();
        let ctx = LoopCtx {
            source: shared(source),
            queue: Some(queue.clone()),
            stats: Arc::new(CaptureStats::default()),
        };
        let mut detector = MotionDetector::new(25, 100);
        let mut detections = 0;
        for _ in 0..10 {
            if ctx.observe(&mut detector).unwrap() {
                detections += 1;
            }
        }
        assert_eq!(detections, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(ctx.stats.detections(), 1);
        assert_eq!(ctx.stats.snapshots_queued(), 1);
    }

    #[test]
    fn starvation_ticks_do_not_count_frames() {
        let source = StubSource::scripted(vec![None, None, Some(flat())])
            .with_frame_delay(Duration::ZERO);
        let ctx = LoopCtx {
            source: shared(source),
            queue: None,
            stats: Arc::new(CaptureStats::default()),
        };
        let mut detector = MotionDetector::new(25, 100);
        for _ in 0..3 {
            let _ = ctx.observe(&mut detector).unwrap();
        }
        assert_eq!(ctx.stats.frames_seen(), 1);
    }

    #[test]
    fn rejects_invalid_config_at_construction() {
        let source = shared(StubSource::scripted(vec![]));
        let mut cfg = photo_config(std::path::Path::new("x"));
        cfg.threshold = 0;
        assert!(CaptureKernel::new(cfg, source).is_err());
    }

    #[test]
    fn double_start_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = shared(StubSource::scripted(vec![]));
        let mut kernel = CaptureKernel::new(photo_config(dir.path()), source).unwrap();
        kernel.start_capturing().unwrap();
        assert!(kernel.start_capturing().is_err());
        kernel.stop_capturing();
    }

    #[test]
    fn still_loop_retries_failed_prepare() {
        let dir = tempfile::tempdir().unwrap();
        let source = StubSource::scripted(vec![]).failing_prepares(2);
        let journal = source.journal();
        let mut kernel = CaptureKernel::new(photo_config(dir.path()), shared(source)).unwrap();
        kernel.start_capturing().unwrap();
        // two injected failures back off 100ms + 200ms before succeeding
        std::thread::sleep(Duration::from_millis(700));
        kernel.stop_capturing();
        assert_eq!(journal.count(SourceCall::PrepareStill), 1);
        assert!(journal.count(SourceCall::StartStill) >= 1);
    }

    #[test]
    fn stop_is_idempotent_and_unblocks_all_loops() {
        let dir = tempfile::tempdir().unwrap();
        let video_dir = tempfile::tempdir().unwrap();
        let mut cfg = photo_config(dir.path());
        cfg.save_video = true;
        cfg.video_dir = Some(video_dir.path().to_path_buf());
        let source = shared(StubSource::scripted(vec![]));
        let mut kernel = CaptureKernel::new(cfg, source).unwrap();
        kernel.start_capturing().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        kernel.stop_capturing();
        kernel.stop_capturing();
    }
}
