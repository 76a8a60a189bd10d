//! Snapshot persistence, decoupled from detection timing.
//!
//! Detections enqueue `SnapshotJob`s and fire a wake pulse; a dedicated
//! worker drains the whole queue on each wake and writes one JPEG per job
//! into a per-day directory derived from the job timestamp.
//!
//! A failed write is logged and dropped. There is no retry and no poison
//! queue: one bad job must never stall the consumer, and the loop always
//! re-arms on its wake pulse afterward. FIFO order holds within the queue;
//! nothing is promised across days.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::frame::Frame;
use crate::signal::Pulse;

/// Filename template for detection snapshots; `{}` receives the timestamp
/// fragment.
pub const SNAPSHOT_TEMPLATE: &str = "motion.{}.jpg";

// ----------------------------------------------------------------------------
// SnapshotJob
// ----------------------------------------------------------------------------

/// One queued unit of persistence work.
pub struct SnapshotJob {
    pub frame: Frame,
    pub template: String,
    pub taken_at: DateTime<Local>,
}

impl SnapshotJob {
    pub fn new(frame: Frame, template: &str) -> Self {
        Self {
            frame,
            template: template.to_string(),
            taken_at: Local::now(),
        }
    }

    /// Directory name for the day this snapshot was taken.
    fn day_dir(&self) -> String {
        self.taken_at.format("%Y%m%d").to_string()
    }

    /// `HHMMSS` plus tenths of a second, substituted into the template.
    fn file_name(&self) -> String {
        let tenths = self.taken_at.timestamp_subsec_millis() / 100;
        let stamp = format!("{}{}", self.taken_at.format("%H%M%S"), tenths);
        self.template.replacen("{}", &stamp, 1)
    }
}

// ----------------------------------------------------------------------------
// SnapshotQueue
// ----------------------------------------------------------------------------

/// Multi-producer FIFO queue with a separate, coalescing wake pulse.
///
/// Enqueue and wake are deliberately split: the wake may race with further
/// enqueues from other detections, which is safe because the worker drains
/// exhaustively per wake.
#[derive(Clone)]
pub struct SnapshotQueue {
    tx: Sender<SnapshotJob>,
    rx: Receiver<SnapshotJob>,
    wake: Pulse,
}

impl SnapshotQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            wake: Pulse::new(),
        }
    }

    pub fn enqueue(&self, job: SnapshotJob) {
        // both ends live in self, so the channel cannot be disconnected
        let _ = self.tx.send(job);
    }

    /// Wake the worker. Safe to call from any loop, any number of times.
    pub fn notify(&self) {
        self.wake.notify();
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    fn wait(&self) -> bool {
        self.wake.wait()
    }

    fn try_next(&self) -> Option<SnapshotJob> {
        self.rx.try_recv().ok()
    }
}

impl Default for SnapshotQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Worker
// ----------------------------------------------------------------------------

/// Write a single job under `photo_dir/<yyyymmdd>/`. Directory creation is
/// idempotent.
pub fn write_snapshot(photo_dir: &Path, job: SnapshotJob) -> Result<PathBuf> {
    let dir = photo_dir.join(job.day_dir());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating snapshot directory {}", dir.display()))?;
    let path = dir.join(job.file_name());
    let image = job.frame.into_rgb_image()?;
    image
        .save(&path)
        .with_context(|| format!("writing snapshot {}", path.display()))?;
    Ok(path)
}

/// Consumer loop: block on the wake pulse, then drain everything queued.
pub(crate) fn persist_loop(queue: SnapshotQueue, photo_dir: PathBuf, run: Arc<AtomicBool>) {
    log::debug!("persistence loop started, dir={}", photo_dir.display());
    while run.load(Ordering::SeqCst) {
        if !queue.wait() {
            break;
        }
        while run.load(Ordering::SeqCst) {
            let Some(job) = queue.try_next() else {
                break;
            };
            match write_snapshot(&photo_dir, job) {
                Ok(path) => log::debug!("snapshot written: {}", path.display()),
                Err(e) => log::warn!("snapshot dropped: {:#}", e),
            }
        }
    }
    log::debug!("persistence loop stopped");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
