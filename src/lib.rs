//! Motion Sentry
//!
//! Motion-triggered capture controller: a still-frame polling loop feeds a
//! three-frame differencing detector; a positive detection queues a snapshot
//! for background persistence and, when video capture is enabled, hands the
//! device over to a timed recording session that extends itself while motion
//! continues.
//!
//! # Architecture
//!
//! Three cooperating loops, supervised independently:
//!
//! 1. **Still loop**: polls `CaptureSource` for frames, ticks the detector,
//!    queues snapshots, initiates the video handoff. Gated by a
//!    level-triggered `Gate` so it parks while a recording is live.
//! 2. **Video loop** (when enabled): idle until the still loop hands it the
//!    `MotionDetector`, records with a self-extending window, hands back.
//! 3. **Persist loop** (when enabled): drains the snapshot queue to per-day
//!    directories on each wake pulse.
//!
//! Device ownership moves with the detector through the handoff channel, so
//! only one loop drives the source at any instant.
//!
//! # Module Structure
//!
//! - `frame`: pixel buffers and the greyscale/difference primitives
//! - `detect`: the three-frame AND-combined motion detector
//! - `signal`: `Gate` and `Pulse` wake primitives
//! - `persist`: snapshot jobs, queue, and the persistence loop
//! - `video`: the self-extending recording session and its loop
//! - `kernel`: `CaptureKernel`, loop supervision, stats
//! - `ingest`: the `CaptureSource` boundary plus stub and synthetic sources
//! - `config`: `CaptureConfig` and the daemon's file/env layering

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod kernel;
pub mod persist;
pub mod signal;
pub mod video;

pub use config::{CaptureConfig, SentrydConfig, SourceSettings};
pub use detect::MotionDetector;
pub use frame::{DiffFrame, Frame, GreyFrame};
pub use ingest::{shared, CaptureSource, SharedSource, StubSource, SyntheticSource};
pub use kernel::{CaptureKernel, CaptureStats};
pub use persist::{write_snapshot, SnapshotJob, SnapshotQueue, SNAPSHOT_TEMPLATE};
pub use video::VideoSession;
