//! Frame/recording sources.
//!
//! `CaptureSource` is the boundary to the physical device: graph
//! construction, codec work, and device enumeration all live behind it. The
//! kernel only ever asks it to prepare, start/stop one of the two capture
//! modes, and hand over the most recent frame.
//!
//! Two implementations ship with the crate:
//! - `StubSource`: scripted frames plus a call journal, for tests.
//! - `SyntheticSource`: procedural frames with periodic motion, so `sentryd`
//!   can demonstrate the full pipeline without a camera.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::frame::Frame;

pub mod stub;
pub mod synthetic;

pub use stub::{SourceCall, SourceJournal, StubSource};
pub use synthetic::SyntheticSource;

/// Contract of the frame/recording collaborator.
///
/// Starting one capture mode while the other runs implicitly stops the other
/// first; the kernel's handoff protocol nevertheless stops the old mode
/// explicitly before starting the new one, so a conforming source never
/// observes concurrent starts.
pub trait CaptureSource: Send {
    /// Idempotent setup for still capture. Fails fast on an invalid
    /// directory. `None` when snapshot saving is disabled.
    fn prepare_still_capture(&mut self, dir: Option<&Path>) -> Result<()>;

    /// Idempotent setup for video capture.
    fn prepare_video_capture(&mut self, dir: Option<&Path>) -> Result<()>;

    fn start_still(&mut self) -> Result<()>;
    fn stop_still(&mut self) -> Result<()>;

    fn start_video(&mut self) -> Result<()>;
    /// Stopping an already-stopped recording is a no-op.
    fn stop_video(&mut self) -> Result<()>;

    /// Non-blocking pull of the most recent frame since the last pull, or
    /// `None` if nothing arrived. The source's pacing is the pipeline's
    /// rate limiter.
    fn retrieve_frame(&mut self) -> Result<Option<Frame>>;
}

/// The source is shared between the still and video loops; the handoff
/// protocol guarantees only the loop holding device ownership touches it,
/// so the lock is uncontended in practice.
pub type SharedSource = Arc<Mutex<dyn CaptureSource>>;

pub fn shared<S: CaptureSource + 'static>(source: S) -> SharedSource {
    Arc::new(Mutex::new(source))
}
