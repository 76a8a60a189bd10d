//! Scripted capture source for tests.
//!
//! `StubSource` replays a prepared frame script and journals every
//! collaborator call, so tests can assert ordering properties (a `StartVideo`
//! must never land while still capture is active) without a device.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::ingest::CaptureSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceCall {
    PrepareStill,
    PrepareVideo,
    StartStill,
    StopStill,
    StartVideo,
    StopVideo,
}

/// Shared view of the calls a `StubSource` has received.
#[derive(Clone, Default)]
pub struct SourceJournal {
    inner: Arc<Mutex<JournalState>>,
}

#[derive(Default)]
struct JournalState {
    calls: Vec<SourceCall>,
    /// Times a start call arrived while the opposite mode was active.
    overlap_violations: u32,
}

impl SourceJournal {
    pub fn calls(&self) -> Vec<SourceCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, call: SourceCall) -> usize {
        self.lock().calls.iter().filter(|&&c| c == call).count()
    }

    pub fn overlap_violations(&self) -> u32 {
        self.lock().overlap_violations
    }

    fn record(&self, call: SourceCall) {
        self.lock().calls.push(call);
    }

    fn record_violation(&self) {
        self.lock().overlap_violations += 1;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JournalState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct StubSource {
    frames: VecDeque<Option<Frame>>,
    journal: SourceJournal,
    /// Simulated acquisition latency per `retrieve_frame` call.
    frame_delay: Duration,
    /// Remaining `prepare_still_capture` calls to fail, for retry tests.
    fail_prepares: u32,
    still_active: bool,
    video_active: bool,
}

impl StubSource {
    /// `frames` are replayed in order; `None` entries simulate source
    /// starvation. After the script runs out every pull is starvation.
    pub fn scripted(frames: Vec<Option<Frame>>) -> Self {
        Self {
            frames: frames.into(),
            journal: SourceJournal::default(),
            frame_delay: Duration::from_millis(5),
            fail_prepares: 0,
            still_active: false,
            video_active: false,
        }
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn failing_prepares(mut self, count: u32) -> Self {
        self.fail_prepares = count;
        self
    }

    /// Handle to the call journal; clone before moving the source into the
    /// kernel.
    pub fn journal(&self) -> SourceJournal {
        self.journal.clone()
    }
}

impl CaptureSource for StubSource {
    fn prepare_still_capture(&mut self, _dir: Option<&Path>) -> Result<()> {
        if self.fail_prepares > 0 {
            self.fail_prepares -= 1;
            return Err(anyhow!("stub: prepare failure injected"));
        }
        self.journal.record(SourceCall::PrepareStill);
        Ok(())
    }

    fn prepare_video_capture(&mut self, _dir: Option<&Path>) -> Result<()> {
        self.journal.record(SourceCall::PrepareVideo);
        Ok(())
    }

    fn start_still(&mut self) -> Result<()> {
        if self.video_active {
            self.journal.record_violation();
            self.video_active = false;
        }
        if !self.still_active {
            self.still_active = true;
            self.journal.record(SourceCall::StartStill);
        }
        Ok(())
    }

    fn stop_still(&mut self) -> Result<()> {
        if self.still_active {
            self.still_active = false;
            self.journal.record(SourceCall::StopStill);
        }
        Ok(())
    }

    fn start_video(&mut self) -> Result<()> {
        if self.still_active {
            self.journal.record_violation();
            self.still_active = false;
        }
        if !self.video_active {
            self.video_active = true;
            self.journal.record(SourceCall::StartVideo);
        }
        Ok(())
    }

    fn stop_video(&mut self) -> Result<()> {
        if self.video_active {
            self.video_active = false;
            self.journal.record(SourceCall::StopVideo);
        }
        Ok(())
    }

    fn retrieve_frame(&mut self) -> Result<Option<Frame>> {
        std::thread::sleep(self.frame_delay);
        Ok(self.frames.pop_front().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_replays_in_order_then_starves() {
        let a = Frame::solid(2, 2, [1, 1, 1]);
        let b = Frame::solid(2, 2, [2, 2, 2]);
        let mut source =
            StubSource::scripted(vec![Some(a.clone()), None, Some(b.clone())])
                .with_frame_delay(Duration::ZERO);
        assert_eq!(source.retrieve_frame().unwrap(), Some(a));
        assert_eq!(source.retrieve_frame().unwrap(), None);
        assert_eq!(source.retrieve_frame().unwrap(), Some(b));
        assert_eq!(source.retrieve_frame().unwrap(), None);
    }

    #[test]
    fn journal_records_mode_transitions_once() {
        let mut source = StubSource::scripted(vec![]);
        source.start_still().unwrap();
        source.start_still().unwrap();
        source.stop_still().unwrap();
        source.start_video().unwrap();
        source.stop_video().unwrap();
        source.stop_video().unwrap();
        let journal = source.journal();
        assert_eq!(
            journal.calls(),
            vec![
                SourceCall::StartStill,
                SourceCall::StopStill,
                SourceCall::StartVideo,
                SourceCall::StopVideo,
            ]
        );
        assert_eq!(journal.overlap_violations(), 0);
    }

    #[test]
    fn overlapping_start_is_flagged() {
        let mut source = StubSource::scripted(vec![]);
        source.start_still().unwrap();
        source.start_video().unwrap();
        assert_eq!(source.journal().overlap_violations(), 1);
    }
}
