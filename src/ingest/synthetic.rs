//! Procedural capture source for demo runs.
//!
//! Generates flat grey frames paced to a target fps and periodically walks a
//! bright patch across two consecutive frames, which is exactly the shape of
//! change the AND-combined detector responds to. `sentryd` runs on this when
//! no real camera is wired up.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::frame::Frame;
use crate::ingest::CaptureSource;

const BACKGROUND: [u8; 3] = [96, 96, 96];
const PATCH: [u8; 3] = [240, 240, 240];
/// A patch is injected for two consecutive frames once per this many frames.
const PATCH_PERIOD: u64 = 50;
const PATCH_SIZE: u32 = 120;

pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    last_frame: Option<Instant>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, target_fps: u32) -> Self {
        let fps = target_fps.max(1);
        Self {
            width,
            height,
            frame_interval: Duration::from_secs(1) / fps,
            last_frame: None,
            frame_count: 0,
        }
    }

    fn compose(&self) -> Frame {
        let mut frame = Frame::solid(self.width, self.height, BACKGROUND);
        let phase = self.frame_count % PATCH_PERIOD;
        if phase < 2 {
            // drift the patch so consecutive events do not look identical
            let step = (self.frame_count / PATCH_PERIOD) as u32;
            let x = (step * 37) % self.width.saturating_sub(PATCH_SIZE).max(1);
            let y = (step * 23) % self.height.saturating_sub(PATCH_SIZE).max(1);
            frame.fill_rect(x, y, PATCH_SIZE, PATCH_SIZE, PATCH);
        }
        frame
    }
}

impl CaptureSource for SyntheticSource {
    fn prepare_still_capture(&mut self, dir: Option<&Path>) -> Result<()> {
        log::info!(
            "synthetic source ready for stills ({}x{}, dir={:?})",
            self.width,
            self.height,
            dir
        );
        Ok(())
    }

    fn prepare_video_capture(&mut self, dir: Option<&Path>) -> Result<()> {
        log::info!("synthetic source ready for video (dir={:?})", dir);
        Ok(())
    }

    fn start_still(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop_still(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_video(&mut self) -> Result<()> {
        log::info!("synthetic source: recording started");
        Ok(())
    }

    fn stop_video(&mut self) -> Result<()> {
        log::info!("synthetic source: recording stopped");
        Ok(())
    }

    fn retrieve_frame(&mut self) -> Result<Option<Frame>> {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            if now.duration_since(last) < self.frame_interval {
                // nothing new since the last pull
                std::thread::sleep(self.frame_interval / 4);
                return Ok(None);
            }
        }
        self.last_frame = Some(now);
        let frame = self.compose();
        self.frame_count += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paces_frames_to_target_fps() {
        let mut source = SyntheticSource::new(64, 48, 1000);
        let first = source.retrieve_frame().unwrap();
        assert!(first.is_some());
        // immediate second pull inside the frame interval yields nothing
        let mut source = SyntheticSource::new(64, 48, 1);
        assert!(source.retrieve_frame().unwrap().is_some());
        assert!(source.retrieve_frame().unwrap().is_none());
    }

    #[test]
    fn patch_appears_on_schedule() {
        let mut source = SyntheticSource::new(256, 256, 1_000_000);
        source.last_frame = None;
        let flat = Frame::solid(256, 256, BACKGROUND);
        // the first two frames of each period carry the patch
        let mut patched = 0;
        for _ in 0..PATCH_PERIOD {
            source.last_frame = None;
            if let Some(frame) = source.retrieve_frame().unwrap() {
                if frame != flat {
                    patched += 1;
                }
            }
        }
        assert_eq!(patched, 2);
    }
}
