//! Frame-to-frame motion detection.
//!
//! `MotionDetector` owns a sliding window of the last three greyscale frames
//! (*previous*, *current*, *next*) plus a cached difference frame, and
//! answers one question per tick: did something change?
//!
//! The algorithm combines two consecutive frame differences with a bitwise
//! AND, so a pixel only counts if it changed across *both* transitions. This
//! suppresses single-frame sensor noise without any temporal filtering
//! beyond the depth-3 window.
//!
//! The detector is a pure algorithm: no threads, no I/O, no clock. Exactly
//! one capture loop owns it at any time; ownership moves between the still
//! and video loops through the handoff channel.

use crate::frame::{DiffFrame, Frame, GreyFrame};

pub struct MotionDetector {
    variance: u8,
    threshold: usize,
    previous: GreyFrame,
    current: GreyFrame,
    next: GreyFrame,
    /// Difference between *current* and *next* computed on the prior tick.
    /// Reused as the *previous*/*current* difference of this tick, except on
    /// the first tick after construction where it is recomputed directly.
    last_diff: Option<DiffFrame>,
}

impl MotionDetector {
    pub fn new(variance: u8, threshold: usize) -> Self {
        Self {
            variance,
            threshold,
            previous: GreyFrame::placeholder(),
            current: GreyFrame::placeholder(),
            next: GreyFrame::placeholder(),
            last_diff: None,
        }
    }

    /// Evaluate one frame. `None` means the source produced nothing since
    /// the last pull; the window does not advance and no motion is reported.
    ///
    /// The window starts as 1x1 zero placeholders, so detection cannot fire
    /// until the window has been advanced enough times to hold real frames.
    /// That warm-up is expected behavior, not an error.
    pub fn tick(&mut self, frame: Option<&Frame>) -> bool {
        let Some(frame) = frame else {
            return false;
        };

        self.previous = std::mem::replace(
            &mut self.current,
            std::mem::replace(&mut self.next, frame.to_grey()),
        );

        let diff_a = match self.last_diff.take() {
            Some(cached) => cached,
            None => self.previous.difference(&self.current),
        };
        let diff_b = self.current.difference(&self.next);
        let combined = diff_a.combine(&diff_b);
        self.last_diff = Some(diff_b);

        combined.count_over(self.variance, self.threshold) >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 64;
    const H: u32 = 48;

    fn flat(level: u8) -> Frame {
        Frame::solid(W, H, [level, level, level])
    }

    fn with_patch(level: u8, patch: u8, px: u32) -> Frame {
        let mut f = flat(level);
        f.fill_rect(0, 0, px, px, [patch, patch, patch]);
        f
    }

    #[test]
    fn starved_tick_is_a_no_op() {
        let mut det = MotionDetector::new(25, 100);
        assert!(!det.tick(None));
        // starvation must not advance the window: the next real tick still
        // behaves like the first
        assert!(!det.tick(Some(&flat(80))));
    }

    #[test]
    fn warm_up_never_fires() {
        let mut det = MotionDetector::new(25, 100);
        // wildly different frames during warm-up: the degenerate 1x1 window
        // caps the combined diff at a single pixel
        assert!(!det.tick(Some(&flat(255))));
        assert!(!det.tick(Some(&flat(0))));
    }

    #[test]
    fn sustained_change_fires_after_warm_up() {
        let mut det = MotionDetector::new(25, 100);
        for _ in 0..4 {
            assert!(!det.tick(Some(&flat(80))));
        }
        // patch appears and is gone next frame: both transitions touch the
        // same pixels, so the AND keeps them
        assert!(!det.tick(Some(&with_patch(80, 255, 20))));
        assert!(det.tick(Some(&flat(80))));
    }

    #[test]
    fn identical_frames_never_fire() {
        let mut det = MotionDetector::new(25, 100);
        for _ in 0..20 {
            assert!(!det.tick(Some(&flat(128))));
        }
    }

    #[test]
    fn same_sequence_gives_same_results() {
        let frames: Vec<Frame> = vec![
            flat(80),
            flat(80),
            flat(80),
            with_patch(80, 255, 30),
            flat(80),
            flat(80),
            with_patch(80, 10, 25),
            with_patch(80, 10, 25),
            flat(80),
        ];
        let run = |frames: &[Frame]| -> Vec<bool> {
            let mut det = MotionDetector::new(25, 100);
            frames.iter().map(|f| det.tick(Some(f))).collect()
        };
        assert_eq!(run(&frames), run(&frames));
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        // a 10x10 patch flips exactly 100 pixels in both transitions
        let fire_at = |threshold: usize| -> bool {
            let mut det = MotionDetector::new(25, threshold);
            for _ in 0..4 {
                det.tick(Some(&flat(0)));
            }
            det.tick(Some(&with_patch(0, 255, 10)));
            det.tick(Some(&flat(0)))
        };
        assert!(fire_at(100));
        assert!(fire_at(99));
        assert!(!fire_at(101));
    }

    #[test]
    fn variance_boundary_is_exclusive() {
        // patch pixels differ by exactly `delta` in intensity
        let fire_with_delta = |variance: u8, delta: u8| -> bool {
            let mut det = MotionDetector::new(variance, 100);
            for _ in 0..4 {
                det.tick(Some(&flat(0)));
            }
            det.tick(Some(&with_patch(0, delta, 20)));
            det.tick(Some(&flat(0)))
        };
        // AND of two identical diffs preserves the delta value
        assert!(!fire_with_delta(25, 25));
        assert!(fire_with_delta(25, 26));
    }

    #[test]
    fn non_overlapping_transitions_are_suppressed() {
        let mut det = MotionDetector::new(25, 100);
        for _ in 0..4 {
            assert!(!det.tick(Some(&flat(0))));
        }
        // transition 1: patch A appears (top-left 20x20, 400 px > threshold)
        let patch_a = with_patch(0, 255, 20);
        assert!(!det.tick(Some(&patch_a)));
        // transition 2: A persists, disjoint patch B appears (bottom-right).
        // each diff alone exceeds the threshold, their AND is empty.
        let mut patch_ab = patch_a.clone();
        patch_ab.fill_rect(W - 20, H - 20, 20, 20, [255, 255, 255]);
        assert!(!det.tick(Some(&patch_ab)));
    }
}
