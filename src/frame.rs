//! Frame containers and the pixel operations behind motion detection.
//!
//! Three representations flow through the pipeline:
//!
//! - `Frame`: immutable RGB8 grid as delivered by a `CaptureSource`.
//! - `GreyFrame`: single intensity channel derived by per-pixel averaging.
//!   The detector keeps a rolling window of exactly three of these.
//! - `DiffFrame`: per-pixel absolute difference between two `GreyFrame`s.
//!
//! Greyscaled pixels carry the same value in all three channels, so the
//! difference and the variance test collapse to a single channel with
//! identical results. That single channel is what we store.

use anyhow::{anyhow, Result};
use image::RgbImage;

// ----------------------------------------------------------------------------
// Frame: raw RGB8 input
// ----------------------------------------------------------------------------

/// An immutable 2D grid of 8-bit RGB samples.
///
/// Ownership transfers to whichever component receives the frame; once a
/// frame has been consumed into its greyscale derivative it is dropped unless
/// a snapshot job claims it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    /// Row-major RGB triples, `width * height * 3` bytes.
    data: Vec<u8>,
}

impl Frame {
    pub fn from_rgb8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer size mismatch: {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A uniform frame where every pixel carries the same RGB triple.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Overwrite a rectangular region with a solid color. Clipped to bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
        let x_end = (x.saturating_add(w)).min(self.width);
        let y_end = (y.saturating_add(h)).min(self.height);
        for row in y..y_end {
            for col in x..x_end {
                let idx = (row as usize * self.width as usize + col as usize) * 3;
                self.data[idx..idx + 3].copy_from_slice(&rgb);
            }
        }
    }

    /// Per-pixel intensity average with floor division.
    pub fn to_grey(&self) -> GreyFrame {
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize);
        for px in self.data.chunks_exact(3) {
            let sum = px[0] as u16 + px[1] as u16 + px[2] as u16;
            data.push((sum / 3) as u8);
        }
        GreyFrame {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Hand the pixel buffer to the `image` crate for encoding.
    pub fn into_rgb_image(self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data)
            .ok_or_else(|| anyhow!("frame buffer rejected by image container"))
    }
}

// ----------------------------------------------------------------------------
// GreyFrame: single intensity channel
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GreyFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl GreyFrame {
    /// Degenerate all-zero 1x1 frame used to seed the detection window.
    pub fn placeholder() -> Self {
        Self {
            width: 1,
            height: 1,
            data: vec![0],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Per-pixel absolute difference over the overlapping region.
    ///
    /// Frames of unequal size are compared over the minimum of both
    /// dimensions, which is what keeps warm-up ticks (1x1 placeholders
    /// against full frames) from ever reaching the detection threshold.
    pub fn difference(&self, other: &GreyFrame) -> DiffFrame {
        let width = self.width.min(other.width);
        let height = self.height.min(other.height);
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height as usize {
            for x in 0..width as usize {
                let a = self.data[y * self.width as usize + x];
                let b = other.data[y * other.width as usize + x];
                data.push(a.abs_diff(b));
            }
        }
        DiffFrame {
            width,
            height,
            data,
        }
    }
}

// ----------------------------------------------------------------------------
// DiffFrame: combined frame-to-frame change
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl DiffFrame {
    /// Per-pixel bitwise AND over the overlapping region.
    ///
    /// A pixel only survives if it changed in *both* inputs. A transient
    /// confined to a single transition is erased here.
    pub fn combine(&self, other: &DiffFrame) -> DiffFrame {
        let width = self.width.min(other.width);
        let height = self.height.min(other.height);
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height as usize {
            for x in 0..width as usize {
                let a = self.data[y * self.width as usize + x];
                let b = other.data[y * other.width as usize + x];
                data.push(a & b);
            }
        }
        DiffFrame {
            width,
            height,
            data,
        }
    }

    /// Count pixels whose value is strictly greater than `variance`,
    /// stopping as soon as `limit` is reached. A pixel differing by exactly
    /// `variance` does not count.
    pub fn count_over(&self, variance: u8, limit: usize) -> usize {
        let mut count = 0usize;
        for &px in &self.data {
            if px > variance {
                count += 1;
                if count >= limit {
                    return count;
                }
            }
        }
        count
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
