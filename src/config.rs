//! Capture configuration.
//!
//! `CaptureConfig` is the core tuning surface accepted by `CaptureKernel`.
//! It is validated exactly once at construction; an invalid configuration is
//! a fatal error, never a runtime condition.
//!
//! `SentrydConfig` is the daemon-facing layer: an optional JSON config file
//! addressed by `SENTRY_CONFIG`, overridden by `SENTRY_*` environment
//! variables, validated last.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_VARIANCE: u8 = 25;
pub const DEFAULT_THRESHOLD: usize = 100;
pub const DEFAULT_RECORD_WINDOW_MS: u64 = 180_000;
/// Shortest recording window the kernel accepts.
pub const MIN_RECORD_WINDOW_MS: u64 = 15_000;

const DEFAULT_PHOTO_DIR: &str = "snapshots";
const DEFAULT_VIDEO_DIR: &str = "recordings";
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_SOURCE_FPS: u32 = 10;

// ----------------------------------------------------------------------------
// CaptureConfig
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Per-channel intensity delta a pixel must *exceed* to count as
    /// different.
    pub variance: u8,
    /// Number of differing pixels at which a tick reports motion.
    pub threshold: usize,
    /// How long the video session keeps recording after the last detection.
    pub record_window: Duration,
    pub save_photo: bool,
    pub save_video: bool,
    /// Required iff `save_photo`.
    pub photo_dir: Option<PathBuf>,
    /// Required iff `save_video`.
    pub video_dir: Option<PathBuf>,
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.variance < 1 {
            return Err(anyhow!("variance must be >= 1"));
        }
        if self.threshold < 1 {
            return Err(anyhow!("threshold must be >= 1"));
        }
        if self.record_window < Duration::from_millis(MIN_RECORD_WINDOW_MS) {
            return Err(anyhow!(
                "record window must be >= {} ms",
                MIN_RECORD_WINDOW_MS
            ));
        }
        if self.save_photo && !dir_set(&self.photo_dir) {
            return Err(anyhow!("photo_dir is required when save_photo is set"));
        }
        if self.save_video && !dir_set(&self.video_dir) {
            return Err(anyhow!("video_dir is required when save_video is set"));
        }
        Ok(())
    }
}

fn dir_set(dir: &Option<PathBuf>) -> bool {
    dir.as_deref()
        .and_then(Path::to_str)
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false)
}

// ----------------------------------------------------------------------------
// SentrydConfig: file + env loading for the daemon
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct SentrydConfigFile {
    photo_dir: Option<String>,
    video_dir: Option<String>,
    save_photo: Option<bool>,
    save_video: Option<bool>,
    detector: Option<DetectorConfigFile>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    variance: Option<u8>,
    threshold: Option<usize>,
    record_window_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SentrydConfig {
    pub capture: CaptureConfig,
    pub source: SourceSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl SentrydConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTRY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.capture.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentrydConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        let capture = CaptureConfig {
            variance: detector.variance.unwrap_or(DEFAULT_VARIANCE),
            threshold: detector.threshold.unwrap_or(DEFAULT_THRESHOLD),
            record_window: Duration::from_millis(
                detector.record_window_ms.unwrap_or(DEFAULT_RECORD_WINDOW_MS),
            ),
            save_photo: file.save_photo.unwrap_or(true),
            save_video: file.save_video.unwrap_or(false),
            photo_dir: Some(PathBuf::from(
                file.photo_dir.unwrap_or_else(|| DEFAULT_PHOTO_DIR.to_string()),
            )),
            video_dir: Some(PathBuf::from(
                file.video_dir.unwrap_or_else(|| DEFAULT_VIDEO_DIR.to_string()),
            )),
        };
        Self {
            capture,
            source: SourceSettings {
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("SENTRY_PHOTO_DIR") {
            if !dir.trim().is_empty() {
                self.capture.photo_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(dir) = std::env::var("SENTRY_VIDEO_DIR") {
            if !dir.trim().is_empty() {
                self.capture.video_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(value) = std::env::var("SENTRY_SAVE_PHOTO") {
            self.capture.save_photo = parse_bool("SENTRY_SAVE_PHOTO", &value)?;
        }
        if let Ok(value) = std::env::var("SENTRY_SAVE_VIDEO") {
            self.capture.save_video = parse_bool("SENTRY_SAVE_VIDEO", &value)?;
        }
        if let Ok(value) = std::env::var("SENTRY_VARIANCE") {
            self.capture.variance = value
                .parse()
                .map_err(|_| anyhow!("SENTRY_VARIANCE must be an integer in 1..=255"))?;
        }
        if let Ok(value) = std::env::var("SENTRY_THRESHOLD") {
            self.capture.threshold = value
                .parse()
                .map_err(|_| anyhow!("SENTRY_THRESHOLD must be a positive integer"))?;
        }
        if let Ok(value) = std::env::var("SENTRY_RECORD_WINDOW_MS") {
            let ms: u64 = value
                .parse()
                .map_err(|_| anyhow!("SENTRY_RECORD_WINDOW_MS must be milliseconds"))?;
            self.capture.record_window = Duration::from_millis(ms);
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean", key)),
    }
}

fn read_config_file(path: &Path) -> Result<SentrydConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
