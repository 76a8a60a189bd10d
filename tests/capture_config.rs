use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use motion_sentry::config::{SentrydConfig, MIN_RECORD_WINDOW_MS};
use motion_sentry::CaptureConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTRY_CONFIG",
        "SENTRY_PHOTO_DIR",
        "SENTRY_VIDEO_DIR",
        "SENTRY_SAVE_PHOTO",
        "SENTRY_SAVE_VIDEO",
        "SENTRY_VARIANCE",
        "SENTRY_THRESHOLD",
        "SENTRY_RECORD_WINDOW_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn valid_config() -> CaptureConfig {
    CaptureConfig {
        variance: 25,
        threshold: 100,
        record_window: Duration::from_millis(180_000),
        save_photo: true,
        save_video: true,
        photo_dir: Some(PathBuf::from("snapshots")),
        video_dir: Some(PathBuf::from("recordings")),
    }
}

#[test]
fn valid_config_passes() {
    valid_config().validate().expect("valid");
}

#[test]
fn zero_variance_is_rejected() {
    let mut cfg = valid_config();
    cfg.variance = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn zero_threshold_is_rejected() {
    let mut cfg = valid_config();
    cfg.threshold = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn short_record_window_is_rejected() {
    let mut cfg = valid_config();
    cfg.record_window = Duration::from_millis(MIN_RECORD_WINDOW_MS - 1);
    assert!(cfg.validate().is_err());
    cfg.record_window = Duration::from_millis(MIN_RECORD_WINDOW_MS);
    cfg.validate().expect("minimum window is allowed");
}

#[test]
fn photo_dir_required_only_when_saving_photos() {
    let mut cfg = valid_config();
    cfg.photo_dir = None;
    assert!(cfg.validate().is_err());
    cfg.save_photo = false;
    cfg.validate().expect("dir not needed when disabled");
}

#[test]
fn blank_video_dir_is_rejected() {
    let mut cfg = valid_config();
    cfg.video_dir = Some(PathBuf::from("   "));
    assert!(cfg.validate().is_err());
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "photo_dir": "captures/photo",
        "video_dir": "captures/video",
        "save_photo": true,
        "save_video": true,
        "detector": {
            "variance": 30,
            "threshold": 250,
            "record_window_ms": 60000
        },
        "source": {
            "width": 800,
            "height": 600,
            "target_fps": 12
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTRY_CONFIG", file.path());
    std::env::set_var("SENTRY_THRESHOLD", "400");
    std::env::set_var("SENTRY_PHOTO_DIR", "elsewhere/photo");

    let cfg = SentrydConfig::load().expect("load config");

    assert_eq!(cfg.capture.variance, 30);
    assert_eq!(cfg.capture.threshold, 400);
    assert_eq!(cfg.capture.record_window, Duration::from_secs(60));
    assert!(cfg.capture.save_photo);
    assert!(cfg.capture.save_video);
    assert_eq!(cfg.capture.photo_dir, Some(PathBuf::from("elsewhere/photo")));
    assert_eq!(cfg.capture.video_dir, Some(PathBuf::from("captures/video")));
    assert_eq!(cfg.source.width, 800);
    assert_eq!(cfg.source.height, 600);
    assert_eq!(cfg.source.target_fps, 12);

    clear_env();
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentrydConfig::load().expect("defaults load");

    assert_eq!(cfg.capture.variance, 25);
    assert_eq!(cfg.capture.threshold, 100);
    assert_eq!(cfg.capture.record_window, Duration::from_secs(180));
    assert!(cfg.capture.save_photo);
    assert!(!cfg.capture.save_video);
    assert_eq!(cfg.capture.photo_dir, Some(PathBuf::from("snapshots")));
    assert_eq!(cfg.source.width, 640);
    assert_eq!(cfg.source.height, 480);
    assert_eq!(cfg.source.target_fps, 10);

    clear_env();
}

#[test]
fn bad_env_values_are_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTRY_SAVE_VIDEO", "maybe");
    assert!(SentrydConfig::load().is_err());
    clear_env();

    std::env::set_var("SENTRY_VARIANCE", "lots");
    assert!(SentrydConfig::load().is_err());
    clear_env();

    // env values feed validate(): a window below the minimum still fails
    std::env::set_var("SENTRY_RECORD_WINDOW_MS", "1000");
    assert!(SentrydConfig::load().is_err());
    clear_env();
}
