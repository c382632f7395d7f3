use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use vehicle_watch::config::WatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VEHICLE_WATCH_CONFIG",
        "VEHICLE_WATCH_URL",
        "VEHICLE_WATCH_DECIMATION",
        "VEHICLE_WATCH_MODEL",
        "VEHICLE_WATCH_CLASS_NAMES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "stream": {
            "url": "http://10.0.0.5/mjpeg",
            "connect_timeout_secs": 2,
            "attempts": 5,
            "retry_delay_ms": 250
        },
        "model": {
            "weights": "models/yolov4-tiny.onnx",
            "input_size": 416
        },
        "detection": {
            "decimation": 4,
            "target_classes": ["car", "truck"]
        },
        "health": {
            "failure_threshold": 20,
            "cooldown_ms": 5000
        },
        "display": {
            "label_font": "fonts/DejaVuSans.ttf"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("VEHICLE_WATCH_CONFIG", file.path());
    std::env::set_var("VEHICLE_WATCH_URL", "http://10.0.0.6/stream");
    std::env::set_var("VEHICLE_WATCH_CLASS_NAMES", "models/coco.names");

    let cfg = WatchConfig::load().expect("load config");

    assert_eq!(cfg.stream.url, "http://10.0.0.6/stream");
    assert_eq!(cfg.stream.connect_timeout, Duration::from_secs(2));
    assert_eq!(cfg.stream.read_timeout, Duration::from_secs(15));
    assert_eq!(cfg.stream.attempts, 5);
    assert_eq!(cfg.stream.retry_delay, Duration::from_millis(250));
    assert_eq!(cfg.model.weights, PathBuf::from("models/yolov4-tiny.onnx"));
    assert_eq!(cfg.model.class_names, PathBuf::from("models/coco.names"));
    assert_eq!(cfg.model.input_size, 416);
    assert_eq!(cfg.detection.decimation, 4);
    assert_eq!(cfg.detection.confidence_threshold, 0.5);
    assert_eq!(cfg.detection.target_classes, vec!["car", "truck"]);
    assert_eq!(cfg.health.failure_threshold, 20);
    assert_eq!(cfg.health.cooldown, Duration::from_secs(5));
    assert_eq!(
        cfg.display.label_font,
        Some(PathBuf::from("fonts/DejaVuSans.ttf"))
    );

    clear_env();
}

#[test]
fn rejects_invalid_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VEHICLE_WATCH_DECIMATION", "0");
    assert!(WatchConfig::load().is_err());

    std::env::set_var("VEHICLE_WATCH_DECIMATION", "every third");
    assert!(WatchConfig::load().is_err());

    std::env::remove_var("VEHICLE_WATCH_DECIMATION");
    std::env::set_var("VEHICLE_WATCH_URL", "rtsp://camera/stream");
    assert!(WatchConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VEHICLE_WATCH_CONFIG", "/nonexistent/vehicle_watch.json");
    assert!(WatchConfig::load().is_err());

    clear_env();
}
