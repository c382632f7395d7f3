use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_STREAM_URL: &str = "http://192.168.137.80/stream";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 15;
const DEFAULT_PROBE_READ_TIMEOUT_SECS: u64 = 5;
const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
const DEFAULT_CHUNK_SIZE: usize = 1024;
const DEFAULT_WEIGHTS_PATH: &str = "yolov4.onnx";
const DEFAULT_CLASS_NAMES_PATH: &str = "coco.names";
const DEFAULT_INPUT_SIZE: u32 = 320;
const DEFAULT_DECIMATION: u32 = 3;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_NMS_SCORE_THRESHOLD: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.4;
const DEFAULT_TARGET_CLASSES: [&str; 3] = ["car", "bus", "truck"];
const DEFAULT_FAILURE_THRESHOLD: u32 = 10;
const DEFAULT_COOLDOWN_MS: u64 = 2_000;

#[derive(Debug, Deserialize, Default)]
struct WatchConfigFile {
    stream: Option<StreamConfigFile>,
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
    health: Option<HealthConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    probe_read_timeout_secs: Option<u64>,
    attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
    chunk_size: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    weights: Option<PathBuf>,
    config: Option<PathBuf>,
    class_names: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    decimation: Option<u32>,
    confidence_threshold: Option<f32>,
    nms_score_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    target_classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct HealthConfigFile {
    failure_threshold: Option<u32>,
    cooldown_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    label_font: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub stream: StreamSettings,
    pub model: ModelSettings,
    pub detection: DetectionSettings,
    pub health: HealthSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Read timeout used by the startup probe, which never reads the body.
    pub probe_read_timeout: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
    pub chunk_size: usize,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub weights: PathBuf,
    pub config: Option<PathBuf>,
    pub class_names: PathBuf,
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub decimation: u32,
    pub confidence_threshold: f32,
    pub nms_score_threshold: f32,
    pub iou_threshold: f32,
    pub target_classes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct DisplaySettings {
    pub label_font: Option<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::from_file(WatchConfigFile::default())
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        WatchConfig::default().detection
    }
}

impl WatchConfig {
    /// File named by `VEHICLE_WATCH_CONFIG` (optional), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VEHICLE_WATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatchConfigFile) -> Self {
        let stream = file.stream.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let health = file.health.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        Self {
            stream: StreamSettings {
                url: stream.url.unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
                connect_timeout: Duration::from_secs(
                    stream
                        .connect_timeout_secs
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
                ),
                read_timeout: Duration::from_secs(
                    stream.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
                ),
                probe_read_timeout: Duration::from_secs(
                    stream
                        .probe_read_timeout_secs
                        .unwrap_or(DEFAULT_PROBE_READ_TIMEOUT_SECS),
                ),
                attempts: stream.attempts.unwrap_or(DEFAULT_ATTEMPTS),
                retry_delay: Duration::from_millis(
                    stream.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                ),
                chunk_size: stream.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            },
            model: ModelSettings {
                weights: model
                    .weights
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_PATH)),
                config: model.config,
                class_names: model
                    .class_names
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASS_NAMES_PATH)),
                input_size: model.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            },
            detection: DetectionSettings {
                decimation: detection.decimation.unwrap_or(DEFAULT_DECIMATION),
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                nms_score_threshold: detection
                    .nms_score_threshold
                    .unwrap_or(DEFAULT_NMS_SCORE_THRESHOLD),
                iou_threshold: detection.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                target_classes: detection.target_classes.unwrap_or_else(|| {
                    DEFAULT_TARGET_CLASSES
                        .iter()
                        .map(|name| name.to_string())
                        .collect()
                }),
            },
            health: HealthSettings {
                failure_threshold: health
                    .failure_threshold
                    .unwrap_or(DEFAULT_FAILURE_THRESHOLD),
                cooldown: Duration::from_millis(health.cooldown_ms.unwrap_or(DEFAULT_COOLDOWN_MS)),
            },
            display: DisplaySettings {
                label_font: display.label_font,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("VEHICLE_WATCH_URL") {
            if !url.trim().is_empty() {
                self.stream.url = url;
            }
        }
        if let Ok(decimation) = std::env::var("VEHICLE_WATCH_DECIMATION") {
            self.detection.decimation = decimation
                .trim()
                .parse()
                .map_err(|_| anyhow!("VEHICLE_WATCH_DECIMATION must be a positive integer"))?;
        }
        if let Ok(path) = std::env::var("VEHICLE_WATCH_MODEL") {
            if !path.trim().is_empty() {
                self.model.weights = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("VEHICLE_WATCH_CLASS_NAMES") {
            if !path.trim().is_empty() {
                self.model.class_names = PathBuf::from(path);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.stream.url)
            .map_err(|e| anyhow!("invalid stream url '{}': {}", self.stream.url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported stream scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        if self.stream.attempts == 0 {
            return Err(anyhow!("stream attempts must be at least 1"));
        }
        if self.stream.chunk_size == 0 {
            return Err(anyhow!("stream chunk size must be greater than zero"));
        }
        if self.model.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if self.detection.decimation == 0 {
            return Err(anyhow!("decimation interval must be at least 1"));
        }
        for (name, value) in [
            ("confidence_threshold", self.detection.confidence_threshold),
            ("nms_score_threshold", self.detection.nms_score_threshold),
            ("iou_threshold", self.detection.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.detection.target_classes.is_empty() {
            return Err(anyhow!("at least one target class is required"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<WatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
