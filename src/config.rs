use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use epiwatch_vision::face::{MAX_EMBEDDING_DISTANCE, SFACE_L2_THRESHOLD};

use crate::aggregator::CompliancePolicy;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("EPIWATCH_CONFIG_PATH").unwrap_or("/usr/local/etc/epiwatch/config.toml"))
});

pub static DATA_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("EPIWATCH_DATA_PREFIX").unwrap_or("/usr/local/share/epiwatch"))
});

/// What to do when the object detector fails on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorFailure {
    /// End the session, like a capture or render failure.
    #[default]
    Fatal,
    /// Log, treat the frame as having no detections and carry on.
    SkipFrame,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: String,
    /// Requested capture size, width x height.
    pub resolution: (u32, u32),
    pub gallery_dir: PathBuf,
    pub required_labels: Vec<String>,
    /// Detector class names indexed by class id.
    pub class_labels: Vec<String>,
    /// Maximum embedding distance for a face to count as identified.
    pub face_threshold: f32,
    /// Detections must score strictly above this to count.
    pub min_confidence: f32,
    /// Identity matching is dispatched every this many frames.
    pub dispatch_every: u64,
    pub report_interval_secs: f64,
    pub compliance: CompliancePolicy,
    pub detector_failure: DetectorFailure,
    /// Where the annotated frame is written after every iteration.
    pub snapshot_path: PathBuf,
    pub face_detector_model: PathBuf,
    pub face_encoder_model: PathBuf,
    pub object_detector_model: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data = |name: &str| DATA_PREFIX.join(name);
        Self {
            camera: "/dev/video0".to_string(),
            resolution: (640, 480),
            gallery_dir: data("people"),
            required_labels: vec![
                "Capacete de seguranca".to_string(),
                "Oculos de protecao".to_string(),
            ],
            class_labels: Vec::new(),
            face_threshold: SFACE_L2_THRESHOLD,
            min_confidence: 0.3,
            dispatch_every: 10,
            report_interval_secs: 5.0,
            compliance: CompliancePolicy::Latching,
            detector_failure: DetectorFailure::Fatal,
            snapshot_path: std::env::temp_dir().join("epiwatch-live.png"),
            face_detector_model: data("models/face_detection_yunet_2023mar.onnx"),
            face_encoder_model: data("models/face_recognition_sface_2021dec.onnx"),
            object_detector_model: data("models/ppe.onnx"),
        }
    }
}

impl Config {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs_f64(self.report_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch_every == 0 {
            anyhow::bail!("dispatch_every must be at least 1");
        }
        if !self.face_threshold.is_finite() || self.face_threshold < 0.0 {
            anyhow::bail!("face_threshold must be a non-negative number");
        }
        if self.face_threshold >= MAX_EMBEDDING_DISTANCE {
            anyhow::bail!(
                "face_threshold {} would identify every face, embeddings are at most {} apart",
                self.face_threshold,
                MAX_EMBEDDING_DISTANCE
            );
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            anyhow::bail!("min_confidence must be within [0, 1]");
        }
        if !self.report_interval_secs.is_finite() || self.report_interval_secs <= 0.0 {
            anyhow::bail!("report_interval_secs must be positive");
        }
        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            anyhow::bail!("resolution must be non-zero");
        }
        let mut labels = self.required_labels.clone();
        labels.sort();
        if let Some(w) = labels.windows(2).find(|w| w[0] == w[1]) {
            anyhow::bail!("required label {:?} listed twice", w[0]);
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
