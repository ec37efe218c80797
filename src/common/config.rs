use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::common::error::{RosterError, Result};
use crate::core::detector::DetectionBackend;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub detector: DetectorConfig,
    pub recognizer: RecognizerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetConfig {
    pub path: PathBuf,
    pub class_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_face_count")]
    pub face_count: usize,
    #[serde(default)]
    pub detection_backend: DetectionBackend,
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default = "default_frame_delay")]
    pub frame_delay_ms: u64,
    #[serde(default = "default_max_frames")]
    pub max_frames: u64,
    #[serde(default = "default_capture_timeout")]
    pub timeout_seconds: u64,
}

fn default_face_count() -> usize { 5 }
fn default_padding() -> u32 { 70 }
fn default_frame_delay() -> u64 { 10 }
fn default_max_frames() -> u64 { 3000 }
fn default_capture_timeout() -> u64 { 120 }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            face_count: default_face_count(),
            detection_backend: DetectionBackend::default(),
            padding: default_padding(),
            frame_delay_ms: default_frame_delay(),
            max_frames: default_max_frames(),
            timeout_seconds: default_capture_timeout(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
}

fn default_warmup_delay() -> u64 {
    50
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    #[serde(default)]
    pub accurate_detector_path: Option<PathBuf>,
    pub recognizer_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    #[serde(default = "default_detection_confidence")]
    pub confidence: f32,
}

fn default_detection_confidence() -> f32 { 0.5 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    pub input_size: u32,
    pub normalization_value: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    pub records_path: PathBuf,
    pub attendance_path: PathBuf,
    pub embeddings_path: PathBuf,
    pub classifier_path: PathBuf,
    pub label_encoder_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TrainingConfig {
    #[serde(default = "default_c")]
    pub c: f32,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_c() -> f32 { 1.0 }
fn default_epochs() -> usize { 50 }
fn default_seed() -> u64 { 42 }

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            c: default_c(),
            epochs: default_epochs(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognitionConfig {
    #[serde(default = "default_recognition_threshold")]
    pub threshold: f32,
}

fn default_recognition_threshold() -> f32 { 0.5 }

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self { threshold: default_recognition_threshold() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreviewConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub ascii_width: Option<usize>,
    #[serde(default)]
    pub ascii_height: Option<usize>,
}

fn default_true() -> bool { true }

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ascii_width: None,
            ascii_height: None,
        }
    }
}

impl CaptureConfig {
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from_path(Path::new(crate::common::paths::DEFAULT_CONFIG_FILE))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RosterError::Config(format!(
                "Config file not found: {}. Please create it from configs/face-roster.toml.",
                path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| RosterError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Directory holding one sub-folder of face samples per person.
    pub fn project_dir(&self) -> PathBuf {
        self.dataset.path.join(&self.dataset.class_name)
    }

    pub fn person_dir(&self, person_id: &str) -> PathBuf {
        self.project_dir().join(person_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset.path.as_os_str().is_empty() {
            return Err(RosterError::Config("dataset.path must not be empty".into()));
        }
        if self.dataset.class_name.trim().is_empty() {
            return Err(RosterError::Config("dataset.class_name must not be empty".into()));
        }

        if self.capture.face_count == 0 || self.capture.face_count > 1000 {
            return Err(RosterError::Config(format!(
                "Face count must be between 1 and 1000, got {}", self.capture.face_count
            )));
        }
        if self.capture.padding > 1024 {
            return Err(RosterError::Config(format!(
                "Capture padding must be at most 1024 pixels, got {}", self.capture.padding
            )));
        }
        if self.capture.max_frames == 0 {
            return Err(RosterError::Config("capture.max_frames must be at least 1".into()));
        }
        if self.capture.timeout_seconds == 0 || self.capture.timeout_seconds > 3600 {
            return Err(RosterError::Config(format!(
                "Capture timeout must be between 1 and 3600 seconds, got {}",
                self.capture.timeout_seconds
            )));
        }

        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(RosterError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(RosterError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        if self.detector.input_width == 0 || self.detector.input_width > 4096 {
            return Err(RosterError::Config(format!(
                "Detector input width must be between 1 and 4096, got {}",
                self.detector.input_width
            )));
        }
        if self.detector.input_height == 0 || self.detector.input_height > 4096 {
            return Err(RosterError::Config(format!(
                "Detector input height must be between 1 and 4096, got {}",
                self.detector.input_height
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(RosterError::Config(format!(
                "Detection confidence must be between 0.0 and 1.0, got {}",
                self.detector.confidence
            )));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(RosterError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }

        if !(self.training.c > 0.0) {
            return Err(RosterError::Config(format!(
                "Training regularization C must be positive, got {}", self.training.c
            )));
        }
        if self.training.epochs == 0 {
            return Err(RosterError::Config("training.epochs must be at least 1".into()));
        }

        if !(0.0..=1.0).contains(&self.recognition.threshold) {
            return Err(RosterError::Config(format!(
                "Recognition threshold must be between 0.0 and 1.0, got {}",
                self.recognition.threshold
            )));
        }

        let storage_paths = [
            ("storage.records_path", &self.storage.records_path),
            ("storage.attendance_path", &self.storage.attendance_path),
            ("storage.embeddings_path", &self.storage.embeddings_path),
            ("storage.classifier_path", &self.storage.classifier_path),
            ("storage.label_encoder_path", &self.storage.label_encoder_path),
        ];
        for (name, path) in storage_paths {
            if path.as_os_str().is_empty() {
                return Err(RosterError::Config(format!("{} must not be empty", name)));
            }
        }

        Ok(())
    }
}
