// Core modules
pub mod camera;
pub mod cli;
pub mod common;
pub mod core;
pub mod pipeline;
pub mod storage;

// Re-export commonly used types
pub use camera::{CameraDevice, FrameSource, V4lCamera};
pub use common::{Config, Result, RosterError};
pub use crate::core::{DetectionBackend, Embedding, EmbeddingExtractor, FaceBox, FaceLocator};
pub use pipeline::{
    ClassifierTrainer, EncodingJob, EnrollmentCoordinator, EnrollmentSession, MaintenanceCoordinator, OutcomeKind,
};
pub use storage::{EmbeddingStore, JsonRecordStore, PersonRecord, PersonStatus, RecordRepository};
