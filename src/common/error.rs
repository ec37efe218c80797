use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record store {path} is corrupt: {reason}")]
    CorruptRecordStore { path: PathBuf, reason: String },

    #[error("Person ID '{0}' is already enrolled")]
    DuplicateId(String),

    #[error("No record found for person ID '{0}'")]
    NotFound(String),

    #[error("At least two different persons are required for training, found {found}")]
    InsufficientClasses { found: usize },

    #[error("No person folders found under {0}")]
    NoCandidateFolder(PathBuf),

    #[error("No images found in {0}")]
    NoImages(PathBuf),

    #[error("Another capture session is already running")]
    SessionBusy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RosterError>;
