use crate::common::{Config, RosterError, Result};
use crate::core::detector::DetectionBackend;
use crate::core::extractor::EmbeddingExtractor;
use crate::storage::{EmbeddingRecord, EmbeddingStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingReport {
    pub person_id: String,
    pub images: usize,
    pub skipped: usize,
    pub new_embeddings: usize,
    pub total_embeddings: usize,
}

/// Embeds the faces of the most recently captured person and appends them to
/// the embedding store.
pub struct EncodingJob {
    project_dir: PathBuf,
    backend: DetectionBackend,
}

impl EncodingJob {
    pub fn new(project_dir: impl Into<PathBuf>, backend: DetectionBackend) -> Self {
        Self {
            project_dir: project_dir.into(),
            backend,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.project_dir(), config.capture.detection_backend)
    }

    pub fn run(
        &self,
        extractor: &dyn EmbeddingExtractor,
        store: &EmbeddingStore,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<EncodingReport> {
        let person_dir = latest_person_dir(&self.project_dir)?;
        let person_id = person_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RosterError::NoCandidateFolder(self.project_dir.clone()))?;

        let images = list_images(&person_dir)?;
        if images.is_empty() {
            return Err(RosterError::NoImages(person_dir));
        }

        tracing::info!("Encoding {} images for {}", images.len(), person_id);

        let mut records = Vec::new();
        let mut skipped = 0;
        for (i, path) in images.iter().enumerate() {
            match image::open(path) {
                Ok(img) => {
                    let faces = extractor.detect_and_embed(&img, self.backend)?;
                    if faces.is_empty() {
                        tracing::debug!("No face found in {}", path.display());
                    }
                    records.extend(
                        faces
                            .into_iter()
                            .map(|(_, embedding)| EmbeddingRecord::new(embedding, person_id.as_str())),
                    );
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable image {}: {}", path.display(), e);
                    skipped += 1;
                }
            }
            progress(i + 1, images.len());
        }

        let new_embeddings = records.len();
        let total_embeddings = store.append(records)?;
        tracing::info!(
            "Added {} embeddings for {} ({} in store)",
            new_embeddings,
            person_id,
            total_embeddings
        );

        Ok(EncodingReport {
            person_id,
            images: images.len(),
            skipped,
            new_embeddings,
            total_embeddings,
        })
    }
}

/// The person folder modified last; equal times go to the greatest path.
pub fn latest_person_dir(project_dir: &Path) -> Result<PathBuf> {
    let entries = match fs::read_dir(project_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RosterError::NoCandidateFolder(project_dir.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_dir() {
            continue;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let candidate = (modified, entry.path());
        if latest.as_ref().map_or(true, |current| candidate > *current) {
            latest = Some(candidate);
        }
    }

    latest
        .map(|(_, path)| path)
        .ok_or_else(|| RosterError::NoCandidateFolder(project_dir.to_path_buf()))
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}
