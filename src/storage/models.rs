use crate::common::{RosterError, Result};
use crate::core::classifier::{LabelEncoder, LinearSvm};
use crate::storage::{remove_if_exists, write_atomic};
use std::fs;
use std::path::{Path, PathBuf};

/// A fitted classifier together with the encoder that names its classes.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub classifier: LinearSvm,
    pub encoder: LabelEncoder,
}

/// The two bincode artifacts produced by training.
pub struct ModelStore {
    classifier_path: PathBuf,
    encoder_path: PathBuf,
}

impl ModelStore {
    pub fn new(classifier_path: impl Into<PathBuf>, encoder_path: impl Into<PathBuf>) -> Self {
        Self {
            classifier_path: classifier_path.into(),
            encoder_path: encoder_path.into(),
        }
    }

    pub fn classifier_path(&self) -> &Path {
        &self.classifier_path
    }

    pub fn encoder_path(&self) -> &Path {
        &self.encoder_path
    }

    pub fn exists(&self) -> bool {
        self.classifier_path.exists() && self.encoder_path.exists()
    }

    pub fn save(&self, model: &TrainedModel) -> Result<()> {
        let classifier = bincode::serialize(&model.classifier)
            .map_err(|e| RosterError::Storage(format!("Failed to serialize classifier: {}", e)))?;
        let encoder = bincode::serialize(&model.encoder)
            .map_err(|e| RosterError::Storage(format!("Failed to serialize label encoder: {}", e)))?;

        write_atomic(&self.classifier_path, &classifier)?;
        write_atomic(&self.encoder_path, &encoder)?;
        Ok(())
    }

    /// `None` when no model has been trained (or it was cleared).
    pub fn load(&self) -> Result<Option<TrainedModel>> {
        if !self.exists() {
            return Ok(None);
        }

        let classifier: LinearSvm = bincode::deserialize(&fs::read(&self.classifier_path)?)
            .map_err(|e| RosterError::Storage(format!("Failed to deserialize classifier: {}", e)))?;
        let encoder: LabelEncoder = bincode::deserialize(&fs::read(&self.encoder_path)?)
            .map_err(|e| RosterError::Storage(format!("Failed to deserialize label encoder: {}", e)))?;

        if classifier.n_classes() != encoder.len() {
            return Err(RosterError::Storage(format!(
                "Classifier has {} classes but label encoder has {}",
                classifier.n_classes(),
                encoder.len()
            )));
        }

        Ok(Some(TrainedModel { classifier, encoder }))
    }

    /// Delete both artifacts; returns whether anything was removed.
    pub fn clear(&self) -> Result<bool> {
        let classifier = remove_if_exists(&self.classifier_path)?;
        let encoder = remove_if_exists(&self.encoder_path)?;
        Ok(classifier || encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::SvmParams;
    use tempfile::TempDir;

    fn fitted() -> TrainedModel {
        let features = vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![0.0, 1.0], vec![0.1, 0.9]];
        let labels = vec![0, 0, 1, 1];
        TrainedModel {
            classifier: LinearSvm::fit(&features, &labels, 2, SvmParams::default()).unwrap(),
            encoder: LabelEncoder::fit(&["1", "2"]),
        }
    }

    #[test]
    fn save_load_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("recognizer.bin"), dir.path().join("le.bin"));
        assert!(store.load().unwrap().is_none());

        store.save(&fitted()).unwrap();
        assert!(store.exists());
        let model = store.load().unwrap().unwrap();
        assert_eq!(model.encoder.classes(), &["1".to_string(), "2".to_string()]);
        assert_eq!(model.classifier.n_classes(), 2);

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert!(!store.encoder_path().exists());
    }
}
