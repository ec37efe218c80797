use crate::common::{Config, RosterError, Result};
use crate::core::classifier::{LabelEncoder, LinearSvm, SvmParams};
use crate::storage::{EmbeddingSet, EmbeddingStore, ModelStore, TrainedModel};
use chrono::{DateTime, Local};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    LoadingData,
    EncodingLabels,
    Training,
    WritingToDisk,
    Complete,
}

impl fmt::Display for TrainingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TrainingPhase::LoadingData => "Loading data",
            TrainingPhase::EncodingLabels => "Encoding labels",
            TrainingPhase::Training => "Training",
            TrainingPhase::WritingToDisk => "Writing to disk",
            TrainingPhase::Complete => "Complete",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub classes: Vec<String>,
    pub samples: usize,
    pub trained_at: DateTime<Local>,
}

pub struct ClassifierTrainer {
    models: ModelStore,
    params: SvmParams,
}

impl ClassifierTrainer {
    pub fn new(models: ModelStore, params: SvmParams) -> Self {
        Self { models, params }
    }

    pub fn from_config(config: &Config) -> Self {
        let models = ModelStore::new(&config.storage.classifier_path, &config.storage.label_encoder_path);
        let params = SvmParams {
            c: config.training.c,
            epochs: config.training.epochs,
            seed: config.training.seed,
        };
        Self::new(models, params)
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    pub fn train_from_store(
        &self,
        store: &EmbeddingStore,
        progress: &mut dyn FnMut(TrainingPhase),
    ) -> Result<TrainingReport> {
        self.train(&store.load(), progress)
    }

    /// Fits and persists a new model. Nothing is written unless at least two
    /// people have embeddings.
    pub fn train(&self, set: &EmbeddingSet, progress: &mut dyn FnMut(TrainingPhase)) -> Result<TrainingReport> {
        progress(TrainingPhase::LoadingData);
        let found = set.distinct_labels().len();
        if found < 2 {
            return Err(RosterError::InsufficientClasses { found });
        }
        tracing::info!("Training on {} embeddings of {} people", set.len(), found);

        progress(TrainingPhase::EncodingLabels);
        let encoder = LabelEncoder::fit(set.names());
        let targets = set
            .names()
            .iter()
            .map(|name| {
                encoder
                    .transform(name)
                    .ok_or_else(|| RosterError::Model(format!("Label '{}' missing from encoder", name)))
            })
            .collect::<Result<Vec<usize>>>()?;

        progress(TrainingPhase::Training);
        let classifier = LinearSvm::fit(set.encodings(), &targets, encoder.len(), self.params)?;

        progress(TrainingPhase::WritingToDisk);
        let model = TrainedModel { classifier, encoder };
        self.models.save(&model)?;
        tracing::info!(
            "Saved classifier to {} and label encoder to {}",
            self.models.classifier_path().display(),
            self.models.encoder_path().display()
        );

        progress(TrainingPhase::Complete);
        Ok(TrainingReport {
            classes: model.encoder.classes().to_vec(),
            samples: set.len(),
            trained_at: Local::now(),
        })
    }

    /// Removes both model artifacts; absent files are fine.
    pub fn clear(&self) -> Result<bool> {
        let removed = self.models.clear()?;
        if removed {
            tracing::info!("Cleared trained model");
        }
        Ok(removed)
    }
}
