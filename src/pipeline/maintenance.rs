use crate::common::{Config, RosterError, Result};
use crate::pipeline::train::{ClassifierTrainer, TrainingPhase};
use crate::storage::records::PLACEHOLDER;
use crate::storage::{AttendanceStore, EmbeddingStore, PersonRecord, PersonStatus, RecordRepository};
use std::fmt;
use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    FaceSamples,
    Attendance,
    Embeddings,
    Model,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CleanupStep::FaceSamples => "face samples",
            CleanupStep::Attendance => "attendance",
            CleanupStep::Embeddings => "embeddings",
            CleanupStep::Model => "model",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub step: CleanupStep,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAction {
    Retrained { classes: usize },
    Cleared,
}

/// What happened after a record was deleted. The record itself is always gone
/// when a report is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionReport {
    pub record: PersonRecord,
    pub samples_removed: bool,
    pub attendance_removed: bool,
    pub embeddings_removed: usize,
    pub model: Option<ModelAction>,
    pub failures: Vec<CleanupFailure>,
}

impl DeletionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct MaintenanceCoordinator {
    config: Arc<Config>,
    records: Arc<dyn RecordRepository>,
    embeddings: EmbeddingStore,
    attendance: AttendanceStore,
    trainer: ClassifierTrainer,
}

impl MaintenanceCoordinator {
    pub fn new(config: Arc<Config>, records: Arc<dyn RecordRepository>) -> Self {
        let embeddings = EmbeddingStore::new(&config.storage.embeddings_path);
        let attendance = AttendanceStore::new(&config.storage.attendance_path);
        let trainer = ClassifierTrainer::from_config(&config);
        Self {
            config,
            records,
            embeddings,
            attendance,
            trainer,
        }
    }

    /// Deletes the record first; the remaining steps are best effort and
    /// their failures are collected in the report.
    pub fn delete_person(&self, person_id: &str) -> Result<DeletionReport> {
        let person_id = person_id.trim();
        let record = self.records.delete(person_id)?;
        tracing::info!("Deleting {} ({})", record.person_id, record.name);

        let mut report = DeletionReport {
            record,
            samples_removed: false,
            attendance_removed: false,
            embeddings_removed: 0,
            model: None,
            failures: Vec::new(),
        };

        match self.remove_face_samples(person_id) {
            Ok(removed) => report.samples_removed = removed,
            Err(e) => record_failure(&mut report, CleanupStep::FaceSamples, e),
        }

        match self.attendance.remove_person(person_id) {
            Ok(removed) => report.attendance_removed = removed,
            Err(e) => record_failure(&mut report, CleanupStep::Attendance, e),
        }

        let embeddings_pruned = match self.embeddings.remove_by_label(person_id) {
            Ok(removed) => {
                report.embeddings_removed = removed;
                true
            }
            Err(e) => {
                record_failure(&mut report, CleanupStep::Embeddings, e);
                false
            }
        };

        self.refresh_model(&mut report, embeddings_pruned);

        Ok(report)
    }

    /// Replaces name and status; embeddings and the model keep the same id.
    pub fn modify_person(&self, person_id: &str, name: &str, status: PersonStatus) -> Result<PersonRecord> {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case(PLACEHOLDER) {
            return Err(RosterError::InvalidInput("Person name is required".into()));
        }
        self.records.update(person_id.trim(), name, status)
    }

    fn remove_face_samples(&self, person_id: &str) -> Result<bool> {
        if !is_single_component(person_id) {
            return Err(RosterError::InvalidInput(format!(
                "Refusing to remove samples for suspicious id '{}'",
                person_id
            )));
        }

        let dir = self.config.person_dir(person_id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!("Removed face samples at {}", dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No face samples at {}", dir.display());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Retrain over what is left when possible; otherwise drop the model so
    /// it cannot name someone who was deleted.
    fn refresh_model(&self, report: &mut DeletionReport, embeddings_pruned: bool) {
        if embeddings_pruned {
            let remaining = self.embeddings.load();
            let classes = remaining.distinct_labels().len();

            if classes >= 2 {
                let trained = self.trainer.train(&remaining, &mut |phase: TrainingPhase| {
                    tracing::debug!("Retraining: {}", phase);
                });
                match trained {
                    Ok(_) => {
                        report.model = Some(ModelAction::Retrained { classes });
                        return;
                    }
                    Err(e) => record_failure(report, CleanupStep::Model, e),
                }
            }
        } else {
            tracing::warn!("Embeddings still contain {}, clearing the model", report.record.person_id);
        }

        match self.trainer.clear() {
            Ok(_) => report.model = Some(ModelAction::Cleared),
            Err(e) => record_failure(report, CleanupStep::Model, e),
        }
    }
}

fn record_failure(report: &mut DeletionReport, step: CleanupStep, error: RosterError) {
    tracing::error!("Cleanup of {} for {} failed: {}", step, report.record.person_id, error);
    report.failures.push(CleanupFailure {
        step,
        message: error.to_string(),
    });
}

fn is_single_component(value: &str) -> bool {
    let mut components = Path::new(value).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
