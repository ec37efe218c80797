use face_roster::core::SvmParams;
use face_roster::pipeline::{ClassifierTrainer, Identifier, TrainingPhase};
use face_roster::storage::{EmbeddingRecord, EmbeddingSet, EmbeddingStore, ModelStore};
use face_roster::RosterError;
use std::fs;
use tempfile::TempDir;

fn trainer(dir: &TempDir) -> ClassifierTrainer {
    let models = ModelStore::new(dir.path().join("recognizer.bin"), dir.path().join("le.bin"));
    ClassifierTrainer::new(models, SvmParams { c: 1.0, epochs: 30, seed: 7 })
}

fn clustered(labels: &[(&str, [f32; 3])], per_label: usize) -> EmbeddingSet {
    let mut set = EmbeddingSet::new();
    for (label, center) in labels {
        for i in 0..per_label {
            let jitter = i as f32 * 0.01;
            let embedding = center.iter().map(|v| v + jitter).collect();
            set.push(EmbeddingRecord::new(embedding, *label));
        }
    }
    set
}

#[test]
fn one_person_is_not_enough_and_nothing_is_written() {
    let dir = TempDir::new().unwrap();
    let trainer = trainer(&dir);
    let set = clustered(&[("101", [1.0, 0.0, 0.0])], 5);

    let mut phases = Vec::new();
    let err = trainer.train(&set, &mut |phase| phases.push(phase)).unwrap_err();

    assert!(matches!(err, RosterError::InsufficientClasses { found: 1 }));
    assert_eq!(phases, vec![TrainingPhase::LoadingData]);
    assert!(!trainer.models().exists());
}

#[test]
fn failed_training_keeps_the_previous_model() {
    let dir = TempDir::new().unwrap();
    let trainer = trainer(&dir);
    let both = clustered(&[("101", [1.0, 0.0, 0.0]), ("102", [0.0, 1.0, 0.0])], 4);
    trainer.train(&both, &mut |_| {}).unwrap();
    let before = fs::read(trainer.models().classifier_path()).unwrap();

    let single = clustered(&[("103", [0.0, 0.0, 1.0])], 4);
    assert!(trainer.train(&single, &mut |_| {}).is_err());

    assert_eq!(fs::read(trainer.models().classifier_path()).unwrap(), before);
}

#[test]
fn empty_store_reports_zero_classes() {
    let dir = TempDir::new().unwrap();
    let store = EmbeddingStore::new(dir.path().join("encodings.bin"));

    let err = trainer(&dir).train_from_store(&store, &mut |_| {}).unwrap_err();
    assert!(matches!(err, RosterError::InsufficientClasses { found: 0 }));
}

#[test]
fn two_people_train_through_every_phase() {
    let dir = TempDir::new().unwrap();
    let trainer = trainer(&dir);
    let store = EmbeddingStore::new(dir.path().join("encodings.bin"));
    store
        .save(&clustered(&[("2", [0.0, 1.0, 0.0]), ("1", [1.0, 0.0, 0.0])], 6))
        .unwrap();

    let mut phases = Vec::new();
    let report = trainer.train_from_store(&store, &mut |phase| phases.push(phase)).unwrap();

    assert_eq!(
        phases,
        vec![
            TrainingPhase::LoadingData,
            TrainingPhase::EncodingLabels,
            TrainingPhase::Training,
            TrainingPhase::WritingToDisk,
            TrainingPhase::Complete,
        ]
    );
    assert_eq!(report.classes, vec!["1", "2"]);
    assert_eq!(report.samples, 12);

    let model = trainer.models().load().unwrap().unwrap();
    assert_eq!(model.encoder.classes(), ["1", "2"]);
    assert_eq!(model.classifier.n_classes(), 2);
}

#[test]
fn trained_model_identifies_cluster_members() {
    let dir = TempDir::new().unwrap();
    let trainer = trainer(&dir);
    let set = clustered(
        &[("101", [1.0, 0.0, 0.0]), ("102", [0.0, 1.0, 0.0]), ("103", [0.0, 0.0, 1.0])],
        8,
    );
    trainer.train(&set, &mut |_| {}).unwrap();

    let identifier = Identifier::load(trainer.models(), 0.0).unwrap();
    assert_eq!(identifier.classes(), ["101", "102", "103"]);

    let (label, _) = identifier.classify(&[0.02, 0.98, 0.0]).unwrap();
    assert_eq!(label.as_deref(), Some("102"));
}

#[test]
fn clearing_removes_both_artifacts() {
    let dir = TempDir::new().unwrap();
    let trainer = trainer(&dir);
    let set = clustered(&[("1", [1.0, 0.0, 0.0]), ("2", [0.0, 1.0, 0.0])], 3);
    trainer.train(&set, &mut |_| {}).unwrap();

    assert!(trainer.clear().unwrap());
    assert!(!trainer.models().classifier_path().exists());
    assert!(!trainer.models().encoder_path().exists());
    assert!(!trainer.clear().unwrap());
}
