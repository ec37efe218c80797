use crate::common::{RosterError, Result};
use crate::core::recognizer::Embedding;
use crate::storage::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub embedding: Embedding,
    pub label: String,
}

impl EmbeddingRecord {
    pub fn new(embedding: Embedding, label: impl Into<String>) -> Self {
        Self {
            embedding,
            label: label.into(),
        }
    }
}

/// Embeddings and their labels as two parallel sequences of equal length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSet {
    encodings: Vec<Embedding>,
    names: Vec<String>,
}

impl EmbeddingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EmbeddingRecord) {
        self.encodings.push(record.embedding);
        self.names.push(record.label);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn encodings(&self) -> &[Embedding] {
        &self.encodings
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Embedding, &str)> {
        self.encodings.iter().zip(self.names.iter().map(String::as_str))
    }

    pub fn distinct_labels(&self) -> BTreeSet<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    pub fn count_for(&self, label: &str) -> usize {
        self.names.iter().filter(|n| n.as_str() == label).count()
    }

    /// Drop every entry labelled `label`; returns how many went.
    pub fn remove_label(&mut self, label: &str) -> usize {
        let before = self.names.len();
        let (encodings, names): (Vec<Embedding>, Vec<String>) = std::mem::take(&mut self.encodings)
            .into_iter()
            .zip(std::mem::take(&mut self.names))
            .filter(|(_, name)| name != label)
            .unzip();
        self.encodings = encodings;
        self.names = names;
        before - self.names.len()
    }
}

impl Extend<EmbeddingRecord> for EmbeddingSet {
    fn extend<I: IntoIterator<Item = EmbeddingRecord>>(&mut self, iter: I) {
        for record in iter {
            self.push(record);
        }
    }
}

impl FromIterator<EmbeddingRecord> for EmbeddingSet {
    fn from_iter<I: IntoIterator<Item = EmbeddingRecord>>(iter: I) -> Self {
        let mut set = EmbeddingSet::new();
        set.extend(iter);
        set
    }
}

/// Bincode file of `{ encodings, names }`. The store is rebuildable from the
/// face samples, so unreadable files load as empty instead of failing.
pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> EmbeddingSet {
        if !self.path.exists() {
            tracing::debug!("No embedding store at {:?}, starting empty", self.path);
            return EmbeddingSet::new();
        }

        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Could not read embedding store {:?}: {}. Starting fresh.", self.path, e);
                return EmbeddingSet::new();
            }
        };

        match bincode::deserialize::<EmbeddingSet>(&data) {
            Ok(set) if set.encodings.len() != set.names.len() => {
                tracing::warn!(
                    "Embedding store {:?} has {} encodings but {} names. Starting fresh.",
                    self.path, set.encodings.len(), set.names.len()
                );
                EmbeddingSet::new()
            }
            Ok(set) => {
                tracing::debug!("Loaded {} existing embeddings", set.len());
                set
            }
            Err(e) => {
                tracing::warn!("Could not decode embedding store {:?}: {}. Starting fresh.", self.path, e);
                EmbeddingSet::new()
            }
        }
    }

    pub fn save(&self, set: &EmbeddingSet) -> Result<()> {
        let encoded = bincode::serialize(set)
            .map_err(|e| RosterError::Storage(format!("Failed to serialize embeddings: {}", e)))?;
        write_atomic(&self.path, &encoded)
    }

    /// Returns the total number of embeddings after the append.
    pub fn append(&self, records: impl IntoIterator<Item = EmbeddingRecord>) -> Result<usize> {
        let mut set = self.load();
        set.extend(records);
        self.save(&set)?;
        Ok(set.len())
    }

    /// Returns how many embeddings were removed; zero is not an error.
    pub fn remove_by_label(&self, label: &str) -> Result<usize> {
        let mut set = self.load();
        let removed = set.remove_label(label);
        if removed > 0 {
            self.save(&set)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(value: f32, label: &str) -> EmbeddingRecord {
        EmbeddingRecord::new(vec![value, value + 1.0], label)
    }

    #[test]
    fn missing_and_corrupt_files_load_empty() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("encodings.bin"));
        assert!(store.load().is_empty());

        fs::write(store.path(), b"\x01garbage").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn mismatched_lengths_are_treated_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("encodings.bin"));
        let bad = EmbeddingSet {
            encodings: vec![vec![1.0], vec![2.0]],
            names: vec!["1".into()],
        };
        fs::write(store.path(), bincode::serialize(&bad).unwrap()).unwrap();

        assert!(store.load().is_empty());
    }

    #[test]
    fn append_does_not_deduplicate() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("out").join("encodings.bin"));

        assert_eq!(store.append(vec![record(1.0, "1")]).unwrap(), 1);
        assert_eq!(store.append(vec![record(1.0, "1")]).unwrap(), 2);

        let set = store.load();
        assert_eq!(set.count_for("1"), 2);
        assert_eq!(set.encodings().len(), set.names().len());
    }

    #[test]
    fn remove_by_label_keeps_other_labels() {
        let dir = TempDir::new().unwrap();
        let store = EmbeddingStore::new(dir.path().join("encodings.bin"));
        store
            .append(vec![record(1.0, "1"), record(2.0, "2"), record(3.0, "1"), record(4.0, "3")])
            .unwrap();

        assert_eq!(store.remove_by_label("1").unwrap(), 2);
        assert_eq!(store.remove_by_label("1").unwrap(), 0);

        let set = store.load();
        assert_eq!(set.count_for("1"), 0);
        assert_eq!(set.count_for("2"), 1);
        assert_eq!(set.count_for("3"), 1);
        assert_eq!(set.encodings()[0], vec![2.0, 3.0]);
    }
}
