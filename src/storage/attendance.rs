use crate::common::{RosterError, Result};
use crate::storage::write_atomic;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const ROOT_KEY: &str = "attendance";

/// `{ "attendance": { "<id>": <entries> } }`. Only read for dashboard numbers
/// and written when a person is deleted.
pub struct AttendanceStore {
    path: PathBuf,
}

impl AttendanceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(RosterError::Storage(format!(
                "Attendance file {} is not a JSON object", self.path.display()
            ))),
            Err(e) => Err(RosterError::Storage(format!(
                "Attendance file {} is unreadable: {}", self.path.display(), e
            ))),
        }
    }

    /// Number of people with at least one attendance entry.
    pub fn count(&self) -> Result<usize> {
        let document = self.read_document()?;
        Ok(document
            .get(ROOT_KEY)
            .and_then(Value::as_object)
            .map(Map::len)
            .unwrap_or(0))
    }

    /// Remove a person's entries. `Ok(false)` when there was nothing to remove.
    pub fn remove_person(&self, person_id: &str) -> Result<bool> {
        let mut document = self.read_document()?;

        let removed = document
            .get_mut(ROOT_KEY)
            .and_then(Value::as_object_mut)
            .and_then(|people| people.shift_remove(person_id))
            .is_some();

        if removed {
            let bytes = serde_json::to_vec_pretty(&Value::Object(document))
                .map_err(|e| RosterError::Storage(format!("Failed to serialize attendance: {}", e)))?;
            write_atomic(&self.path, &bytes)?;
            tracing::info!("Removed attendance entries for {}", person_id);
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_means_nothing_to_remove() {
        let dir = TempDir::new().unwrap();
        let store = AttendanceStore::new(dir.path().join("attendance.json"));
        assert!(!store.remove_person("101").unwrap());
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn removes_only_the_given_person() {
        let dir = TempDir::new().unwrap();
        let store = AttendanceStore::new(dir.path().join("attendance.json"));
        fs::write(
            store.path(),
            r#"{"attendance": {"101": ["2024-01-01"], "102": ["2024-01-02"]}}"#,
        )
        .unwrap();

        assert!(store.remove_person("101").unwrap());
        assert!(!store.remove_person("101").unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }
}
