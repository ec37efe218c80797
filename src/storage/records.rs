use crate::common::{RosterError, Result};
use crate::storage::write_atomic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// Literal used by the old tooling for missing fields.
pub const PLACEHOLDER: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonStatus {
    Enrolled,
    Active,
    Inactive,
}

impl PersonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonStatus::Enrolled => "enrolled",
            PersonStatus::Active => "active",
            PersonStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for PersonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonStatus {
    type Err = RosterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enrolled" => Ok(PersonStatus::Enrolled),
            "active" => Ok(PersonStatus::Active),
            "inactive" => Ok(PersonStatus::Inactive),
            other => Err(RosterError::InvalidInput(format!("Unknown status: '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub person_id: String,
    pub name: String,
    pub status: PersonStatus,
}

impl PersonRecord {
    pub fn new(person_id: impl Into<String>, name: impl Into<String>, status: PersonStatus) -> Self {
        Self {
            person_id: person_id.into(),
            name: name.into(),
            status,
        }
    }
}

/// Durable person id → (name, status) mapping. `person_id` is unique across
/// the whole store.
pub trait RecordRepository: Send + Sync {
    fn lookup(&self, person_id: &str) -> Result<Option<PersonRecord>>;
    fn insert(&self, record: PersonRecord) -> Result<()>;
    fn update(&self, person_id: &str, name: &str, status: PersonStatus) -> Result<PersonRecord>;
    fn delete(&self, person_id: &str) -> Result<PersonRecord>;
    /// Well-formed records in store order; malformed entries are skipped.
    fn list_all(&self) -> Result<Vec<PersonRecord>>;
}

/// JSON document `{ "<id>": ["<name>", "<status>"] }`.
pub struct JsonRecordStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| RosterError::Storage("Record store lock poisoned".into()))
    }

    fn read_document(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(RosterError::CorruptRecordStore {
                path: self.path.clone(),
                reason: "top level is not an object".into(),
            }),
            Err(e) => Err(RosterError::CorruptRecordStore {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn write_document(&self, document: Map<String, Value>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&Value::Object(document))
            .map_err(|e| RosterError::Storage(format!("Failed to serialize records: {}", e)))?;
        write_atomic(&self.path, &bytes)
    }
}

fn entry_value(name: &str, status: PersonStatus) -> Value {
    Value::Array(vec![
        Value::String(name.to_string()),
        Value::String(status.as_str().to_string()),
    ])
}

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(PLACEHOLDER)
}

fn parse_entry(person_id: &str, value: &Value) -> std::result::Result<PersonRecord, String> {
    if is_placeholder(person_id) {
        return Err("placeholder id".into());
    }

    let fields = value.as_array().ok_or("entry is not a [name, status] pair")?;
    let name = fields.first().and_then(Value::as_str).unwrap_or(PLACEHOLDER);
    let status = fields.get(1).and_then(Value::as_str).unwrap_or(PLACEHOLDER);

    if is_placeholder(name) {
        return Err("missing name".into());
    }
    if is_placeholder(status) {
        return Err("missing status".into());
    }
    let status = status.parse::<PersonStatus>().map_err(|e| e.to_string())?;

    Ok(PersonRecord::new(person_id, name, status))
}

impl RecordRepository for JsonRecordStore {
    fn lookup(&self, person_id: &str) -> Result<Option<PersonRecord>> {
        let _guard = self.guard()?;
        let document = self.read_document()?;

        match document.get(person_id) {
            None => Ok(None),
            Some(value) => match parse_entry(person_id, value) {
                Ok(record) => Ok(Some(record)),
                Err(reason) => {
                    tracing::warn!("Skipping malformed record '{}': {}", person_id, reason);
                    Ok(None)
                }
            },
        }
    }

    fn insert(&self, record: PersonRecord) -> Result<()> {
        let _guard = self.guard()?;
        let mut document = self.read_document()?;

        if document.contains_key(&record.person_id) {
            return Err(RosterError::DuplicateId(record.person_id));
        }

        document.insert(record.person_id.clone(), entry_value(&record.name, record.status));
        self.write_document(document)?;
        tracing::info!("Inserted record {} ({})", record.person_id, record.name);
        Ok(())
    }

    fn update(&self, person_id: &str, name: &str, status: PersonStatus) -> Result<PersonRecord> {
        let _guard = self.guard()?;
        let mut document = self.read_document()?;

        let entry = document
            .get_mut(person_id)
            .ok_or_else(|| RosterError::NotFound(person_id.to_string()))?;
        *entry = entry_value(name, status);

        self.write_document(document)?;
        tracing::info!("Updated record {}: name='{}', status={}", person_id, name, status);
        Ok(PersonRecord::new(person_id, name, status))
    }

    fn delete(&self, person_id: &str) -> Result<PersonRecord> {
        let _guard = self.guard()?;
        let mut document = self.read_document()?;

        // shift_remove keeps the remaining records in their original order
        let removed = document
            .shift_remove(person_id)
            .ok_or_else(|| RosterError::NotFound(person_id.to_string()))?;

        self.write_document(document)?;
        tracing::info!("Deleted record {}", person_id);

        let record = parse_entry(person_id, &removed).unwrap_or_else(|reason| {
            tracing::warn!("Deleted malformed record '{}': {}", person_id, reason);
            PersonRecord::new(person_id, PLACEHOLDER, PersonStatus::Inactive)
        });
        Ok(record)
    }

    fn list_all(&self) -> Result<Vec<PersonRecord>> {
        let _guard = self.guard()?;
        let document = self.read_document()?;

        let mut records = Vec::with_capacity(document.len());
        for (person_id, value) in &document {
            match parse_entry(person_id, value) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::warn!("Skipping incomplete or 'unknown' record '{}': {}", person_id, reason);
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> JsonRecordStore {
        JsonRecordStore::new(dir.path().join("database").join("enroll.json"))
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.insert(PersonRecord::new("101", "Alice", PersonStatus::Enrolled)).unwrap();

        let record = store.lookup("101").unwrap().unwrap();
        assert_eq!(record, PersonRecord::new("101", "Alice", PersonStatus::Enrolled));
        assert!(store.lookup("102").unwrap().is_none());
    }

    #[test]
    fn duplicate_insert_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.insert(PersonRecord::new("101", "Alice", PersonStatus::Enrolled)).unwrap();
        let before = fs::read(store.path()).unwrap();

        let err = store
            .insert(PersonRecord::new("101", "Mallory", PersonStatus::Active))
            .unwrap_err();

        assert!(matches!(err, RosterError::DuplicateId(id) if id == "101"));
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn update_and_delete_require_existing_record() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(matches!(store.update("7", "X", PersonStatus::Active), Err(RosterError::NotFound(_))));
        assert!(matches!(store.delete("7"), Err(RosterError::NotFound(_))));

        store.insert(PersonRecord::new("7", "Bob", PersonStatus::Enrolled)).unwrap();
        let updated = store.update("7", "Robert", PersonStatus::Inactive).unwrap();
        assert_eq!(updated.name, "Robert");
        assert_eq!(store.lookup("7").unwrap().unwrap().status, PersonStatus::Inactive);

        store.delete("7").unwrap();
        assert!(store.lookup("7").unwrap().is_none());
    }

    #[test]
    fn list_all_skips_malformed_entries_in_document_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            r#"{
                "20": ["Zed", "active"],
                "3": ["unknown", "enrolled"],
                "4": ["Dora"],
                "unknown": ["Ghost", "active"],
                "5": ["Eve", "banned"],
                "1": ["Ann", "enrolled"]
            }"#,
        )
        .unwrap();

        let ids: Vec<String> = store.list_all().unwrap().into_iter().map(|r| r.person_id).collect();
        assert_eq!(ids, vec!["20", "1"]);
    }

    #[test]
    fn corrupt_document_is_reported_not_emptied() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{ not json").unwrap();

        assert!(matches!(store.list_all(), Err(RosterError::CorruptRecordStore { .. })));
        assert!(matches!(
            store.insert(PersonRecord::new("1", "A", PersonStatus::Enrolled)),
            Err(RosterError::CorruptRecordStore { .. })
        ));
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{ not json");
    }
}
