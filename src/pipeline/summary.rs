use crate::common::Result;
use crate::storage::{AttendanceStore, EmbeddingStore, ModelStore, PersonStatus, RecordRepository};
use chrono::{DateTime, Local};
use std::fmt;

/// Dashboard numbers for the `status` command.
#[derive(Debug, Clone)]
pub struct RosterSummary {
    pub people: usize,
    pub enrolled: usize,
    pub active: usize,
    pub inactive: usize,
    pub embeddings: usize,
    pub labels: usize,
    pub model_trained: bool,
    pub attendance_entries: usize,
    pub generated_at: DateTime<Local>,
}

impl RosterSummary {
    pub fn collect(
        records: &dyn RecordRepository,
        embeddings: &EmbeddingStore,
        models: &ModelStore,
        attendance: &AttendanceStore,
    ) -> Result<Self> {
        let people = records.list_all()?;
        let count = |status: PersonStatus| people.iter().filter(|p| p.status == status).count();

        let set = embeddings.load();
        let attendance_entries = attendance.count().unwrap_or_else(|e| {
            tracing::warn!("Could not read attendance: {}", e);
            0
        });

        Ok(Self {
            people: people.len(),
            enrolled: count(PersonStatus::Enrolled),
            active: count(PersonStatus::Active),
            inactive: count(PersonStatus::Inactive),
            embeddings: set.len(),
            labels: set.distinct_labels().len(),
            model_trained: models.exists(),
            attendance_entries,
            generated_at: Local::now(),
        })
    }
}

impl fmt::Display for RosterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Roster status ({})", self.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "  People:        {}", self.people)?;
        writeln!(f, "    enrolled:    {}", self.enrolled)?;
        writeln!(f, "    active:      {}", self.active)?;
        writeln!(f, "    inactive:    {}", self.inactive)?;
        writeln!(f, "  Embeddings:    {} ({} people)", self.embeddings, self.labels)?;
        writeln!(f, "  Model:         {}", if self.model_trained { "trained" } else { "not trained" })?;
        write!(f, "  Attendance:    {} people", self.attendance_entries)
    }
}
