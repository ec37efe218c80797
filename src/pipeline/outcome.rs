use crate::common::RosterError;
use std::fmt;

/// User-facing result of a coordinated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    ValidationFailed,
    ResourceUnavailable,
    AlreadyExists,
    NotFound,
    InsufficientData,
    NothingToDo,
    Cancelled,
    UnknownError,
}

impl OutcomeKind {
    /// `NothingToDo` and `Cancelled` are not failures.
    pub fn is_failure(&self) -> bool {
        !matches!(self, OutcomeKind::Success | OutcomeKind::NothingToDo | OutcomeKind::Cancelled)
    }
}

impl From<&RosterError> for OutcomeKind {
    fn from(error: &RosterError) -> Self {
        match error {
            RosterError::InvalidInput(_) | RosterError::Config(_) => OutcomeKind::ValidationFailed,
            RosterError::CameraUnavailable(_) | RosterError::Model(_) | RosterError::SessionBusy => {
                OutcomeKind::ResourceUnavailable
            }
            RosterError::DuplicateId(_) => OutcomeKind::AlreadyExists,
            RosterError::NotFound(_) => OutcomeKind::NotFound,
            RosterError::InsufficientClasses { .. } => OutcomeKind::InsufficientData,
            RosterError::NoCandidateFolder(_) | RosterError::NoImages(_) => OutcomeKind::NothingToDo,
            RosterError::Storage(_)
            | RosterError::CorruptRecordStore { .. }
            | RosterError::Io(_)
            | RosterError::Image(_)
            | RosterError::Ort(_)
            | RosterError::Other(_) => OutcomeKind::UnknownError,
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::ValidationFailed => "validation failed",
            OutcomeKind::ResourceUnavailable => "resource unavailable",
            OutcomeKind::AlreadyExists => "already exists",
            OutcomeKind::NotFound => "not found",
            OutcomeKind::InsufficientData => "insufficient data",
            OutcomeKind::NothingToDo => "nothing to do",
            OutcomeKind::Cancelled => "cancelled",
            OutcomeKind::UnknownError => "unknown error",
        };
        f.write_str(text)
    }
}
